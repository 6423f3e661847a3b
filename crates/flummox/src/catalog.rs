//! Named constructors for stores and action sets.
//!
//! A [`Catalog`] maps class names to constructors taking JSON arguments. It is
//! what lets a [`FluxConfig`](crate::FluxConfig) name the stores and action
//! sets to build, and it is where a class of the wrong kind is caught: asking
//! for a store from an action-set class fails with
//! [`FluxError::InvalidVariant`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::action::ActionSet;
use crate::error::{FluxError, RegistryKind};
use crate::flux::Flux;
use crate::store::{BoxedStore, Store, StoreRef};

type StoreCtor = Box<dyn Fn(&Value) -> anyhow::Result<BoxedStore> + Send + Sync>;
type ActionsCtor = Box<dyn Fn(&Value) -> anyhow::Result<ActionSet> + Send + Sync>;

enum Constructor {
    Store(StoreCtor),
    Actions(ActionsCtor),
}

impl Constructor {
    fn kind(&self) -> RegistryKind {
        match self {
            Constructor::Store(_) => RegistryKind::Store,
            Constructor::Actions(_) => RegistryKind::Actions,
        }
    }
}

/// Class name to constructor.
#[derive(Default)]
pub struct Catalog {
    classes: HashMap<String, Constructor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store class. A later registration under the same name
    /// replaces the earlier one.
    pub fn store_class<S, F>(mut self, class: impl Into<String>, ctor: F) -> Self
    where
        S: Store,
        F: Fn(&Value) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        self.classes.insert(
            class.into(),
            Constructor::Store(Box::new(move |args: &Value| ctor(args).map(BoxedStore::new))),
        );
        self
    }

    /// Register an action set class.
    pub fn actions_class<F>(mut self, class: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<ActionSet> + Send + Sync + 'static,
    {
        self.classes
            .insert(class.into(), Constructor::Actions(Box::new(ctor)));
        self
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Whether `class` builds stores or action sets.
    pub fn kind_of(&self, class: &str) -> Option<RegistryKind> {
        self.classes.get(class).map(Constructor::kind)
    }

    fn lookup(&self, class: &str, expected: RegistryKind) -> Result<&Constructor, FluxError> {
        let ctor = self
            .classes
            .get(class)
            .ok_or_else(|| FluxError::UnknownClass(class.to_string()))?;
        if ctor.kind() != expected {
            return Err(FluxError::InvalidVariant {
                class: class.to_string(),
                expected,
            });
        }
        Ok(ctor)
    }

    fn construct<T>(class: &str, result: anyhow::Result<T>) -> Result<T, FluxError> {
        result.map_err(|source| FluxError::Construct {
            class: class.to_string(),
            source,
        })
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<(&String, RegistryKind)> =
            self.classes.iter().map(|(name, ctor)| (name, ctor.kind())).collect();
        classes.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_struct("Catalog").field("classes", &classes).finish()
    }
}

impl Flux {
    /// Build the store class `class` from `catalog` with `args` and register
    /// it under `key`.
    ///
    /// The class kind is checked first, then the key, and only then is the
    /// constructor run.
    pub fn create_store_from(
        &self,
        catalog: &Catalog,
        key: impl Into<String>,
        class: &str,
        args: &Value,
    ) -> Result<StoreRef, FluxError> {
        let key = key.into();
        let Constructor::Store(ctor) = catalog.lookup(class, RegistryKind::Store)? else {
            return Err(FluxError::InvalidVariant {
                class: class.to_string(),
                expected: RegistryKind::Store,
            });
        };
        if self.get_store(&key).is_some() {
            return Err(FluxError::DuplicateKey {
                kind: RegistryKind::Store,
                key,
            });
        }
        debug!(%key, class, "constructing store");
        let boxed = Catalog::construct(class, ctor(args))?;
        self.insert_store(key, boxed)
    }

    /// Build the action set class `class` from `catalog` and register it
    /// under `key`.
    pub fn create_actions_from(
        &self,
        catalog: &Catalog,
        key: impl Into<String>,
        class: &str,
        args: &Value,
    ) -> Result<Arc<ActionSet>, FluxError> {
        let key = key.into();
        let Constructor::Actions(ctor) = catalog.lookup(class, RegistryKind::Actions)? else {
            return Err(FluxError::InvalidVariant {
                class: class.to_string(),
                expected: RegistryKind::Actions,
            });
        };
        if self.get_actions(&key).is_some() {
            return Err(FluxError::DuplicateKey {
                kind: RegistryKind::Actions,
                key,
            });
        }
        debug!(%key, class, "constructing actions");
        let actions = Catalog::construct(class, ctor(args))?;
        self.create_actions(key, actions)
    }
}
