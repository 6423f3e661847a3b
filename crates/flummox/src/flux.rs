//! The orchestrator: named stores and action sets sharing one dispatch channel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{ActionSet, DispatchFn};
use crate::dispatch::{DispatchChannel, Dispatcher};
use crate::error::{FluxError, RegistryKind};
use crate::payload::{ActionId, Payload};
use crate::store::{BoxedStore, Store, StoreRef};
use crate::wait::WaitTargets;

struct FluxInner {
    dispatcher: Arc<dyn DispatchChannel>,
    stores: DashMap<String, StoreRef>,
    actions: DashMap<String, Arc<ActionSet>>,
}

/// Binds named stores and action sets to one dispatch channel.
///
/// `Flux` is a handle: clones share the same registries and channel.
///
/// Keys are unique per registry. Creating a second store (or action set)
/// under an existing key fails and leaves the first one in place.
#[derive(Clone)]
pub struct Flux {
    inner: Arc<FluxInner>,
}

impl Default for Flux {
    fn default() -> Self {
        Self::new()
    }
}

impl Flux {
    /// A new orchestrator over an in-memory [`Dispatcher`].
    pub fn new() -> Self {
        Self::with_dispatcher(Arc::new(Dispatcher::new()))
    }

    /// A new orchestrator over a caller-supplied channel.
    pub fn with_dispatcher(dispatcher: Arc<dyn DispatchChannel>) -> Self {
        Self {
            inner: Arc::new(FluxInner {
                dispatcher,
                stores: DashMap::new(),
                actions: DashMap::new(),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Arc<dyn DispatchChannel> {
        &self.inner.dispatcher
    }

    // ------------------------------------------------------------------
    // Stores
    // ------------------------------------------------------------------

    /// Register `store` under `key` and subscribe its handler.
    pub fn create_store<S: Store>(&self, key: impl Into<String>, store: S) -> Result<StoreRef, FluxError> {
        self.insert_store(key.into(), BoxedStore::new(store))
    }

    pub(crate) fn insert_store(&self, key: String, boxed: BoxedStore) -> Result<StoreRef, FluxError> {
        match self.inner.stores.entry(key) {
            Entry::Occupied(entry) => Err(FluxError::DuplicateKey {
                kind: RegistryKind::Store,
                key: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let store = StoreRef::register(entry.key(), boxed, &self.inner.dispatcher);
                info!(key = %store.key(), token = %store.token(), store = store.type_name(), "store created");
                entry.insert(store.clone());
                Ok(store)
            }
        }
    }

    pub fn get_store(&self, key: &str) -> Option<StoreRef> {
        self.inner.stores.get(key).map(|entry| entry.value().clone())
    }

    /// Typed lookup. `None` if the key is unknown or holds another type.
    pub fn get_store_as<S: Store>(&self, key: &str) -> Option<Arc<S>> {
        self.get_store(key).and_then(|store| store.downcast::<S>())
    }

    /// Remove the store under `key` and unsubscribe its handler, so it sees
    /// no further dispatches. Unknown keys are a no-op.
    pub fn remove_store(&self, key: &str) -> Result<Option<StoreRef>, FluxError> {
        let Some(store) = self.get_store(key) else {
            return Ok(None);
        };
        // Stays registered if the channel refuses to let go of the handler.
        self.inner.dispatcher.unregister(store.token())?;
        self.inner
            .stores
            .remove_if(key, |_, entry| entry.token() == store.token());
        info!(key, token = %store.token(), "store removed");
        Ok(Some(store))
    }

    /// Registered store keys, sorted.
    pub fn store_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.stores.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    // ------------------------------------------------------------------
    // Action sets
    // ------------------------------------------------------------------

    /// Register `actions` under `key` and wire them to this orchestrator's
    /// dispatch entry point.
    pub fn create_actions(&self, key: impl Into<String>, actions: ActionSet) -> Result<Arc<ActionSet>, FluxError> {
        match self.inner.actions.entry(key.into()) {
            Entry::Occupied(entry) => Err(FluxError::DuplicateKey {
                kind: RegistryKind::Actions,
                key: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                if !actions.bind(self.dispatch_fn()) {
                    warn!(set = actions.name(), "action set was already wired");
                }
                let actions = Arc::new(actions);
                info!(key = %entry.key(), set = actions.name(), actions = actions.len(), "actions created");
                entry.insert(actions.clone());
                Ok(actions)
            }
        }
    }

    pub fn get_actions(&self, key: &str) -> Option<Arc<ActionSet>> {
        self.inner.actions.get(key).map(|entry| entry.value().clone())
    }

    /// Method name to action id for the set under `key`; `None` if unknown.
    pub fn get_action_ids(&self, key: &str) -> Option<BTreeMap<String, ActionId>> {
        self.get_actions(key).map(|actions| actions.action_ids())
    }

    /// Same as [`get_action_ids`](Self::get_action_ids).
    pub fn get_constants(&self, key: &str) -> Option<BTreeMap<String, ActionId>> {
        self.get_action_ids(key)
    }

    /// Registered action set keys, sorted.
    pub fn action_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.actions.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    // ------------------------------------------------------------------
    // Dispatch and ordering
    // ------------------------------------------------------------------

    /// Send `{action_id, body}` to every registered store. The id is not
    /// checked against any action set.
    pub fn dispatch(&self, action_id: impl Into<ActionId>, body: impl Serialize) -> Result<(), FluxError> {
        let payload = Payload::new(action_id, serde_json::to_value(body)?);
        self.dispatch_payload(payload)
    }

    pub fn dispatch_payload(&self, payload: Payload) -> Result<(), FluxError> {
        debug!(action_id = %payload.action_id, "flux dispatch");
        self.inner.dispatcher.dispatch(payload)
    }

    /// From inside a store handler: make the given stores (or tokens) handle
    /// the current payload first.
    pub fn wait_for(&self, targets: impl Into<WaitTargets>) -> Result<(), FluxError> {
        let tokens = targets.into().tokens();
        debug!(?tokens, "flux wait_for");
        self.inner.dispatcher.wait_for(&tokens)
    }

    pub fn is_dispatching(&self) -> bool {
        self.inner.dispatcher.is_dispatching()
    }

    // Captures the channel only; capturing `self` would cycle through `actions`.
    fn dispatch_fn(&self) -> DispatchFn {
        let dispatcher = self.inner.dispatcher.clone();
        Arc::new(move |payload: Payload| {
            debug!(action_id = %payload.action_id, "flux dispatch");
            dispatcher.dispatch(payload)
        })
    }
}

impl fmt::Debug for Flux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flux")
            .field("stores", &self.store_keys())
            .field("actions", &self.action_keys())
            .finish()
    }
}
