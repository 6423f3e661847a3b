//! The store capability and its registry entry.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::dispatch::{Callback, DispatchChannel, DispatchToken};
use crate::error::FluxError;
use crate::payload::Payload;
use crate::wait::WaitTargets;

/// A stateful subscriber that reacts to dispatched payloads.
///
/// Stores keep their state behind interior mutability: `handle` borrows the
/// store immutably because other stores may read it (through
/// [`StoreRef::downcast`]) while a dispatch is in flight.
///
/// # Example
///
/// ```ignore
/// struct CounterStore {
///     count: AtomicI64,
///     increment: ActionId,
/// }
///
/// impl Store for CounterStore {
///     fn handle(&self, payload: &Payload, _wiring: &StoreWiring) -> Result<(), FluxError> {
///         if payload.is(&self.increment) {
///             self.count.fetch_add(payload.body_as::<i64>()?, Ordering::SeqCst);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Store: Send + Sync + 'static {
    /// Called once per dispatched payload.
    ///
    /// Unknown action ids reach every store; ignore what you don't handle.
    fn handle(&self, payload: &Payload, wiring: &StoreWiring) -> Result<(), FluxError>;
}

/// What a store gets injected at registration: its own dispatch token and a
/// bound `wait_for`.
pub struct StoreWiring {
    channel: Arc<dyn DispatchChannel>,
    token: OnceLock<DispatchToken>,
}

impl StoreWiring {
    fn new(channel: Arc<dyn DispatchChannel>) -> Self {
        Self {
            channel,
            token: OnceLock::new(),
        }
    }

    /// This store's dispatch token. Set as soon as registration completes.
    pub fn token(&self) -> Option<DispatchToken> {
        self.token.get().copied()
    }

    /// Make the given stores (or raw tokens) finish handling the current
    /// payload before this call returns.
    pub fn wait_for(&self, targets: impl Into<WaitTargets>) -> Result<(), FluxError> {
        let tokens = targets.into().tokens();
        trace!(waiter = ?self.token(), ?tokens, "store waiting");
        self.channel.wait_for(&tokens)
    }
}

impl fmt::Debug for StoreWiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWiring")
            .field("token", &self.token())
            .finish_non_exhaustive()
    }
}

/// A store with its concrete type erased but still recoverable.
pub(crate) struct BoxedStore {
    store: Arc<dyn Store>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl BoxedStore {
    pub(crate) fn new<S: Store>(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            store: store.clone(),
            any: store,
            type_name: std::any::type_name::<S>(),
        }
    }
}

/// A registered store: its key, its dispatch token and the live instance.
///
/// Cloning is cheap and every clone refers to the same instance. Pass a
/// `StoreRef` to `wait_for` to wait on that store.
#[derive(Clone)]
pub struct StoreRef {
    key: Arc<str>,
    token: DispatchToken,
    store: Arc<dyn Store>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    wiring: Arc<StoreWiring>,
}

impl StoreRef {
    /// Subscribe the store's handler to `channel` and inject its wiring.
    pub(crate) fn register(
        key: &str,
        boxed: BoxedStore,
        channel: &Arc<dyn DispatchChannel>,
    ) -> Self {
        let wiring = Arc::new(StoreWiring::new(channel.clone()));

        let handler: Callback = {
            let store = boxed.store.clone();
            let wiring = wiring.clone();
            Arc::new(move |payload: &Payload| store.handle(payload, &wiring))
        };
        let token = channel.register(handler);
        let _ = wiring.token.set(token);

        Self {
            key: Arc::from(key),
            token,
            store: boxed.store,
            any: boxed.any,
            type_name: boxed.type_name,
            wiring,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> DispatchToken {
        self.token
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn wiring(&self) -> &StoreWiring {
        &self.wiring
    }

    /// Concrete type name of the store, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<S: Store>(&self) -> bool {
        self.any.is::<S>()
    }

    /// Recover the concrete store.
    pub fn downcast<S: Store>(&self) -> Option<Arc<S>> {
        self.any.clone().downcast::<S>().ok()
    }
}

impl fmt::Debug for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRef")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        payloads: Mutex<Vec<Payload>>,
        tokens: Mutex<Vec<Option<DispatchToken>>>,
    }

    impl Store for Seen {
        fn handle(&self, payload: &Payload, wiring: &StoreWiring) -> Result<(), FluxError> {
            self.payloads.lock().unwrap().push(payload.clone());
            self.tokens.lock().unwrap().push(wiring.token());
            Ok(())
        }
    }

    struct Other;

    impl Store for Other {
        fn handle(&self, _payload: &Payload, _wiring: &StoreWiring) -> Result<(), FluxError> {
            Ok(())
        }
    }

    #[test]
    fn registered_handler_sees_payload_and_its_own_token() {
        let channel: Arc<dyn DispatchChannel> = Arc::new(Dispatcher::new());
        let entry = StoreRef::register("seen", BoxedStore::new(Seen::default()), &channel);

        channel.dispatch(Payload::new("actionId", json!("foobar"))).unwrap();

        let seen = entry.downcast::<Seen>().expect("concrete store");
        let payloads = seen.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].body, json!("foobar"));
        assert_eq!(*seen.tokens.lock().unwrap(), vec![Some(entry.token())]);
    }

    #[test]
    fn downcast_to_wrong_type_is_none() {
        let channel: Arc<dyn DispatchChannel> = Arc::new(Dispatcher::new());
        let entry = StoreRef::register("seen", BoxedStore::new(Seen::default()), &channel);

        assert!(entry.is::<Seen>());
        assert!(!entry.is::<Other>());
        assert!(entry.downcast::<Other>().is_none());
        assert!(entry.type_name().ends_with("Seen"));
    }

    #[test]
    fn clones_share_the_same_instance() {
        let channel: Arc<dyn DispatchChannel> = Arc::new(Dispatcher::new());
        let entry = StoreRef::register("seen", BoxedStore::new(Seen::default()), &channel);
        let clone = entry.clone();

        assert!(Arc::ptr_eq(
            &entry.downcast::<Seen>().unwrap(),
            &clone.downcast::<Seen>().unwrap()
        ));
        assert_eq!(entry.token(), clone.token());
    }
}
