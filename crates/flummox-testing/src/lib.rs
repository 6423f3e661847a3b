//! # Flummox Testing
//!
//! Test doubles for code built on `flummox`.
//!
//! - [`RecordingStore`] keeps every payload it sees.
//! - [`FnStore`] turns a closure into a store.
//! - [`OrderLog`] records which stores ran, in order.
//! - [`SpyChannel`] records what reaches the dispatch channel, and can forward
//!   it to a real [`Dispatcher`].
//!
//! ```ignore
//! let flux = Flux::new();
//! let recorder = flux.create_store("recorder", RecordingStore::new())?;
//!
//! flux.dispatch("INC", 1)?;
//!
//! let recorder = recorder.downcast::<RecordingStore>().unwrap();
//! assert_eq!(recorder.action_ids(), vec!["INC"]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use flummox::{
    ActionId, Callback, DispatchChannel, DispatchToken, Dispatcher, FluxError, Payload, Store,
    StoreWiring, WaitTargets,
};
use serde::de::DeserializeOwned;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// RecordingStore
// ============================================================================

/// Keeps every payload, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingStore {
    payloads: Mutex<Vec<Payload>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<Payload> {
        lock(&self.payloads).clone()
    }

    pub fn action_ids(&self) -> Vec<ActionId> {
        lock(&self.payloads)
            .iter()
            .map(|p| p.action_id.clone())
            .collect()
    }

    /// Bodies of the payloads tagged `action_id`, decoded as `T`.
    pub fn bodies<T: DeserializeOwned>(&self, action_id: &ActionId) -> Result<Vec<T>, FluxError> {
        lock(&self.payloads)
            .iter()
            .filter(|p| p.is(action_id))
            .map(Payload::body_as)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.payloads).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.payloads).clear();
    }
}

impl Store for RecordingStore {
    fn handle(&self, payload: &Payload, _wiring: &StoreWiring) -> Result<(), FluxError> {
        lock(&self.payloads).push(payload.clone());
        Ok(())
    }
}

// ============================================================================
// FnStore
// ============================================================================

type Handler = dyn Fn(&Payload, &StoreWiring) -> Result<(), FluxError> + Send + Sync;

/// A store whose handler is a closure.
///
/// `anyhow` errors convert with `?` and surface as [`FluxError::Handler`].
pub struct FnStore {
    handler: Box<Handler>,
}

impl FnStore {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Payload, &StoreWiring) -> Result<(), FluxError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl Store for FnStore {
    fn handle(&self, payload: &Payload, wiring: &StoreWiring) -> Result<(), FluxError> {
        (self.handler)(payload, wiring)
    }
}

impl std::fmt::Debug for FnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStore").finish_non_exhaustive()
    }
}

// ============================================================================
// OrderLog
// ============================================================================

/// Shared, append-only list of names. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct OrderLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl OrderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: impl Into<String>) {
        lock(&self.entries).push(name.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        lock(&self.entries).iter().position(|entry| entry == name)
    }

    /// Whether `first` was logged before `second`. False if either is missing.
    pub fn ran_before(&self, first: &str, second: &str) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// A store that logs `name` on every payload.
    pub fn store(&self, name: impl Into<String>) -> FnStore {
        self.waiting_store(name, WaitTargets::new())
    }

    /// A store that waits for `targets`, then logs `name`.
    pub fn waiting_store(&self, name: impl Into<String>, targets: impl Into<WaitTargets>) -> FnStore {
        let log = self.clone();
        let name = name.into();
        let targets = targets.into();
        FnStore::new(move |_payload, wiring| {
            if !targets.is_empty() {
                wiring.wait_for(targets.clone())?;
            }
            log.push(name.clone());
            Ok(())
        })
    }
}

// ============================================================================
// SpyChannel
// ============================================================================

/// A [`DispatchChannel`] that records every dispatch and wait.
///
/// [`SpyChannel::forwarding`] also delivers to a real [`Dispatcher`], so
/// stores still run. [`SpyChannel::silent`] only records.
pub struct SpyChannel {
    inner: Option<Dispatcher>,
    dispatched: Mutex<Vec<Payload>>,
    waits: Mutex<Vec<Vec<DispatchToken>>>,
    registered: Mutex<Vec<DispatchToken>>,
    next_token: Mutex<u64>,
}

impl SpyChannel {
    pub fn forwarding() -> Self {
        Self::with_inner(Some(Dispatcher::new()))
    }

    pub fn silent() -> Self {
        Self::with_inner(None)
    }

    fn with_inner(inner: Option<Dispatcher>) -> Self {
        Self {
            inner,
            dispatched: Mutex::new(Vec::new()),
            waits: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            next_token: Mutex::new(0),
        }
    }

    pub fn dispatched(&self) -> Vec<Payload> {
        lock(&self.dispatched).clone()
    }

    pub fn waits(&self) -> Vec<Vec<DispatchToken>> {
        lock(&self.waits).clone()
    }

    /// Tokens currently registered through this channel.
    pub fn registered(&self) -> Vec<DispatchToken> {
        lock(&self.registered).clone()
    }
}

impl DispatchChannel for SpyChannel {
    fn register(&self, callback: Callback) -> DispatchToken {
        let token = match &self.inner {
            Some(inner) => inner.register(callback),
            None => {
                let mut next = lock(&self.next_token);
                *next += 1;
                DispatchToken::from_raw(*next)
            }
        };
        lock(&self.registered).push(token);
        token
    }

    fn unregister(&self, token: DispatchToken) -> Result<(), FluxError> {
        if let Some(inner) = &self.inner {
            inner.unregister(token)?;
        }
        lock(&self.registered).retain(|t| *t != token);
        Ok(())
    }

    fn dispatch(&self, payload: Payload) -> Result<(), FluxError> {
        lock(&self.dispatched).push(payload.clone());
        match &self.inner {
            Some(inner) => inner.dispatch(payload),
            None => Ok(()),
        }
    }

    fn wait_for(&self, tokens: &[DispatchToken]) -> Result<(), FluxError> {
        lock(&self.waits).push(tokens.to_vec());
        match &self.inner {
            Some(inner) => inner.wait_for(tokens),
            None => Ok(()),
        }
    }

    fn is_dispatching(&self) -> bool {
        self.inner.as_ref().is_some_and(Dispatcher::is_dispatching)
    }
}

impl std::fmt::Debug for SpyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyChannel")
            .field("forwarding", &self.inner.is_some())
            .field("dispatched", &lock(&self.dispatched).len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flummox::{ActionOutcome, ActionSet, Flux};
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::OnceLock;

    fn counter_actions() -> ActionSet {
        ActionSet::builder("CounterActions")
            .action("increment", |_: ()| Ok(Some(1)))
            .action("peek", |_: ()| Ok(None::<i64>))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn counter_increments_once_per_action_call() {
        let flux = Flux::new();
        let actions = counter_actions();
        let inc = actions.action_id("increment").unwrap().clone();

        let count = Arc::new(AtomicI64::new(0));
        let seen = count.clone();
        flux.create_store(
            "Counter",
            FnStore::new(move |payload, _| {
                if payload.is(&inc) {
                    seen.fetch_add(payload.body_as::<i64>()?, Ordering::SeqCst);
                }
                Ok(())
            }),
        )
        .unwrap();
        let actions = flux.create_actions("CounterActions", actions).unwrap();

        for expected in 1..=3 {
            actions.invoke("increment", ()).await.unwrap();
            assert_eq!(count.load(Ordering::SeqCst), expected);
        }
    }

    #[test]
    fn every_store_sees_each_dispatch_once() {
        let flux = Flux::new();
        let refs: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|key| flux.create_store(key, RecordingStore::new()).unwrap())
            .collect();

        flux.dispatch("ping", json!({ "n": 1 })).unwrap();

        for store in refs {
            let store = store.downcast::<RecordingStore>().unwrap();
            assert_eq!(store.payloads(), vec![Payload::new("ping", json!({ "n": 1 }))]);
        }
    }

    #[tokio::test]
    async fn action_returning_nothing_reaches_no_store() {
        let flux = Flux::new();
        let recorder = flux.create_store("recorder", RecordingStore::new()).unwrap();
        let actions = flux.create_actions("counter", counter_actions()).unwrap();

        let outcome = actions.invoke("peek", ()).await.unwrap();

        assert_eq!(outcome, ActionOutcome::Skipped);
        assert!(recorder.downcast::<RecordingStore>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unwired_action_names_set_and_method() {
        let actions = counter_actions();

        let err = actions.invoke("increment", ()).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "You've attempted to perform the action CounterActions#increment, but it hasn't been added to a Flux instance."
        );
    }

    #[test]
    fn waiting_store_runs_after_the_store_it_waits_for() {
        let log = OrderLog::new();
        let flux = Flux::new();
        let primitive_token = Arc::new(OnceLock::<DispatchToken>::new());

        // Registered first, so only the wait can put it second.
        let derived_log = log.clone();
        let waits_on = primitive_token.clone();
        flux.create_store(
            "derived",
            FnStore::new(move |_, wiring| {
                if let Some(token) = waits_on.get() {
                    wiring.wait_for(*token)?;
                }
                derived_log.push("derived");
                Ok(())
            }),
        )
        .unwrap();
        let primitive = flux.create_store("primitive", log.store("primitive")).unwrap();
        primitive_token.set(primitive.token()).unwrap();

        flux.dispatch("anything", ()).unwrap();

        assert_eq!(log.entries(), vec!["primitive", "derived"]);
        assert!(log.ran_before("primitive", "derived"));
    }

    #[tokio::test]
    async fn spy_channel_records_actions_and_still_delivers() {
        let spy = Arc::new(SpyChannel::forwarding());
        let flux = Flux::with_dispatcher(spy.clone());
        let recorder = flux.create_store("recorder", RecordingStore::new()).unwrap();
        let actions = flux.create_actions("counter", counter_actions()).unwrap();
        let inc = actions.action_id("increment").unwrap().clone();

        actions.invoke("increment", ()).await.unwrap();
        actions.invoke("peek", ()).await.unwrap();

        assert_eq!(spy.dispatched(), vec![Payload::new(inc.clone(), json!(1))]);
        assert_eq!(spy.registered(), vec![recorder.token()]);

        let recorder = recorder.downcast::<RecordingStore>().unwrap();
        assert_eq!(recorder.bodies::<i64>(&inc).unwrap(), vec![1]);
    }

    #[test]
    fn silent_spy_records_without_running_stores() {
        let spy = Arc::new(SpyChannel::silent());
        let flux = Flux::with_dispatcher(spy.clone());
        let recorder = flux.create_store("recorder", RecordingStore::new()).unwrap();

        flux.dispatch("actionId", "foobar").unwrap();

        assert_eq!(
            serde_json::to_value(&spy.dispatched()[0]).unwrap(),
            json!({ "actionId": "actionId", "body": "foobar" })
        );
        assert!(recorder.downcast::<RecordingStore>().unwrap().is_empty());
    }

    #[test]
    fn removed_store_is_unregistered_from_the_channel() {
        let spy = Arc::new(SpyChannel::forwarding());
        let flux = Flux::with_dispatcher(spy.clone());
        let recorder = flux.create_store("recorder", RecordingStore::new()).unwrap();

        flux.remove_store("recorder").unwrap();
        flux.dispatch("after", ()).unwrap();

        assert!(spy.registered().is_empty());
        assert!(flux.get_store("recorder").is_none());
        assert!(recorder.downcast::<RecordingStore>().unwrap().is_empty());
    }

    #[test]
    fn spy_records_waits() {
        let spy = Arc::new(SpyChannel::forwarding());
        let flux = Flux::with_dispatcher(spy.clone());
        let log = OrderLog::new();
        let first = flux.create_store("first", log.store("first")).unwrap();
        flux.create_store("second", log.waiting_store("second", &first))
            .unwrap();

        flux.dispatch("go", ()).unwrap();

        assert_eq!(spy.waits(), vec![vec![first.token()]]);
    }
}
