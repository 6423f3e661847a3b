//! Action sets: named methods turned into dispatch-producing actions.
//!
//! An action set is declared once, with a builder, and never changes after
//! `build()`. Every declared method gets an [`ActionId`] of the form
//! `"<instance id>-<method>"` and a bound [`Action`] that:
//!
//! 1. decodes its arguments and runs the method,
//! 2. awaits the method's future if it declared one,
//! 3. skips dispatch when the method produced no payload (`None`),
//! 4. otherwise hands `(action_id, body)` to the dispatch channel the set was
//!    wired to by [`Flux::create_actions`](crate::Flux::create_actions).
//!
//! Calling an action whose set was never added to a `Flux` fails with
//! [`FluxError::NotWired`].
//!
//! ```ignore
//! let todos = ActionSet::builder("TodoActions")
//!     .action("create_todo", |text: String| Ok(Some(text)))
//!     .async_action("fetch_todos", |_: ()| async move {
//!         let todos = api::fetch().await?;
//!         Ok(Some(todos))
//!     })
//!     .build()?;
//!
//! let todos = flux.create_actions("todos", todos)?;
//! todos.invoke("create_todo", "buy milk").await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::FluxError;
use crate::ids::{is_valid_method_name, next_base_id};
use crate::payload::{ActionId, Payload};

/// The orchestrator's dispatch entry point, as seen by an action set.
pub(crate) type DispatchFn = Arc<dyn Fn(Payload) -> Result<(), FluxError> + Send + Sync>;

type Binding = Arc<OnceLock<DispatchFn>>;

type ErasedMethod =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Option<Value>, FluxError>> + Send + Sync>;

fn erase<F>(method: F) -> ErasedMethod
where
    F: Fn(Value) -> BoxFuture<'static, Result<Option<Value>, FluxError>> + Send + Sync + 'static,
{
    Arc::new(method)
}

fn decode_args<A: DeserializeOwned>(set: &str, method: &str, args: Value) -> Result<A, FluxError> {
    serde_json::from_value(args).map_err(|source| FluxError::InvalidArguments {
        set: set.to_string(),
        method: method.to_string(),
        source,
    })
}

fn encode_body<T: Serialize>(body: Option<T>) -> Result<Option<Value>, FluxError> {
    Ok(body.map(serde_json::to_value).transpose()?)
}

fn action_failed(set: &str, method: &str, source: anyhow::Error) -> FluxError {
    FluxError::ActionFailed {
        set: set.to_string(),
        method: method.to_string(),
        source,
    }
}

/// What an action call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// A payload tagged with this id went through the dispatch channel.
    Dispatched(ActionId),
    /// The method produced no payload; nothing was dispatched.
    Skipped,
}

impl ActionOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, ActionOutcome::Dispatched(_))
    }
}

/// One bound action. Cheap to clone; clones share the set's wiring, so an
/// `Action` taken before registration works once the set is registered.
#[derive(Clone)]
pub struct Action {
    id: ActionId,
    set: Arc<str>,
    method: Arc<str>,
    run: ErasedMethod,
    binding: Binding,
}

impl Action {
    pub fn id(&self) -> &ActionId {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_name(&self) -> &str {
        &self.set
    }

    /// Run the method with `args` and dispatch what it produces.
    ///
    /// Arguments are captured eagerly, so the returned future is `'static`
    /// and can be spawned. The method itself runs on first poll.
    pub fn call<A: Serialize>(&self, args: A) -> BoxFuture<'static, Result<ActionOutcome, FluxError>> {
        let action = self.clone();
        let args = serde_json::to_value(args).map_err(|source| FluxError::InvalidArguments {
            set: self.set.to_string(),
            method: self.method.to_string(),
            source,
        });
        async move { action.perform(args?).await }.boxed()
    }

    async fn perform(self, args: Value) -> Result<ActionOutcome, FluxError> {
        let body = (self.run)(args).await?;

        let Some(body) = body else {
            trace!(set = %self.set, method = %self.method, "no payload, skipping dispatch");
            return Ok(ActionOutcome::Skipped);
        };

        let dispatch = self.binding.get().ok_or_else(|| FluxError::NotWired {
            set: self.set.to_string(),
            method: self.method.to_string(),
        })?;

        debug!(set = %self.set, method = %self.method, action_id = %self.id, "action dispatching");
        dispatch(Payload::new(self.id.clone(), body))?;
        Ok(ActionOutcome::Dispatched(self.id))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("set", &self.set)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.set, self.method)
    }
}

/// Declares the methods of an [`ActionSet`].
pub struct ActionSetBuilder {
    name: Arc<str>,
    methods: Vec<(String, ErasedMethod)>,
}

impl ActionSetBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            methods: Vec::new(),
        }
    }

    /// Declare a synchronous action.
    ///
    /// Return `Ok(None)` for helpers that should not dispatch anything.
    pub fn action<A, T, F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        T: Serialize + 'static,
        F: Fn(A) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        let method = method.into();
        let set = self.name.clone();
        let name: Arc<str> = Arc::from(method.as_str());

        let run = erase(move |args| {
            let result = decode_args::<A>(&set, &name, args)
                .and_then(|args| handler(args).map_err(|e| action_failed(&set, &name, e)))
                .and_then(encode_body);
            future::ready(result).boxed()
        });

        self.methods.push((method, run));
        self
    }

    /// Declare an action whose method is asynchronous.
    ///
    /// Dispatch happens after the future resolves; an error from the future
    /// fails the call and nothing is dispatched.
    pub fn async_action<A, T, F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        T: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        let method = method.into();
        let set = self.name.clone();
        let name: Arc<str> = Arc::from(method.as_str());

        let run = erase(move |args| match decode_args::<A>(&set, &name, args) {
            Err(error) => future::ready(Err(error)).boxed(),
            Ok(args) => {
                let pending = handler(args);
                let set = set.clone();
                let name = name.clone();
                async move {
                    let body = pending.await.map_err(|e| action_failed(&set, &name, e))?;
                    encode_body(body)
                }
                .boxed()
            }
        });

        self.methods.push((method, run));
        self
    }

    /// Fix the set of actions and derive their ids.
    pub fn build(self) -> Result<ActionSet, FluxError> {
        let base_id = next_base_id();
        let binding: Binding = Arc::default();
        let mut ids = BTreeMap::new();
        let mut actions = HashMap::with_capacity(self.methods.len());

        for (method, run) in self.methods {
            if !is_valid_method_name(&method) {
                return Err(FluxError::InvalidMethodName {
                    set: self.name.to_string(),
                    method,
                });
            }
            if ids.contains_key(&method) {
                return Err(FluxError::DuplicateAction {
                    set: self.name.to_string(),
                    method,
                });
            }

            let id = ActionId::for_method(&base_id, &method);
            ids.insert(method.clone(), id.clone());
            actions.insert(
                id.clone(),
                Action {
                    id,
                    set: self.name.clone(),
                    method: Arc::from(method),
                    run,
                    binding: binding.clone(),
                },
            );
        }

        debug!(set = %self.name, %base_id, actions = ids.len(), "action set built");

        Ok(ActionSet {
            name: self.name,
            base_id,
            ids,
            actions,
            binding,
        })
    }
}

/// A fixed collection of actions sharing one instance id and one wiring.
pub struct ActionSet {
    name: Arc<str>,
    base_id: String,
    ids: BTreeMap<String, ActionId>,
    actions: HashMap<ActionId, Action>,
    binding: Binding,
}

impl ActionSet {
    pub fn builder(name: impl Into<String>) -> ActionSetBuilder {
        ActionSetBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The per-instance part of every action id in this set.
    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    /// Method name to action id, as an owned copy.
    pub fn action_ids(&self) -> BTreeMap<String, ActionId> {
        self.ids.clone()
    }

    /// Same as [`action_ids`](Self::action_ids).
    pub fn constants(&self) -> BTreeMap<String, ActionId> {
        self.action_ids()
    }

    pub fn action_id(&self, method: &str) -> Option<&ActionId> {
        self.ids.get(method)
    }

    pub fn action(&self, method: &str) -> Option<Action> {
        self.action_id(method).and_then(|id| self.action_by_id(id))
    }

    pub fn action_by_id(&self, id: &ActionId) -> Option<Action> {
        self.actions.get(id).cloned()
    }

    /// Declared method names, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Call the action declared as `method`.
    pub fn invoke<A: Serialize>(
        &self,
        method: &str,
        args: A,
    ) -> BoxFuture<'static, Result<ActionOutcome, FluxError>> {
        match self.action(method) {
            Some(action) => action.call(args),
            None => future::ready(Err(FluxError::UnknownAction {
                set: self.name.to_string(),
                method: method.to_string(),
            }))
            .boxed(),
        }
    }

    /// True once the set has been added to a `Flux` instance.
    pub fn is_wired(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Connect every action of this set to a dispatch entry point. Only the
    /// first binding takes effect.
    pub(crate) fn bind(&self, dispatch: DispatchFn) -> bool {
        self.binding.set(dispatch).is_ok()
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSet")
            .field("name", &self.name)
            .field("base_id", &self.base_id)
            .field("actions", &self.ids)
            .field("wired", &self.is_wired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn dispatch_fn(
        f: impl Fn(Payload) -> Result<(), FluxError> + Send + Sync + 'static,
    ) -> DispatchFn {
        Arc::new(f)
    }

    fn recording_binding(set: &ActionSet) -> Arc<Mutex<Vec<Payload>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        assert!(set.bind(dispatch_fn(move |payload| {
            sink.lock().unwrap().push(payload);
            Ok(())
        })));
        seen
    }

    fn counter_actions() -> ActionSet {
        ActionSet::builder("CounterActions")
            .action("increment", |by: i64| Ok(Some(by)))
            .action("noop", |_: ()| Ok(None::<Value>))
            .async_action("fetch", |n: i64| async move {
                tokio::task::yield_now().await;
                Ok::<_, anyhow::Error>(Some(n * 10))
            })
            .async_action("reject", |_: ()| async move {
                Err::<Option<()>, _>(anyhow::anyhow!("server said no"))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn ids_join_instance_id_and_method() {
        let set = counter_actions();
        let ids = set.action_ids();

        assert_eq!(ids.len(), 4);
        for (method, id) in &ids {
            assert_eq!(id.as_str(), format!("{}-{}", set.base_id(), method));
        }
        assert_eq!(set.constants(), ids);
        assert_eq!(set.action_ids(), ids);
    }

    #[test]
    fn ids_are_unique_across_instances_of_the_same_declaration() {
        let mut seen = HashSet::new();
        let instances = 2 + fastrand::usize(..8);
        for _ in 0..instances {
            for id in counter_actions().action_ids().into_values() {
                assert!(seen.insert(id), "duplicate action id");
            }
        }
        assert_eq!(seen.len(), instances * 4);
    }

    #[test]
    fn duplicate_method_is_rejected() {
        let err = ActionSet::builder("Dupes")
            .action("go", |_: ()| Ok(Some(1)))
            .action("go", |_: ()| Ok(Some(2)))
            .build()
            .unwrap_err();
        assert!(matches!(err, FluxError::DuplicateAction { ref method, .. } if method == "go"));
    }

    #[test]
    fn non_identifier_method_is_rejected() {
        let err = ActionSet::builder("Bad")
            .action("not valid", |_: ()| Ok(Some(1)))
            .build()
            .unwrap_err();
        assert!(matches!(err, FluxError::InvalidMethodName { .. }));
    }

    #[tokio::test]
    async fn unwired_action_reports_set_and_method() {
        let set = counter_actions();
        let err = set.invoke("increment", 1).await.unwrap_err();

        assert!(matches!(
            &err,
            FluxError::NotWired { set, method } if set == "CounterActions" && method == "increment"
        ));
        assert_eq!(
            err.to_string(),
            "You've attempted to perform the action CounterActions#increment, but it hasn't been added to a Flux instance."
        );
    }

    #[tokio::test]
    async fn method_without_payload_never_needs_wiring() {
        let set = counter_actions();
        assert_eq!(set.invoke("noop", ()).await.unwrap(), ActionOutcome::Skipped);
    }

    #[tokio::test]
    async fn wired_action_dispatches_its_body() {
        let set = counter_actions();
        let seen = recording_binding(&set);

        let outcome = set.invoke("increment", 3).await.unwrap();

        let id = set.action_id("increment").unwrap().clone();
        assert_eq!(outcome, ActionOutcome::Dispatched(id.clone()));
        assert_eq!(*seen.lock().unwrap(), vec![Payload::new(id, json!(3))]);
    }

    #[tokio::test]
    async fn action_taken_before_wiring_sees_later_binding() {
        let set = counter_actions();
        let increment = set.action("increment").unwrap();
        assert!(!set.is_wired());

        let seen = recording_binding(&set);
        assert!(set.is_wired());
        increment.call(1).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn async_method_dispatches_resolved_value() {
        let set = counter_actions();
        let seen = recording_binding(&set);

        set.invoke("fetch", 4).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].body, json!(40));
    }

    #[tokio::test]
    async fn rejected_future_fails_the_call_without_dispatch() {
        let set = counter_actions();
        let seen = recording_binding(&set);

        let err = set.invoke("reject", ()).await.unwrap_err();

        assert!(matches!(err, FluxError::ActionFailed { ref method, .. } if method == "reject"));
        assert!(err.to_string().contains("server said no"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_arguments_fail_before_the_method_runs() {
        let set = counter_actions();
        let seen = recording_binding(&set);

        let err = set.invoke("increment", "not a number").await.unwrap_err();

        assert!(matches!(err, FluxError::InvalidArguments { .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let set = counter_actions();
        let err = set.invoke("missing", ()).await.unwrap_err();
        assert!(matches!(err, FluxError::UnknownAction { ref method, .. } if method == "missing"));
    }

    #[tokio::test]
    async fn dispatch_failure_propagates_unchanged() {
        let set = counter_actions();
        set.bind(dispatch_fn(|_| Err(FluxError::ReentrantDispatch)));

        let err = set.invoke("increment", 1).await.unwrap_err();
        assert!(matches!(err, FluxError::ReentrantDispatch));
    }

    #[test]
    fn only_first_binding_takes_effect() {
        let set = counter_actions();
        assert!(set.bind(dispatch_fn(|_| Ok(()))));
        assert!(!set.bind(dispatch_fn(|_| Ok(()))));
    }
}
