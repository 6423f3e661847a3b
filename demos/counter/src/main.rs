//! # Counter Demo
//!
//! A counter store, a derived parity store that waits for it, and an action
//! set mixing sync and async actions. Everything is built from a JSON
//! config through a catalog.
//!
//! Run with `RUST_LOG=flummox=debug` to watch dispatches and waits.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;
use flummox::{
    ActionId, ActionSet, Catalog, Flux, FluxConfig, FluxError, Payload, Store, StoreRef,
    StoreWiring,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
    "stores": [
        { "key": "Parity", "class": "ParityStore" },
        { "key": "Counter", "class": "CounterStore", "args": { "start": 10 } }
    ],
    "actions": [
        { "key": "counter", "class": "CounterActions" }
    ]
}"#;

// ============================================================================
// Action Ids
// ============================================================================

/// Ids of the counter actions, known once the action set is built.
///
/// Stores are created before action sets, so they read the ids from here
/// when a payload arrives.
#[derive(Default)]
struct CounterIds {
    increment: OnceLock<ActionId>,
    reset: OnceLock<ActionId>,
}

// ============================================================================
// Stores
// ============================================================================

#[derive(Deserialize)]
struct CounterArgs {
    #[serde(default)]
    start: i64,
}

struct CounterStore {
    ids: Arc<CounterIds>,
    count: AtomicI64,
}

impl CounterStore {
    fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Store for CounterStore {
    fn handle(&self, payload: &Payload, _wiring: &StoreWiring) -> Result<(), FluxError> {
        if self.ids.increment.get().is_some_and(|id| payload.is(id)) {
            self.count.fetch_add(payload.body_as::<i64>()?, Ordering::SeqCst);
        } else if self.ids.reset.get().is_some_and(|id| payload.is(id)) {
            self.count.store(payload.body_as::<i64>()?, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Derived state: whether the count is even. Registered before the counter,
/// so it waits for it.
struct ParityStore {
    counter: Arc<OnceLock<StoreRef>>,
    even: AtomicBool,
}

impl Store for ParityStore {
    fn handle(&self, _payload: &Payload, wiring: &StoreWiring) -> Result<(), FluxError> {
        let Some(counter) = self.counter.get() else {
            return Ok(());
        };
        wiring.wait_for(counter)?;
        let count = counter
            .downcast::<CounterStore>()
            .ok_or_else(|| anyhow::anyhow!("Counter is not a CounterStore"))?
            .count();
        self.even.store(count % 2 == 0, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

fn catalog(ids: &Arc<CounterIds>, counter: &Arc<OnceLock<StoreRef>>) -> Catalog {
    let store_ids = ids.clone();
    let action_ids = ids.clone();
    let counter = counter.clone();

    Catalog::new()
        .store_class("CounterStore", move |args: &Value| {
            let args: CounterArgs = serde_json::from_value(args.clone())?;
            Ok(CounterStore {
                ids: store_ids.clone(),
                count: AtomicI64::new(args.start),
            })
        })
        .store_class("ParityStore", move |_: &Value| {
            Ok(ParityStore {
                counter: counter.clone(),
                even: AtomicBool::new(false),
            })
        })
        .actions_class("CounterActions", move |_: &Value| {
            let actions = ActionSet::builder("CounterActions")
                .action("increment", |by: i64| Ok(Some(by)))
                .async_action("incrementLater", |(by, delay_ms): (i64, u64)| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok::<_, anyhow::Error>(Some(by))
                })
                .action("reset", |to: Option<i64>| Ok(to.or(Some(0))))
                .action("peek", |_: ()| Ok(None::<i64>))
                .build()?;

            if let Some(id) = actions.action_id("increment") {
                let _ = action_ids.increment.set(id.clone());
            }
            if let Some(id) = actions.action_id("reset") {
                let _ = action_ids.reset.set(id.clone());
            }
            Ok(actions)
        })
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("counter_demo=info".parse()?))
        .init();

    let ids = Arc::new(CounterIds::default());
    let counter_ref = Arc::new(OnceLock::new());

    let config = FluxConfig::from_json_str(CONFIG)?;
    let flux = Flux::from_config(&catalog(&ids, &counter_ref), &config)?;

    let counter = flux
        .get_store("Counter")
        .ok_or_else(|| anyhow::anyhow!("Counter store missing"))?;
    let _ = counter_ref.set(counter.clone());
    let counter = counter
        .downcast::<CounterStore>()
        .ok_or_else(|| anyhow::anyhow!("Counter is not a CounterStore"))?;
    let parity = flux
        .get_store_as::<ParityStore>("Parity")
        .ok_or_else(|| anyhow::anyhow!("Parity store missing"))?;
    let actions = flux
        .get_actions("counter")
        .ok_or_else(|| anyhow::anyhow!("counter actions missing"))?;

    info!(ids = ?flux.get_action_ids("counter"), "actions registered");
    info!(count = counter.count(), "starting");

    actions.invoke("increment", 1).await?;
    info!(count = counter.count(), even = parity.even.load(Ordering::SeqCst), "after increment");

    let later = tokio::spawn(actions.invoke("incrementLater", (5, 50)));
    actions.invoke("increment", 2).await?;
    info!(count = counter.count(), "incremented while the async action is pending");
    later.await??;
    info!(count = counter.count(), even = parity.even.load(Ordering::SeqCst), "after async increment");

    let outcome = actions.invoke("peek", ()).await?;
    info!(?outcome, count = counter.count(), "peek dispatches nothing");

    actions.invoke("reset", None::<i64>).await?;
    info!(count = counter.count(), even = parity.even.load(Ordering::SeqCst), "after reset");

    // Removing a store unsubscribes it.
    flux.remove_store("Parity")?;
    actions.invoke("increment", 3).await?;
    info!(
        count = counter.count(),
        stale_even = parity.even.load(Ordering::SeqCst),
        "parity no longer updates"
    );

    Ok(())
}
