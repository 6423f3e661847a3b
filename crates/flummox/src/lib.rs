//! # Flummox
//!
//! A unidirectional data-flow layer: actions produce payloads, one dispatcher
//! broadcasts every payload to every store, and stores may wait for each
//! other so derived state is always computed from already-updated state.
//!
//! ## Core Concepts
//!
//! - [`ActionSet`] = named methods turned into actions. Calling one runs the
//!   method and dispatches what it returns.
//! - [`Store`] = a stateful subscriber. It sees every payload and ignores the
//!   ones it doesn't care about.
//! - [`Flux`] = the registry that binds stores and action sets, by key, to one
//!   [`DispatchChannel`].
//!
//! ## Architecture
//!
//! ```text
//! ActionSet.invoke("increment", 1)
//!     │
//!     ▼ method runs (and is awaited, if async)
//! Some(body) ── None ──► nothing dispatched
//!     │
//!     ▼ Flux dispatch entry point
//! Dispatcher.dispatch({ actionId, body })
//!     │
//!     ├─► Store A.handle()
//!     │
//!     ├─► Store B.handle() ── wait_for(A) ──► A already handled, continue
//!     │
//!     └─► Store C.handle()
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Action ids are unique** - `"<instance id>-<method>"`, per action set instance
//! 2. **Keys are unique** - a second registration under a key fails, the first stays
//! 3. **Dispatch runs to completion** - no yielding, no re-entrant dispatch
//! 4. **Waits are acyclic** - waiting on a store that is waiting on you is an error
//! 5. **Unwired actions fail loudly** - an action set must be added to a `Flux` first
//!
//! ## Example
//!
//! ```ignore
//! use flummox::{ActionSet, Flux, FluxError, Payload, Store, StoreWiring};
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! struct CounterStore {
//!     count: AtomicI64,
//! }
//!
//! impl Store for CounterStore {
//!     fn handle(&self, payload: &Payload, _wiring: &StoreWiring) -> Result<(), FluxError> {
//!         if let Some(by) = payload.body.as_i64() {
//!             self.count.fetch_add(by, Ordering::SeqCst);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let flux = Flux::new();
//! flux.create_store("Counter", CounterStore { count: AtomicI64::new(0) })?;
//!
//! let counter = flux.create_actions(
//!     "counter",
//!     ActionSet::builder("CounterActions")
//!         .action("increment", |by: i64| Ok(Some(by)))
//!         .build()?,
//! )?;
//!
//! counter.invoke("increment", 1).await?;
//!
//! let store = flux.get_store_as::<CounterStore>("Counter").unwrap();
//! assert_eq!(store.count.load(Ordering::SeqCst), 1);
//! ```
//!
//! ## What This Is Not
//!
//! Flummox does not persist anything, talk to the network, or render
//! anything. It only decides *when* and *in what order* stores see a payload.

// Core modules
mod action;
mod catalog;
mod config;
mod dispatch;
mod error;
mod flux;
mod ids;
mod macros;
mod payload;
mod store;
mod wait;



// Re-export action types
pub use action::{Action, ActionOutcome, ActionSet, ActionSetBuilder};

// Re-export payload types
pub use payload::{ActionId, Payload};

// Re-export dispatch channel types
pub use dispatch::{Callback, DispatchChannel, DispatchToken, Dispatcher};

// Re-export store types
pub use store::{Store, StoreRef, StoreWiring};
pub use wait::{WaitTarget, WaitTargets};

// Re-export orchestrator and configuration
pub use catalog::Catalog;
pub use config::{ComponentConfig, FluxConfig};
pub use flux::Flux;

// Re-export error types
pub use error::{FluxError, RegistryKind};

/// Alias for [`Flux`].
pub type Flummox = Flux;
