//! The dispatch channel: broadcast fan-out with `wait_for` ordering.
//!
//! [`Dispatcher`] delivers each payload to every registered callback, in
//! registration order. While a callback runs it may ask the dispatcher to run
//! other callbacks first with [`DispatchChannel::wait_for`]; the dispatcher
//! tracks which callbacks are pending and which have handled the current
//! payload, so a wait on a pending-but-unfinished callback is a cycle.
//!
//! Dispatch is synchronous. A dispatch never yields until every callback has
//! run, and a second dispatch started from inside a callback is rejected.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::FluxError;
use crate::payload::Payload;

/// Handle returned by [`DispatchChannel::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchToken(u64);

impl DispatchToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID_{}", self.0)
    }
}

/// A registered handler.
pub type Callback = Arc<dyn Fn(&Payload) -> Result<(), FluxError> + Send + Sync>;

/// The primitive broadcast channel the orchestrator is built on.
///
/// Implementations must reject re-entrant dispatch and cyclic waits.
pub trait DispatchChannel: Send + Sync {
    /// Subscribe a callback to every future dispatch.
    fn register(&self, callback: Callback) -> DispatchToken;

    /// Remove a callback. Later dispatches no longer reach it.
    fn unregister(&self, token: DispatchToken) -> Result<(), FluxError>;

    /// Deliver `payload` to every registered callback.
    fn dispatch(&self, payload: Payload) -> Result<(), FluxError>;

    /// From inside a callback: run the callbacks behind `tokens` first.
    fn wait_for(&self, tokens: &[DispatchToken]) -> Result<(), FluxError>;

    fn is_dispatching(&self) -> bool;
}

#[derive(Default)]
struct DispatchState {
    dispatching: bool,
    pending: HashSet<DispatchToken>,
    handled: HashSet<DispatchToken>,
    payload: Option<Payload>,
}

/// In-memory [`DispatchChannel`].
#[derive(Default)]
pub struct Dispatcher {
    callbacks: Mutex<BTreeMap<DispatchToken, Callback>>,
    state: Mutex<DispatchState>,
    last_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Poisoning only happens if a callback panicked mid-dispatch; the maps
    // themselves are still consistent.
    fn callbacks(&self) -> MutexGuard<'_, BTreeMap<DispatchToken, Callback>> {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn callback(&self, token: DispatchToken) -> Option<Callback> {
        self.callbacks().get(&token).cloned()
    }

    fn invoke(&self, token: DispatchToken, callback: Callback) -> Result<(), FluxError> {
        let payload = {
            let mut state = self.state();
            state.pending.insert(token);
            state.payload.clone()
        };
        let Some(payload) = payload else {
            return Err(FluxError::WaitOutsideDispatch);
        };

        callback(&payload)?;

        self.state().handled.insert(token);
        Ok(())
    }

    fn start_dispatching(&self, payload: Payload) -> Result<(), FluxError> {
        let mut state = self.state();
        if state.dispatching {
            return Err(FluxError::ReentrantDispatch);
        }
        state.pending.clear();
        state.handled.clear();
        state.payload = Some(payload);
        state.dispatching = true;
        Ok(())
    }

    fn stop_dispatching(&self) {
        let mut state = self.state();
        state.payload = None;
        state.dispatching = false;
    }

    fn run(&self) -> Result<(), FluxError> {
        let tokens: Vec<DispatchToken> = self.callbacks().keys().copied().collect();
        for token in tokens {
            if self.state().pending.contains(&token) {
                continue;
            }
            // Unregistered by an earlier callback during this dispatch.
            let Some(callback) = self.callback(token) else {
                continue;
            };
            self.invoke(token, callback)?;
        }
        Ok(())
    }
}

/// Ends the dispatch when dropped, including while unwinding from a
/// panicking callback.
struct Dispatching<'a>(&'a Dispatcher);

impl Drop for Dispatching<'_> {
    fn drop(&mut self) {
        self.0.stop_dispatching();
    }
}

impl DispatchChannel for Dispatcher {
    fn register(&self, callback: Callback) -> DispatchToken {
        let token = DispatchToken(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.callbacks().insert(token, callback);
        debug!(%token, "callback registered");
        token
    }

    fn unregister(&self, token: DispatchToken) -> Result<(), FluxError> {
        match self.callbacks().remove(&token) {
            Some(_) => {
                debug!(%token, "callback unregistered");
                Ok(())
            }
            None => Err(FluxError::UnknownToken(token)),
        }
    }

    fn dispatch(&self, payload: Payload) -> Result<(), FluxError> {
        debug!(action_id = %payload.action_id, "dispatching");
        self.start_dispatching(payload)?;
        let result = {
            let _dispatching = Dispatching(self);
            self.run()
        };
        if let Err(error) = &result {
            warn!(%error, "dispatch aborted");
        }
        result
    }

    fn wait_for(&self, tokens: &[DispatchToken]) -> Result<(), FluxError> {
        if !self.is_dispatching() {
            return Err(FluxError::WaitOutsideDispatch);
        }
        for &token in tokens {
            {
                let state = self.state();
                if state.pending.contains(&token) {
                    if state.handled.contains(&token) {
                        continue;
                    }
                    return Err(FluxError::CircularDependency(token));
                }
            }
            let callback = self.callback(token).ok_or(FluxError::UnknownToken(token))?;
            debug!(%token, "waiting for callback");
            self.invoke(token, callback)?;
        }
        Ok(())
    }

    fn is_dispatching(&self) -> bool {
        self.state().dispatching
    }
}
