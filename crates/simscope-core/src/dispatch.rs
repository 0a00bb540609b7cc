//! Point-event dispatch (clicks and key presses).
//!
//! An event applies to the state the client is looking at. Because the
//! engine always runs one step ahead, dispatching first throws away the
//! look-ahead frame and the observed frame, restores the observed step
//! from its snapshot, runs the hook on the target instance, then captures
//! the result as a new frame for the same step and precomputes the next
//! one again. The old branch is gone afterwards.
//!
//! Hooks are optional. [`invoke_hook`] is the only place a hook is ever
//! called: it probes [`Model::supports`] first and turns a hook error
//! into a logged no-op.

use serde_json::Value;
use simscope_types::ServerMessage;
use tracing::{debug, info, warn};

use crate::model::{Hook, HookError, Model};
use crate::session::{SessionEngine, SessionError};

/// What happened when an event reached an instance.
#[derive(Debug)]
pub enum HookOutcome {
    /// The hook ran and succeeded.
    Applied,
    /// The instance does not implement the hook.
    Unsupported,
    /// The hook ran and returned an error.
    Failed(HookError),
}

/// Probe for `hook` on `instance` and call it if present.
pub fn invoke_hook<M: Model>(instance: &mut M, hook: Hook, payload: &Value) -> HookOutcome {
    if !instance.supports(hook) {
        return HookOutcome::Unsupported;
    }
    let result = match hook {
        Hook::Click => instance.on_click(payload),
        Hook::Key => instance.on_key(payload),
    };
    match result {
        Ok(()) => HookOutcome::Applied,
        Err(e) => HookOutcome::Failed(e),
    }
}

impl<M: Model> SessionEngine<M> {
    /// Deliver a point event to instance `index` at the current step.
    ///
    /// Emits the re-captured state for the current step (and `end` if
    /// the event stopped every instance).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialized`], [`SessionError::Ended`]
    /// or [`SessionError::UnknownInstance`] without changing anything, or
    /// a fatal error if the ensemble cannot be restored or captured. A
    /// failing hook is not an error.
    pub fn dispatch(
        &mut self,
        index: usize,
        hook: Hook,
        payload: &Value,
    ) -> Result<Vec<ServerMessage>, SessionError> {
        self.ensure_steppable()?;
        let n_instances = self.n_instances();
        if index >= n_instances {
            return Err(SessionError::UnknownInstance { index, n_instances });
        }

        let step = self.current_step;
        let snapshot = self.history.require(step)?.snapshot.clone();
        self.instances = snapshot.restore()?;
        self.history.discard_from(step);

        let target = self
            .instances
            .get_mut(index)
            .ok_or(SessionError::UnknownInstance { index, n_instances })?;
        match invoke_hook(target, hook, payload) {
            HookOutcome::Applied => {
                info!(step, instance = index, %hook, "Event applied");
            }
            HookOutcome::Unsupported => {
                debug!(step, instance = index, %hook, "Hook not implemented, ignoring event");
            }
            HookOutcome::Failed(e) => {
                warn!(step, instance = index, %hook, error = %e, "Hook failed, ignoring event");
                // The hook may have mutated before failing.
                self.instances = snapshot.restore()?;
            }
        }

        self.capture(step)?;
        let mut out = Vec::new();
        self.land(step, &mut out)?;
        Ok(out)
    }
}
