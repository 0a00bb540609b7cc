//! The per-connection session engine.
//!
//! [`SessionEngine`] owns one ensemble of model instances and the step
//! history built from it. It drives reset, forward stepping, rewinding
//! and (see [`crate::dispatch`]) point-event replay.
//!
//! # Steps
//!
//! `current_step` is the step the client last saw. Instances are always
//! at the store's head, which is either `current_step` or one past it:
//! after every landing the engine advances one extra step so the next
//! forward request is already computed. That look-ahead frame is never
//! served to the client until it is asked for.
//!
//! # Phases
//!
//! | Phase | Meaning | Leaves via |
//! |-------|---------|------------|
//! | `Uninitialized` | no reset yet | `reset` |
//! | `Ready` | history holds at least step 0 | `step_to` landing on a stopped frame |
//! | `Ended` | no instance is running at `current_step` | `reset` |
//!
//! Every operation returns the messages to send, in order. Errors for
//! which [`SessionError::is_fatal`] is false leave the session exactly as
//! it was.

use serde_json::Value;
use simscope_types::ServerMessage;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::model::{Model, ModelError, Observation};
use crate::params::{ParamError, ParameterRegistry};
use crate::snapshot::{Frame, Snapshot, SnapshotError, SnapshotStore};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No reset has happened yet.
    Uninitialized,
    /// Instances exist and can be stepped.
    Ready,
    /// Every instance has stopped; only a reset continues.
    Ended,
}

/// Errors produced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An operation other than reset arrived before the first reset.
    #[error("session has not been reset yet")]
    NotInitialized,

    /// Stepping or event injection after every instance stopped.
    #[error("simulation has ended; reset to start again")]
    Ended,

    /// A step target beyond the configured limit.
    #[error("step {step} is beyond the limit of {max}")]
    StepOutOfRange {
        /// Requested step.
        step: u64,
        /// Configured maximum.
        max: u64,
    },

    /// A state that was never computed or has been discarded.
    #[error("no state available for step {step}")]
    StateUnavailable {
        /// Requested step.
        step: i64,
    },

    /// An instance index outside the ensemble.
    #[error("instance {index} does not exist (ensemble size {n_instances})")]
    UnknownInstance {
        /// Requested index.
        index: usize,
        /// Ensemble size.
        n_instances: usize,
    },

    /// Parameter validation failed.
    #[error(transparent)]
    Param(#[from] ParamError),

    /// Snapshot capture or restore failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A model could not be built or observed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The step counter cannot advance further.
    #[error("step counter overflow")]
    StepOverflow,
}

impl SessionError {
    /// Whether the session must be torn down.
    ///
    /// Validation failures are reported to the client and the session
    /// carries on. Snapshot and model failures mean the ensemble can no
    /// longer be trusted.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Snapshot(_) | Self::Model(_) | Self::StepOverflow
        )
    }
}

/// Engine state for one connection.
#[derive(Debug)]
pub struct SessionEngine<M: Model> {
    pub(crate) registry: ParameterRegistry,
    pub(crate) instances: Vec<M>,
    pub(crate) history: SnapshotStore,
    pub(crate) current_step: u64,
    pub(crate) phase: SessionPhase,
    max_steps: u64,
}

impl<M: Model> SessionEngine<M> {
    /// Create an engine that will build its ensemble from `registry`.
    ///
    /// Nothing is constructed until the first [`reset`](Self::reset).
    pub fn new(registry: ParameterRegistry, config: &SessionConfig) -> Self {
        Self {
            registry,
            instances: Vec::new(),
            history: SnapshotStore::new(),
            current_step: 0,
            phase: SessionPhase::Uninitialized,
            max_steps: config.max_steps,
        }
    }

    /// Rebuild every instance from the current parameter bindings and
    /// start over at step 0.
    ///
    /// Emits `model_params`, then the step-0 `model_state` (and `end` if
    /// nothing is running).
    ///
    /// # Errors
    ///
    /// Returns a fatal [`SessionError`] if an instance cannot be built or
    /// captured.
    pub fn reset(&mut self) -> Result<Vec<ServerMessage>, SessionError> {
        let instances = (0..self.registry.n_instances())
            .map(|index| {
                let params = self.registry.materialize(index)?;
                Ok(M::from_params(&params)?)
            })
            .collect::<Result<Vec<M>, SessionError>>()?;

        self.instances = instances;
        self.history.clear();
        self.current_step = 0;
        self.capture(0)?;

        info!(n_instances = self.instances.len(), "Session reset");

        let mut out = vec![ServerMessage::ModelParams {
            params: self.registry.describe(),
        }];
        self.land(0, &mut out)?;
        Ok(out)
    }

    /// Move to `requested`, forwards or backwards, and emit its state.
    ///
    /// Negative targets clamp to 0. Moving backwards restores the frame
    /// before the target and recomputes the target from it, discarding
    /// every later frame. Moving forwards steps the ensemble until the
    /// target is reached or every instance stops, whichever is first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialized`], [`SessionError::Ended`]
    /// or [`SessionError::StepOutOfRange`] without changing anything, or
    /// a fatal error if the ensemble cannot be captured or restored.
    pub fn step_to(&mut self, requested: i64) -> Result<Vec<ServerMessage>, SessionError> {
        self.ensure_steppable()?;
        let target = u64::try_from(requested).unwrap_or(0);
        if target > self.max_steps {
            return Err(SessionError::StepOutOfRange {
                step: target,
                max: self.max_steps,
            });
        }

        let mut out = Vec::new();
        if target == self.current_step {
            out.push(self.state_message(target)?);
            return Ok(out);
        }

        if target < self.current_step {
            let base = target.saturating_sub(1);
            self.restore(base)?;
            debug!(from = self.current_step, to = target, base, "Rewinding");
        }

        let landed = self.advance_until(target)?;
        self.land(landed, &mut out)?;
        Ok(out)
    }

    /// Re-emit a state the client has already been able to see.
    ///
    /// Only steps up to `current_step` are served; the look-ahead frame
    /// and anything discarded by a rewind or event are unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialized`] or
    /// [`SessionError::StateUnavailable`].
    pub fn get_state(&self, requested: i64) -> Result<Vec<ServerMessage>, SessionError> {
        if self.phase == SessionPhase::Uninitialized {
            return Err(SessionError::NotInitialized);
        }
        let step = u64::try_from(requested)
            .ok()
            .filter(|s| *s <= self.current_step)
            .ok_or(SessionError::StateUnavailable { step: requested })?;
        Ok(vec![self.state_message(step)?])
    }

    /// Bind a parameter value for the next reset.
    ///
    /// Running instances are not affected. Nothing is emitted on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Param`] if validation fails.
    pub fn submit_param(
        &mut self,
        index: usize,
        name: &str,
        value: Value,
    ) -> Result<Vec<ServerMessage>, SessionError> {
        self.registry.submit(index, name, value)?;
        debug!(instance = index, param = name, "Parameter bound for next reset");
        Ok(Vec::new())
    }

    /// Current lifecycle phase.
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The step the client last saw.
    pub const fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Highest step computed so far, including the look-ahead frame.
    pub fn head(&self) -> Option<u64> {
        self.history.head()
    }

    /// Ensemble size.
    pub fn n_instances(&self) -> usize {
        self.registry.n_instances()
    }

    /// This session's parameter registry.
    pub const fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// The live instances, positioned at [`head`](Self::head).
    pub fn instances(&self) -> &[M] {
        &self.instances
    }

    /// The stored frame for `step`, if still in history.
    pub fn frame(&self, step: u64) -> Option<&Frame> {
        self.history.get(step)
    }

    pub(crate) fn ensure_steppable(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Uninitialized => Err(SessionError::NotInitialized),
            SessionPhase::Ended => Err(SessionError::Ended),
            SessionPhase::Ready => Ok(()),
        }
    }

    /// Snapshot and observe the instances as the frame for `step`.
    pub(crate) fn capture(&mut self, step: u64) -> Result<(), SessionError> {
        let snapshot = Snapshot::capture(step, &self.instances)?;
        let state = self
            .instances
            .iter()
            .map(|m| m.observe().map(Observation::into_record))
            .collect::<Result<Vec<_>, _>>()?;
        let running = self.instances.iter().any(M::running);
        let bytes = snapshot.len();
        self.history.push(Frame {
            snapshot,
            state,
            running,
        })?;
        debug!(
            step,
            bytes,
            history_bytes = self.history.total_bytes(),
            running,
            "Captured frame"
        );
        Ok(())
    }

    /// Replace the instances with the frame at `step` and drop every later
    /// frame.
    pub(crate) fn restore(&mut self, step: u64) -> Result<(), SessionError> {
        self.instances = self.history.require(step)?.snapshot.restore()?;
        self.history.truncate_after(step);
        Ok(())
    }

    /// Step every instance once and capture the result.
    fn advance(&mut self) -> Result<(), SessionError> {
        let next = match self.history.head() {
            Some(head) => head.checked_add(1).ok_or(SessionError::StepOverflow)?,
            None => 0,
        };
        for instance in &mut self.instances {
            instance.step();
        }
        self.capture(next)
    }

    /// Advance until the head reaches `target` or the head frame has
    /// stopped. Returns the step to land on.
    fn advance_until(&mut self, target: u64) -> Result<u64, SessionError> {
        loop {
            let latest = self.history.latest().ok_or(SnapshotError::Missing { step: 0 })?;
            let head = latest.step();
            if head >= target {
                return Ok(target);
            }
            if !latest.running {
                return Ok(head);
            }
            self.advance()?;
        }
    }

    /// Make `step` the current step, emit its state, and either end the
    /// session or precompute the next step.
    pub(crate) fn land(
        &mut self,
        step: u64,
        out: &mut Vec<ServerMessage>,
    ) -> Result<(), SessionError> {
        let running = self.history.require(step)?.running;
        self.current_step = step;
        out.push(self.state_message(step)?);

        if running {
            self.phase = SessionPhase::Ready;
            if self.history.head() == Some(step) {
                self.advance()?;
            }
        } else {
            info!(step, "All instances stopped");
            self.phase = SessionPhase::Ended;
            out.push(ServerMessage::End);
        }
        Ok(())
    }

    fn state_message(&self, step: u64) -> Result<ServerMessage, SessionError> {
        let frame = self.history.require(step)?;
        Ok(ServerMessage::ModelState {
            data: frame.state.clone(),
            step,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use simscope_types::ParameterSpec;

    use super::*;
    use crate::model::{ParamMap, decode_params};

    /// Counts up by `increment` each step, stopping at `limit`.
    #[derive(Debug, Serialize, Deserialize)]
    struct Counter {
        value: u64,
        increment: u64,
        limit: u64,
    }

    #[derive(Deserialize)]
    struct CounterArgs {
        increment: u64,
        limit: u64,
    }

    impl Model for Counter {
        fn from_params(params: &ParamMap) -> Result<Self, ModelError> {
            let args: CounterArgs = decode_params(params)?;
            Ok(Self {
                value: 0,
                increment: args.increment,
                limit: args.limit,
            })
        }

        fn step(&mut self) {
            self.value = self.value.saturating_add(self.increment);
        }

        fn running(&self) -> bool {
            self.value < self.limit
        }

        fn observe(&self) -> Result<Observation, ModelError> {
            let agents: [Value; 0] = [];
            Observation::new(&json!({"value": self.value}), &agents)
        }
    }

    fn engine(n: usize, limit: u64) -> SessionEngine<Counter> {
        let mut registry = ParameterRegistry::new(n).unwrap();
        registry
            .declare(ParameterSpec::slider("increment", "Increment", json!(1), 1.0, 10.0, 1.0))
            .unwrap();
        registry.fix("limit", json!(limit)).unwrap();
        SessionEngine::new(registry, &SessionConfig::default())
    }

    fn values(messages: &[ServerMessage]) -> Vec<(u64, u64)> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::ModelState { data, step } => {
                    Some((*step, data[0]["value"].as_u64().unwrap()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn operations_before_reset_are_rejected() {
        let mut engine = engine(1, 100);
        assert!(matches!(engine.step_to(1), Err(SessionError::NotInitialized)));
        assert!(matches!(engine.get_state(0), Err(SessionError::NotInitialized)));
        assert_eq!(engine.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn reset_emits_params_then_step_zero_and_precomputes() {
        let mut engine = engine(1, 100);
        let out = engine.reset().unwrap();
        assert!(matches!(out[0], ServerMessage::ModelParams { .. }));
        assert_eq!(values(&out), vec![(0, 0)]);
        assert_eq!(engine.current_step(), 0);
        assert_eq!(engine.head(), Some(1));
        assert_eq!(engine.phase(), SessionPhase::Ready);
    }

    #[test]
    fn forward_then_back_then_forward() {
        let mut engine = engine(1, 100);
        engine.reset().unwrap();

        let first = engine.step_to(3).unwrap();
        assert_eq!(values(&first), vec![(3, 3)]);
        assert_eq!(engine.head(), Some(4));

        assert_eq!(values(&engine.step_to(1).unwrap()), vec![(1, 1)]);
        assert_eq!(engine.head(), Some(2));
        assert!(engine.frame(3).is_none());

        let again = engine.step_to(3).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn rewinding_to_zero_restores_initial_state() {
        let mut engine = engine(1, 100);
        engine.reset().unwrap();
        engine.step_to(5).unwrap();
        assert_eq!(values(&engine.step_to(0).unwrap()), vec![(0, 0)]);
        assert_eq!(engine.head(), Some(1));
    }

    #[test]
    fn negative_target_clamps_to_zero() {
        let mut engine = engine(1, 100);
        engine.reset().unwrap();
        engine.step_to(2).unwrap();
        assert_eq!(values(&engine.step_to(-4).unwrap()), vec![(0, 0)]);
    }

    #[test]
    fn stepping_to_current_step_reemits_cached_state() {
        let mut engine = engine(1, 100);
        engine.reset().unwrap();
        engine.step_to(2).unwrap();
        let head = engine.head();
        assert_eq!(values(&engine.step_to(2).unwrap()), vec![(2, 2)]);
        assert_eq!(engine.head(), head);
    }

    #[test]
    fn stopping_model_ends_the_session() {
        let mut engine = engine(1, 3);
        engine.reset().unwrap();
        let out = engine.step_to(10).unwrap();
        assert_eq!(values(&out), vec![(3, 3)]);
        assert_eq!(out.last(), Some(&ServerMessage::End));
        assert_eq!(engine.phase(), SessionPhase::Ended);
        assert_eq!(engine.current_step(), 3);

        assert!(matches!(engine.step_to(1), Err(SessionError::Ended)));
        assert_eq!(values(&engine.get_state(1).unwrap()), vec![(1, 1)]);

        engine.reset().unwrap();
        assert_eq!(engine.phase(), SessionPhase::Ready);
    }

    #[test]
    fn model_stopped_at_construction_ends_immediately() {
        let mut engine = engine(1, 0);
        let out = engine.reset().unwrap();
        assert_eq!(out.last(), Some(&ServerMessage::End));
        assert_eq!(engine.phase(), SessionPhase::Ended);
        assert_eq!(engine.head(), Some(0));
    }

    #[test]
    fn get_state_refuses_the_lookahead_frame() {
        let mut engine = engine(1, 100);
        engine.reset().unwrap();
        engine.step_to(2).unwrap();
        assert!(engine.frame(3).is_some());
        assert!(matches!(
            engine.get_state(3),
            Err(SessionError::StateUnavailable { step: 3 })
        ));
        assert!(matches!(
            engine.get_state(-1),
            Err(SessionError::StateUnavailable { step: -1 })
        ));
    }

    #[test]
    fn step_limit_is_a_validation_error() {
        let mut registry = ParameterRegistry::new(1).unwrap();
        registry
            .declare(ParameterSpec::number("increment", "Increment", json!(1)))
            .unwrap();
        registry.fix("limit", json!(1000)).unwrap();
        let config = SessionConfig {
            max_steps: 5,
            ..SessionConfig::default()
        };
        let mut engine: SessionEngine<Counter> = SessionEngine::new(registry, &config);
        engine.reset().unwrap();
        let err = engine.step_to(6).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(engine.current_step(), 0);
    }

    #[test]
    fn submitted_params_wait_for_reset() {
        let mut engine = engine(1, 1000);
        engine.reset().unwrap();
        engine.submit_param(0, "increment", json!(5)).unwrap();
        assert_eq!(values(&engine.step_to(2).unwrap()), vec![(2, 2)]);

        engine.reset().unwrap();
        assert_eq!(values(&engine.step_to(2).unwrap()), vec![(2, 10)]);
    }

    #[test]
    fn fatal_classification() {
        assert!(SessionError::StepOverflow.is_fatal());
        assert!(SessionError::Snapshot(SnapshotError::Missing { step: 1 }).is_fatal());
        assert!(!SessionError::Ended.is_fatal());
        assert!(!SessionError::Param(ParamError::EmptyEnsemble).is_fatal());
    }
}
