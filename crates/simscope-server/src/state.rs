//! Shared application state for the session server.
//!
//! [`AppState`] is the read-only template every connection starts from:
//! model metadata, chart specs, and the declared parameter registry. Each
//! session clones the registry, so values one client submits are never
//! visible to another. The only shared mutable value is the count of
//! open sessions.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use simscope_core::{Model, ParameterRegistry, SessionConfig, SessionEngine};
use simscope_types::ServerMessage;

/// Server-wide state for serving model `M`.
#[derive(Debug)]
pub struct AppState<M: Model> {
    /// Display name of the model.
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Chart specifications sent to each client on connect.
    pub charts: Vec<Value>,
    registry: ParameterRegistry,
    session: SessionConfig,
    active_sessions: AtomicUsize,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> AppState<M> {
    /// Create state for serving `M` with the declared `registry`.
    ///
    /// The ensemble size is the registry's instance count.
    pub fn new(name: &str, registry: ParameterRegistry, session: SessionConfig) -> Self {
        Self {
            name: name.to_owned(),
            description: None,
            charts: Vec::new(),
            registry,
            session,
            active_sessions: AtomicUsize::new(0),
            _model: PhantomData,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Attach chart specifications.
    #[must_use]
    pub fn with_charts(mut self, charts: Vec<Value>) -> Self {
        self.charts = charts;
        self
    }

    /// A fresh, uninitialized engine for a new connection.
    pub fn new_engine(&self) -> SessionEngine<M> {
        SessionEngine::new(self.registry.clone(), &self.session)
    }

    /// The `vega_specs` greeting sent when a connection opens.
    pub fn hello(&self) -> ServerMessage {
        ServerMessage::VegaSpecs {
            data: self.charts.clone(),
            n_sims: self.n_sims(),
        }
    }

    /// Ensemble size of every session.
    pub fn n_sims(&self) -> usize {
        self.registry.n_instances()
    }

    /// The declared parameters with their default bindings.
    pub const fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// Bound on each session's incoming message queue.
    pub const fn queue_capacity(&self) -> usize {
        self.session.queue_capacity
    }

    /// Record a new connection; returns the updated count.
    pub fn session_opened(&self) -> usize {
        self.active_sessions
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    /// Record a closed connection; returns the updated count.
    pub fn session_closed(&self) -> usize {
        self.active_sessions
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1)
    }

    /// Number of open connections.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }
}
