//! Interactive session engine for Simscope.
//!
//! A session owns an ensemble of simulation instances and lets a remote
//! client step them, rewind to any earlier step, inject clicks and key
//! presses, and bind parameters for the next restart. Every step is
//! captured as a serialized snapshot so that rewinding and replaying
//! reproduce the original run exactly.
//!
//! # Modules
//!
//! - [`model`] -- The [`Model`] trait a simulation implements.
//! - [`snapshot`] -- Serialized ensemble captures and the step-indexed
//!   history.
//! - [`params`] -- Parameter declarations and per-instance bindings.
//! - [`session`] -- [`SessionEngine`], the reset/step/rewind state machine.
//! - [`dispatch`] -- Click and key-press delivery with history branching.
//! - [`codec`] -- Wire decoding and routing of client messages.
//! - [`config`] -- Configuration loading from `simscope.yaml`.
//!
//! The engine is synchronous and owns no I/O. Transport lives in
//! `simscope-server`.
//!
//! [`Model`]: model::Model
//! [`SessionEngine`]: session::SessionEngine

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod params;
pub mod session;
pub mod snapshot;

pub use config::{SessionConfig, SimscopeConfig};
pub use model::{Hook, HookError, Model, ModelError, Observation, ParamMap};
pub use params::{ParamError, ParameterRegistry};
pub use session::{SessionEngine, SessionError, SessionPhase};
