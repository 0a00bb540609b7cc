//! Shared type definitions for Simscope sessions.
//!
//! This crate is the single source of truth for everything that crosses
//! the WebSocket: client requests, server pushes, and parameter
//! descriptors. Types flow downstream to `TypeScript` via `ts-rs` for the
//! browser client.
//!
//! # Modules
//!
//! - [`params`] -- Parameter declarations and their wire descriptors
//! - [`protocol`] -- Client and server message types

pub mod params;
pub mod protocol;

pub use params::{ParamDescriptor, ParamKind, ParameterSpec};
pub use protocol::{ClientMessage, PointEvent, ServerMessage, StepRequest, SubmitParams};
