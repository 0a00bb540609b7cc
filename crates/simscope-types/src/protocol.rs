//! Messages exchanged between a browser client and a session.
//!
//! Client messages travel as `{"type": ..., "data": {...}}` envelopes.
//! Server messages are flat records with a `type` field, e.g.
//! `{"type": "model_state", "data": [...], "step": 3}`.
//!
//! | Direction | `type` | Payload |
//! |-----------|--------|---------|
//! | client | `reset` | none |
//! | client | `step` | [`StepRequest`] |
//! | client | `get_state` | [`StepRequest`] |
//! | client | `submit_params` | [`SubmitParams`] |
//! | client | `call_method` | [`PointEvent`] (click) |
//! | client | `key_press` | [`PointEvent`] (key) |
//! | server | `vega_specs` | chart specs + ensemble size |
//! | server | `model_params` | [`ParamDescriptor`] list |
//! | server | `model_state` | one record per instance + step |
//! | server | `end` | none |
//! | server | `rejected` | request type + reason |
//! | server | `error` | fatal message, connection closes |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::params::ParamDescriptor;

/// Payload of `step` and `get_state`.
///
/// Negative steps are accepted on the wire and clamped by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepRequest {
    /// Target step index.
    #[ts(type = "number")]
    pub step: i64,
}

/// Payload of `submit_params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubmitParams {
    /// Ensemble index of the instance the value is bound to.
    pub model: usize,
    /// Constructor key of the parameter.
    pub param: String,
    /// New value, validated against the parameter's declaration.
    pub value: Value,
}

/// Payload of `call_method` and `key_press`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PointEvent {
    /// Ensemble index of the targeted instance.
    pub model_id: usize,
    /// Event record handed to the model hook untouched.
    #[serde(default)]
    pub data: Value,
}

/// A decoded client request.
///
/// Decoding goes through an explicit tag table rather than serde's
/// adjacently tagged representation so that unknown tags can be told
/// apart from malformed payloads. The serde derive here describes the
/// encoded form and is what clients (and tests) produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// Rebuild every instance from current parameters.
    Reset,
    /// Move to a step, forwards or backwards.
    Step(StepRequest),
    /// Re-send a state already computed.
    GetState(StepRequest),
    /// Bind a parameter value for the next reset.
    SubmitParams(SubmitParams),
    /// Click on an instance (`on_click` hook).
    CallMethod(PointEvent),
    /// Key press on an instance (`on_key` hook).
    KeyPress(PointEvent),
}

impl ClientMessage {
    /// The wire tag of this message.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Step(_) => "step",
            Self::GetState(_) => "get_state",
            Self::SubmitParams(_) => "submit_params",
            Self::CallMethod(_) => "call_method",
            Self::KeyPress(_) => "key_press",
        }
    }
}

/// A message pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// Chart specifications, sent once when the connection opens.
    VegaSpecs {
        /// Opaque chart specs, rendered client side.
        data: Vec<Value>,
        /// Ensemble size.
        n_sims: usize,
    },
    /// Parameter descriptors, sent after every reset.
    ModelParams {
        /// One descriptor per user-settable parameter.
        params: Vec<ParamDescriptor>,
    },
    /// Observable state of every instance at one step.
    ModelState {
        /// One record per instance, in ensemble order.
        data: Vec<Value>,
        /// The step these records belong to.
        #[ts(type = "number")]
        step: u64,
    },
    /// No instance is running any more.
    End,
    /// A request failed validation; nothing changed.
    Rejected {
        /// The `type` of the rejected request.
        request: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The session hit an unrecoverable error and is closing.
    Error {
        /// Description of the failure.
        message: String,
    },
}

impl ServerMessage {
    /// Whether the connection must be closed after sending this message.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
