//! The interface a simulation model implements to be driven by a session.
//!
//! The engine never looks inside a model. It needs exactly four things:
//!
//! - a constructor from the materialized parameter map ([`Model::from_params`]),
//! - a way to advance one step ([`Model::step`]) and to ask whether there
//!   is anything left to do ([`Model::running`]),
//! - an observable projection for the client ([`Model::observe`]),
//! - a complete, self-describing state record for snapshots. That last
//!   one is the `Serialize + DeserializeOwned` bound: whatever the model
//!   serializes is everything that exists of it, RNG state included.
//!
//! Point-event hooks are optional. A model advertises them through
//! [`Model::supports`]; the dispatcher never calls a hook the model does
//! not advertise.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Resolved constructor arguments, keyed by parameter name.
pub type ParamMap = BTreeMap<String, Value>;

/// An optional point-event hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// `on_click`, triggered by `call_method`.
    Click,
    /// `on_key`, triggered by `key_press`.
    Key,
}

impl Hook {
    /// The hook's method name as the client knows it.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Click => "on_click",
            Self::Key => "on_key",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while building or observing a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The parameter map could not be turned into model arguments.
    #[error("invalid model parameters: {source}")]
    Params {
        /// The underlying decode error.
        #[from]
        source: serde_json::Error,
    },

    /// The model rejected otherwise well-formed arguments.
    #[error("model construction failed: {reason}")]
    Construction {
        /// Why construction failed.
        reason: String,
    },

    /// The observable projection could not be serialized.
    #[error("observation serialization failed: {source}")]
    Serialization {
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// The model's observable fields did not serialize to a JSON object.
    #[error("observation is not a record: got {found}")]
    NotARecord {
        /// JSON type that was produced instead.
        found: &'static str,
    },
}

/// Errors raised by a hook while handling a point event.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook is not implemented by this model.
    #[error("{0} is not supported by this model")]
    Unsupported(Hook),

    /// The event payload did not have the shape the hook expects.
    #[error("malformed event payload: {source}")]
    Payload {
        /// The underlying decode error.
        #[from]
        source: serde_json::Error,
    },

    /// The hook understood the event but refused it.
    #[error("event rejected: {reason}")]
    Rejected {
        /// Why the event was refused.
        reason: String,
    },
}

/// What a client sees of one instance at one step: the instance's own
/// observable fields plus its agent list, each a plain JSON record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Instance-level fields.
    pub fields: Map<String, Value>,
    /// One record per agent or unit.
    pub agents: Vec<Value>,
}

impl Observation {
    /// Build an observation from any serializable field struct and agent
    /// list.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Serialization`] if serialization fails, or
    /// [`ModelError::NotARecord`] if `fields` is not a struct or map.
    pub fn new<F, A>(fields: &F, agents: &[A]) -> Result<Self, ModelError>
    where
        F: Serialize,
        A: Serialize,
    {
        let fields = match serde_json::to_value(fields).map_err(serialization)? {
            Value::Object(map) => map,
            other => {
                return Err(ModelError::NotARecord {
                    found: json_type_name(&other),
                });
            }
        };
        let agents = agents
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(serialization)?;
        Ok(Self { fields, agents })
    }

    /// Flatten into the record sent in `model_state`: the fields with an
    /// `agents` key added.
    pub fn into_record(self) -> Value {
        let mut record = self.fields;
        record.insert(String::from("agents"), Value::Array(self.agents));
        Value::Object(record)
    }
}

/// A simulation that can be stepped, observed, snapshotted and restored.
pub trait Model: Serialize + DeserializeOwned + Send + 'static {
    /// Build a fresh instance from its materialized parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the parameters cannot be used.
    fn from_params(params: &ParamMap) -> Result<Self, ModelError>;

    /// Advance by one step.
    fn step(&mut self);

    /// Whether the model still has work to do.
    fn running(&self) -> bool;

    /// The client-facing projection of the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the projection cannot be serialized.
    fn observe(&self) -> Result<Observation, ModelError>;

    /// Whether this model implements `hook`.
    fn supports(&self, _hook: Hook) -> bool {
        false
    }

    /// Handle a click event.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] if the event cannot be applied.
    fn on_click(&mut self, _payload: &Value) -> Result<(), HookError> {
        Err(HookError::Unsupported(Hook::Click))
    }

    /// Handle a key press event.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] if the event cannot be applied.
    fn on_key(&mut self, _payload: &Value) -> Result<(), HookError> {
        Err(HookError::Unsupported(Hook::Key))
    }
}

/// Decode a parameter map into a typed argument struct.
///
/// # Errors
///
/// Returns [`ModelError::Params`] if a key is missing or has the wrong
/// type for `T`.
pub fn decode_params<T: DeserializeOwned>(params: &ParamMap) -> Result<T, ModelError> {
    let object: Map<String, Value> = params
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(serde_json::from_value(Value::Object(object))?)
}

const fn serialization(source: serde_json::Error) -> ModelError {
    ModelError::Serialization { source }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Fields {
        width: u32,
        label: &'static str,
    }

    #[test]
    fn observation_flattens_agents_into_record() {
        let observation =
            Observation::new(&Fields { width: 4, label: "grid" }, &[json!({"x": 1})]).unwrap();
        assert_eq!(
            observation.into_record(),
            json!({"width": 4, "label": "grid", "agents": [{"x": 1}]})
        );
    }

    #[test]
    fn observation_rejects_non_record_fields() {
        let agents: [Value; 0] = [];
        let err = Observation::new(&42_u32, &agents).unwrap_err();
        assert!(matches!(err, ModelError::NotARecord { found: "number" }));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Args {
        size: u32,
        wrap: bool,
    }

    #[test]
    fn decode_params_reads_typed_arguments() {
        let mut params = ParamMap::new();
        params.insert(String::from("size"), json!(20));
        params.insert(String::from("wrap"), json!(true));
        let args: Args = decode_params(&params).unwrap();
        assert_eq!(args, Args { size: 20, wrap: true });
    }

    #[test]
    fn decode_params_reports_missing_keys() {
        let params = ParamMap::new();
        let result: Result<Args, _> = decode_params(&params);
        assert!(matches!(result, Err(ModelError::Params { .. })));
    }

    #[test]
    fn hook_names_match_client_methods() {
        assert_eq!(Hook::Click.to_string(), "on_click");
        assert_eq!(Hook::Key.name(), "on_key");
    }
}
