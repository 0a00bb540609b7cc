//! Parameter declarations and their wire descriptors.
//!
//! A [`ParameterSpec`] is declared once when the server is configured and
//! never changes afterwards. The per-instance values a client submits are
//! held elsewhere (by the session's parameter registry); on the wire they
//! appear as the `model_values` list of a [`ParamDescriptor`].
//!
//! The field names follow the descriptor format the browser client
//! already understands: `parameter` is the constructor key, `name` is the
//! human-readable label.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// The input widget a parameter is presented with, which also determines
/// the values it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ParamKind {
    /// Free numeric input, optionally bounded.
    Number,
    /// Boolean toggle.
    Checkbox,
    /// One string out of a fixed list.
    Choice,
    /// Bounded numeric slider with a step size.
    Slider,
    /// Display-only text. Never passed to a model constructor.
    StaticText,
}

impl ParamKind {
    /// Whether values of this kind are handed to the model constructor.
    pub const fn is_constructible(self) -> bool {
        !matches!(self, Self::StaticText)
    }
}

/// A declared, user-settable model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ParameterSpec {
    /// Constructor key the value is passed under.
    pub parameter: String,
    /// Widget kind.
    pub param_type: ParamKind,
    /// Human-readable label.
    pub name: String,
    /// Default value used until a client submits another one.
    pub value: Value,
    /// Inclusive lower bound for numeric kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Inclusive upper bound for numeric kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Slider increment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Allowed values for [`ParamKind::Choice`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// Optional longer help text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    fn new(parameter: &str, param_type: ParamKind, name: &str, value: Value) -> Self {
        Self {
            parameter: parameter.to_owned(),
            param_type,
            name: name.to_owned(),
            value,
            min_value: None,
            max_value: None,
            step: None,
            choices: Vec::new(),
            description: None,
        }
    }

    /// A bounded numeric slider.
    pub fn slider(parameter: &str, name: &str, value: Value, min: f64, max: f64, step: f64) -> Self {
        Self {
            min_value: Some(min),
            max_value: Some(max),
            step: Some(step),
            ..Self::new(parameter, ParamKind::Slider, name, value)
        }
    }

    /// An unbounded numeric input.
    pub fn number(parameter: &str, name: &str, value: Value) -> Self {
        Self::new(parameter, ParamKind::Number, name, value)
    }

    /// A boolean toggle.
    pub fn checkbox(parameter: &str, name: &str, value: bool) -> Self {
        Self::new(parameter, ParamKind::Checkbox, name, Value::Bool(value))
    }

    /// A selection from a fixed list of strings.
    pub fn choice(parameter: &str, name: &str, value: &str, choices: &[&str]) -> Self {
        Self {
            choices: choices.iter().map(|c| (*c).to_owned()).collect(),
            ..Self::new(parameter, ParamKind::Choice, name, Value::String(value.to_owned()))
        }
    }

    /// Display-only text shown alongside the other parameters.
    pub fn static_text(parameter: &str, text: &str) -> Self {
        Self::new(parameter, ParamKind::StaticText, "", Value::String(text.to_owned()))
    }

    /// Attach help text.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Set or replace the numeric bounds.
    #[must_use]
    pub const fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }
}

/// A parameter as sent in a `model_params` message: the declaration plus
/// the value currently bound for each ensemble instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ParamDescriptor {
    /// The declaration.
    #[serde(flatten)]
    pub spec: ParameterSpec,
    /// One entry per instance, in ensemble order.
    pub model_values: Vec<Value>,
}
