//! Parameter registry: declared parameters plus per-instance bindings.
//!
//! Declarations are made once, while the server is being configured.
//! Every session then works on its own clone of the registry, so values a
//! client submits never leak into another connection.
//!
//! Bound values are read only when instances are built
//! ([`ParameterRegistry::materialize`] during reset). Submitting a value
//! does not touch an instance that is already running.

use std::collections::BTreeMap;

use serde_json::Value;
use simscope_types::{ParamDescriptor, ParamKind, ParameterSpec};

use crate::model::ParamMap;

/// Tolerance used when checking that a numeric value is integral.
const INTEGRAL_EPSILON: f64 = 1e-9;

/// 2^63. Integral floats in `[-I64_BOUND, I64_BOUND)` convert to `i64`
/// exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Errors raised when declaring or submitting parameters.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    /// A parameter with this name is already declared (or fixed).
    #[error("parameter '{name}' is already declared")]
    Duplicate {
        /// The clashing name.
        name: String,
    },

    /// No parameter with this name is declared.
    #[error("unknown parameter '{name}'")]
    Unknown {
        /// The requested name.
        name: String,
    },

    /// The instance index is outside the ensemble.
    #[error("instance {index} does not exist (ensemble size {n_instances})")]
    UnknownInstance {
        /// The requested index.
        index: usize,
        /// Ensemble size.
        n_instances: usize,
    },

    /// The parameter is display-only.
    #[error("parameter '{name}' is not settable")]
    NotSettable {
        /// The parameter name.
        name: String,
    },

    /// The value has the wrong JSON type for the parameter kind.
    #[error("parameter '{name}' expects {expected}, got {got}")]
    WrongType {
        /// The parameter name.
        name: String,
        /// What the kind accepts.
        expected: &'static str,
        /// The submitted value.
        got: Value,
    },

    /// A numeric value is outside the declared bounds.
    #[error("parameter '{name}' must be within [{min}, {max}], got {got}")]
    OutOfRange {
        /// The parameter name.
        name: String,
        /// Lower bound (`-inf` when unbounded).
        min: f64,
        /// Upper bound (`inf` when unbounded).
        max: f64,
        /// The submitted value.
        got: f64,
    },

    /// The value is not one of the declared choices.
    #[error("parameter '{name}' must be one of {choices:?}, got {got}")]
    NotAChoice {
        /// The parameter name.
        name: String,
        /// The allowed values.
        choices: Vec<String>,
        /// The submitted value.
        got: String,
    },

    /// An ensemble needs at least one instance.
    #[error("ensemble size must be at least 1")]
    EmptyEnsemble,
}

/// Declared parameters and the values bound to each ensemble instance.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    /// Settable parameters in declaration order.
    specs: Vec<ParameterSpec>,
    /// Constructor arguments that are not user settable.
    fixed: BTreeMap<String, Value>,
    /// Per-instance submitted values, overriding spec defaults.
    bindings: Vec<BTreeMap<String, Value>>,
}

impl ParameterRegistry {
    /// Create an empty registry for an ensemble of `n_instances`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::EmptyEnsemble`] if `n_instances` is 0.
    pub fn new(n_instances: usize) -> Result<Self, ParamError> {
        if n_instances == 0 {
            return Err(ParamError::EmptyEnsemble);
        }
        Ok(Self {
            specs: Vec::new(),
            fixed: BTreeMap::new(),
            bindings: vec![BTreeMap::new(); n_instances],
        })
    }

    /// Register a settable parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::Duplicate`] if the name is taken, or a
    /// validation error if the default itself violates the declaration.
    pub fn declare(&mut self, spec: ParameterSpec) -> Result<(), ParamError> {
        self.ensure_free(&spec.parameter)?;
        if spec.param_type.is_constructible() {
            validate(&spec, spec.value.clone())?;
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Register a constant constructor argument.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::Duplicate`] if the name is taken.
    pub fn fix(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        self.ensure_free(name)?;
        self.fixed.insert(name.to_owned(), value);
        Ok(())
    }

    /// Validate `value` and bind it to instance `index`.
    ///
    /// Integral parameters are stored as JSON integers even when the
    /// client sends `4.0`. On error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] if the instance or parameter is unknown, the
    /// parameter is display-only, or the value violates the declaration.
    pub fn submit(&mut self, index: usize, name: &str, value: Value) -> Result<(), ParamError> {
        let n_instances = self.bindings.len();
        let spec = self.spec(name)?;
        if !spec.param_type.is_constructible() {
            return Err(ParamError::NotSettable {
                name: name.to_owned(),
            });
        }
        let value = validate(spec, value)?;
        let binding = self
            .bindings
            .get_mut(index)
            .ok_or(ParamError::UnknownInstance { index, n_instances })?;
        binding.insert(name.to_owned(), value);
        Ok(())
    }

    /// Resolve the constructor arguments for instance `index`: fixed
    /// values, then each settable parameter's bound value or default.
    /// Display-only parameters are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::UnknownInstance`] if `index` is outside the
    /// ensemble.
    pub fn materialize(&self, index: usize) -> Result<ParamMap, ParamError> {
        let binding = self.binding(index)?;
        let mut params = self.fixed.clone();
        for spec in self.specs.iter().filter(|s| s.param_type.is_constructible()) {
            let value = binding.get(&spec.parameter).unwrap_or(&spec.value);
            params.insert(spec.parameter.clone(), value.clone());
        }
        Ok(params)
    }

    /// Descriptors for the `model_params` message, in declaration order.
    pub fn describe(&self) -> Vec<ParamDescriptor> {
        self.specs
            .iter()
            .map(|spec| ParamDescriptor {
                spec: spec.clone(),
                model_values: self
                    .bindings
                    .iter()
                    .map(|b| b.get(&spec.parameter).unwrap_or(&spec.value).clone())
                    .collect(),
            })
            .collect()
    }

    /// Ensemble size.
    pub fn n_instances(&self) -> usize {
        self.bindings.len()
    }

    /// Declared settable parameters.
    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    fn spec(&self, name: &str) -> Result<&ParameterSpec, ParamError> {
        self.specs
            .iter()
            .find(|s| s.parameter == name)
            .ok_or_else(|| ParamError::Unknown {
                name: name.to_owned(),
            })
    }

    fn binding(&self, index: usize) -> Result<&BTreeMap<String, Value>, ParamError> {
        self.bindings.get(index).ok_or(ParamError::UnknownInstance {
            index,
            n_instances: self.bindings.len(),
        })
    }

    fn ensure_free(&self, name: &str) -> Result<(), ParamError> {
        if self.fixed.contains_key(name) || self.specs.iter().any(|s| s.parameter == name) {
            return Err(ParamError::Duplicate {
                name: name.to_owned(),
            });
        }
        Ok(())
    }
}

/// Check `value` against `spec`, returning the value to store.
fn validate(spec: &ParameterSpec, value: Value) -> Result<Value, ParamError> {
    let name = &spec.parameter;
    match spec.param_type {
        ParamKind::Number | ParamKind::Slider => validate_number(spec, value),
        ParamKind::Checkbox => {
            if value.is_boolean() {
                Ok(value)
            } else {
                Err(wrong_type(name, "a boolean", &value))
            }
        }
        ParamKind::Choice => {
            let choice = value
                .as_str()
                .ok_or_else(|| wrong_type(name, "a string", &value))?;
            if spec.choices.iter().any(|c| c == choice) {
                Ok(value)
            } else {
                Err(ParamError::NotAChoice {
                    name: name.clone(),
                    choices: spec.choices.clone(),
                    got: choice.to_owned(),
                })
            }
        }
        ParamKind::StaticText => Err(ParamError::NotSettable { name: name.clone() }),
    }
}

fn validate_number(spec: &ParameterSpec, value: Value) -> Result<Value, ParamError> {
    let name = &spec.parameter;
    let number = value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| wrong_type(name, "a number", &value))?;

    let min = spec.min_value.unwrap_or(f64::NEG_INFINITY);
    let max = spec.max_value.unwrap_or(f64::INFINITY);
    if number < min || number > max {
        return Err(ParamError::OutOfRange {
            name: name.clone(),
            min,
            max,
            got: number,
        });
    }

    // An integral default with an integral step means the model reads the
    // value as an integer.
    let integral_default = spec.value.is_i64() || spec.value.is_u64();
    let integral_step = spec.step.is_none_or(is_integral);
    if !(integral_default && integral_step) || value.is_i64() || value.is_u64() {
        return Ok(value);
    }
    if !is_integral(number) || !(-I64_BOUND..I64_BOUND).contains(&number) {
        return Err(wrong_type(name, "an integer", &value));
    }
    #[allow(clippy::cast_possible_truncation)]
    let integer = number.round() as i64;
    Ok(Value::from(integer))
}

fn is_integral(n: f64) -> bool {
    (n - n.round()).abs() < INTEGRAL_EPSILON
}

fn wrong_type(name: &str, expected: &'static str, got: &Value) -> ParamError {
    ParamError::WrongType {
        name: name.to_owned(),
        expected,
        got: got.clone(),
    }
}
