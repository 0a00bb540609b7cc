//! The smallest useful model: a counter that stops at a limit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use simscope_core::model::decode_params;
use simscope_core::{
    Hook, HookError, Model, ModelError, Observation, ParamError, ParamMap, ParameterRegistry,
};
use simscope_types::ParameterSpec;

use crate::ReferenceModel;

/// Adds `increment` each step until `value` reaches `limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    value: u64,
    increment: u64,
    limit: u64,
}

#[derive(Deserialize)]
struct Args {
    increment: u64,
    limit: u64,
}

#[derive(Deserialize)]
struct SetValue {
    value: u64,
}

impl Counter {
    /// The current count.
    pub const fn value(&self) -> u64 {
        self.value
    }
}

impl Model for Counter {
    fn from_params(params: &ParamMap) -> Result<Self, ModelError> {
        let args: Args = decode_params(params)?;
        Ok(Self {
            value: 0,
            increment: args.increment,
            limit: args.limit,
        })
    }

    fn step(&mut self) {
        self.value = self.value.saturating_add(self.increment).min(self.limit);
    }

    fn running(&self) -> bool {
        self.value < self.limit
    }

    fn observe(&self) -> Result<Observation, ModelError> {
        #[derive(Serialize)]
        struct Fields {
            value: u64,
            limit: u64,
        }
        let agents: [Value; 0] = [];
        Observation::new(
            &Fields {
                value: self.value,
                limit: self.limit,
            },
            &agents,
        )
    }

    fn supports(&self, hook: Hook) -> bool {
        hook == Hook::Click
    }

    /// Payload: `{"value": n}`.
    fn on_click(&mut self, payload: &Value) -> Result<(), HookError> {
        let SetValue { value } = serde_json::from_value(payload.clone())?;
        self.value = value.min(self.limit);
        Ok(())
    }
}

impl ReferenceModel for Counter {
    const KEY: &'static str = "counter";
    const NAME: &'static str = "Counter";
    const DESCRIPTION: &'static str = "Counts up by a fixed increment until it reaches its limit.";

    fn declare(registry: &mut ParameterRegistry, _seed: u64) -> Result<(), ParamError> {
        registry.declare(ParameterSpec::slider(
            "increment",
            "Increment",
            Value::from(1),
            1.0,
            10.0,
            1.0,
        ))?;
        registry.declare(
            ParameterSpec::number("limit", "Limit", Value::from(100))
                .with_bounds(Some(0.0), None)
                .with_description("The counter stops once it reaches this value."),
        )
    }

    fn charts() -> Vec<Value> {
        vec![serde_json::json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v4.json",
            "width": 300,
            "height": 60,
            "data": {"name": "model"},
            "mark": "bar",
            "encoding": {
                "x": {"type": "quantitative", "field": "value", "scale": {"domainMin": 0}}
            }
        })]
    }
}
