//! Reference models served by the Simscope launcher.
//!
//! Each model implements [`Model`] for the engine and [`ReferenceModel`]
//! for the launcher, which needs a display name, parameter declarations,
//! and chart specs on top.
//!
//! # Modules
//!
//! - [`counter`] -- Counts up to a limit. Clicks overwrite the value.
//! - [`life`] -- Conway's Game of Life on a torus, with optional noise.
//!   Clicks revive cells.
//! - [`turtle`] -- A turtle steered with the arrow keys that cannot cross
//!   its own trail.

pub mod counter;
pub mod life;
pub mod turtle;

use serde_json::Value;
use simscope_core::{Model, ParamError, ParameterRegistry};

pub use counter::Counter;
pub use life::Life;
pub use turtle::Turtle;

/// A model the launcher knows how to configure and serve.
pub trait ReferenceModel: Model {
    /// Key used to select the model in `simscope.yaml`.
    const KEY: &'static str;

    /// Display name.
    const NAME: &'static str;

    /// One-line description.
    const DESCRIPTION: &'static str;

    /// Declare the model's parameters. `seed` is fixed for models that
    /// draw random numbers.
    fn declare(registry: &mut ParameterRegistry, seed: u64) -> Result<(), ParamError>;

    /// Chart specifications sent in `vega_specs`.
    fn charts() -> Vec<Value>;
}

/// Keys of every reference model, for error messages.
pub const KEYS: [&str; 3] = [Counter::KEY, Life::KEY, Turtle::KEY];

/// Build a registry for an ensemble of `n_instances` of `M`.
///
/// # Errors
///
/// Returns [`ParamError`] if `n_instances` is 0 or a declaration is
/// invalid.
pub fn registry<M: ReferenceModel>(
    n_instances: usize,
    seed: u64,
) -> Result<ParameterRegistry, ParamError> {
    let mut registry = ParameterRegistry::new(n_instances)?;
    M::declare(&mut registry, seed)?;
    Ok(registry)
}

/// A square grid chart over the `agents` records, coloured by `field`.
/// With a known `size` the axes show every cell, including empty ones.
fn grid_chart(field: &str, size: Option<u64>) -> Value {
    let mut x = serde_json::json!({"type": "ordinal", "field": "x"});
    let mut y = serde_json::json!({"type": "ordinal", "field": "y"});
    if let (Some(size), Value::Object(x), Value::Object(y)) = (size, &mut x, &mut y) {
        x.insert(
            String::from("scale"),
            serde_json::json!({"domain": (0..size).collect::<Vec<_>>()}),
        );
        y.insert(
            String::from("scale"),
            serde_json::json!({"domain": (0..size).rev().collect::<Vec<_>>()}),
        );
    }
    serde_json::json!({
        "$schema": "https://vega.github.io/schema/vega-lite/v4.json",
        "width": 400,
        "height": 400,
        "data": {"name": "agents"},
        "mark": "rect",
        "encoding": {
            "x": x,
            "y": y,
            "color": {"type": "nominal", "field": field}
        }
    })
}
