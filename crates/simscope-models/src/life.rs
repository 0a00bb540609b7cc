//! Conway's Game of Life on a square torus.
//!
//! Cells are seeded alive with probability `density`. Each step applies
//! the usual rules to every cell at once, then flips each cell with
//! probability `noise`. The RNG lives in the model, so snapshots carry
//! it and a replayed run draws the same flips.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simscope_core::model::decode_params;
use simscope_core::{
    Hook, HookError, Model, ModelError, Observation, ParamError, ParamMap, ParameterRegistry,
};
use simscope_types::ParameterSpec;

use crate::{ReferenceModel, grid_chart};

/// A Game of Life board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Life {
    size: usize,
    noise: f64,
    /// Row-major, `size * size` cells.
    cells: Vec<bool>,
    rng: ChaCha8Rng,
}

#[derive(Deserialize)]
struct Args {
    size: usize,
    density: f64,
    #[serde(default)]
    noise: f64,
    seed: u64,
}

#[derive(Deserialize)]
struct Click {
    x: usize,
    y: usize,
}

#[derive(Serialize)]
struct Cell {
    x: usize,
    y: usize,
    #[serde(rename = "isAlive")]
    alive: bool,
}

impl Life {
    /// Side length of the board.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether the cell at `(x, y)` is alive. Out-of-range cells are dead.
    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.index(x, y)
            .and_then(|i| self.cells.get(i))
            .copied()
            .unwrap_or(false)
    }

    /// Number of live cells.
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.size || y >= self.size {
            return None;
        }
        y.checked_mul(self.size)?.checked_add(x)
    }

    fn live_neighbours(&self, x: usize, y: usize) -> usize {
        let mut count = 0_usize;
        for dy in [-1_i8, 0, 1] {
            for dx in [-1_i8, 0, 1] {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = wrap(x, dx, self.size);
                let ny = wrap(y, dy, self.size);
                if self.is_alive(nx, ny) {
                    count = count.saturating_add(1);
                }
            }
        }
        count
    }
}

/// Move one cell in direction `delta` on a torus of side `size`.
const fn wrap(coord: usize, delta: i8, size: usize) -> usize {
    match delta {
        -1 if coord == 0 => size.saturating_sub(1),
        -1 => coord.saturating_sub(1),
        1 if coord.saturating_add(1) >= size => 0,
        1 => coord.saturating_add(1),
        _ => coord,
    }
}

impl Model for Life {
    fn from_params(params: &ParamMap) -> Result<Self, ModelError> {
        let args: Args = decode_params(params)?;
        if args.size == 0 {
            return Err(ModelError::Construction {
                reason: String::from("size must be at least 1"),
            });
        }
        for (name, p) in [("density", args.density), ("noise", args.noise)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ModelError::Construction {
                    reason: format!("{name} must be a probability, got {p}"),
                });
            }
        }
        let n_cells = args
            .size
            .checked_mul(args.size)
            .ok_or_else(|| ModelError::Construction {
                reason: format!("board of size {} is too large", args.size),
            })?;

        let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
        let cells = (0..n_cells).map(|_| rng.random_bool(args.density)).collect();
        Ok(Self {
            size: args.size,
            noise: args.noise,
            cells,
            rng,
        })
    }

    fn step(&mut self) {
        let mut next = Vec::with_capacity(self.cells.len());
        for y in 0..self.size {
            for x in 0..self.size {
                let alive = self.is_alive(x, y);
                let neighbours = self.live_neighbours(x, y);
                next.push(matches!((alive, neighbours), (true, 2 | 3) | (false, 3)));
            }
        }
        if self.noise > 0.0 {
            for cell in &mut next {
                if self.rng.random_bool(self.noise) {
                    *cell = !*cell;
                }
            }
        }
        self.cells = next;
    }

    fn running(&self) -> bool {
        true
    }

    fn observe(&self) -> Result<Observation, ModelError> {
        #[derive(Serialize)]
        struct Fields {
            size: usize,
            population: usize,
        }
        let agents: Vec<Cell> = (0..self.size)
            .flat_map(|y| (0..self.size).map(move |x| (x, y)))
            .map(|(x, y)| Cell {
                x,
                y,
                alive: self.is_alive(x, y),
            })
            .collect();
        Observation::new(
            &Fields {
                size: self.size,
                population: self.population(),
            },
            &agents,
        )
    }

    fn supports(&self, hook: Hook) -> bool {
        hook == Hook::Click
    }

    /// Payload: `{"x": .., "y": ..}`. Revives the cell.
    fn on_click(&mut self, payload: &Value) -> Result<(), HookError> {
        let Click { x, y } = serde_json::from_value(payload.clone())?;
        let cell = self
            .index(x, y)
            .and_then(|i| self.cells.get_mut(i))
            .ok_or_else(|| HookError::Rejected {
                reason: format!("cell ({x}, {y}) is outside the board"),
            })?;
        *cell = true;
        Ok(())
    }
}

impl ReferenceModel for Life {
    const KEY: &'static str = "life";
    const NAME: &'static str = "Game of Life";
    const DESCRIPTION: &'static str =
        "Conway's Game of Life on a torus. Click a cell to bring it to life.";

    fn declare(registry: &mut ParameterRegistry, seed: u64) -> Result<(), ParamError> {
        registry.declare(ParameterSpec::slider(
            "size",
            "Size",
            Value::from(50),
            10.0,
            100.0,
            5.0,
        ))?;
        registry.declare(ParameterSpec::slider(
            "density",
            "Initial density",
            Value::from(0.1),
            0.0,
            1.0,
            0.05,
        ))?;
        registry.declare(
            ParameterSpec::slider("noise", "Noise", Value::from(0.0), 0.0, 0.1, 0.005)
                .with_description("Chance that any cell flips after each generation."),
        )?;
        registry.fix("seed", Value::from(seed))
    }

    fn charts() -> Vec<Value> {
        vec![grid_chart("isAlive", None)]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn board(size: usize, density: f64, noise: f64, seed: u64) -> Life {
        let mut params = ParamMap::new();
        params.insert(String::from("size"), json!(size));
        params.insert(String::from("density"), json!(density));
        params.insert(String::from("noise"), json!(noise));
        params.insert(String::from("seed"), json!(seed));
        Life::from_params(&params).unwrap()
    }

    fn empty(size: usize) -> Life {
        board(size, 0.0, 0.0, 1)
    }

    #[test]
    fn blinker_oscillates() {
        let mut life = empty(5);
        for x in 1..=3 {
            life.on_click(&json!({"x": x, "y": 2})).unwrap();
        }
        life.step();
        assert!(life.is_alive(2, 1) && life.is_alive(2, 2) && life.is_alive(2, 3));
        assert!(!life.is_alive(1, 2) && !life.is_alive(3, 2));
        life.step();
        assert!(life.is_alive(1, 2) && life.is_alive(2, 2) && life.is_alive(3, 2));
        assert_eq!(life.population(), 3);
    }

    #[test]
    fn edges_wrap_around() {
        let mut life = empty(5);
        for y in [4, 0, 1] {
            life.on_click(&json!({"x": 0, "y": y})).unwrap();
        }
        life.step();
        assert!(life.is_alive(4, 0) && life.is_alive(0, 0) && life.is_alive(1, 0));
    }

    #[test]
    fn clicks_outside_the_board_are_rejected() {
        let mut life = empty(5);
        let err = life.on_click(&json!({"x": 5, "y": 0})).unwrap_err();
        assert!(matches!(err, HookError::Rejected { .. }));
        assert_eq!(life.population(), 0);
    }

    #[test]
    fn same_seed_same_board() {
        let a = board(20, 0.3, 0.0, 9);
        let b = board(20, 0.3, 0.0, 9);
        let c = board(20, 0.3, 0.0, 10);
        assert_eq!(a, b);
        assert_ne!(a.cells, c.cells);
    }

    #[test]
    fn noise_replays_from_a_serialized_copy() {
        let mut original = board(12, 0.2, 0.05, 3);
        original.step();
        let saved = serde_json::to_vec(&original).unwrap();
        let mut copy: Life = serde_json::from_slice(&saved).unwrap();
        for _ in 0..10 {
            original.step();
            copy.step();
        }
        assert_eq!(original, copy);
    }

    #[test]
    fn observation_lists_every_cell() {
        let mut life = empty(3);
        life.on_click(&json!({"x": 1, "y": 2})).unwrap();
        let record = life.observe().unwrap().into_record();
        assert_eq!(record["population"], json!(1));
        let agents = record["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 9);
        assert!(agents.contains(&json!({"x": 1, "y": 2, "isAlive": true})));
    }

    #[test]
    fn invalid_probabilities_fail_construction() {
        let mut params = ParamMap::new();
        params.insert(String::from("size"), json!(10));
        params.insert(String::from("density"), json!(1.5));
        params.insert(String::from("seed"), json!(1));
        assert!(matches!(
            Life::from_params(&params),
            Err(ModelError::Construction { .. })
        ));
    }
}
