//! A turtle steered with the arrow keys.
//!
//! Each key press moves the turtle one cell on a torus and leaves a trail
//! cell behind. The turtle cannot move onto its own trail; once every
//! neighbouring cell is trail the run is over. Stepping does nothing, so
//! the history is driven entirely by key presses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use simscope_core::model::decode_params;
use simscope_core::{
    Hook, HookError, Model, ModelError, Observation, ParamError, ParamMap, ParameterRegistry,
};
use simscope_types::ParameterSpec;

use crate::{ReferenceModel, grid_chart};

/// Side length of the board served by the launcher.
const BOARD_SIZE: u64 = 20;

/// Compass direction of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards larger `y`.
    Up,
    /// Towards smaller `y`.
    Down,
    /// Towards smaller `x`.
    Left,
    /// Towards larger `x`.
    Right,
}

impl Direction {
    const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Parse a browser `KeyboardEvent.key` value.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" => Some(Self::Up),
            "ArrowDown" => Some(Self::Down),
            "ArrowLeft" => Some(Self::Left),
            "ArrowRight" => Some(Self::Right),
            _ => None,
        }
    }
}

/// The turtle and everything it has drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turtle {
    width: usize,
    height: usize,
    position: (usize, usize),
    /// Visited cells, oldest first.
    trail: Vec<(usize, usize)>,
}

#[derive(Deserialize)]
struct Args {
    width: usize,
    height: usize,
}

#[derive(Deserialize)]
struct KeyPress {
    key: String,
}

#[derive(Serialize)]
struct Mark {
    x: usize,
    y: usize,
    active: bool,
}

impl Turtle {
    /// Current `(x, y)` cell.
    pub const fn position(&self) -> (usize, usize) {
        self.position
    }

    /// Cells the turtle has left behind.
    pub fn trail(&self) -> &[(usize, usize)] {
        &self.trail
    }

    /// Move one cell in `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Rejected`] if the target cell is occupied.
    pub fn advance(&mut self, direction: Direction) -> Result<(), HookError> {
        let target = self.neighbour(direction);
        if !self.is_free(target) {
            return Err(HookError::Rejected {
                reason: format!("cell ({}, {}) is occupied", target.0, target.1),
            });
        }
        self.trail.push(self.position);
        self.position = target;
        Ok(())
    }

    fn neighbour(&self, direction: Direction) -> (usize, usize) {
        let (x, y) = self.position;
        match direction {
            Direction::Up => (x, next(y, self.height)),
            Direction::Down => (x, prev(y, self.height)),
            Direction::Left => (prev(x, self.width), y),
            Direction::Right => (next(x, self.width), y),
        }
    }

    fn is_free(&self, cell: (usize, usize)) -> bool {
        cell != self.position && !self.trail.contains(&cell)
    }
}

const fn next(coord: usize, size: usize) -> usize {
    if coord.saturating_add(1) >= size {
        0
    } else {
        coord.saturating_add(1)
    }
}

const fn prev(coord: usize, size: usize) -> usize {
    if coord == 0 {
        size.saturating_sub(1)
    } else {
        coord.saturating_sub(1)
    }
}

impl Model for Turtle {
    fn from_params(params: &ParamMap) -> Result<Self, ModelError> {
        let Args { width, height } = decode_params(params)?;
        if width == 0 || height == 0 {
            return Err(ModelError::Construction {
                reason: format!("board must not be empty, got {width}x{height}"),
            });
        }
        Ok(Self {
            width,
            height,
            position: (width.div_euclid(2), height.div_euclid(2)),
            trail: Vec::new(),
        })
    }

    fn step(&mut self) {}

    fn running(&self) -> bool {
        Direction::ALL
            .into_iter()
            .any(|d| self.is_free(self.neighbour(d)))
    }

    fn observe(&self) -> Result<Observation, ModelError> {
        #[derive(Serialize)]
        struct Fields {
            width: usize,
            height: usize,
            trail_length: usize,
        }
        let (x, y) = self.position;
        let agents: Vec<Mark> = std::iter::once(Mark { x, y, active: true })
            .chain(self.trail.iter().map(|&(x, y)| Mark {
                x,
                y,
                active: false,
            }))
            .collect();
        Observation::new(
            &Fields {
                width: self.width,
                height: self.height,
                trail_length: self.trail.len(),
            },
            &agents,
        )
    }

    fn supports(&self, hook: Hook) -> bool {
        hook == Hook::Key
    }

    /// Payload: `{"key": "ArrowUp"}`. Other keys are ignored.
    fn on_key(&mut self, payload: &Value) -> Result<(), HookError> {
        let KeyPress { key } = serde_json::from_value(payload.clone())?;
        match Direction::from_key(&key) {
            Some(direction) => self.advance(direction),
            None => Ok(()),
        }
    }
}

impl ReferenceModel for Turtle {
    const KEY: &'static str = "turtle";
    const NAME: &'static str = "Turtle";
    const DESCRIPTION: &'static str =
        "Steer the turtle with the arrow keys. It cannot cross its own trail.";

    fn declare(registry: &mut ParameterRegistry, _seed: u64) -> Result<(), ParamError> {
        registry.declare(ParameterSpec::static_text(
            "help",
            "Focus the chart and use the arrow keys to move.",
        ))?;
        registry.fix("width", Value::from(BOARD_SIZE))?;
        registry.fix("height", Value::from(BOARD_SIZE))
    }

    fn charts() -> Vec<Value> {
        vec![grid_chart("active", Some(BOARD_SIZE))]
    }
}
