//! End-to-end properties of the session engine.
//!
//! Uses a seeded random-walk ensemble so that any divergence in RNG
//! state across snapshots shows up as a different position, and a
//! compounding float model so that any lossy float encoding shows up as
//! a drifting value.

#![allow(clippy::unwrap_used)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use simscope_core::codec::{apply, decode};
use simscope_core::model::decode_params;
use simscope_core::snapshot::Snapshot;
use simscope_core::{
    Hook, HookError, Model, ModelError, Observation, ParamMap, ParameterRegistry, SessionConfig,
    SessionEngine,
};
use simscope_types::{ParameterSpec, ServerMessage};

#[derive(Debug, Serialize, Deserialize)]
struct Walker {
    x: i64,
    y: i64,
    rng: ChaCha8Rng,
}

#[derive(Deserialize)]
struct WalkerArgs {
    seed: u64,
}

#[derive(Deserialize)]
struct Jump {
    x: i64,
    y: i64,
}

impl Model for Walker {
    fn from_params(params: &ParamMap) -> Result<Self, ModelError> {
        let args: WalkerArgs = decode_params(params)?;
        Ok(Self {
            x: 0,
            y: 0,
            rng: ChaCha8Rng::seed_from_u64(args.seed),
        })
    }

    fn step(&mut self) {
        match self.rng.random_range(0..4_u8) {
            0 => self.x = self.x.saturating_add(1),
            1 => self.x = self.x.saturating_sub(1),
            2 => self.y = self.y.saturating_add(1),
            _ => self.y = self.y.saturating_sub(1),
        }
    }

    fn running(&self) -> bool {
        true
    }

    fn observe(&self) -> Result<Observation, ModelError> {
        Observation::new(&json!({"x": self.x, "y": self.y}), &[json!({"id": 0})])
    }

    fn supports(&self, hook: Hook) -> bool {
        hook == Hook::Click
    }

    fn on_click(&mut self, payload: &Value) -> Result<(), HookError> {
        let jump: Jump = serde_json::from_value(payload.clone())?;
        self.x = jump.x;
        self.y = jump.y;
        Ok(())
    }
}

/// Compounds a float every step, so one lost bit after a restore grows
/// into a visible difference.
#[derive(Debug, Serialize, Deserialize)]
struct Drift {
    v: f64,
}

impl Model for Drift {
    fn from_params(_params: &ParamMap) -> Result<Self, ModelError> {
        Ok(Self { v: 0.1 })
    }

    fn step(&mut self) {
        self.v = self.v.mul_add(1.37, 0.013);
    }

    fn running(&self) -> bool {
        true
    }

    fn observe(&self) -> Result<Observation, ModelError> {
        Observation::new(&json!({"v": self.v}), &[] as &[Value])
    }
}

fn engine(seeds: &[u64]) -> SessionEngine<Walker> {
    let mut registry = ParameterRegistry::new(seeds.len()).unwrap();
    registry
        .declare(ParameterSpec::number("seed", "Seed", json!(1)))
        .unwrap();
    for (index, seed) in seeds.iter().enumerate() {
        registry.submit(index, "seed", json!(seed)).unwrap();
    }
    let mut engine = SessionEngine::new(registry, &SessionConfig::default());
    engine.reset().unwrap();
    engine
}

fn state_at(messages: &[ServerMessage]) -> (u64, Vec<Value>) {
    messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::ModelState { data, step } => Some((*step, data.clone())),
            _ => None,
        })
        .unwrap()
}

#[test]
fn direct_and_incremental_stepping_agree() {
    let mut direct = engine(&[11]);
    let mut incremental = engine(&[11]);

    let jumped = state_at(&direct.step_to(40).unwrap());
    let mut walked = None;
    for step in 1..=40 {
        walked = Some(state_at(&incremental.step_to(step).unwrap()));
    }
    assert_eq!(Some(jumped), walked);
}

#[test]
fn rewinding_reproduces_every_earlier_state() {
    let mut engine = engine(&[3]);
    let mut seen = Vec::new();
    for step in 0..=25 {
        seen.push(state_at(&engine.step_to(step).unwrap()));
    }

    for step in [24_i64, 10, 1, 0, 17] {
        let replayed = state_at(&engine.step_to(step).unwrap());
        assert_eq!(&replayed, &seen[usize::try_from(step).unwrap()]);
    }
    let forward = state_at(&engine.step_to(25).unwrap());
    assert_eq!(forward, seen[25]);
}

#[test]
fn snapshots_are_byte_identical_after_replay() {
    let mut engine = engine(&[5, 6]);
    engine.step_to(12).unwrap();
    let before = engine.frame(12).unwrap().snapshot.clone();
    engine.step_to(2).unwrap();
    engine.step_to(12).unwrap();
    assert_eq!(engine.frame(12).unwrap().snapshot.as_bytes(), before.as_bytes());
}

#[test]
fn events_touch_only_their_instance_and_truncate_history() {
    let mut reference = engine(&[1, 2, 3]);
    let mut engine = engine(&[1, 2, 3]);
    reference.step_to(8).unwrap();
    engine.step_to(8).unwrap();

    let (step, data) = state_at(
        &engine
            .dispatch(1, Hook::Click, &json!({"x": 100, "y": -100}))
            .unwrap(),
    );
    assert_eq!(step, 8);
    assert_eq!(data[1]["x"], json!(100));

    let (_, expected) = state_at(&reference.step_to(8).unwrap());
    assert_eq!(data[0], expected[0]);
    assert_eq!(data[2], expected[2]);

    assert!(engine.get_state(9).is_err());

    // The untouched instances keep their trajectories on the new branch.
    let (_, after) = state_at(&engine.step_to(15).unwrap());
    let (_, expected) = state_at(&reference.step_to(15).unwrap());
    assert_eq!(after[0], expected[0]);
    assert_eq!(after[2], expected[2]);
    assert_ne!(after[1], expected[1]);
}

#[test]
fn text_frames_drive_the_engine() {
    let mut engine = engine(&[9]);
    let frames = [
        r#"{"type": "step", "data": {"step": 3}}"#,
        r#"{"type": "ping"}"#,
        r#"{"type": "get_state", "data": {"step": 1}}"#,
    ];
    let mut steps = Vec::new();
    for frame in frames {
        if let Some(message) = decode(frame).unwrap() {
            for reply in apply(&mut engine, message).unwrap() {
                if let ServerMessage::ModelState { step, .. } = reply {
                    steps.push(step);
                }
            }
        }
    }
    assert_eq!(steps, vec![3, 1]);
    assert_eq!(engine.current_step(), 3);
}

#[test]
fn snapshots_restore_floats_bit_for_bit() {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let ensemble: Vec<Drift> = (-300..300_i32)
        .flat_map(|exponent| {
            let draws: Vec<f64> = (0..32).map(|_| rng.random()).collect();
            draws.into_iter().map(move |mantissa| Drift {
                v: mantissa * 10_f64.powi(exponent),
            })
        })
        .collect();

    let restored: Vec<Drift> = Snapshot::capture(0, &ensemble).unwrap().restore().unwrap();
    assert_eq!(restored.len(), ensemble.len());
    for (original, copy) in ensemble.iter().zip(&restored) {
        assert_eq!(original.v.to_bits(), copy.v.to_bits(), "{} came back as {}", original.v, copy.v);
    }
}

#[test]
fn rewinding_float_state_does_not_drift() {
    let registry = ParameterRegistry::new(1).unwrap();
    let mut engine = SessionEngine::<Drift>::new(registry, &SessionConfig::default());
    engine.reset().unwrap();
    engine.step_to(60).unwrap();
    let expected = engine.instances()[0].v.to_bits();

    for step in 1..60 {
        engine.step_to(step).unwrap();
        engine.step_to(60).unwrap();
        assert_eq!(engine.instances()[0].v.to_bits(), expected, "diverged after rewinding to {step}");
    }
}
