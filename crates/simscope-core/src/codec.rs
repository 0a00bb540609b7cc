//! Wire codec: raw text frames in, [`ServerMessage`] outboxes out.
//!
//! [`decode`] reads the `{"type", "data"}` envelope and picks the payload
//! type from an explicit tag table, so an unknown tag is distinguishable
//! from a known tag with a bad payload. [`apply`] routes a decoded message
//! to the engine and folds recoverable failures into a `rejected` reply.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use simscope_types::{ClientMessage, ServerMessage};
use tracing::{debug, warn};

use crate::model::{Hook, Model};
use crate::session::{SessionEngine, SessionError};

/// Errors that can occur while decoding a client frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a JSON object with a string `type`.
    #[error("malformed message: {source}")]
    Json {
        /// The underlying parse error.
        #[from]
        source: serde_json::Error,
    },

    /// The tag is known but its `data` does not match.
    #[error("invalid payload for {kind}: {source}")]
    Payload {
        /// The message tag.
        kind: String,
        /// The underlying decode error.
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame.
///
/// Returns `Ok(None)` for a well-formed envelope with an unknown `type`.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] if the frame is not an envelope, or
/// [`DecodeError::Payload`] if a known type carries a bad `data` field.
pub fn decode(text: &str) -> Result<Option<ClientMessage>, DecodeError> {
    let Envelope { kind, data } = serde_json::from_str(text)?;
    let message = match kind.as_str() {
        "reset" => ClientMessage::Reset,
        "step" => ClientMessage::Step(payload(&kind, data)?),
        "get_state" => ClientMessage::GetState(payload(&kind, data)?),
        "submit_params" => ClientMessage::SubmitParams(payload(&kind, data)?),
        "call_method" => ClientMessage::CallMethod(payload(&kind, data)?),
        "key_press" => ClientMessage::KeyPress(payload(&kind, data)?),
        _ => {
            debug!(kind = %kind, "Ignoring unknown message type");
            return Ok(None);
        }
    };
    Ok(Some(message))
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        kind: kind.to_owned(),
        source,
    })
}

/// Encode one server message as a text frame.
///
/// # Errors
///
/// Returns the serializer error if a record holds a non-finite float or
/// otherwise cannot be represented as JSON.
pub fn encode(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Run a decoded message against the engine.
///
/// Recoverable failures become a single `rejected` message and the
/// session carries on.
///
/// # Errors
///
/// Returns the [`SessionError`] when it is fatal; the caller must send
/// an `error` message and close the connection.
pub fn apply<M: Model>(
    engine: &mut SessionEngine<M>,
    message: ClientMessage,
) -> Result<Vec<ServerMessage>, SessionError> {
    let kind = message.kind();
    let result = match message {
        ClientMessage::Reset => engine.reset(),
        ClientMessage::Step(request) => engine.step_to(request.step),
        ClientMessage::GetState(request) => engine.get_state(request.step),
        ClientMessage::SubmitParams(submit) => {
            engine.submit_param(submit.model, &submit.param, submit.value)
        }
        ClientMessage::CallMethod(event) => engine.dispatch(event.model_id, Hook::Click, &event.data),
        ClientMessage::KeyPress(event) => engine.dispatch(event.model_id, Hook::Key, &event.data),
    };

    match result {
        Ok(out) => Ok(out),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(request = kind, error = %e, "Request rejected");
            Ok(vec![ServerMessage::Rejected {
                request: kind.to_owned(),
                reason: e.to_string(),
            }])
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;
    use serde_json::json;
    use simscope_types::{ParameterSpec, PointEvent, StepRequest, SubmitParams};

    use super::*;
    use crate::config::SessionConfig;
    use crate::model::{ModelError, Observation, ParamMap, decode_params};
    use crate::params::ParameterRegistry;

    #[test]
    fn reset_decodes_with_or_without_data() {
        assert_eq!(
            decode(r#"{"type": "reset"}"#).unwrap(),
            Some(ClientMessage::Reset)
        );
        assert_eq!(
            decode(r#"{"type": "reset", "data": {}}"#).unwrap(),
            Some(ClientMessage::Reset)
        );
    }

    #[test]
    fn payloads_decode_by_tag() {
        assert_eq!(
            decode(r#"{"type": "step", "data": {"step": -2}}"#).unwrap(),
            Some(ClientMessage::Step(StepRequest { step: -2 }))
        );
        assert_eq!(
            decode(r#"{"type": "submit_params", "data": {"model": 1, "param": "density", "value": 0.4}}"#)
                .unwrap(),
            Some(ClientMessage::SubmitParams(SubmitParams {
                model: 1,
                param: String::from("density"),
                value: json!(0.4),
            }))
        );
        assert_eq!(
            decode(r#"{"type": "key_press", "data": {"model_id": 0, "data": {"key": "ArrowUp"}}}"#)
                .unwrap(),
            Some(ClientMessage::KeyPress(PointEvent {
                model_id: 0,
                data: json!({"key": "ArrowUp"}),
            }))
        );
    }

    #[test]
    fn encoded_client_messages_decode_back() {
        let message = ClientMessage::CallMethod(PointEvent {
            model_id: 2,
            data: json!({"x": 3, "y": 4}),
        });
        let text = serde_json::to_string(&message).unwrap();
        assert_eq!(decode(&text).unwrap(), Some(message));
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert_eq!(decode(r#"{"type": "teleport", "data": 5}"#).unwrap(), None);
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json { .. })));
        assert!(matches!(decode(r#"{"data": {}}"#), Err(DecodeError::Json { .. })));
        let err = decode(r#"{"type": "step", "data": {"step": "three"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Payload { ref kind, .. } if kind == "step"));
        assert!(matches!(
            decode(r#"{"type": "get_state"}"#),
            Err(DecodeError::Payload { .. })
        ));
    }

    #[test]
    fn encode_produces_flat_records() {
        let text = encode(&ServerMessage::End).unwrap();
        assert_eq!(text, r#"{"type":"end"}"#);
    }

    #[derive(Debug, Serialize, serde::Deserialize)]
    struct Ticker {
        ticks: u64,
    }

    impl Model for Ticker {
        fn from_params(params: &ParamMap) -> Result<Self, ModelError> {
            #[derive(serde::Deserialize)]
            struct Args {
                start: u64,
            }
            let args: Args = decode_params(params)?;
            Ok(Self { ticks: args.start })
        }

        fn step(&mut self) {
            self.ticks = self.ticks.saturating_add(1);
        }

        fn running(&self) -> bool {
            true
        }

        fn observe(&self) -> Result<Observation, ModelError> {
            let agents: [Value; 0] = [];
            Observation::new(&json!({"ticks": self.ticks}), &agents)
        }
    }

    fn engine() -> SessionEngine<Ticker> {
        let mut registry = ParameterRegistry::new(1).unwrap();
        registry
            .declare(ParameterSpec::number("start", "Start", json!(0)).with_bounds(Some(0.0), Some(10.0)))
            .unwrap();
        SessionEngine::new(registry, &SessionConfig::default())
    }

    #[test]
    fn validation_failures_become_rejections() {
        let mut engine = engine();
        let out = apply(&mut engine, ClientMessage::Step(StepRequest { step: 1 })).unwrap();
        assert!(matches!(
            out.as_slice(),
            [ServerMessage::Rejected { request, .. }] if request == "step"
        ));

        apply(&mut engine, ClientMessage::Reset).unwrap();
        let out = apply(
            &mut engine,
            ClientMessage::SubmitParams(SubmitParams {
                model: 0,
                param: String::from("start"),
                value: json!(99),
            }),
        )
        .unwrap();
        assert!(matches!(
            out.as_slice(),
            [ServerMessage::Rejected { request, .. }] if request == "submit_params"
        ));
    }

    #[test]
    fn successful_submit_emits_nothing() {
        let mut engine = engine();
        let out = apply(
            &mut engine,
            ClientMessage::SubmitParams(SubmitParams {
                model: 0,
                param: String::from("start"),
                value: json!(4),
            }),
        )
        .unwrap();
        assert!(out.is_empty());

        let out = apply(&mut engine, ClientMessage::Reset).unwrap();
        assert_eq!(
            out.last(),
            Some(&ServerMessage::ModelState {
                data: vec![json!({"ticks": 4, "agents": []})],
                step: 0,
            })
        );
    }

    #[test]
    fn events_route_to_the_dispatcher() {
        let mut engine = engine();
        apply(&mut engine, ClientMessage::Reset).unwrap();
        apply(&mut engine, ClientMessage::Step(StepRequest { step: 2 })).unwrap();
        let out = apply(
            &mut engine,
            ClientMessage::CallMethod(PointEvent {
                model_id: 0,
                data: json!({"x": 1}),
            }),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![ServerMessage::ModelState {
                data: vec![json!({"ticks": 2, "agents": []})],
                step: 2,
            }]
        );
    }
}
