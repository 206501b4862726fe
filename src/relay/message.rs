//! Relay protocol frames (NIP-01).

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::filter::Filter;

/// Client to relay
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(Event),
    /// `["REQ", <subscription id>, <filter>...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription id>]`
    Close(String),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = vec![json!("REQ"), json!(subscription_id)];
                for filter in filters {
                    frame.push(serde_json::to_value(filter)?);
                }
                Value::Array(frame)
            }
            ClientMessage::Close(subscription_id) => json!(["CLOSE", subscription_id]),
        };
        Ok(serde_json::to_string(&value)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let frame = as_frame(&value)?;

        match frame_type(frame)? {
            "EVENT" => {
                let event = frame
                    .get(1)
                    .ok_or_else(|| Error::Protocol("EVENT requires an event".into()))?;
                Ok(ClientMessage::Event(serde_json::from_value(event.clone())?))
            }
            "REQ" => {
                let subscription_id = string_at(frame, 1, "REQ subscription id")?;
                let filters = frame[2..]
                    .iter()
                    .map(|f| serde_json::from_value(f.clone()))
                    .collect::<std::result::Result<Vec<Filter>, _>>()?;
                Ok(ClientMessage::Req {
                    subscription_id,
                    filters,
                })
            }
            "CLOSE" => Ok(ClientMessage::Close(string_at(
                frame,
                1,
                "CLOSE subscription id",
            )?)),
            other => Err(Error::Protocol(format!("unknown client message: {}", other))),
        }
    }
}

/// Relay to client
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription id>, <event>]`
    Event {
        subscription_id: String,
        event: Box<Event>,
    },
    /// `["OK", <event id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["EOSE", <subscription id>]`
    EndOfStoredEvents(String),
    /// `["CLOSED", <subscription id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice(String),
}

impl RelayMessage {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::EndOfStoredEvents(subscription_id) => json!(["EOSE", subscription_id]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            RelayMessage::Notice(message) => json!(["NOTICE", message]),
        };
        Ok(serde_json::to_string(&value)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let frame = as_frame(&value)?;

        match frame_type(frame)? {
            "EVENT" => {
                let subscription_id = string_at(frame, 1, "EVENT subscription id")?;
                let event = frame
                    .get(2)
                    .ok_or_else(|| Error::Protocol("EVENT requires an event".into()))?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event: Box::new(serde_json::from_value(event.clone())?),
                })
            }
            "OK" => {
                let event_id = string_at(frame, 1, "OK event id")?;
                let accepted = frame
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| Error::Protocol("OK accepted field must be a boolean".into()))?;
                // Some relays omit the message
                let message = frame
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "EOSE" => Ok(RelayMessage::EndOfStoredEvents(string_at(
                frame,
                1,
                "EOSE subscription id",
            )?)),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: string_at(frame, 1, "CLOSED subscription id")?,
                message: frame
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice(string_at(frame, 1, "NOTICE message")?)),
            other => Err(Error::Protocol(format!("unknown relay message: {}", other))),
        }
    }
}

fn as_frame(value: &Value) -> Result<&[Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .filter(|frame| !frame.is_empty())
        .ok_or_else(|| Error::Protocol("message must be a non-empty array".into()))
}

fn frame_type(frame: &[Value]) -> Result<&str> {
    frame[0]
        .as_str()
        .ok_or_else(|| Error::Protocol("message type must be a string".into()))
}

fn string_at(frame: &[Value], index: usize, what: &str) -> Result<String> {
    frame
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("{} must be a string", what)))
}
