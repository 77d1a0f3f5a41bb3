//! Packet model and text codec for the Socket.IO websocket transport.
//!
//! The assistant service speaks Socket.IO v5 layered over Engine.IO v4. Over
//! a websocket every Engine.IO packet travels as one text message: a single
//! type digit followed by an optional payload. Engine.IO `message` packets
//! carry a Socket.IO packet (type digit, optional namespace, optional ack id,
//! JSON payload). This crate flattens both layers into one [`Packet`] enum
//! since the client only ever needs the combined view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used when a packet carries no explicit `/name,` prefix.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Error returned by [`decode_packet`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The websocket message was empty.
    #[error("empty packet")]
    Empty,
    /// The leading Engine.IO type digit is not recognised.
    #[error("unknown engine.io packet type: {0:?}")]
    UnknownEngineType(char),
    /// The Socket.IO type digit is missing or not recognised.
    #[error("unknown socket.io packet type: {0:?}")]
    UnknownSocketType(Option<char>),
    /// The packet type is valid but this client does not handle it.
    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),
    /// The JSON payload could not be parsed.
    #[error("invalid packet payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The ack id digits overflow `u64`.
    #[error("invalid ack id: {0}")]
    InvalidAckId(String),
    /// An ACK packet arrived without an ack id.
    #[error("ack packet is missing its id")]
    MissingAckId,
    /// An EVENT payload is not an array headed by the event name.
    #[error("event payload must be an array starting with the event name")]
    InvalidEvent,
    /// A CONNECT_ERROR payload carries no readable message.
    #[error("connect error payload has no message")]
    InvalidConnectError,
}

/// Payload of the Engine.IO OPEN packet sent by the server right after the
/// websocket upgrade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id assigned by the server.
    pub sid: String,
    /// Transports the server offers to upgrade to. Empty over websocket.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong before dropping us.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// One decoded message on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Engine.IO OPEN with the server handshake.
    Open(Handshake),
    /// Engine.IO CLOSE.
    Close,
    /// Engine.IO PING. Sent by the server; the client must answer with [`Packet::Pong`].
    Ping,
    /// Engine.IO PONG.
    Pong,
    /// Engine.IO NOOP.
    Noop,
    /// Socket.IO CONNECT. Sent by the client to join a namespace and echoed
    /// back by the server (with its socket id in `data`) as the ack.
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    /// Socket.IO DISCONNECT.
    Disconnect { namespace: String },
    /// Socket.IO EVENT: a named event with JSON arguments.
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    /// Socket.IO ACK answering an event that carried an ack id.
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    /// Socket.IO CONNECT_ERROR: the server refused the namespace connection.
    ConnectError { namespace: String, message: String },
}

impl Packet {
    /// CONNECT for the default namespace without auth payload.
    #[must_use]
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            data: None,
        }
    }

    /// DISCONNECT for the default namespace.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }

    /// Fire-and-forget EVENT on the default namespace with a single argument.
    #[must_use]
    pub fn event(name: &str, arg: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            ack_id: None,
            name: name.to_owned(),
            args: vec![arg],
        }
    }
}

// Engine.IO packet type digits.
const ENGINE_OPEN: char = '0';
const ENGINE_CLOSE: char = '1';
const ENGINE_PING: char = '2';
const ENGINE_PONG: char = '3';
const ENGINE_MESSAGE: char = '4';
const ENGINE_UPGRADE: char = '5';
const ENGINE_NOOP: char = '6';

// Socket.IO packet type digits.
const SOCKET_CONNECT: char = '0';
const SOCKET_DISCONNECT: char = '1';
const SOCKET_EVENT: char = '2';
const SOCKET_ACK: char = '3';
const SOCKET_CONNECT_ERROR: char = '4';
const SOCKET_BINARY_EVENT: char = '5';
const SOCKET_BINARY_ACK: char = '6';

/// Encode a packet into the text form sent as one websocket message.
#[must_use]
pub fn encode_packet(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => {
            let json = serde_json::to_value(handshake).unwrap_or(Value::Null);
            format!("{ENGINE_OPEN}{json}")
        }
        Packet::Close => ENGINE_CLOSE.to_string(),
        Packet::Ping => ENGINE_PING.to_string(),
        Packet::Pong => ENGINE_PONG.to_string(),
        Packet::Noop => ENGINE_NOOP.to_string(),
        Packet::Connect { namespace, data } => {
            let mut out = socket_prefix(SOCKET_CONNECT, namespace);
            if let Some(data) = data {
                out.push_str(&data.to_string());
            }
            out
        }
        Packet::Disconnect { namespace } => socket_prefix(SOCKET_DISCONNECT, namespace),
        Packet::Event {
            namespace,
            ack_id,
            name,
            args,
        } => {
            let mut out = socket_prefix(SOCKET_EVENT, namespace);
            if let Some(id) = ack_id {
                out.push_str(&id.to_string());
            }
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            out.push_str(&Value::Array(items).to_string());
            out
        }
        Packet::Ack {
            namespace,
            ack_id,
            args,
        } => {
            let mut out = socket_prefix(SOCKET_ACK, namespace);
            out.push_str(&ack_id.to_string());
            out.push_str(&Value::Array(args.clone()).to_string());
            out
        }
        Packet::ConnectError { namespace, message } => {
            let mut out = socket_prefix(SOCKET_CONNECT_ERROR, namespace);
            out.push_str(&serde_json::json!({ "message": message }).to_string());
            out
        }
    }
}

/// Decode one websocket text message into a packet.
///
/// # Errors
///
/// Returns [`CodecError`] for empty input, unknown or unsupported packet
/// types, malformed JSON payloads, and payloads that do not fit the packet
/// type (e.g. an EVENT that is not an array).
pub fn decode_packet(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        ENGINE_OPEN => Ok(Packet::Open(serde_json::from_str(rest)?)),
        ENGINE_CLOSE => Ok(Packet::Close),
        // Probe payloads ("2probe") only appear during transport upgrades.
        ENGINE_PING => Ok(Packet::Ping),
        ENGINE_PONG => Ok(Packet::Pong),
        ENGINE_MESSAGE => decode_socket_packet(rest),
        ENGINE_UPGRADE => Err(CodecError::Unsupported("engine.io upgrade")),
        ENGINE_NOOP => Ok(Packet::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

fn socket_prefix(kind: char, namespace: &str) -> String {
    let mut out = String::with_capacity(namespace.len() + 3);
    out.push(ENGINE_MESSAGE);
    out.push(kind);
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        out.push(',');
    }
    out
}

fn decode_socket_packet(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next();
    let rest = chars.as_str();

    if matches!(kind, Some(SOCKET_BINARY_EVENT | SOCKET_BINARY_ACK)) {
        return Err(CodecError::Unsupported("socket.io binary packet"));
    }

    let (namespace, rest) = split_namespace(rest);
    let (ack_id, rest) = split_ack_id(rest)?;
    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest)?)
    };

    match kind {
        Some(SOCKET_CONNECT) => Ok(Packet::Connect { namespace, data }),
        Some(SOCKET_DISCONNECT) => Ok(Packet::Disconnect { namespace }),
        Some(SOCKET_EVENT) => {
            let Some(Value::Array(mut items)) = data else {
                return Err(CodecError::InvalidEvent);
            };
            if items.is_empty() {
                return Err(CodecError::InvalidEvent);
            }
            let Value::String(name) = items.remove(0) else {
                return Err(CodecError::InvalidEvent);
            };
            Ok(Packet::Event {
                namespace,
                ack_id,
                name,
                args: items,
            })
        }
        Some(SOCKET_ACK) => {
            let ack_id = ack_id.ok_or(CodecError::MissingAckId)?;
            let args = match data {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok(Packet::Ack {
                namespace,
                ack_id,
                args,
            })
        }
        Some(SOCKET_CONNECT_ERROR) => {
            // v5 servers send `{"message": ...}`; v4 servers sent a bare string.
            let message = match data {
                Some(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
                Some(Value::String(message)) => Some(message),
                _ => None,
            }
            .ok_or(CodecError::InvalidConnectError)?;
            Ok(Packet::ConnectError { namespace, message })
        }
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

fn split_namespace(text: &str) -> (String, &str) {
    if !text.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_owned(), text);
    }
    match text.split_once(',') {
        Some((namespace, rest)) => (namespace.to_owned(), rest),
        None => (text.to_owned(), ""),
    }
}

fn split_ack_id(text: &str) -> Result<(Option<u64>, &str), CodecError> {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, text));
    }
    let (id, rest) = text.split_at(digits);
    let id = id
        .parse::<u64>()
        .map_err(|_| CodecError::InvalidAckId(id.to_owned()))?;
    Ok((Some(id), rest))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
