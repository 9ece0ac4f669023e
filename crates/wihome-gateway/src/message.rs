// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device-bus message model.
//!
//! Every datagram on the WiHome bus is a flat JSON object. The gateway only
//! looks at two keys: `cmd` (routing) and `client` (device identity). All
//! other keys are opaque payload passed through unchanged.
//!
//! ```text
//! {"cmd":"findhub","client":"wihomeDEV2"}
//! {"cmd":"set","client":"wihomeDEV2","parameter":"relay","channel":0,"value":1}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key carrying the command name.
pub const CMD_KEY: &str = "cmd";

/// Key carrying the device client identifier.
pub const CLIENT_KEY: &str = "client";

/// Device broadcast looking for the gateway.
pub const CMD_FINDHUB: &str = "findhub";
/// Gateway reply to `findhub`.
pub const CMD_HUBID: &str = "hubid";
/// Unsolicited device identification.
pub const CMD_CLIENTID: &str = "clientid";
/// Gateway broadcast looking for a device.
pub const CMD_FINDCLIENT: &str = "findclient";

/// Routing tag derived from the `cmd` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `findhub`: device asks where the gateway is.
    FindHub,
    /// `hubid`: gateway answer to `findhub`.
    HubId,
    /// `clientid`: device announces itself.
    ClientId,
    /// `findclient`: gateway discovery broadcast.
    FindClient,
    /// Any other command; forwarded to subscribers untouched.
    Application(String),
    /// No `cmd`, or `cmd` is not a string.
    Missing,
}

impl Command {
    /// Classify a raw `cmd` value.
    pub fn parse(cmd: &str) -> Self {
        match cmd {
            CMD_FINDHUB => Self::FindHub,
            CMD_HUBID => Self::HubId,
            CMD_CLIENTID => Self::ClientId,
            CMD_FINDCLIENT => Self::FindClient,
            other => Self::Application(other.to_string()),
        }
    }
}

/// A schema-less device-bus message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create a message with only a `cmd` field.
    pub fn with_cmd(cmd: &str) -> Self {
        let mut msg = Self::new();
        msg.set_cmd(cmd);
        msg
    }

    /// Build the gateway's `findclient` discovery broadcast for `client`.
    pub fn findclient(client: &str) -> Self {
        let mut msg = Self::with_cmd(CMD_FINDCLIENT);
        msg.insert(CLIENT_KEY, client);
        msg
    }

    /// Raw `cmd` value, if it is a string.
    pub fn cmd(&self) -> Option<&str> {
        self.0.get(CMD_KEY).and_then(Value::as_str)
    }

    /// Routing tag for this message.
    pub fn command(&self) -> Command {
        self.cmd().map(Command::parse).unwrap_or(Command::Missing)
    }

    /// Replace the `cmd` field.
    pub fn set_cmd(&mut self, cmd: &str) {
        self.0.insert(CMD_KEY.to_string(), Value::from(cmd));
    }

    /// Device identifier, if present as a non-empty string.
    pub fn client(&self) -> Option<&str> {
        self.0
            .get(CLIENT_KEY)
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }

    /// Look up an arbitrary field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.to_string(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as compact UTF-8 JSON (wire format).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }

    /// Decode a datagram payload. Anything but a JSON object is rejected.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MessageError> {
        match serde_json::from_slice::<Value>(data) {
            Ok(value) => Self::try_from(value),
            Err(e) => Err(MessageError::Json(e.to_string())),
        }
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Message {
    type Error = MessageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(MessageError::NotAnObject(json_kind(&other))),
        }
    }
}

impl From<Message> for Value {
    fn from(msg: Message) -> Self {
        Value::Object(msg.0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Message decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(value: Value) -> Message {
        Message::try_from(value).unwrap()
    }

    #[test]
    fn test_command_classification() {
        assert_eq!(msg(json!({"cmd": "findhub"})).command(), Command::FindHub);
        assert_eq!(msg(json!({"cmd": "hubid"})).command(), Command::HubId);
        assert_eq!(msg(json!({"cmd": "clientid"})).command(), Command::ClientId);
        assert_eq!(
            msg(json!({"cmd": "findclient"})).command(),
            Command::FindClient
        );
        assert_eq!(
            msg(json!({"cmd": "info"})).command(),
            Command::Application("info".into())
        );
        assert_eq!(msg(json!({"value": 1})).command(), Command::Missing);
        assert_eq!(msg(json!({"cmd": 7})).command(), Command::Missing);
    }

    #[test]
    fn test_client_requires_non_empty_string() {
        assert_eq!(msg(json!({"client": "dev1"})).client(), Some("dev1"));
        assert_eq!(msg(json!({"client": ""})).client(), None);
        assert_eq!(msg(json!({"client": 3})).client(), None);
        assert_eq!(msg(json!({"cmd": "set"})).client(), None);
    }

    #[test]
    fn test_set_cmd_keeps_other_fields() {
        let mut m = msg(json!({"cmd": "findhub", "client": "dev1", "ver": 2}));
        m.set_cmd(CMD_HUBID);
        assert_eq!(
            Value::from(m),
            json!({"cmd": "hubid", "client": "dev1", "ver": 2})
        );
    }

    #[test]
    fn test_findclient_shape() {
        assert_eq!(
            Value::from(Message::findclient("wihomeDEV2")),
            json!({"cmd": "findclient", "client": "wihomeDEV2"})
        );
    }

    #[test]
    fn test_from_bytes_rejects_non_objects() {
        assert!(matches!(
            Message::from_bytes(b"[1,2,3]"),
            Err(MessageError::NotAnObject("array"))
        ));
        assert!(matches!(
            Message::from_bytes(b"{not json"),
            Err(MessageError::Json(_))
        ));
        assert!(matches!(
            Message::from_bytes(&[0xff, 0xfe]),
            Err(MessageError::Json(_))
        ));
        assert_eq!(
            MessageError::NotAnObject("array").to_string(),
            "Expected a JSON object, got array"
        );
    }

    #[test]
    fn test_wire_encoding_is_compact_json() {
        let m = msg(json!({"cmd": "set", "client": "dev1", "value": 1}));
        let bytes = m.to_bytes().unwrap();
        assert_eq!(Message::from_bytes(&bytes).unwrap(), m);
        assert!(!bytes.contains(&b'\n'));
    }
}
