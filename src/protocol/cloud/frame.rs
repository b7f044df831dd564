// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud socket frames.
//!
//! Outbound frames are JSON objects carrying a sequence id (epoch
//! milliseconds, strictly increasing per process) and an 8-character nonce.
//! Inbound text is either the keepalive answer `pong` or a JSON object that
//! is a state push or a command acknowledgement.

use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Keepalive request text.
pub const PING: &str = "ping";

/// Keepalive answer text.
pub const PONG: &str = "pong";

/// Generates an 8-character alphanumeric nonce.
#[must_use]
pub fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Source of sequence ids: current epoch milliseconds, bumped when two ids
/// are requested within the same millisecond.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: AtomicI64,
}

impl SequenceGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence id.
    pub fn next(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp_millis()).to_string()
    }

    fn next_at(&self, now_ms: i64) -> i64 {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// A command frame sent to the cloud socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFrame {
    /// `update` or `query`.
    pub action: String,
    /// Account API key.
    pub apikey: String,
    /// Account API key, repeated.
    pub self_apikey: String,
    /// Target device id.
    pub deviceid: String,
    /// Parameters to write (`update`) or keys to read (`query`).
    pub params: Value,
    /// Always `app`.
    pub user_agent: String,
    /// Sequence id the acknowledgement refers to.
    pub sequence: String,
    /// Random nonce.
    pub nonce: String,
}

impl CommandFrame {
    /// Builds an `update` frame.
    #[must_use]
    pub fn update(
        apikey: &str,
        device_id: &str,
        params: Map<String, Value>,
        sequence: String,
    ) -> Self {
        Self {
            action: "update".to_string(),
            apikey: apikey.to_string(),
            self_apikey: apikey.to_string(),
            deviceid: device_id.to_string(),
            params: Value::Object(params),
            user_agent: "app".to_string(),
            sequence,
            nonce: nonce(),
        }
    }

    /// Builds a `query` frame asking for the keys this frame wrote.
    #[must_use]
    pub fn to_query(&self, sequence: String) -> Self {
        let keys = self
            .params
            .as_object()
            .map(|params| params.keys().cloned().map(Value::String).collect())
            .unwrap_or_default();
        Self {
            action: "query".to_string(),
            params: Value::Array(keys),
            sequence,
            nonce: nonce(),
            ..self.clone()
        }
    }

    /// Returns true if the frame writes only the power state.
    #[must_use]
    pub fn is_power_only(&self) -> bool {
        self.params.as_object().is_some_and(|params| {
            !params.is_empty() && params.keys().all(|k| k == "switch" || k == "switches")
        })
    }

    /// Serializes the frame.
    #[must_use]
    pub fn to_text(&self) -> String {
        // Strings and JSON values only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The handshake frame announcing the client after the socket opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOnlineFrame {
    action: &'static str,
    at: String,
    apikey: String,
    appid: String,
    nonce: String,
    sequence: String,
    ts: i64,
    user_agent: &'static str,
    version: u8,
}

impl UserOnlineFrame {
    /// Builds the handshake frame.
    #[must_use]
    pub fn new(access_token: &str, apikey: &str, app_id: &str, sequence: String) -> Self {
        Self {
            action: "userOnline",
            at: access_token.to_string(),
            apikey: apikey.to_string(),
            appid: app_id.to_string(),
            nonce: nonce(),
            sequence,
            ts: chrono::Utc::now().timestamp(),
            user_agent: "app",
            version: 8,
        }
    }

    /// Serializes the frame.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    action: Option<String>,
    deviceid: Option<String>,
    params: Option<Value>,
    sequence: Option<Value>,
    error: Option<i64>,
    reason: Option<String>,
}

/// A message received from the cloud socket.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudMessage {
    /// Keepalive answer.
    Pong,
    /// State fragment pushed for a device.
    State {
        /// Device id.
        device_id: String,
        /// Fragment to merge.
        params: Map<String, Value>,
    },
    /// Acknowledgement of a command.
    Ack {
        /// Sequence id of the command.
        sequence: String,
        /// 0 on success.
        error: i64,
        /// Failure description, if any.
        reason: Option<String>,
    },
    /// Anything else (handshake replies, unrelated notifications).
    Other,
}

impl CloudMessage {
    /// Classifies inbound text.
    ///
    /// A frame is a state push if its action is `update`, or if it reports
    /// success and carries a device id and a parameter object. Otherwise it
    /// is an acknowledgement if it carries an error code and a sequence id.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the text is neither `pong` nor JSON.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text == PONG {
            return Ok(Self::Pong);
        }

        let raw: RawInbound = serde_json::from_str(text)?;
        let params = match raw.params {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };

        let is_push = raw.action.as_deref() == Some("update")
            || (raw.error == Some(0) && raw.deviceid.is_some() && params.is_some());
        if is_push {
            return match (raw.deviceid, params) {
                (Some(device_id), Some(params)) => Ok(Self::State { device_id, params }),
                _ => Err(ParseError::MissingField("deviceid/params".to_string())),
            };
        }

        match (raw.error, raw.sequence) {
            (Some(error), Some(sequence)) => Ok(Self::Ack {
                sequence: sequence_text(&sequence),
                error,
                reason: raw.reason,
            }),
            _ => Ok(Self::Other),
        }
    }
}

fn sequence_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nonce_shape() {
        let n = nonce();
        assert_eq!(n.len(), 8);
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn sequences_strictly_increase() {
        let generator = SequenceGenerator::new();
        assert_eq!(generator.next_at(1_000), 1_000);
        assert_eq!(generator.next_at(1_000), 1_001);
        assert_eq!(generator.next_at(999), 1_002);
        assert_eq!(generator.next_at(5_000), 5_000);

        let a: i64 = generator.next().parse().unwrap();
        let b: i64 = generator.next().parse().unwrap();
        assert!(b > a);
    }

    #[test]
    fn update_frame_shape() {
        let params = json!({ "switch": "on" }).as_object().cloned().unwrap();
        let frame = CommandFrame::update("user-key", "1000sw", params, "1700000000000".to_string());
        let value: Value = serde_json::from_str(&frame.to_text()).unwrap();

        assert_eq!(value["action"], "update");
        assert_eq!(value["apikey"], "user-key");
        assert_eq!(value["selfApikey"], "user-key");
        assert_eq!(value["deviceid"], "1000sw");
        assert_eq!(value["userAgent"], "app");
        assert_eq!(value["sequence"], "1700000000000");
        assert_eq!(value["params"], json!({ "switch": "on" }));
        assert!(frame.is_power_only());
    }

    #[test]
    fn query_frame_lists_written_keys() {
        let params = json!({ "colorR": 1, "colorG": 2 }).as_object().cloned().unwrap();
        let frame = CommandFrame::update("k", "l", params, "1".to_string());
        assert!(!frame.is_power_only());

        let query = frame.to_query("2".to_string());
        assert_eq!(query.action, "query");
        assert_eq!(query.sequence, "2");
        assert_eq!(query.params, json!(["colorG", "colorR"]));
        assert_eq!(query.deviceid, "l");
    }

    #[test]
    fn handshake_frame_shape() {
        let frame = UserOnlineFrame::new("token", "user-key", "app-id", "42".to_string());
        let value: Value = serde_json::from_str(&frame.to_text()).unwrap();
        assert_eq!(value["action"], "userOnline");
        assert_eq!(value["at"], "token");
        assert_eq!(value["appid"], "app-id");
        assert_eq!(value["userAgent"], "app");
        assert_eq!(value["version"], 8);
    }

    #[test]
    fn parse_pong() {
        assert_eq!(CloudMessage::parse("pong").unwrap(), CloudMessage::Pong);
    }

    #[test]
    fn parse_state_push() {
        let msg = CloudMessage::parse(
            r#"{"action":"update","deviceid":"1000sw","apikey":"k","params":{"switch":"off"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, CloudMessage::State { ref device_id, ref params }
            if device_id == "1000sw" && params["switch"] == "off"));
    }

    #[test]
    fn query_reply_is_a_state_push() {
        let msg = CloudMessage::parse(
            r#"{"error":0,"deviceid":"l","params":{"bright":30},"sequence":"17"}"#,
        )
        .unwrap();
        assert!(matches!(msg, CloudMessage::State { .. }));
    }

    #[test]
    fn parse_ack() {
        let msg = CloudMessage::parse(r#"{"error":0,"deviceid":"l","sequence":"17"}"#).unwrap();
        assert_eq!(
            msg,
            CloudMessage::Ack {
                sequence: "17".to_string(),
                error: 0,
                reason: None
            }
        );

        let msg =
            CloudMessage::parse(r#"{"error":504,"sequence":18,"reason":"device offline"}"#).unwrap();
        assert_eq!(
            msg,
            CloudMessage::Ack {
                sequence: "18".to_string(),
                error: 504,
                reason: Some("device offline".to_string())
            }
        );
    }

    #[test]
    fn parse_other_and_garbage() {
        assert_eq!(
            CloudMessage::parse(r#"{"error":0,"apikey":"k","config":{"hb":1}}"#).unwrap(),
            CloudMessage::Other
        );
        assert!(CloudMessage::parse("not json").is_err());
        assert!(CloudMessage::parse(r#"{"action":"update","deviceid":"x"}"#).is_err());
    }
}
