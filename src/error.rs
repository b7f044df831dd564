// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! Failures are grouped by where they originate: plugin configuration,
//! network protocols (cloud REST, cloud socket, LAN unicast), payload parsing
//! and LAN payload cryptography. The top-level [`Error`] also carries the
//! command-dispatch conditions that end up in a command outcome.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The plugin configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A LAN payload could not be encrypted or decrypted.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The device is not in the registry.
    #[error("unknown device: {0}")]
    DeviceNotFound(String),

    /// The cloud socket is not connected.
    #[error("cloud connection is not established")]
    NotConnected,

    /// LAN transport was selected but no endpoint has been discovered yet.
    #[error("no LAN endpoint known for device {0}")]
    NoEndpointKnown(String),

    /// The device or the cloud rejected the command.
    #[error("command rejected: {0}")]
    CommandRejected(String),

    /// No enabled device point is published at the written path.
    #[error("no device at path {0}")]
    UnknownPath(String),

    /// The bridge has not been started, or was stopped.
    #[error("bridge is not running")]
    NotRunning,

    /// A value written by the host cannot be converted into device parameters.
    #[error("invalid value {0}")]
    InvalidValue(String),

    /// Reading or writing a cache file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in the plugin settings.
///
/// These are fatal for a start attempt: the bridge reports them once and
/// does not open any connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No authentication info was supplied.
    #[error("please enter your authentication info")]
    MissingAuthInfo,

    /// The authentication info is not valid JSON or lacks a field.
    #[error("malformed authentication info: {0}")]
    MalformedAuthInfo(String),

    /// A settings key could not be interpreted.
    #[error("invalid settings key {key}: {message}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        message: String,
    },

    /// The settings document does not have the expected shape.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Errors related to protocol communication (cloud REST, socket, LAN).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Websocket transport failed.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Connection to the remote end failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The cloud API answered with a non-zero error code.
    #[error("cloud API error {code}: {message}")]
    Api {
        /// Vendor error code.
        code: i64,
        /// Vendor message.
        message: String,
    },

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to parsing frames, advertisements and listings.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Unexpected payload format.
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),
}

/// Errors in LAN payload encryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Base64 decoding of payload or IV failed.
    #[error("invalid base64: {0}")]
    Base64(String),

    /// The IV does not have the cipher block size.
    #[error("invalid IV length {0}, expected 16")]
    InvalidIv(usize),

    /// Padding check failed after decryption, usually a wrong key.
    #[error("decryption failed")]
    Decrypt,

    /// The decrypted bytes are not UTF-8 JSON.
    #[error("decrypted payload is not valid JSON: {0}")]
    Payload(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidKey {
            key: "Channel x".to_string(),
            message: "outlet is not a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid settings key Channel x: outlet is not a number"
        );
    }

    #[test]
    fn error_from_config_error() {
        let err: Error = ConfigError::MissingAuthInfo.into();
        assert!(matches!(err, Error::Config(ConfigError::MissingAuthInfo)));
    }

    #[test]
    fn api_error_display() {
        let err = ProtocolError::Api {
            code: 401,
            message: "token expired".to_string(),
        };
        assert_eq!(err.to_string(), "cloud API error 401: token expired");
    }

    #[test]
    fn no_endpoint_display() {
        let err = Error::NoEndpointKnown("1000abcd".to_string());
        assert_eq!(err.to_string(), "no LAN endpoint known for device 1000abcd");
    }
}
