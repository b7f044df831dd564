// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud account credentials.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Lifetime assumed for an access token when the refresh reply has no expiry.
pub const DEFAULT_ACCESS_TTL_MS: i64 = 29 * 24 * 60 * 60 * 1000;

/// Lifetime assumed for a refresh token when the refresh reply has no expiry.
pub const DEFAULT_REFRESH_TTL_MS: i64 = 59 * 24 * 60 * 60 * 1000;

/// Credentials pasted by the user into the `authInfo` setting.
///
/// Unknown fields are kept so that rewriting the setting after a token
/// refresh does not lose anything the user supplied.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::config::AuthInfo;
///
/// let auth = AuthInfo::parse(
///     r#"{"region":"eu","accessToken":"at","refreshToken":"rt","atExpiredTime":100}"#,
/// )
/// .unwrap();
///
/// assert_eq!(auth.region, "eu");
/// assert!(auth.is_access_expired(100));
/// assert!(!auth.is_access_expired(99));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    /// Account region (`eu`, `us`, `as`, `cn`).
    pub region: String,
    /// Bearer token for REST and socket calls.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
    /// Access token expiry, epoch milliseconds. 0 when unknown.
    #[serde(default)]
    pub at_expired_time: i64,
    /// Refresh token expiry, epoch milliseconds. 0 when unknown.
    #[serde(default)]
    pub rt_expired_time: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl AuthInfo {
    /// Creates credentials with unknown expiry.
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            at_expired_time: 0,
            rt_expired_time: 0,
            extra: Map::new(),
        }
    }

    /// Parses the JSON text of the `authInfo` setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedAuthInfo`] if the text is not JSON or
    /// lacks one of the token fields.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let auth: Self = serde_json::from_str(raw.trim())
            .map_err(|e| ConfigError::MalformedAuthInfo(e.to_string()))?;
        if auth.access_token.is_empty() || auth.refresh_token.is_empty() {
            return Err(ConfigError::MalformedAuthInfo(
                "empty access or refresh token".to_string(),
            ));
        }
        Ok(auth)
    }

    /// Returns true once the access token has reached its expiry.
    #[must_use]
    pub fn is_access_expired(&self, now_ms: i64) -> bool {
        self.at_expired_time <= now_ms
    }

    /// Applies a token grant received from the refresh endpoint.
    ///
    /// Missing expiries default to 29 days (access) and 59 days (refresh)
    /// from `now_ms`.
    pub fn apply_grant(&mut self, grant: TokenGrant, now_ms: i64) {
        self.access_token = grant.at;
        self.refresh_token = grant.rt;
        self.at_expired_time = grant
            .at_expired_time
            .unwrap_or(now_ms + DEFAULT_ACCESS_TTL_MS);
        self.rt_expired_time = grant
            .rt_expired_time
            .unwrap_or(now_ms + DEFAULT_REFRESH_TTL_MS);
    }

    /// Renders the credentials the way they are stored in the setting.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        // A struct of strings, integers and a JSON map always serializes.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Tokens returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// New access token.
    pub at: String,
    /// New refresh token.
    pub rt: String,
    /// Access token expiry, epoch milliseconds.
    #[serde(default)]
    pub at_expired_time: Option<i64>,
    /// Refresh token expiry, epoch milliseconds.
    #[serde(default)]
    pub rt_expired_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_unknown_fields() {
        let auth = AuthInfo::parse(
            r#"{"region":"us","accessToken":"a","refreshToken":"r","user":{"email":"x@y"}}"#,
        )
        .unwrap();
        assert_eq!(auth.at_expired_time, 0);
        let rendered: Value = serde_json::from_str(&auth.to_json_pretty()).unwrap();
        assert_eq!(rendered["user"]["email"], "x@y");
        assert_eq!(rendered["accessToken"], "a");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            AuthInfo::parse("not json"),
            Err(ConfigError::MalformedAuthInfo(_))
        ));
        assert!(matches!(
            AuthInfo::parse(r#"{"region":"eu"}"#),
            Err(ConfigError::MalformedAuthInfo(_))
        ));
        assert!(matches!(
            AuthInfo::parse(r#"{"region":"eu","accessToken":"","refreshToken":"r"}"#),
            Err(ConfigError::MalformedAuthInfo(_))
        ));
    }

    #[test]
    fn grant_without_expiry_uses_defaults() {
        let mut auth = AuthInfo::new("eu", "old-at", "old-rt");
        auth.apply_grant(
            TokenGrant {
                at: "new-at".to_string(),
                rt: "new-rt".to_string(),
                at_expired_time: None,
                rt_expired_time: None,
            },
            1_000,
        );
        assert_eq!(auth.access_token, "new-at");
        assert_eq!(auth.refresh_token, "new-rt");
        assert_eq!(auth.at_expired_time, 1_000 + DEFAULT_ACCESS_TTL_MS);
        assert_eq!(auth.rt_expired_time, 1_000 + DEFAULT_REFRESH_TTL_MS);
    }

    #[test]
    fn grant_with_expiry() {
        let mut auth = AuthInfo::new("eu", "a", "r");
        auth.apply_grant(
            TokenGrant {
                at: "a2".to_string(),
                rt: "r2".to_string(),
                at_expired_time: Some(5),
                rt_expired_time: Some(6),
            },
            1,
        );
        assert_eq!((auth.at_expired_time, auth.rt_expired_time), (5, 6));
    }
}
