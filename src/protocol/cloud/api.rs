// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud REST API.
//!
//! Every reply is wrapped in `{ "error": <code>, "msg": <text>, "data": ... }`;
//! a non-zero code is turned into [`ProtocolError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{AuthInfo, DEFAULT_APP_ID, TokenGrant};
use crate::device::Device;
use crate::error::{ParseError, ProtocolError, Result};

use super::frame::nonce;

/// A family (home) of the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    /// Family id, used as the `family` setting.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl Family {
    /// Creates a family.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            other: Map::new(),
        }
    }
}

/// Cloud REST operations the bridge uses.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Exchanges the refresh token for new tokens.
    async fn refresh_token(&self, auth: &AuthInfo) -> Result<TokenGrant>;

    /// Lists the families of the account.
    async fn families(&self, auth: &AuthInfo) -> Result<Vec<Family>>;

    /// Lists the devices of a family, or of the current family when `None`.
    async fn list_devices(&self, auth: &AuthInfo, family: Option<&str>) -> Result<Vec<Device>>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    error: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T> {
        if self.error != 0 {
            return Err(ProtocolError::Api {
                code: self.error,
                message: self.msg,
            }
            .into());
        }
        self.data
            .ok_or_else(|| ParseError::MissingField("data".to_string()).into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FamilyPage {
    #[serde(default)]
    family_list: Vec<Family>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThingPage {
    #[serde(default)]
    thing_list: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thing {
    #[serde(default)]
    item_data: Value,
}

/// [`CloudApi`] over the public HTTPS API.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::protocol::CoolkitApi;
///
/// let api = CoolkitApi::new().unwrap();
/// assert_eq!(api.base_url("eu"), "https://eu-apia.coolkit.cc");
/// assert_eq!(api.base_url("cn"), "https://cn-apia.coolkit.cn");
/// ```
#[derive(Debug, Clone)]
pub struct CoolkitApi {
    client: Client,
    app_id: String,
    base_url: Option<String>,
}

impl CoolkitApi {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a client with the default application id.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(ProtocolError::Http)?;
        Ok(Self {
            client,
            app_id: DEFAULT_APP_ID.to_string(),
            base_url: None,
        })
    }

    /// Sets the application id.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Sends every request to `base_url` regardless of region.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Returns the API root for a region.
    #[must_use]
    pub fn base_url(&self, region: &str) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        let tld = if region == "cn" { "cn" } else { "cc" };
        format!("https://{region}-apia.coolkit.{tld}")
    }

    fn authorized(&self, builder: RequestBuilder, auth: &AuthInfo) -> RequestBuilder {
        builder
            .header("X-CK-Appid", &self.app_id)
            .header("X-CK-Nonce", nonce())
            .bearer_auth(&auth.access_token)
    }

    async fn read<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(ProtocolError::Http)?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ParseError::UnexpectedFormat(e.to_string()))?;
        envelope.into_data()
    }
}

#[async_trait]
impl CloudApi for CoolkitApi {
    async fn refresh_token(&self, auth: &AuthInfo) -> Result<TokenGrant> {
        let url = format!("{}/v2/user/refresh", self.base_url(&auth.region));
        tracing::debug!(url = %url, "Refreshing access token");
        let request = self
            .authorized(self.client.post(&url), auth)
            .json(&serde_json::json!({ "rt": auth.refresh_token }));
        Self::read(request).await
    }

    async fn families(&self, auth: &AuthInfo) -> Result<Vec<Family>> {
        let url = format!("{}/v2/family", self.base_url(&auth.region));
        let page: FamilyPage = Self::read(self.authorized(self.client.get(&url), auth)).await?;
        tracing::debug!(count = page.family_list.len(), "Fetched families");
        Ok(page.family_list)
    }

    async fn list_devices(&self, auth: &AuthInfo, family: Option<&str>) -> Result<Vec<Device>> {
        let url = format!("{}/v2/device/thing", self.base_url(&auth.region));
        let mut query = vec![("num", "0")];
        if let Some(family) = family {
            query.push(("familyid", family));
        }
        let request = self.authorized(self.client.get(&url).query(&query), auth);
        let page: ThingPage = Self::read(request).await?;

        let devices: Vec<Device> = page
            .thing_list
            .into_iter()
            .filter(|thing| thing.item_data.get("deviceid").is_some())
            .filter_map(|thing| match serde_json::from_value::<Device>(thing.item_data) {
                Ok(device) => Some(device),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable device listing entry");
                    None
                }
            })
            .collect();
        tracing::info!(count = devices.len(), "Fetched device listing");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::Error;

    #[test]
    fn envelope_error_code() {
        let envelope: Envelope<Value> =
            serde_json::from_value(json!({ "error": 401, "msg": "token invalid" })).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::Api { code: 401, ref message }) if message == "token invalid"
        ));
    }

    #[test]
    fn envelope_without_data() {
        let envelope: Envelope<Value> = serde_json::from_value(json!({ "error": 0 })).unwrap();
        assert!(matches!(
            envelope.into_data(),
            Err(Error::Parse(ParseError::MissingField(_)))
        ));
    }

    #[test]
    fn base_url_override() {
        let api = CoolkitApi::new().unwrap().with_base_url("http://127.0.0.1:9000/");
        assert_eq!(api.base_url("eu"), "http://127.0.0.1:9000");
    }
}
