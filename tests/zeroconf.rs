// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for LAN command delivery using wiremock.

use std::sync::Arc;

use ewelink_bridge::Error;
use ewelink_bridge::device::Device;
use ewelink_bridge::protocol::{DiscoveryRecord, LanChannel, ZeroconfClient, crypto};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICE_KEY: &str = "0f4d9a3c-8e21-4b7f-a5c6-1d2e3f405162";

fn channel_for(server: &MockServer) -> LanChannel {
    let address = server.address();
    let channel = LanChannel::new(Arc::new(ZeroconfClient::new().unwrap()));
    channel.record_endpoint(&DiscoveryRecord {
        device_id: "1000sw".to_string(),
        ip: address.ip(),
        port: address.port(),
        iv: crypto::random_iv(),
        encrypted_payload: String::new(),
    });
    channel
}

fn device() -> Device {
    Device::new("1000sw", "Anchor Light", 1).with_device_key(DEVICE_KEY)
}

#[tokio::test]
async fn switch_command_is_encrypted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zeroconf/switch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "seq": 12,
            "sequence": "1",
            "error": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = json!({ "switch": "on" });
    channel_for(&server)
        .send_command(&device(), params.as_object().unwrap())
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["deviceid"], "1000sw");
    assert_eq!(body["selfApikey"], "123");
    assert_eq!(body["encrypt"], true);

    let data = body["data"].as_str().unwrap();
    let iv = body["iv"].as_str().unwrap();
    let decrypted = crypto::decrypt_params(data, DEVICE_KEY, iv).unwrap();
    assert_eq!(Value::Object(decrypted), params);
}

#[tokio::test]
async fn device_error_rejects_command() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zeroconf/switch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": 400 })))
        .mount(&server)
        .await;

    let params = json!({ "switch": "off" });
    let err = channel_for(&server)
        .send_command(&device(), params.as_object().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandRejected(_)));
}

#[tokio::test]
async fn http_error_rejects_command() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let params = json!({ "switch": "off" });
    let err = channel_for(&server)
        .send_command(&device(), params.as_object().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandRejected(_)));
}
