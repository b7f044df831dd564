// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud socket transport.
//!
//! A [`SocketConnector`] opens an authenticated socket and hands back a
//! [`CloudSocket`]: a pair of text channels. The socket is closed when the
//! inbound channel ends; dropping the outbound sender closes it from our side.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{ProtocolError, Result};

use super::frame::{SequenceGenerator, UserOnlineFrame};
use super::session::Session;

const CHANNEL_CAPACITY: usize = 64;

/// An open cloud socket.
#[derive(Debug)]
pub struct CloudSocket {
    /// Text frames to send.
    pub outbound: mpsc::Sender<String>,
    /// Text frames received; ends when the socket closes.
    pub inbound: mpsc::Receiver<String>,
}

impl CloudSocket {
    /// Creates a socket from its two channel ends.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens cloud sockets.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Opens and authenticates a socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be opened or the handshake is
    /// refused.
    async fn connect(&self, session: &Session) -> Result<CloudSocket>;
}

#[derive(Debug, Deserialize)]
struct DispatchReply {
    domain: String,
    port: u16,
    #[serde(default)]
    error: i64,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandshakeReply {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    reason: Option<String>,
}

/// [`SocketConnector`] over a TLS websocket.
///
/// The socket host is looked up through the region's dispatch service, then
/// `wss://<domain>:<port>/api/ws` is opened and a `userOnline` frame sent.
#[derive(Debug, Clone)]
pub struct WsConnector {
    client: Client,
    dispatch_url: Option<String>,
    handshake_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ProtocolError::Http)?;
        Ok(Self {
            client,
            dispatch_url: None,
            handshake_timeout: Duration::from_secs(10),
        })
    }

    /// Uses a fixed dispatch URL instead of the regional one.
    #[must_use]
    pub fn with_dispatch_url(mut self, url: impl Into<String>) -> Self {
        self.dispatch_url = Some(url.into());
        self
    }

    /// Returns the dispatch URL for a region.
    #[must_use]
    pub fn dispatch_url(&self, region: &str) -> String {
        if let Some(url) = &self.dispatch_url {
            return url.clone();
        }
        let tld = if region == "cn" { "cn" } else { "cc" };
        format!("https://{region}-dispa.coolkit.{tld}/dispatch/app")
    }

    async fn socket_url(&self, region: &str) -> Result<String> {
        let reply: DispatchReply = self
            .client
            .get(self.dispatch_url(region))
            .send()
            .await
            .map_err(ProtocolError::Http)?
            .json()
            .await
            .map_err(ProtocolError::Http)?;
        if reply.error != 0 {
            return Err(ProtocolError::Api {
                code: reply.error,
                message: reply.reason.unwrap_or_default(),
            }
            .into());
        }
        Ok(format!("wss://{}:{}/api/ws", reply.domain, reply.port))
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, session: &Session) -> Result<CloudSocket> {
        let url = self.socket_url(&session.region).await?;
        tracing::info!(url = %url, "Connecting to cloud socket");

        let (mut stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

        let handshake = UserOnlineFrame::new(
            &session.access_token,
            &session.apikey,
            &session.app_id,
            SequenceGenerator::new().next(),
        );
        stream
            .send(Message::text(handshake.to_text()))
            .await
            .map_err(|e| ProtocolError::WebSocket(e.to_string()))?;

        let reply = tokio::time::timeout(self.handshake_timeout, async {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => return Ok(text.as_str().to_owned()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => return Err(ProtocolError::WebSocket(e.to_string())),
                }
            }
            Err(ProtocolError::ConnectionFailed(
                "socket closed during handshake".to_string(),
            ))
        })
        .await
        .map_err(|_| {
            let millis = u64::try_from(self.handshake_timeout.as_millis()).unwrap_or(u64::MAX);
            ProtocolError::Timeout(millis)
        })??;

        let reply: HandshakeReply = serde_json::from_str(&reply)
            .map_err(|e| ProtocolError::ConnectionFailed(format!("bad handshake reply: {e}")))?;
        if reply.error != 0 {
            return Err(ProtocolError::Api {
                code: reply.error,
                message: reply.reason.unwrap_or_else(|| "handshake refused".to_string()),
            }
            .into());
        }
        tracing::info!("Cloud socket online");

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::text(text)).await {
                    tracing::warn!(error = %e, "Cloud socket write failed");
                    break;
                }
            }
            let _ = write.close().await;
            tracing::debug!("Cloud socket writer stopped");
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!(frame = ?frame, "Cloud socket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Cloud socket read failed");
                        break;
                    }
                }
            }
            tracing::debug!("Cloud socket reader stopped");
        });

        Ok(CloudSocket::new(out_tx, in_rx))
    }
}
