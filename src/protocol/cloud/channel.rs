// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud connection lifecycle.
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Connected
//!      ▲               │              │
//!      └───────────────┴──────────────┘
//!          failure / close, retry after the reconnection delay
//! ```
//!
//! Connecting renews the access token when needed and opens the socket.
//! While connected a keepalive `ping` is sent every interval and `pong`
//! answers are swallowed; every other inbound frame is forwarded to the
//! bridge. A closed or failed socket arms exactly one reconnect timer.
//! Cancelling the token stops the loop in any state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectionPolicy;
use crate::error::{Error, Result};
use crate::host::Host;

use super::frame::{PING, PONG};
use super::session::CloudSession;
use super::socket::{CloudSocket, SocketConnector};

/// State of the cloud connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket; a reconnect may be pending.
    Disconnected,
    /// Renewing credentials or opening the socket.
    Connecting,
    /// Socket open and authenticated.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Collaborators and tunables of the connection loop.
pub struct ChannelDriver {
    /// Credentials.
    pub session: Arc<CloudSession>,
    /// Socket factory.
    pub connector: Arc<dyn SocketConnector>,
    /// Status reporting.
    pub host: Arc<dyn Host>,
    /// Reconnect schedule.
    pub reconnection: ReconnectionPolicy,
    /// Keepalive interval.
    pub ping_interval: Duration,
    /// Receives every inbound frame except `pong`.
    pub inbound: mpsc::Sender<String>,
}

/// The cloud socket as seen by the rest of the bridge.
pub struct CloudChannel {
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl CloudChannel {
    /// Creates a disconnected channel.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            state,
            outbound: Mutex::new(None),
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] unless the channel is connected.
    pub async fn send(&self, text: String) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let sender = self.outbound.lock().clone().ok_or(Error::NotConnected)?;
        sender.send(text).await.map_err(|_| Error::NotConnected)
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Cloud connection state");
        }
    }

    /// Runs the connection loop until `cancel` fires or the reconnection
    /// policy gives up.
    pub async fn run(self: Arc<Self>, driver: ChannelDriver, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = driver.session.refresh_if_expired() => {}
            }

            let Some(session) = driver.session.session() else {
                tracing::warn!("No account API key known, cloud connection not started");
                break;
            };

            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = driver.connector.connect(&session) => result,
            };

            match connected {
                Ok(socket) => {
                    attempt = 0;
                    *self.outbound.lock() = Some(socket.outbound.clone());
                    self.set_state(ConnectionState::Connected);
                    tracing::info!("Cloud socket connected");
                    driver.host.report_status("Connected to eWeLink cloud");

                    self.pump(socket, &driver, &cancel).await;

                    self.outbound.lock().take();
                    self.set_state(ConnectionState::Disconnected);
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::error!("Cloud socket closed");
                    driver.host.report_status("Cloud connection lost, reconnecting");
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!(error = %e, attempt, "Cloud socket connection failed");
                    driver
                        .host
                        .report_error(&format!("cloud connection failed: {e}"));
                }
            }

            if !driver.reconnection.should_retry(attempt) {
                tracing::error!(attempt, "Cloud reconnection limit reached, giving up");
                break;
            }
            let delay = driver.reconnection.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            tracing::info!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Waiting before reconnect");

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.outbound.lock().take();
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("Cloud connection loop stopped");
    }

    /// Drives one open socket until it closes or `cancel` fires.
    async fn pump(&self, socket: CloudSocket, driver: &ChannelDriver, cancel: &CancellationToken) {
        let CloudSocket {
            outbound,
            mut inbound,
        } = socket;
        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + driver.ping_interval,
            driver.ping_interval,
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                frame = inbound.recv() => {
                    let Some(text) = frame else {
                        return;
                    };
                    if text == PONG {
                        tracing::trace!("Keepalive answered");
                        continue;
                    }
                    if driver.inbound.send(text).await.is_err() {
                        return;
                    }
                }
                _ = keepalive.tick() => {
                    tracing::trace!("Sending keepalive");
                    if outbound.send(PING.to_string()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

impl fmt::Debug for CloudChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudChannel")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{AuthInfo, TokenGrant};
    use crate::device::Device;
    use crate::protocol::cloud::api::{CloudApi, Family};
    use crate::protocol::cloud::session::Session;
    use crate::state::Delta;

    struct NoopApi;

    #[async_trait]
    impl CloudApi for NoopApi {
        async fn refresh_token(&self, _auth: &AuthInfo) -> Result<TokenGrant> {
            Ok(TokenGrant {
                at: "at".to_string(),
                rt: "rt".to_string(),
                at_expired_time: None,
                rt_expired_time: None,
            })
        }

        async fn families(&self, _auth: &AuthInfo) -> Result<Vec<Family>> {
            Ok(Vec::new())
        }

        async fn list_devices(&self, _auth: &AuthInfo, _family: Option<&str>) -> Result<Vec<Device>> {
            Ok(Vec::new())
        }
    }

    struct QuietHost;

    impl Host for QuietHost {
        fn publish(&self, _delta: Delta) {}
        fn report_error(&self, _message: &str) {}
        fn report_status(&self, _message: &str) {}
        fn register_command_path(&self, _path: &str) {}
        fn save_auth_info(&self, _auth: &AuthInfo) {}
    }

    /// Hands out sockets whose far ends are pushed to `remotes`.
    #[derive(Default)]
    struct FakeConnector {
        connects: AtomicUsize,
        fail: bool,
        remotes: Mutex<Vec<(mpsc::Receiver<String>, mpsc::Sender<String>)>>,
    }

    #[async_trait]
    impl SocketConnector for FakeConnector {
        async fn connect(&self, _session: &Session) -> Result<CloudSocket> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::NotConnected);
            }
            let (out_tx, out_rx) = mpsc::channel(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            self.remotes.lock().push((out_rx, in_tx));
            Ok(CloudSocket::new(out_tx, in_rx))
        }
    }

    fn driver(connector: Arc<FakeConnector>, inbound: mpsc::Sender<String>) -> ChannelDriver {
        let host: Arc<dyn Host> = Arc::new(QuietHost);
        let session = CloudSession::new(
            Arc::new(NoopApi),
            Arc::clone(&host),
            AuthInfo::new("eu", "at", "rt"),
            "app",
        );
        session.set_apikey(Some("user".to_string()));
        ChannelDriver {
            session: Arc::new(session),
            connector,
            host,
            reconnection: ReconnectionPolicy::default(),
            ping_interval: Duration::from_secs(25),
            inbound,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_pings_and_forwards() {
        let connector = Arc::new(FakeConnector::default());
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let channel = CloudChannel::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Arc::clone(&channel).run(driver(Arc::clone(&connector), inbound_tx), cancel.clone()),
        );

        settle().await;
        assert_eq!(channel.state(), ConnectionState::Connected);
        let (mut remote_out, remote_in) = connector.remotes.lock().pop().unwrap();

        tokio::time::advance(Duration::from_secs(25)).await;
        settle().await;
        assert_eq!(remote_out.try_recv().unwrap(), "ping");

        remote_in.send("pong".to_string()).await.unwrap();
        remote_in.send(r#"{"action":"update"}"#.to_string()).await.unwrap();
        settle().await;
        assert_eq!(inbound_rx.try_recv().unwrap(), r#"{"action":"update"}"#);
        assert!(inbound_rx.try_recv().is_err());

        channel.send("hello".to_string()).await.unwrap();
        assert_eq!(remote_out.try_recv().unwrap(), "hello");

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_once_after_close() {
        let connector = Arc::new(FakeConnector::default());
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let channel = CloudChannel::new();
        let cancel = CancellationToken::new();
        tokio::spawn(
            Arc::clone(&channel).run(driver(Arc::clone(&connector), inbound_tx), cancel.clone()),
        );

        settle().await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        // Server closes the socket.
        connector.remotes.lock().clear();
        settle().await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(matches!(
            channel.send("x".to_string()).await,
            Err(Error::NotConnected)
        ));

        tokio::time::advance(Duration::from_millis(4_900)).await;
        settle().await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(channel.state(), ConnectionState::Connected);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_retry_loop() {
        let connector = Arc::new(FakeConnector {
            fail: true,
            ..FakeConnector::default()
        });
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let channel = CloudChannel::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Arc::clone(&channel).run(driver(Arc::clone(&connector), inbound_tx), cancel.clone()),
        );

        settle().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let channel = CloudChannel::new();
        assert!(matches!(
            channel.send("x".to_string()).await,
            Err(Error::NotConnected)
        ));
    }
}
