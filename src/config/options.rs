// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime options of the bridge.

use std::path::PathBuf;
use std::time::Duration;

/// Default application id sent with cloud requests.
pub const DEFAULT_APP_ID: &str = "SsgewdgY5EHXEFIx6wAsmqf7dBE71c8i";

/// Tunables that are not part of the user settings.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ewelink_bridge::config::{BridgeOptions, ReconnectionPolicy};
///
/// let options = BridgeOptions::new("/var/lib/ewelink")
///     .with_ping_interval(Duration::from_secs(10))
///     .with_reconnection(ReconnectionPolicy::disabled());
///
/// assert_eq!(options.ping_interval, Duration::from_secs(10));
/// assert!(options.device_cache_path().ends_with("devices-cache-v2.json"));
/// ```
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Directory holding the device and LAN endpoint caches.
    pub data_dir: PathBuf,
    /// Interval between keepalive pings on the cloud socket.
    pub ping_interval: Duration,
    /// Reconnection policy of the cloud socket.
    pub reconnection: ReconnectionPolicy,
    /// How long a cloud command waits for its acknowledgement.
    pub command_timeout: Duration,
    /// File name of the device cache inside `data_dir`.
    pub device_cache_file: String,
    /// File name of the LAN endpoint cache inside `data_dir`.
    pub lan_cache_file: String,
    /// Application id sent with cloud requests.
    pub app_id: String,
}

impl BridgeOptions {
    /// Creates options with defaults, storing caches under `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the keepalive interval.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Sets the command acknowledgement timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the application id.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Full path of the device cache.
    #[must_use]
    pub fn device_cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.device_cache_file)
    }

    /// Full path of the LAN endpoint cache.
    #[must_use]
    pub fn lan_cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.lan_cache_file)
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            ping_interval: Duration::from_secs(25),
            reconnection: ReconnectionPolicy::default(),
            command_timeout: Duration::from_secs(30),
            device_cache_file: "devices-cache-v2.json".to_string(),
            lan_cache_file: "lan-info.json".to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
        }
    }
}

/// Reconnection policy of the cloud socket.
///
/// The default retries forever with a fixed 5 second delay.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ewelink_bridge::config::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::new()
///     .with_max_retries(5)
///     .with_initial_delay(Duration::from_millis(500))
///     .with_backoff_multiplier(2.0)
///     .with_max_delay(Duration::from_secs(30));
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
/// assert!(!policy.should_retry(5));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Maximum number of retries before giving up (None = infinite).
    pub max_retries: Option<u32>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt; 1.0 keeps the delay fixed.
    pub backoff_multiplier: f32,
}

impl ReconnectionPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Creates a policy with a fixed delay and unbounded retries.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            enabled: true,
            max_retries: None,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the upper bound on the delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the delay to wait before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        // Non-negative and capped by max_delay below.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }

    /// Returns true if retry number `attempt` (0-based) may be made.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && self.max_retries.is_none_or(|max| attempt < max)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = BridgeOptions::default();
        assert_eq!(options.ping_interval, Duration::from_secs(25));
        assert_eq!(options.command_timeout, Duration::from_secs(30));
        assert_eq!(options.device_cache_file, "devices-cache-v2.json");
        assert_eq!(options.lan_cache_file, "lan-info.json");
    }

    #[test]
    fn cache_paths_join_data_dir() {
        let options = BridgeOptions::new("/data");
        assert_eq!(
            options.lan_cache_path(),
            PathBuf::from("/data/lan-info.json")
        );
    }

    #[test]
    fn default_policy_is_fixed_and_unbounded() {
        let policy = ReconnectionPolicy::default();
        assert!(policy.enabled);
        assert!(policy.max_retries.is_none());
        for attempt in [0, 1, 10, 1_000] {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_secs(5));
            assert!(policy.should_retry(attempt));
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert!(!ReconnectionPolicy::disabled().should_retry(0));
    }

    #[test]
    fn bounded_retries() {
        let policy = ReconnectionPolicy::new().with_max_retries(2);
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }
}
