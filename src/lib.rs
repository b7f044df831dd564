// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! eWeLink Bridge - Sonoff/eWeLink switches and lights in a vessel data model.
//!
//! This library keeps eWeLink devices in sync with a Signal K style host:
//! device state is published as path/value deltas, and writes to those
//! paths are turned into device commands.
//!
//! # Transports
//!
//! - **LAN**: devices advertise their encrypted state over mDNS and accept
//!   encrypted commands on a local HTTP endpoint
//! - **Cloud**: the vendor websocket pushes state and acknowledges commands;
//!   the REST API lists devices and renews credentials
//!
//! Each command picks its transport on its own: LAN when LAN mode is on and
//! the device has been seen on the network, the cloud otherwise.
//!
//! # Supported Devices
//!
//! - Single relays (`electrical.switches.<name>.state`)
//! - Multi-outlet banks (`electrical.switches.<bank>.<outlet>.state`)
//! - L1 colour light strips (state, mode, colour, dimming level, presets)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ewelink_bridge::{Bridge, BridgeOptions, Host};
//! use ewelink_bridge::config::AuthInfo;
//! use ewelink_bridge::state::Delta;
//! use serde_json::json;
//!
//! struct Printer;
//!
//! impl Host for Printer {
//!     fn publish(&self, delta: Delta) {
//!         println!("{delta:?}");
//!     }
//!     fn report_error(&self, message: &str) {
//!         eprintln!("{message}");
//!     }
//!     fn report_status(&self, message: &str) {
//!         eprintln!("{message}");
//!     }
//!     fn register_command_path(&self, path: &str) {
//!         println!("writable: {path}");
//!     }
//!     fn save_auth_info(&self, auth: &AuthInfo) {
//!         println!("{}", auth.to_json_pretty());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ewelink_bridge::Result<()> {
//!     let bridge = Bridge::builder()
//!         .with_host(Arc::new(Printer))
//!         .with_options(BridgeOptions::new("/var/lib/ewelink"))
//!         .build()?;
//!
//!     let settings = json!({
//!         "authInfo": r#"{"region":"eu","accessToken":"...","refreshToken":"...","atExpiredTime":0,"rtExpiredTime":0}"#,
//!         "lanMode": true
//!     });
//!     bridge.start(&settings).await?;
//!
//!     let outcome = bridge
//!         .put("electrical.switches.anchorLight.state", &json!(1))
//!         .outcome()
//!         .await;
//!     println!("{}", outcome.status_code);
//!
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
mod persist;
pub mod protocol;
pub mod state;
pub mod types;

pub use bridge::{Bridge, BridgeBuilder};
pub use command::{CommandOutcome, CommandTicket};
pub use config::{AuthInfo, BridgeOptions, BridgeSettings};
pub use device::{Device, DeviceRegistry};
pub use error::{ConfigError, CryptoError, Error, ParseError, ProtocolError, Result};
pub use host::Host;
pub use state::{Delta, PathValue};
pub use types::{Brightness, LightMode, PowerState};
