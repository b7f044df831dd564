// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transports for talking to eWeLink devices.
//!
//! # Transports
//!
//! - [`lan`]: encrypted HTTP straight to the device, endpoints learnt via
//!   [`discovery`]
//! - [`cloud`]: vendor websocket with REST for listing and credentials
//!
//! Which one a command uses is decided per command by [`select_transport`].

pub mod cloud;
pub mod crypto;
pub mod discovery;
pub mod lan;

#[cfg(feature = "mdns")]
pub use discovery::MdnsDiscovery;
pub use discovery::{Discovery, DiscoveryRecord};
pub use cloud::{
    ChannelDriver, CloudApi, CloudChannel, CloudMessage, CloudSession, CloudSocket, CommandFrame,
    ConnectionState, CoolkitApi, Family, SequenceGenerator, Session, SocketConnector, WsConnector,
};
pub use lan::{EndpointTable, LanChannel, LanClient, LanEndpoint, ZeroconfClient, ZeroconfRequest};

use crate::config::DeviceSettings;
use crate::device::Device;

/// Transport a command travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Direct, encrypted unicast on the local network.
    Lan,
    /// Through the vendor cloud socket.
    Cloud,
}

/// Chooses the transport for one command.
///
/// 1. Cloud-only hardware always uses the cloud.
/// 2. So does a device the user forced into cloud mode.
/// 3. Otherwise LAN is used when LAN mode is on and the device's endpoint
///    is known.
/// 4. Everything else goes through the cloud.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::config::DeviceSettings;
/// use ewelink_bridge::device::Device;
/// use ewelink_bridge::protocol::{Transport, select_transport};
///
/// let plug = Device::new("1000sw", "Anchor", 1);
/// let settings = DeviceSettings::default();
///
/// assert_eq!(select_transport(&plug, &settings, true, true), Transport::Lan);
/// assert_eq!(select_transport(&plug, &settings, true, false), Transport::Cloud);
/// assert_eq!(select_transport(&plug, &settings, false, true), Transport::Cloud);
/// ```
#[must_use]
pub fn select_transport(
    device: &Device,
    settings: &DeviceSettings,
    lan_mode: bool,
    endpoint_known: bool,
) -> Transport {
    if device.is_cloud_only() || settings.force_cloud_mode {
        Transport::Cloud
    } else if lan_mode && endpoint_known {
        Transport::Lan
    } else {
        Transport::Cloud
    }
}
