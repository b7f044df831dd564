// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud transport: REST API, credentials, socket and connection loop.

pub mod api;
pub mod channel;
pub mod frame;
pub mod session;
pub mod socket;

pub use api::{CloudApi, CoolkitApi, Family};
pub use channel::{ChannelDriver, CloudChannel, ConnectionState};
pub use frame::{CloudMessage, CommandFrame, SequenceGenerator};
pub use session::{CloudSession, Session};
pub use socket::{CloudSocket, SocketConnector, WsConnector};
