// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Result of a host write.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::Error;

/// Status code of a successful command.
pub const STATUS_OK: u16 = 200;
/// Status code of a failed command.
pub const STATUS_FAILED: u16 = 400;

/// Command lifecycle state reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandState {
    /// The command finished, successfully or not.
    Completed,
}

/// Final outcome of a command, in the host's wire shape.
///
/// ```json
/// { "state": "COMPLETED", "statusCode": 400, "message": "invalid value Disco" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    /// Always [`CommandState::Completed`].
    pub state: CommandState,
    /// 200 on success, 400 on failure.
    pub status_code: u16,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success() -> Self {
        Self {
            state: CommandState::Completed,
            status_code: STATUS_OK,
            message: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            state: CommandState::Completed,
            status_code: STATUS_FAILED,
            message: Some(message.into()),
        }
    }

    /// The outcome of a command nobody acknowledged in time.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::failure("timed out")
    }

    /// Maps a cloud acknowledgement.
    #[must_use]
    pub fn from_ack(error: i64, reason: Option<&str>) -> Self {
        if error == 0 {
            Self::success()
        } else {
            Self::failure(reason.map_or_else(|| format!("error {error}"), str::to_string))
        }
    }

    /// Maps a bridge error.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self::failure(error.to_string())
    }

    /// Returns true for a 200 outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// Sender half of a pending command.
pub type CommandCompletion = oneshot::Sender<CommandOutcome>;

/// Handle returned for a host write; resolves once with the outcome.
#[derive(Debug)]
pub struct CommandTicket {
    receiver: oneshot::Receiver<CommandOutcome>,
}

impl CommandTicket {
    /// A ticket that is already resolved.
    #[must_use]
    pub fn completed(outcome: CommandOutcome) -> Self {
        let (completion, ticket) = Self::pending();
        let _ = completion.send(outcome);
        ticket
    }

    /// A ticket and the completion that resolves it.
    #[must_use]
    pub fn pending() -> (CommandCompletion, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Waits for the outcome.
    ///
    /// A completion dropped without an answer (the bridge stopped) yields
    /// a failure.
    pub async fn outcome(self) -> CommandOutcome {
        self.receiver
            .await
            .unwrap_or_else(|_| CommandOutcome::failure("bridge stopped"))
    }

    /// Returns the outcome if it is already known.
    pub fn try_outcome(&mut self) -> Option<CommandOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(CommandOutcome::failure("bridge stopped"))
            }
        }
    }
}
