// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Matching cloud acknowledgements to pending commands.
//!
//! Every cloud command is registered under its sequence id. The first
//! acknowledgement or the timeout resolves it; anything arriving later for
//! the same id is ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::CommandFrame;

use super::ticket::{CommandCompletion, CommandOutcome};

struct PendingCommand {
    completion: CommandCompletion,
    frame: CommandFrame,
}

/// Pending cloud commands keyed by sequence id.
#[derive(Default)]
pub struct CommandCorrelator {
    pending: Mutex<HashMap<String, PendingCommand>>,
}

impl CommandCorrelator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command sent with `frame.sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandRejected`] if the sequence id is already
    /// pending. The new completion is resolved with that failure.
    pub fn register(&self, frame: CommandFrame, completion: CommandCompletion) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&frame.sequence) {
            let message = format!("duplicate sequence {}", frame.sequence);
            tracing::warn!(sequence = %frame.sequence, "Duplicate command sequence");
            let _ = completion.send(CommandOutcome::failure(message.clone()));
            return Err(Error::CommandRejected(message));
        }
        pending.insert(frame.sequence.clone(), PendingCommand { completion, frame });
        Ok(())
    }

    /// Resolves a pending command and returns the frame it was sent with.
    ///
    /// Unknown or already resolved ids return `None`.
    pub fn resolve(&self, sequence: &str, outcome: CommandOutcome) -> Option<CommandFrame> {
        let entry = self.pending.lock().remove(sequence)?;
        tracing::debug!(sequence, status = outcome.status_code, "Command resolved");
        let _ = entry.completion.send(outcome);
        Some(entry.frame)
    }

    /// Resolves a pending command as timed out.
    pub fn expire(&self, sequence: &str) -> bool {
        let expired = self.resolve(sequence, CommandOutcome::timed_out()).is_some();
        if expired {
            tracing::warn!(sequence, "Command timed out");
        }
        expired
    }

    /// Expires `sequence` after `timeout` unless it resolves first.
    pub fn arm_timeout(
        self: &Arc<Self>,
        sequence: String,
        timeout: Duration,
        cancel: CancellationToken,
    ) {
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    correlator.expire(&sequence);
                }
            }
        });
    }

    /// Fails every pending command with a "bridge stopped" outcome.
    pub fn clear(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Abandoning pending commands");
        }
        for (_, pending) in drained {
            let _ = pending
                .completion
                .send(CommandOutcome::failure("bridge stopped"));
        }
    }

    /// Number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl std::fmt::Debug for CommandCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCorrelator")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::command::CommandTicket;

    fn frame(sequence: &str) -> CommandFrame {
        let mut params = Map::new();
        params.insert("mode".to_string(), json!(2));
        CommandFrame::update("key", "1000abc", params, sequence.to_string())
    }

    #[tokio::test]
    async fn resolves_once() {
        let correlator = CommandCorrelator::new();
        let (completion, ticket) = CommandTicket::pending();
        correlator.register(frame("1"), completion).unwrap();

        let sent = correlator.resolve("1", CommandOutcome::success());
        assert_eq!(sent.unwrap().deviceid, "1000abc");
        assert!(correlator.resolve("1", CommandOutcome::failure("late")).is_none());
        assert!(ticket.outcome().await.is_success());
        assert!(correlator.is_empty());
    }

    #[test]
    fn unknown_sequence_is_ignored() {
        let correlator = CommandCorrelator::new();
        assert!(correlator.resolve("42", CommandOutcome::success()).is_none());
        assert!(!correlator.expire("42"));
    }

    #[tokio::test]
    async fn duplicate_sequence_rejected() {
        let correlator = CommandCorrelator::new();
        let (first, first_ticket) = CommandTicket::pending();
        let (second, second_ticket) = CommandTicket::pending();
        correlator.register(frame("7"), first).unwrap();
        assert!(correlator.register(frame("7"), second).is_err());
        assert_eq!(correlator.len(), 1);

        assert_eq!(second_ticket.outcome().await.status_code, 400);
        correlator.resolve("7", CommandOutcome::success());
        assert!(first_ticket.outcome().await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_expires_pending() {
        let correlator = Arc::new(CommandCorrelator::new());
        let (completion, ticket) = CommandTicket::pending();
        correlator.register(frame("9"), completion).unwrap();
        correlator.arm_timeout("9".to_string(), Duration::from_secs(30), CancellationToken::new());

        let outcome = ticket.outcome().await;
        assert_eq!(outcome.status_code, 400);
        assert_eq!(outcome.message.as_deref(), Some("timed out"));
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn clear_abandons_pending() {
        let correlator = CommandCorrelator::new();
        let (completion, ticket) = CommandTicket::pending();
        correlator.register(frame("3"), completion).unwrap();
        correlator.clear();

        assert!(correlator.is_empty());
        let outcome = ticket.outcome().await;
        assert_eq!(outcome.status_code, 400);
        assert_eq!(outcome.message.as_deref(), Some("bridge stopped"));
    }
}
