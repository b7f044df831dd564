// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs the bridge as a standalone process.
//!
//! Deltas and command outcomes are written to stdout as JSON lines; writes
//! are read from stdin as `{"path": "...", "value": ...}` lines. Logs go to
//! stderr and follow `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use ewelink_bridge::config::AuthInfo;
use ewelink_bridge::state::Delta;
use ewelink_bridge::{Bridge, BridgeOptions, Host};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ewelink-bridge", version, about)]
struct Args {
    /// Settings document (JSON); rewritten when the access token is renewed.
    #[arg(long, env = "EWELINK_SETTINGS")]
    settings: PathBuf,
    /// Directory for the device and LAN caches.
    #[arg(long, env = "EWELINK_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,
    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct PutRequest {
    path: String,
    value: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Line<'a> {
    Delta { delta: &'a Delta },
    Outcome { path: &'a str, outcome: &'a ewelink_bridge::CommandOutcome },
}

fn emit(line: &Line<'_>) {
    match serde_json::to_string(line) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output line"),
    }
}

/// Host writing to stdout and persisting credentials into the settings file.
struct StdioHost {
    settings_path: PathBuf,
    settings: Mutex<Value>,
}

impl StdioHost {
    fn write_settings(path: &Path, settings: &Value) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

impl Host for StdioHost {
    fn publish(&self, delta: Delta) {
        emit(&Line::Delta { delta: &delta });
    }

    fn report_error(&self, message: &str) {
        tracing::error!(message, "Bridge error");
    }

    fn report_status(&self, message: &str) {
        tracing::info!(message, "Bridge status");
    }

    fn register_command_path(&self, path: &str) {
        tracing::debug!(path, "Writable path");
    }

    fn save_auth_info(&self, auth: &AuthInfo) {
        let snapshot = {
            let mut settings = self.settings.lock();
            settings["authInfo"] = json!(auth.to_json_pretty());
            settings.clone()
        };
        match Self::write_settings(&self.settings_path, &snapshot) {
            Ok(()) => tracing::info!(path = %self.settings_path.display(), "Saved renewed credentials"),
            Err(e) => tracing::error!(path = %self.settings_path.display(), error = %e, "Failed to save settings"),
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let raw = std::fs::read_to_string(&args.settings)?;
    let settings: Value = serde_json::from_str(&raw)?;

    let host = Arc::new(StdioHost {
        settings_path: args.settings.clone(),
        settings: Mutex::new(settings.clone()),
    });
    let bridge = Bridge::builder()
        .with_host(host)
        .with_options(BridgeOptions::new(&args.data_dir))
        .build()?;
    bridge.start(&settings).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    tracing::debug!("Command input closed");
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let request: PutRequest = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring unreadable command line");
                        continue;
                    }
                };
                let ticket = bridge.put(&request.path, &request.value);
                tokio::spawn(async move {
                    let outcome = ticket.outcome().await;
                    emit(&Line::Outcome { path: &request.path, outcome: &outcome });
                });
            }
        }
    }

    bridge.stop().await;
    Ok(())
}
