//! Snapshot queries and imperative commands through the `pactl` client.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use soundwarden_core::{CardInfo, ChannelVolume, Direction, EndpointInfo, ServerInfo, SinkInputInfo};

use crate::error::{PwError, PwResult};
use crate::json;

/// A `pactl` invocation target.
///
/// Calls block the current thread until `pactl` exits or the timeout
/// expires, so they must not be made from async code.
#[derive(Debug, Clone)]
pub struct Pactl {
    binary: String,
    timeout: Duration,
    runtime: Handle,
}

impl Pactl {
    /// `runtime` must be a multi-threaded runtime; it drives the child
    /// process and the timeout.
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration, runtime: Handle) -> Self {
        Self { binary: binary.into(), timeout, runtime }
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run `pactl` with `args` and return its stdout. `command` names the
    /// invocation in errors. A run exceeding the timeout is killed.
    fn run(&self, command: &str, args: &[String]) -> PwResult<String> {
        trace!(binary = %self.binary, ?args, "Running pactl");
        let output = self
            .runtime
            .block_on(async {
                let child = Command::new(&self.binary)
                    .args(args)
                    .env("LC_ALL", "C")
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output();
                tokio::time::timeout(self.timeout, child).await
            })
            .map_err(|_| {
                warn!(command, timeout = ?self.timeout, "pactl command timed out");
                PwError::Timeout { command: command.to_string(), timeout: self.timeout }
            })?
            .map_err(|source| PwError::Spawn { command: command.to_string(), source })?;

        if !output.status.success() {
            let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(command, %reason, "pactl command failed");
            return Err(PwError::CommandFailed {
                command: command.to_string(),
                reason: if reason.is_empty() { output.status.to_string() } else { reason },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn query(&self, args: &[&str]) -> PwResult<String> {
        let mut full = vec!["--format=json".to_string()];
        full.extend(args.iter().map(ToString::to_string));
        self.run(&args.join(" "), &full)
    }

    pub fn server_info(&self) -> PwResult<ServerInfo> {
        json::decode_server(&self.query(&["info"])?)
    }

    pub fn cards(&self) -> PwResult<Vec<CardInfo>> {
        json::decode_cards(&self.query(&["list", "cards"])?)
    }

    pub fn sinks(&self) -> PwResult<Vec<EndpointInfo>> {
        json::decode_endpoints(&self.query(&["list", "sinks"])?, Direction::Sink, |_| None)
    }

    /// Sources, with monitor sources resolved to the sink they tap.
    pub fn sources(&self) -> PwResult<Vec<EndpointInfo>> {
        let raw = self.query(&["list", "sources"])?;
        let sinks = if raw.contains("\"monitor_of_sink\"") { self.sinks()? } else { Vec::new() };
        json::decode_endpoints(&raw, Direction::Source, |name| {
            sinks.iter().find(|s| s.name == name).map(|s| s.index)
        })
    }

    pub fn sink_inputs(&self) -> PwResult<Vec<SinkInputInfo>> {
        json::decode_sink_inputs(&self.query(&["list", "sink-inputs"])?)
    }

    pub fn execute(&self, args: &[String]) -> PwResult<()> {
        let command = args.first().map_or("pactl", String::as_str);
        debug!(?args, "pactl command");
        self.run(command, args).map(|_| ())
    }
}

fn endpoint_noun(direction: Direction) -> &'static str {
    match direction {
        Direction::Sink => "sink",
        Direction::Source => "source",
    }
}

pub fn set_card_profile_args(card: u32, profile: &str) -> Vec<String> {
    vec!["set-card-profile".into(), card.to_string(), profile.into()]
}

pub fn set_port_args(direction: Direction, index: u32, port: &str) -> Vec<String> {
    vec![format!("set-{}-port", endpoint_noun(direction)), index.to_string(), port.into()]
}

pub fn set_default_args(direction: Direction, name: &str) -> Vec<String> {
    vec![format!("set-default-{}", endpoint_noun(direction)), name.into()]
}

/// One raw value per channel; plain integers are raw volumes to pactl.
pub fn set_volume_args(direction: Direction, index: u32, volume: &ChannelVolume) -> Vec<String> {
    let mut args = vec![format!("set-{}-volume", endpoint_noun(direction)), index.to_string()];
    args.extend(volume.to_raw().into_iter().map(|v| v.to_string()));
    args
}

pub fn set_mute_args(direction: Direction, index: u32, muted: bool) -> Vec<String> {
    vec![
        format!("set-{}-mute", endpoint_noun(direction)),
        index.to_string(),
        if muted { "1" } else { "0" }.into(),
    ]
}

pub fn move_sink_input_args(input: u32, sink: u32) -> Vec<String> {
    vec!["move-sink-input".into(), input.to_string(), sink.to_string()]
}
