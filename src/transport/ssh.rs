//! [`Transport`] backed by the system OpenSSH client.
//!
//! Authentication, host key checking, and the SSH protocol itself stay with
//! `ssh`; this module only spawns it with the right flags and wires its stdio
//! into a [`StreamChannel`] or an [`ScpSink`]. Host aliases, ports, and
//! jump hosts from `ssh_config` are honoured: `-p` is only passed when the
//! target names a port, and the reachability check asks `ssh -G` where the
//! client will actually connect.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::{ScpSink, StreamChannel, Transport, TransportError};
use crate::target::Target;

/// Options for invoking the `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Path (or bare command name resolved via `$PATH`) of the ssh client.
    pub binary: String,
    pub identity: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Pass `-o BatchMode=yes` so a missing key fails instead of prompting.
    pub batch_mode: bool,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`.
    pub options: Vec<String>,
    /// Number of `-v` flags handed to ssh itself. Non-zero also lets the
    /// client's stderr through.
    pub verbosity: u8,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            identity: None,
            connect_timeout: Duration::from_secs(10),
            batch_mode: true,
            options: Vec::new(),
            verbosity: 0,
        }
    }
}

/// Where `ssh -G` says the client will connect.
#[derive(Debug, Default, PartialEq, Eq)]
struct EffectiveConfig {
    hostname: Option<String>,
    port: Option<u16>,
    /// A `ProxyJump` or `ProxyCommand` is in effect.
    proxied: bool,
}

fn parse_effective_config(output: &str) -> EffectiveConfig {
    let mut cfg = EffectiveConfig::default();
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(' ') else {
            continue;
        };
        let value = value.trim();
        match key.to_ascii_lowercase().as_str() {
            "hostname" => cfg.hostname = Some(value.to_string()),
            "port" => cfg.port = value.parse().ok(),
            "proxyjump" | "proxycommand" if value != "none" => cfg.proxied = true,
            _ => {}
        }
    }
    cfg
}

pub type SshChannel = StreamChannel<ChildStdin, ChildStdout>;
pub type SshSink = ScpSink<ChildStdin, ChildStdout>;

pub struct SshTransport {
    settings: SshSettings,
    target: Option<Target>,
}

impl SshTransport {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            target: None,
        }
    }

    fn target(&self) -> Result<&Target, TransportError> {
        self.target.as_ref().ok_or(TransportError::NotConnected)
    }

    /// Arguments shared by every invocation, ending with the destination.
    fn base_args(&self, target: &Target) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = target.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.settings.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push("-o".to_string());
        args.push(format!(
            "ConnectTimeout={}",
            self.settings.connect_timeout.as_secs().max(1)
        ));
        if self.settings.batch_mode {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        for option in &self.settings.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        for _ in 0..self.settings.verbosity {
            args.push("-v".to_string());
        }
        args.push(target.destination());
        args
    }

    fn command(&self, leading: &[&str], target: &Target, remote: &[&str]) -> Command {
        let mut cmd = Command::new(&self.settings.binary);
        cmd.args(leading)
            .args(self.base_args(target))
            .args(remote)
            .kill_on_drop(true)
            .stderr(if self.settings.verbosity > 0 {
                Stdio::inherit()
            } else {
                Stdio::null()
            });
        cmd
    }

    /// Falls back to the target as written when `ssh -G` is unavailable.
    async fn effective_config(&self, target: &Target) -> EffectiveConfig {
        let mut cmd = self.command(&["-G"], target, &[]);
        cmd.stdin(Stdio::null());
        match cmd.output().await {
            Ok(out) if out.status.success() => {
                parse_effective_config(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                warn!(status = %out.status, "ssh -G failed, using the target as given");
                EffectiveConfig::default()
            }
            Err(e) => {
                warn!(error = %e, "cannot run ssh -G, using the target as given");
                EffectiveConfig::default()
            }
        }
    }

    fn spawn_piped(&self, mut cmd: Command) -> Result<(Child, ChildStdin, ChildStdout), TransportError> {
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.settings.binary.clone(),
                source,
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Protocol("ssh stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Protocol("ssh stdout not captured".to_string()))?;
        Ok((child, stdin, stdout))
    }
}

#[async_trait::async_trait]
impl Transport for SshTransport {
    type Channel = SshChannel;
    type Sink = SshSink;

    /// Check that the SSH port accepts TCP connections within the timeout.
    /// Skipped when the client goes through a jump host.
    async fn connect(&mut self, target: &Target) -> Result<(), TransportError> {
        let effective = self.effective_config(target).await;
        if effective.proxied {
            debug!(%target, "ssh_config routes through a proxy, skipping TCP check");
        } else {
            let host = effective.hostname.unwrap_or_else(|| target.host.clone());
            let port = effective.port.unwrap_or_else(|| target.port_or_default());
            let unreachable = |reason: String| TransportError::Unreachable {
                host: host.clone(),
                port,
                reason,
            };
            let attempt = TcpStream::connect((host.as_str(), port));
            match tokio::time::timeout(self.settings.connect_timeout, attempt).await {
                Err(_) => return Err(unreachable("connect timed out".to_string())),
                Ok(Err(e)) => return Err(unreachable(e.to_string())),
                Ok(Ok(stream)) => {
                    debug!(peer = ?stream.peer_addr().ok(), "TCP port reachable");
                }
            }
        }
        self.target = Some(target.clone());
        info!(%target, "connected");
        Ok(())
    }

    /// Run a no-op remote command; success means the client can log in
    /// without prompting.
    async fn authenticate(&mut self) -> Result<(), TransportError> {
        let target = self.target()?.clone();
        let mut cmd = self.command(&["-T"], &target, &["true"]);
        cmd.stdin(Stdio::null()).stdout(Stdio::null());
        let status = cmd
            .status()
            .await
            .map_err(|source| TransportError::Spawn {
                program: self.settings.binary.clone(),
                source,
            })?;
        if !status.success() {
            return Err(TransportError::Auth(format!(
                "ssh to {} exited with {}",
                target.destination(),
                status
            )));
        }
        info!(destination = %target.destination(), "authenticated");
        Ok(())
    }

    async fn open_interactive_channel(&mut self) -> Result<Self::Channel, TransportError> {
        let target = self.target()?.clone();
        // -tt forces a pseudo-terminal even though our stdin is a pipe.
        let cmd = self.command(&["-tt"], &target, &[]);
        let (child, stdin, stdout) = self.spawn_piped(cmd)?;
        debug!(pid = ?child.id(), "interactive shell spawned");
        Ok(StreamChannel::new(stdin, stdout).with_child(child))
    }

    async fn open_bulk_sink(&mut self, remote_path: &str) -> Result<Self::Sink, TransportError> {
        let target = self.target()?.clone();
        let cmd = self.command(&["-T"], &target, &["scp", "-t", remote_path]);
        let (child, stdin, stdout) = self.spawn_piped(cmd)?;
        debug!(pid = ?child.id(), %remote_path, "scp sink spawned");
        Ok(ScpSink::new(stdin, stdout).with_child(child))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(target) = self.target.take() {
            info!(%target, "disconnected");
        }
        Ok(())
    }
}
