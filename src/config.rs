//! TOML configuration for sshping.
//!
//! Values come from, in order of precedence: command-line flags, an explicit
//! `--config` file, the file named by `SSHPING_CONFIG`,
//! `/etc/sshping/sshping.toml`, and finally the compiled-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::MedianRule;
use crate::probes::{EchoConfig, ThroughputConfig};
use crate::transport::SshSettings;

pub const CONFIG_ENV: &str = "SSHPING_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sshping/sshping.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshpingConfig {
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub echo: EchoSettings,
    #[serde(default)]
    pub speed: SpeedSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SshpingConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try `SSHPING_CONFIG`, then the system path, then fall back to defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SSHPING_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// An explicitly requested file must load; otherwise search as usual.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Reject values that would make a probe meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.echo.count == 0 {
            bail!("echo count must be at least 1");
        }
        if self.echo.command.trim().is_empty() {
            bail!("echo command must not be empty");
        }
        if self.echo.settle_ms == 0 || self.echo.read_timeout_ms == 0 {
            bail!("echo timeouts must be greater than zero");
        }
        if self.ssh.login_settle_ms == 0 || self.ssh.connect_timeout_secs == 0 {
            bail!("ssh timeouts must be greater than zero");
        }
        if self.speed.size == 0 {
            bail!("transfer size must be at least 1 byte");
        }
        if self.speed.chunk_size == 0 {
            bail!("transfer chunk size must be at least 1 byte");
        }
        let name = &self.speed.remote_name;
        if name.is_empty() || name.contains('/') || name.contains('\n') {
            bail!("remote file name {:?} must be a plain file name", name);
        }
        Ok(())
    }

    pub fn echo_config(&self) -> EchoConfig {
        EchoConfig {
            count: self.echo.count,
            runtime: self.echo.runtime_secs.map(Duration::from_secs),
            command: self.echo.command.clone(),
            settle: Duration::from_millis(self.echo.settle_ms),
            read_timeout: Duration::from_millis(self.echo.read_timeout_ms),
            median: self.echo.median,
            terminate_responder: self.echo.terminate_responder,
        }
    }

    pub fn throughput_config(&self) -> ThroughputConfig {
        ThroughputConfig {
            size: self.speed.size,
            chunk_size: self.speed.chunk_size,
            remote_name: self.speed.remote_name.clone(),
            mode: self.speed.mode,
            ..ThroughputConfig::default()
        }
    }

    /// `verbosity` is the number of `-v` flags; the ssh client gets one `-v`
    /// less than we do, so only `-vv` makes it chatty.
    pub fn ssh_settings(&self, verbosity: u8) -> SshSettings {
        SshSettings {
            binary: self.ssh.binary.clone(),
            identity: self.ssh.identity.clone(),
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            batch_mode: self.ssh.batch_mode,
            options: self.ssh.options.clone(),
            verbosity: verbosity.saturating_sub(1),
        }
    }

    pub fn login_settle(&self) -> Duration {
        Duration::from_millis(self.ssh.login_settle_ms)
    }
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Path (or bare command name resolved via `$PATH`) to the ssh client.
    pub binary: String,
    /// Private key passed with `-i`.
    pub identity: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Inactivity timeout for draining the login banner and prompt.
    pub login_settle_ms: u64,
    pub batch_mode: bool,
    /// Extra `-o` options.
    pub options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            identity: None,
            connect_timeout_secs: 10,
            login_settle_ms: 1300,
            batch_mode: true,
            options: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Echo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoSettings {
    pub count: u64,
    pub command: String,
    /// Run for this many seconds instead of `count` characters.
    pub runtime_secs: Option<u64>,
    pub settle_ms: u64,
    pub read_timeout_ms: u64,
    pub median: MedianRule,
    pub terminate_responder: bool,
}

impl Default for EchoSettings {
    fn default() -> Self {
        let probe = EchoConfig::default();
        Self {
            count: probe.count,
            command: probe.command,
            runtime_secs: None,
            settle_ms: probe.settle.as_millis() as u64,
            read_timeout_ms: probe.read_timeout.as_millis() as u64,
            median: probe.median,
            terminate_responder: probe.terminate_responder,
        }
    }
}

// ---------------------------------------------------------------------------
// Speed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedSettings {
    /// Payload size in bytes.
    pub size: u64,
    pub chunk_size: usize,
    /// Target handed to the remote `scp -t`.
    pub remote_path: String,
    pub remote_name: String,
    pub mode: u32,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        let probe = ThroughputConfig::default();
        Self {
            size: probe.size,
            chunk_size: probe.chunk_size,
            remote_path: "/dev/null".to_string(),
            remote_name: probe.remote_name,
            mode: probe.mode,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when no `-v` flag or `RUST_LOG` is given.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SshpingConfig::default();

        assert_eq!(cfg.ssh.binary, "ssh");
        assert_eq!(cfg.ssh.identity, None);
        assert_eq!(cfg.ssh.connect_timeout_secs, 10);
        assert_eq!(cfg.ssh.login_settle_ms, 1300);
        assert!(cfg.ssh.batch_mode);

        assert_eq!(cfg.echo.count, 1000);
        assert_eq!(cfg.echo.command, "cat > /dev/null");
        assert_eq!(cfg.echo.runtime_secs, None);
        assert_eq!(cfg.echo.settle_ms, 1500);
        assert_eq!(cfg.echo.read_timeout_ms, 2500);
        assert_eq!(cfg.echo.median, MedianRule::Reference);

        assert_eq!(cfg.speed.size, 8_000_000);
        assert_eq!(cfg.speed.remote_path, "/dev/null");
        assert_eq!(cfg.speed.remote_name, "speedtest.tmp");
        assert_eq!(cfg.speed.mode, 0o400);

        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.logging.format, LogFormat::Text);

        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[ssh]
binary = "/usr/local/bin/ssh"
identity = "/home/alice/.ssh/id_ed25519"
connect_timeout_secs = 5
options = ["StrictHostKeyChecking=accept-new"]

[echo]
count = 200
command = "cat"
runtime_secs = 30
median = "midpoint"
terminate_responder = false

[speed]
size = 1000000
chunk_size = 4096
mode = 0o600

[logging]
level = "debug"
format = "json"
"#;

        let cfg: SshpingConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.ssh.binary, "/usr/local/bin/ssh");
        assert_eq!(
            cfg.ssh.identity,
            Some(PathBuf::from("/home/alice/.ssh/id_ed25519"))
        );
        assert_eq!(cfg.ssh.options, vec!["StrictHostKeyChecking=accept-new"]);
        assert_eq!(cfg.echo.count, 200);
        assert_eq!(cfg.echo.median, MedianRule::Midpoint);
        assert!(!cfg.echo.terminate_responder);
        assert_eq!(cfg.speed.mode, 0o600);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        let echo = cfg.echo_config();
        assert_eq!(echo.runtime, Some(Duration::from_secs(30)));
        assert_eq!(echo.command, "cat");

        let speed = cfg.throughput_config();
        assert_eq!(speed.size, 1_000_000);
        assert_eq!(speed.chunk_size, 4096);
        assert_eq!(speed.filler, b's');

        let ssh = cfg.ssh_settings(2);
        assert_eq!(ssh.connect_timeout, Duration::from_secs(5));
        assert_eq!(ssh.verbosity, 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: SshpingConfig = toml::from_str("[echo]\ncount = 5\n").unwrap();
        assert_eq!(cfg.echo.count, 5);
        assert_eq!(cfg.echo.read_timeout_ms, 2500);
        assert_eq!(cfg.speed.size, 8_000_000);
        assert_eq!(cfg.ssh.binary, "ssh");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = SshpingConfig::default();
        cfg.echo.count = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SshpingConfig::default();
        cfg.speed.size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SshpingConfig::default();
        cfg.speed.remote_name = "../escape".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SshpingConfig::default();
        cfg.echo.command = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SshpingConfig::default();
        cfg.speed.chunk_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sshping.toml");
        std::fs::write(&path, "[speed]\nsize = 42\n").unwrap();

        let cfg = SshpingConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.speed.size, 42);
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let result = SshpingConfig::resolve(Some(Path::new("/nonexistent/sshping.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sshping.toml");
        std::fs::write(&path, "[echo\ncount = ").unwrap();
        assert!(SshpingConfig::load(&path).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = SshpingConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let back: SshpingConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.echo.command, cfg.echo.command);
        assert_eq!(back.speed.size, cfg.speed.size);
    }
}
