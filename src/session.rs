//! One measurement session against one target.
//!
//! Session setup (connect, authenticate, login shell) is fatal when it fails.
//! After that the requested probes run one after another over the same
//! session, and a failed probe never stops the next one.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::probes::{
    drain, EchoConfig, EchoProbe, EchoReport, ProbeError, ProbeKind, ProbeResult,
    ThroughputConfig, ThroughputProbe, ThroughputReport,
};
use crate::target::Target;
use crate::timer::{to_millis, Timestamp};
use crate::transport::{Channel, Transport};

/// Inactivity timeout for the login banner and first prompt.
pub const LOGIN_SETTLE: Duration = Duration::from_millis(1300);

/// What to run once the login shell is up.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub echo: Option<EchoConfig>,
    pub throughput: Option<ThroughputConfig>,
    /// Destination handed to the bulk sink.
    pub remote_path: String,
    pub login_settle: Duration,
}

impl Default for SessionPlan {
    fn default() -> Self {
        Self {
            echo: Some(EchoConfig::default()),
            throughput: Some(ThroughputConfig::default()),
            remote_path: "/dev/null".to_string(),
            login_settle: LOGIN_SETTLE,
        }
    }
}

#[derive(Debug)]
pub struct SessionReport {
    pub target: Target,
    /// From spawning the login shell until it went quiet. This covers the
    /// shell session's own handshake and authentication, but not the
    /// reachability and credential checks that precede it.
    pub login_ms: u64,
    /// `None` when the probe was not requested.
    pub echo: Option<ProbeResult<EchoReport>>,
    pub throughput: Option<ProbeResult<ThroughputReport>>,
}

impl SessionReport {
    pub fn failures(&self) -> Vec<(ProbeKind, &ProbeError)> {
        let mut failed = Vec::new();
        if let Some(Err(e)) = &self.echo {
            failed.push((ProbeKind::Echo, e));
        }
        if let Some(Err(e)) = &self.throughput {
            failed.push((ProbeKind::Throughput, e));
        }
        failed
    }

    pub fn any_failed(&self) -> bool {
        !self.failures().is_empty()
    }
}

/// Establish the session, run the planned probes, and tear everything down.
pub async fn run<T>(transport: &mut T, target: &Target, plan: &SessionPlan) -> Result<SessionReport>
where
    T: Transport,
{
    transport
        .connect(target)
        .await
        .with_context(|| format!("Error connecting to {}", target))?;

    let (mut channel, login_ms) = match login(transport, plan.login_settle).await {
        Ok(established) => established,
        Err(e) => {
            if let Err(de) = transport.disconnect().await {
                warn!(error = %de, "disconnect after failed login");
            }
            return Err(e);
        }
    };

    let echo = match &plan.echo {
        Some(cfg) => {
            let result = EchoProbe::new(cfg.clone()).run(&mut channel).await;
            log_outcome(ProbeKind::Echo, &result);
            Some(result)
        }
        None => None,
    };

    let throughput = match &plan.throughput {
        Some(cfg) => {
            let result = run_throughput(transport, &plan.remote_path, cfg).await;
            log_outcome(ProbeKind::Throughput, &result);
            Some(result)
        }
        None => None,
    };

    if let Err(e) = channel.close().await {
        warn!(error = %e, "login shell did not close cleanly");
    } else {
        info!("login shell closed");
    }
    if let Err(e) = transport.disconnect().await {
        warn!(error = %e, "disconnect failed");
    }

    Ok(SessionReport {
        target: target.clone(),
        login_ms,
        echo,
        throughput,
    })
}

/// Returns the settled shell and the login time in milliseconds.
async fn login<T>(transport: &mut T, settle: Duration) -> Result<(T::Channel, u64)>
where
    T: Transport,
{
    transport
        .authenticate()
        .await
        .context("Authentication failed")?;
    let t0 = Timestamp::now();
    let mut channel = transport
        .open_interactive_channel()
        .await
        .context("Cannot open login shell")?;
    let discarded = drain(&mut channel, settle)
        .await
        .and_then(|report| report.require_quiet("before the login shell settled"))
        .context("Cannot login")?;
    let login_ms = to_millis(t0.elapsed_nanos());
    info!(discarded, login_ms, "login shell established");
    Ok((channel, login_ms))
}

async fn run_throughput<T>(
    transport: &mut T,
    remote_path: &str,
    cfg: &ThroughputConfig,
) -> ProbeResult<ThroughputReport>
where
    T: Transport,
{
    let mut sink = transport
        .open_bulk_sink(remote_path)
        .await
        .map_err(ProbeError::Transport)?;
    ThroughputProbe::new(cfg.clone()).run(&mut sink).await
}

fn log_outcome<R>(kind: ProbeKind, result: &ProbeResult<R>) {
    if let Err(e) = result {
        warn!(probe = %kind, error_kind = %e.kind(), error = %e, "probe failed");
    }
}
