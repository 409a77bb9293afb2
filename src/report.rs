//! Rendering of a finished session: `---` text lines or one JSON document.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::probes::{EchoReport, ErrorKind, ProbeResult, ThroughputReport};
use crate::session::SessionReport;
use crate::target::Target;

/// Identity of one invocation, stamped into JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

impl Default for RunInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Measurement lines for stdout. Failed probes contribute nothing here; see
/// [`failure_lines`].
pub fn render_text(report: &SessionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- Login: {} msec", report.login_ms);

    if let Some(Ok(echo)) = &report.echo {
        let s = &echo.stats;
        let _ = writeln!(out, "--- Minimum Latency: {} nsec", s.min);
        let _ = writeln!(
            out,
            "---  Median Latency: {} nsec  +/- {} std dev",
            s.median, s.stddev
        );
        let _ = writeln!(out, "--- Average Latency: {} nsec", s.mean);
        let _ = writeln!(out, "--- Maximum Latency: {} nsec", s.max);
    }

    if let Some(Ok(speed)) = &report.throughput {
        let _ = writeln!(
            out,
            "---  Transfer Speed: {} Bytes/second",
            speed.bytes_per_sec
        );
    }
    out
}

/// One `*** ` line per failed probe, for stderr.
pub fn failure_lines(report: &SessionReport) -> Vec<String> {
    report
        .failures()
        .into_iter()
        .map(|(kind, err)| format!("*** {} probe failed ({}): {}", kind, err.kind(), err))
        .collect()
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ProbeOutcome<'a, T> {
    Ok {
        #[serde(flatten)]
        result: &'a T,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl<'a, T> ProbeOutcome<'a, T> {
    fn from_result(result: &'a ProbeResult<T>) -> Self {
        match result {
            Ok(result) => ProbeOutcome::Ok { result },
            Err(e) => ProbeOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    run: &'a RunInfo,
    version: &'static str,
    target: &'a Target,
    login_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    echo: Option<ProbeOutcome<'a, EchoReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    throughput: Option<ProbeOutcome<'a, ThroughputReport>>,
}

pub fn render_json(report: &SessionReport, run: &RunInfo) -> serde_json::Result<String> {
    let doc = JsonReport {
        run,
        version: crate::VERSION,
        target: &report.target,
        login_ms: report.login_ms,
        echo: report.echo.as_ref().map(ProbeOutcome::from_result),
        throughput: report.throughput.as_ref().map(ProbeOutcome::from_result),
    };
    serde_json::to_string_pretty(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ProbeStats, SampleSet};
    use crate::probes::ProbeError;

    fn echo_report() -> EchoReport {
        EchoReport {
            stats: ProbeStats {
                min: 1_200_000,
                median: 1_500_000,
                mean: 1_600_000,
                max: 3_000_000,
                stddev: 250_000,
            },
            characters: 1000,
            elapsed_ms: 1650,
            samples: SampleSet::new(),
        }
    }

    fn session(
        echo: Option<ProbeResult<EchoReport>>,
        throughput: Option<ProbeResult<ThroughputReport>>,
    ) -> SessionReport {
        SessionReport {
            target: "alice@example.com:2222".parse().unwrap(),
            login_ms: 842,
            echo,
            throughput,
        }
    }

    fn speed() -> ThroughputReport {
        ThroughputReport {
            bytes: 8_000_000,
            elapsed_secs: 0.5,
            bytes_per_sec: 16_000_000,
        }
    }

    #[test]
    fn test_text_matches_classic_layout() {
        let text = render_text(&session(Some(Ok(echo_report())), Some(Ok(speed()))));
        let expected = "\
--- Login: 842 msec
--- Minimum Latency: 1200000 nsec
---  Median Latency: 1500000 nsec  +/- 250000 std dev
--- Average Latency: 1600000 nsec
--- Maximum Latency: 3000000 nsec
---  Transfer Speed: 16000000 Bytes/second
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_failed_probe_is_omitted_from_text() {
        let report = session(
            Some(Err(ProbeError::Timeout {
                character: 3,
                timeout_ms: 2500,
            })),
            Some(Ok(speed())),
        );
        let text = render_text(&report);
        assert!(!text.contains("Latency"));
        assert!(text.contains("Transfer Speed"));

        let failures = failure_lines(&report);
        assert_eq!(
            failures,
            vec!["*** echo probe failed (timeout): no echo within 2500 ms for character 3"]
        );
    }

    #[test]
    fn test_json_document() {
        let report = session(
            Some(Ok(echo_report())),
            Some(Err(ProbeError::ClosedEarly("during transfer"))),
        );
        let run = RunInfo::new();
        let json = render_json(&report, &run).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["run_id"], run.run_id.to_string());
        assert_eq!(value["login_ms"], 842);
        assert_eq!(value["target"]["host"], "example.com");
        assert_eq!(value["target"]["port"], 2222);
        assert_eq!(value["echo"]["status"], "ok");
        assert_eq!(value["echo"]["stats"]["median"], 1_500_000);
        assert_eq!(value["echo"]["characters"], 1000);
        assert_eq!(value["throughput"]["status"], "failed");
        assert_eq!(value["throughput"]["kind"], "IoError");
        assert!(value["started_at"].is_string());
    }

    #[test]
    fn test_json_skips_probes_not_requested() {
        let report = session(None, Some(Ok(speed())));
        let json = render_json(&report, &RunInfo::new()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("echo").is_none());
        assert_eq!(value["throughput"]["bytes_per_sec"], 16_000_000);
    }
}
