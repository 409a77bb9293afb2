use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sshping::config::{LogFormat, LoggingConfig, SshpingConfig};
use sshping::report::{self, RunInfo};
use sshping::session::{self, SessionPlan};
use sshping::target::Target;
use sshping::transport::SshTransport;

/// Exit status for usage errors and sessions that could not be set up.
const EXIT_SETUP_FAILED: u8 = 255;
/// Exit status when the session ran but a probe failed.
const EXIT_PROBE_FAILED: u8 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "sshping",
    about = "Measure character-echo latency and bandwidth for an interactive ssh session",
    version,
    long_about = None
)]
struct Cli {
    /// Target as [user@]addr[:port]
    target: String,

    /// Number of characters to echo
    #[arg(short = 'c', long = "count", value_name = "NCHARS")]
    count: Option<u64>,

    /// Echo command to run on the remote host
    #[arg(short = 'e', long = "echocmd", value_name = "CMD")]
    echo_cmd: Option<String>,

    /// Identity file, i.e. private key
    #[arg(short = 'i', long = "identity", value_name = "FILE")]
    identity: Option<PathBuf>,

    /// Run the echo test for SECS seconds instead of a character count
    #[arg(short = 'r', long = "runtime", value_name = "SECS")]
    runtime: Option<u64>,

    /// Payload size for the speed test, in bytes
    #[arg(short = 's', long = "size", value_name = "BYTES")]
    size: Option<u64>,

    /// Tests to run: e = echo, s = speed (default: es)
    #[arg(short = 't', long = "tests", value_name = "e|s|es", value_parser = parse_tests)]
    tests: Option<Tests>,

    /// Show more output; repeat for ssh client debug output
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print results as one JSON document
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tests {
    echo: bool,
    speed: bool,
}

impl Default for Tests {
    fn default() -> Self {
        Self {
            echo: true,
            speed: true,
        }
    }
}

fn parse_tests(s: &str) -> Result<Tests, String> {
    if s.is_empty() {
        return Err("expected e, s, or es".to_string());
    }
    let mut tests = Tests {
        echo: false,
        speed: false,
    };
    for c in s.chars() {
        match c {
            'e' => tests.echo = true,
            's' => tests.speed = true,
            other => return Err(format!("unknown test '{}', expected e or s", other)),
        }
    }
    Ok(tests)
}

/// Command-line values win over anything from the config file.
fn apply_overrides(config: &mut SshpingConfig, cli: &Cli) {
    if let Some(count) = cli.count {
        config.echo.count = count;
    }
    if let Some(cmd) = &cli.echo_cmd {
        config.echo.command = cmd.clone();
    }
    if let Some(identity) = &cli.identity {
        config.ssh.identity = Some(identity.clone());
    }
    if let Some(runtime) = cli.runtime {
        config.echo.runtime_secs = Some(runtime);
    }
    if let Some(size) = cli.size {
        config.speed.size = size;
    }
}

fn init_tracing(verbosity: u8, logging: &LoggingConfig) {
    let default_level = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn setup(cli: &Cli) -> Result<(Target, SshpingConfig)> {
    let target: Target = cli.target.parse()?;
    let mut config = SshpingConfig::resolve(cli.config.as_deref())?;
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok((target, config))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            eprintln!("\n*** Command error, see usage");
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };

    let (target, config) = match setup(&cli) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("*** {:#}", e);
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };
    init_tracing(cli.verbose, &config.logging);

    let tests = cli.tests.unwrap_or_default();
    tracing::info!(
        user = target.user.as_deref().unwrap_or("--not specified--"),
        host = %target.host,
        port = ?target.port,
        echo_cmd = %config.echo.command,
        echo = tests.echo,
        speed = tests.speed,
        "starting sshping"
    );

    let plan = SessionPlan {
        echo: tests.echo.then(|| config.echo_config()),
        throughput: tests.speed.then(|| config.throughput_config()),
        remote_path: config.speed.remote_path.clone(),
        login_settle: config.login_settle(),
    };
    let run = RunInfo::new();
    let mut transport = SshTransport::new(config.ssh_settings(cli.verbose));

    let report = match session::run(&mut transport, &target, &plan).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("*** Cannot establish ssh session: {:#}", e);
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };

    if cli.json {
        match report::render_json(&report, &run) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("*** Cannot render JSON: {}", e);
                return ExitCode::from(EXIT_SETUP_FAILED);
            }
        }
    } else {
        print!("{}", report::render_text(&report));
    }
    for line in report::failure_lines(&report) {
        eprintln!("{}", line);
    }

    if report.any_failed() {
        ExitCode::from(EXIT_PROBE_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}
