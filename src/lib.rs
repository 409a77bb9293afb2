//! sshping -- interactive echo latency and bulk throughput over SSH.
//!
//! The measurement core (timer, drain, echo and throughput probes, statistics)
//! is written against the [`transport`] traits. [`transport::SshTransport`]
//! drives the system OpenSSH client; [`session::run`] ties the pieces together.

pub mod analysis;
pub mod config;
pub mod probes;
pub mod report;
pub mod session;
pub mod target;
pub mod timer;
pub mod transport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
