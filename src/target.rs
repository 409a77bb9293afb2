//! `[user@]host[:port]` target addresses.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("missing host in target address")]
    MissingHost,

    #[error("Bad port, must be integer from 1 to 65535 (got '{0}')")]
    BadPort(String),

    #[error("unterminated '[' in target address")]
    UnterminatedBracket,

    #[error("target cannot start with a hyphen")]
    LeadingHyphen,
}

/// A remote host to measure, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    /// Only set when given explicitly, so ssh_config can still choose.
    pub port: Option<u16>,
}

impl Target {
    /// `user@host` or just `host`, the form the ssh client expects.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        match self.port {
            Some(port) => write!(f, ":{}", port),
            None => Ok(()),
        }
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Refuse anything the ssh client would parse as an option.
        if s.starts_with('-') {
            return Err(TargetError::LeadingHyphen);
        }

        let (user, rest) = match s.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, s),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or(TargetError::UnterminatedBracket)?;
            let port = match after.strip_prefix(':') {
                Some(p) => Some(p),
                None if after.is_empty() => None,
                None => return Err(TargetError::BadPort(after.to_string())),
            };
            (host, port)
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(TargetError::MissingHost);
        }

        let port = match port {
            None | Some("") => None,
            Some(p) => Some(parse_port(p)?),
        };

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, TargetError> {
    match raw.parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(TargetError::BadPort(raw.to_string())),
    }
}
