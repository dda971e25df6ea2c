//! Error taxonomy
//!
//! - `UsageError` : erreurs de configuration, fatales avant tout contact réseau
//! - `SessionError` : échec d'ouverture ou d'exécution d'une session distante
//! - `HostError` : échec isolé d'un hôte pendant la découverte

use std::path::PathBuf;
use std::time::Duration;

/// Caller-supplied usage mistakes, reported before any host is contacted
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("{0:?}: unknown command (expected on, off, cycle or query)")]
    UnknownIntent(String),
    #[error("no hosts given: use --host or set `hosts` in the config file")]
    NoHosts,
    #[error("invalid name filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid config {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },
}

/// Failure to open or use a remote session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unable to read private key {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("host key {path}: {message}")]
    HostKey { path: PathBuf, message: String },
    #[error("failed to start transport: {0}")]
    Spawn(#[from] std::io::Error),
    /// ssh itself could not reach or log into the PDU (exit status 255)
    #[error("connection failed: {output}")]
    Connect { output: String },
    #[error("remote command exited with {code:?}: {output}")]
    Remote { code: Option<i32>, output: String },
    #[error("deadline of {} expired", format_deadline(.0))]
    Timeout(Duration),
}

impl SessionError {
    /// True when the PDU was never reached, whichever call reported it
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

fn format_deadline(deadline: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*deadline)
}

/// Which step of a host's discovery failed
#[derive(Debug, thiserror::Error)]
pub enum HostErrorKind {
    #[error("dial: {0}")]
    Dial(#[source] SessionError),
    #[error("exec: {0}")]
    Exec(#[source] SessionError),
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// Per-host failure recorded by discovery; never fatal to the run
#[derive(Debug, thiserror::Error)]
#[error("{host}: {kind}")]
pub struct HostError {
    pub host: String,
    #[source]
    pub kind: HostErrorKind,
}

impl HostError {
    pub fn new(host: impl Into<String>, kind: HostErrorKind) -> Self {
        Self { host: host.into(), kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_names_host() {
        let err = HostError::new(
            "pdu",
            HostErrorKind::Exec(SessionError::Remote { code: Some(127), output: "uom: not found".into() }),
        );
        let text = err.to_string();
        assert!(text.starts_with("pdu: exec:"));
        assert!(text.contains("uom: not found"));
    }

    #[test]
    fn test_connect_failure() {
        let err = SessionError::Connect { output: "ssh: connect to host pdu port 22: Connection refused".into() };
        assert!(err.is_connect_failure());
        assert!(err.to_string().starts_with("connection failed: ssh: connect"));
        assert!(!SessionError::Remote { code: Some(1), output: String::new() }.is_connect_failure());
    }

    #[test]
    fn test_timeout_message() {
        let err = SessionError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "deadline of 5s expired");
    }

    #[test]
    fn test_unknown_intent_message() {
        let err = UsageError::UnknownIntent("reboot".into());
        assert!(err.to_string().starts_with("\"reboot\": unknown command"));
    }
}
