//! Session provider contract
//!
//! The kernel never speaks the remote-shell protocol itself: it asks a
//! `SessionProvider` for a `Session` bound to one PDU alias and runs vendor
//! commands through it. `OpenSshProvider` is the production implementation;
//! tests use the scripted provider from the devkit.

use crate::error::SessionError;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Opens authenticated command-execution sessions by host alias
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn dial(&self, host: &str) -> Result<Box<dyn Session>, SessionError>;
}

/// A remote command-execution handle bound to one host
#[async_trait]
pub trait Session: Send {
    /// Run one command and return its combined output (stdout then stderr)
    async fn run(&mut self, command: &str) -> Result<Vec<u8>, SessionError>;
}

/// Bound one dial or run by the optional per-call deadline. The inner
/// future is dropped on expiry, which kills any transport process it owns.
pub async fn within<T, F>(deadline: Option<Duration>, call: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(SessionError::Timeout(limit))),
        None => call.await,
    }
}

/// Connection parameters for one PDU, built at dial time and dropped with
/// the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduDescriptor {
    pub alias: String,
    /// Network host name; the alias itself when the ssh config has none
    pub host_name: String,
    pub port: u16,
    pub user: String,
    /// Always "tcp"
    pub network: &'static str,
    pub identity_file: PathBuf,
    pub host_key_file: Option<PathBuf>,
}

impl PduDescriptor {
    /// `host:port`, bracketed for IPv6 literals
    pub fn address(&self) -> String {
        if self.host_name.contains(':') {
            format!("[{}]:{}", self.host_name, self.port)
        } else {
            format!("{}:{}", self.host_name, self.port)
        }
    }

    /// Host pattern as written in a known_hosts file
    pub fn known_hosts_pattern(&self) -> String {
        if self.port == 22 {
            self.host_name.clone()
        } else {
            format!("[{}]:{}", self.host_name, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(host_name: &str, port: u16) -> PduDescriptor {
        PduDescriptor {
            alias: "pdu".into(),
            host_name: host_name.into(),
            port,
            user: "admin".into(),
            network: "tcp",
            identity_file: PathBuf::from("key.pub"),
            host_key_file: None,
        }
    }

    #[tokio::test]
    async fn test_within_deadline() {
        let fast = within(Some(Duration::from_secs(1)), async { Ok(7) }).await;
        assert_eq!(fast.unwrap(), 7);

        let slow = within(Some(Duration::from_millis(20)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(SessionError::Timeout(_))));

        let unbounded = within(None, async { Ok("done") }).await;
        assert_eq!(unbounded.unwrap(), "done");
    }

    #[test]
    fn test_address_formats() {
        assert_eq!(descriptor("10.0.0.2", 22).address(), "10.0.0.2:22");
        assert_eq!(descriptor("fe80::1", 2222).address(), "[fe80::1]:2222");
    }

    #[test]
    fn test_known_hosts_pattern() {
        assert_eq!(descriptor("pdu.lan", 22).known_hosts_pattern(), "pdu.lan");
        assert_eq!(descriptor("pdu.lan", 2200).known_hosts_pattern(), "[pdu.lan]:2200");
    }
}
