//! Session provider backed by the system OpenSSH client
//!
//! Handles:
//! - Alias resolution through `~/.ssh/config` (see `ssh_config`)
//! - Private key check at dial time
//! - Optional pinned host key, written to a throwaway known_hosts file
//! - Batch-mode `ssh` invocation with combined stdout/stderr capture
//!
//! `dial` only prepares the invocation; the TCP connection is made when a
//! command runs. ssh's own failures (exit status 255) come back as
//! `SessionError::Connect` so callers can still report them as dial errors.
//! An explicit `ssh_config` path is handed to `ssh -F` so the client reads
//! the same file that resolved the alias.

use crate::config::PowerConfig;
use crate::error::SessionError;
use crate::session::{PduDescriptor, Session, SessionProvider};
use crate::ssh_config::{expand_tilde, SshConfig};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, Instrument, Span};

/// Dials PDUs by spawning `ssh`
pub struct OpenSshProvider {
    settings: PowerConfig,
    ssh_config: SshConfig,
    span: Span,
}

impl OpenSshProvider {
    pub fn new(settings: PowerConfig) -> Self {
        let ssh_config = SshConfig::load_default(settings.ssh_config.as_deref());
        Self::with_ssh_config(settings, ssh_config)
    }

    pub fn with_ssh_config(settings: PowerConfig, ssh_config: SshConfig) -> Self {
        Self { settings, ssh_config, span: Span::current() }
    }

    /// Parent span for everything this provider logs
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn descriptor(&self, host: &str) -> PduDescriptor {
        self.ssh_config.resolve(host, &self.settings)
    }
}

#[async_trait]
impl SessionProvider for OpenSshProvider {
    async fn dial(&self, host: &str) -> Result<Box<dyn Session>, SessionError> {
        let descriptor = self.descriptor(host);
        let span = tracing::debug_span!(parent: &self.span, "dial", host = %host);

        async {
            check_identity(&descriptor.identity_file).await?;
            let known_hosts = match &descriptor.host_key_file {
                Some(path) => Some(pinned_known_hosts(&descriptor, path).await?),
                None => None,
            };
            debug!(
                "ssh dial {} {} as {} ({})",
                descriptor.network,
                descriptor.address(),
                descriptor.user,
                descriptor.identity_file.display()
            );

            Ok::<Box<dyn Session>, SessionError>(Box::new(OpenSshSession {
                program: self.settings.ssh_program.clone(),
                config_file: self.settings.ssh_config.as_deref().map(expand_tilde),
                descriptor,
                known_hosts,
                span: span.clone(),
            }))
        }
        .instrument(span.clone())
        .await
    }
}

async fn check_identity(path: &Path) -> Result<(), SessionError> {
    tokio::fs::read(path)
        .await
        .map(|_| ())
        .map_err(|source| SessionError::Credentials { path: path.to_path_buf(), source })
}

/// Turn a public key file (`<type> <base64> [comment]`) into a one-line
/// known_hosts file for this host.
async fn pinned_known_hosts(descriptor: &PduDescriptor, path: &Path) -> Result<NamedTempFile, SessionError> {
    let host_key_err = |message: String| SessionError::HostKey { path: path.to_path_buf(), message };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| host_key_err(e.to_string()))?;
    let line = known_hosts_line(&descriptor.known_hosts_pattern(), &raw)
        .ok_or_else(|| host_key_err(format!("not a public key: {:?}", raw.trim())))?;

    let mut file = NamedTempFile::new().map_err(|e| host_key_err(e.to_string()))?;
    writeln!(file, "{}", line)
        .and_then(|_| file.flush())
        .map_err(|e| host_key_err(e.to_string()))?;
    Ok(file)
}

fn known_hosts_line(pattern: &str, public_key: &str) -> Option<String> {
    let mut fields = public_key.split_whitespace();
    let key_type = fields.next()?;
    let blob = fields.next()?;
    let plausible = (key_type.starts_with("ssh-") || key_type.starts_with("ecdsa-") || key_type.starts_with("sk-"))
        && blob.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='));
    plausible.then(|| format!("{} {} {}", pattern, key_type, blob))
}

struct OpenSshSession {
    program: String,
    config_file: Option<PathBuf>,
    descriptor: PduDescriptor,
    known_hosts: Option<NamedTempFile>,
    span: Span,
}

impl OpenSshSession {
    fn args(&self, command: &str) -> Vec<String> {
        let d = &self.descriptor;
        let mut args: Vec<String> = Vec::new();
        if let Some(path) = &self.config_file {
            args.push("-F".into());
            args.push(path.display().to_string());
        }
        args.extend([
            "-o".into(), "BatchMode=yes".into(),
            "-p".into(), d.port.to_string(),
            "-l".into(), d.user.clone(),
            "-i".into(), d.identity_file.display().to_string(),
            "-o".into(), "IdentitiesOnly=yes".into(),
        ]);

        match &self.known_hosts {
            Some(file) => {
                args.push("-o".into());
                args.push("StrictHostKeyChecking=yes".into());
                args.push("-o".into());
                args.push(format!("UserKnownHostsFile={}", file.path().display()));
            }
            None => {
                args.push("-o".into());
                args.push("StrictHostKeyChecking=no".into());
                args.push("-o".into());
                args.push("UserKnownHostsFile=/dev/null".into());
                args.push("-o".into());
                args.push("LogLevel=ERROR".into());
            }
        }

        args.push("--".into());
        args.push(d.host_name.clone());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl Session for OpenSshSession {
    async fn run(&mut self, command: &str) -> Result<Vec<u8>, SessionError> {
        let args = self.args(command);
        debug!(parent: &self.span, "{} {}", self.program, shell_words::join(&args));

        let output = AsyncCommand::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if output.status.success() {
            Ok(combined)
        } else {
            Err(exit_error(output.status.code(), &combined))
        }
    }
}

// 255 is reserved by ssh for its own errors
fn exit_error(code: Option<i32>, combined: &[u8]) -> SessionError {
    let output = String::from_utf8_lossy(combined).trim().to_string();
    match code {
        Some(255) => SessionError::Connect { output },
        code => SessionError::Remote { code, output },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_key(key: &Path) -> PowerConfig {
        PowerConfig {
            identity_file: Some(key.to_path_buf()),
            ..PowerConfig::default()
        }
    }

    #[test]
    fn test_known_hosts_line() {
        let line = known_hosts_line("[pdu]:2222", "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB+x/y= admin@pdu\n");
        assert_eq!(line.as_deref(), Some("[pdu]:2222 ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB+x/y="));
        assert!(known_hosts_line("pdu", "not a key").is_none());
        assert!(known_hosts_line("pdu", "").is_none());
    }

    #[tokio::test]
    async fn test_dial_fails_without_key() {
        let provider = OpenSshProvider::with_ssh_config(
            settings_with_key(Path::new("/nonexistent/key")),
            SshConfig::default(),
        );
        let err = provider.dial("pdu").await.err().unwrap();
        assert!(matches!(err, SessionError::Credentials { .. }));
    }

    #[tokio::test]
    async fn test_dial_rejects_bad_host_key() {
        let key = NamedTempFile::new().unwrap();
        let mut host_key = NamedTempFile::new().unwrap();
        writeln!(host_key, "garbage").unwrap();

        let settings = PowerConfig {
            host_key_file: Some(host_key.path().to_path_buf()),
            ..settings_with_key(key.path())
        };
        let provider = OpenSshProvider::with_ssh_config(settings, SshConfig::default());
        let err = provider.dial("pdu").await.err().unwrap();
        assert!(matches!(err, SessionError::HostKey { .. }));
    }

    fn session(config_file: Option<PathBuf>) -> OpenSshSession {
        OpenSshSession {
            program: "ssh".into(),
            config_file,
            descriptor: PduDescriptor {
                alias: "pdu".into(),
                host_name: "192.168.0.100".into(),
                port: 22,
                user: "admin".into(),
                network: "tcp",
                identity_file: PathBuf::from("/keys/pdu"),
                host_key_file: None,
            },
            known_hosts: None,
            span: Span::none(),
        }
    }

    #[test]
    fn test_args_without_pinned_key() {
        let args = session(None).args("uom get relay/outlets");
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(!args.contains(&"-F".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--", "192.168.0.100", "uom get relay/outlets"]);
    }

    #[test]
    fn test_args_pass_explicit_ssh_config() {
        let args = session(Some(PathBuf::from("/etc/dlpower/ssh_config"))).args("uom get relay/outlets");
        assert_eq!(&args[..2], ["-F", "/etc/dlpower/ssh_config"]);
    }

    #[test]
    fn test_exit_status_255_is_connect_failure() {
        let err = exit_error(Some(255), b"ssh: connect to host 10.0.0.9 port 22: Connection refused\n");
        assert!(matches!(&err, SessionError::Connect { output } if output.ends_with("Connection refused")));

        let err = exit_error(Some(1), b"uom: no such outlet");
        assert!(matches!(err, SessionError::Remote { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_run_reports_transport_failure() {
        let key = NamedTempFile::new().unwrap();
        let settings = PowerConfig {
            ssh_program: "/nonexistent/ssh".into(),
            ..settings_with_key(key.path())
        };
        let provider = OpenSshProvider::with_ssh_config(settings, SshConfig::default());
        let mut session = provider.dial("pdu").await.unwrap();
        let err = session.run("uom get relay/outlets").await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(_)));
    }
}
