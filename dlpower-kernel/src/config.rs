use crate::error::UsageError;
use serde::{Deserialize, Deserializer, Serialize};
use std::{path::{Path, PathBuf}, time::Duration};
use tokio::fs;

pub const CONFIG_ENV: &str = "DLPOWER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "dlpower.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PowerConfig {
    /// Default target PDUs when none are given on the command line
    pub hosts: Vec<String>,
    /// Login name; falls back to the ssh config, then `admin`
    pub user: Option<String>,
    /// Falls back to the ssh config, then 22
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub host_key_file: Option<PathBuf>,
    pub ssh_program: String,
    pub ssh_config: Option<PathBuf>,
    #[serde(deserialize_with = "duration_opt", serialize_with = "duration_opt_ser")]
    pub deadline: Option<Duration>,
    pub concurrency: Option<usize>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            user: None,
            port: None,
            identity_file: None,
            host_key_file: None,
            ssh_program: "ssh".into(),
            ssh_config: None,
            deadline: None,
            concurrency: None,
        }
    }
}

fn duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn duration_opt_ser<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
        None => serializer.serialize_none(),
    }
}

/// Config path: `$DLPOWER_CONFIG`, else `./dlpower.yaml`
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub async fn load_config() -> Result<PowerConfig, UsageError> {
    load_config_from(&config_path()).await
}

/// Missing or empty file gives the defaults; a file that does not parse is
/// a usage error.
pub async fn load_config_from(path: &Path) -> Result<PowerConfig, UsageError> {
    if !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(PowerConfig::default());
    }

    let txt = fs::read_to_string(path).await.map_err(|e| UsageError::InvalidConfig {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if txt.trim().is_empty() {
        return Ok(PowerConfig::default());
    }

    serde_yaml::from_str(&txt).map_err(|e| UsageError::InvalidConfig {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let cfg = load_config_from(Path::new("/nonexistent/dlpower.yaml")).await.unwrap();
        assert_eq!(cfg, PowerConfig::default());
        assert_eq!(cfg.user, None);
        assert_eq!(cfg.ssh_program, "ssh");
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hosts: [pdu, pdu2]\ndeadline: 10s\nconcurrency: 4").unwrap();

        let cfg = load_config_from(file.path()).await.unwrap();
        assert_eq!(cfg.hosts, vec!["pdu", "pdu2"]);
        assert_eq!(cfg.deadline, Some(Duration::from_secs(10)));
        assert_eq!(cfg.concurrency, Some(4));
        assert_eq!(cfg.ssh_program, "ssh");
    }

    #[tokio::test]
    async fn test_bad_file_is_usage_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "deadline: soon").unwrap();

        let err = load_config_from(file.path()).await.unwrap_err();
        assert!(matches!(err, UsageError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hostz: [pdu]").unwrap();

        assert!(load_config_from(file.path()).await.is_err());
    }
}
