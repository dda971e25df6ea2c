//! Command-line surface
//!
//! `dlpower [flags] [on|off|cycle|query] [FILTER...]`
//!
//! Everything here runs before any PDU is contacted; any error it returns
//! is a usage error.

use clap::Parser;
use dlpower_kernel::config::{config_path, load_config_from};
use dlpower_kernel::{Intent, NameFilter, PowerConfig, UsageError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "dlpower", version, about = "Query and switch PDU outlets over ssh")]
pub struct Cli {
    /// PDU alias to contact (repeatable or comma separated)
    #[arg(short = 'H', long = "host", value_delimiter = ',', env = "DLPOWER_HOSTS")]
    pub hosts: Vec<String>,

    /// Verbose tracing
    #[arg(short, long)]
    pub debug: bool,

    /// Print the commands instead of running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Exit 1 when any host or relay failed
    #[arg(long)]
    pub strict: bool,

    /// Private key file (default: ssh config IdentityFile, then key.pub)
    #[arg(short = 'i', long)]
    pub identity: Option<PathBuf>,

    /// Pinned host public key; without it host keys are not checked
    #[arg(long)]
    pub host_key: Option<PathBuf>,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(short = 'l', long)]
    pub user: Option<String>,

    /// Bound on each dial and remote command, e.g. "10s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub deadline: Option<Duration>,

    /// Config file (default: $DLPOWER_CONFIG or ./dlpower.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// on, off, cycle or query (default)
    #[arg(value_name = "COMMAND")]
    pub command: Option<String>,

    /// Relay name patterns, OR-ed together
    #[arg(value_name = "FILTER")]
    pub filters: Vec<String>,
}

/// Fully validated run
#[derive(Debug)]
pub struct Plan {
    pub intent: Intent,
    pub filter: NameFilter,
    pub hosts: Vec<String>,
    pub settings: PowerConfig,
    pub dry_run: bool,
    pub strict: bool,
}

impl Cli {
    pub async fn plan(self) -> Result<Plan, UsageError> {
        let path = self.config.clone().unwrap_or_else(config_path);
        let file = load_config_from(&path).await?;
        self.plan_with(file)
    }

    /// Flags override the config file
    pub fn plan_with(self, mut settings: PowerConfig) -> Result<Plan, UsageError> {
        let intent = match &self.command {
            Some(word) => word.parse()?,
            None => Intent::Query,
        };

        let hosts = if self.hosts.is_empty() {
            settings.hosts.clone()
        } else {
            self.hosts
        };
        let hosts: Vec<String> = hosts.into_iter().filter(|h| !h.trim().is_empty()).collect();
        if hosts.is_empty() {
            return Err(UsageError::NoHosts);
        }

        let filter = NameFilter::from_terms(&self.filters)?;

        if self.identity.is_some() {
            settings.identity_file = self.identity;
        }
        if self.host_key.is_some() {
            settings.host_key_file = self.host_key;
        }
        if self.port.is_some() {
            settings.port = self.port;
        }
        if self.user.is_some() {
            settings.user = self.user;
        }
        if self.deadline.is_some() {
            settings.deadline = self.deadline;
        }

        Ok(Plan {
            intent,
            filter,
            hosts,
            settings,
            dry_run: self.dry_run,
            strict: self.strict,
        })
    }
}
