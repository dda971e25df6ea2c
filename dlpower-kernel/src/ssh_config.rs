//! OpenSSH client configuration lookup
//!
//! Only what is needed to turn a PDU alias into connection parameters:
//! `Host` blocks with `*`/`?`/`!` patterns, `HostName`, `Port`, `User` and
//! `IdentityFile`. First obtained value wins, as in `ssh(1)`. `Match` and
//! `Include` blocks are skipped.

use crate::config::PowerConfig;
use crate::session::PduDescriptor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_IDENTITY: &str = "key.pub";

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<String>,
    options: Vec<(String, String)>,
}

/// Parsed `~/.ssh/config`
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    blocks: Vec<HostBlock>,
}

impl SshConfig {
    /// Parse config text; unparseable lines are skipped
    pub fn parse(text: &str) -> Self {
        // options before the first Host line apply to every host
        let mut blocks = vec![HostBlock { patterns: vec!["*".into()], options: Vec::new() }];
        let mut skipping = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = split_option(line) else {
                debug!("ssh config: ignoring line {:?}", line);
                continue;
            };

            match key.to_ascii_lowercase().as_str() {
                "host" => {
                    skipping = false;
                    blocks.push(HostBlock {
                        patterns: value.split_whitespace().map(String::from).collect(),
                        options: Vec::new(),
                    });
                }
                "match" => {
                    debug!("ssh config: Match blocks are not supported, skipping");
                    skipping = true;
                }
                "include" => debug!("ssh config: Include {} not followed", value),
                key if !skipping => {
                    if let Some(block) = blocks.last_mut() {
                        block.options.push((key.to_string(), unquote(value).to_string()));
                    }
                }
                _ => {}
            }
        }

        Self { blocks }
    }

    /// Read a config file; a missing file is an empty config
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no ssh config at {}", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("unable to read ssh config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// `~/.ssh/config` unless overridden
    pub fn load_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load(&expand_tilde(p)),
            None => match dirs::home_dir() {
                Some(home) => Self::load(&home.join(".ssh").join("config")),
                None => Self::default(),
            },
        }
    }

    /// First value of `key` (case-insensitive) among the blocks matching `host`
    pub fn get(&self, host: &str, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.blocks
            .iter()
            .filter(|b| block_matches(&b.patterns, host))
            .flat_map(|b| b.options.iter())
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Build the connection descriptor for `alias`.
    ///
    /// Explicit settings win, then the ssh config, then the built-in
    /// defaults (`admin`, port 22, `key.pub`).
    pub fn resolve(&self, alias: &str, cfg: &PowerConfig) -> PduDescriptor {
        let host_name = self.get(alias, "HostName").unwrap_or(alias).to_string();

        let port = cfg.port.or_else(|| {
            let raw = self.get(alias, "Port")?;
            raw.parse().map_err(|_| warn!("ssh config: bad Port {:?} for {}", raw, alias)).ok()
        });

        let user = cfg
            .user
            .clone()
            .or_else(|| self.get(alias, "User").map(String::from))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let identity_file = cfg
            .identity_file
            .clone()
            .or_else(|| {
                let kf = self.get(alias, "IdentityFile")?;
                debug!("key file from ssh config is {:?}", kf);
                Some(PathBuf::from(kf))
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY));

        PduDescriptor {
            alias: alias.to_string(),
            host_name,
            port: port.unwrap_or(DEFAULT_PORT),
            user,
            network: "tcp",
            identity_file: expand_tilde(&identity_file),
            host_key_file: cfg.host_key_file.as_deref().map(expand_tilde),
        }
    }
}

fn split_option(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (key, rest) = line.split_at(idx);
    let value = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=').trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn block_matches(patterns: &[String], host: &str) -> bool {
    let mut matched = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            if glob_match(negated, host) {
                return false;
            }
        } else if glob_match(pattern, host) {
            matched = true;
        }
    }
    matched
}

/// `*` and `?` wildcards, ASCII case-insensitive like ssh
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let t: Vec<char> = text.to_ascii_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// `~/x` → `$HOME/x`
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
