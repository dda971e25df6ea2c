//! Discovery aggregator
//!
//! One worker per PDU dials, runs the "list outlets" query and parses the
//! reply. Workers hand back their own relay list (or their error); the
//! aggregator waits for every worker and merges the results itself, in the
//! order the hosts were given, so completion order never shows in the
//! inventory. A failing host contributes no relays and one `HostError`.

use crate::command::LIST_OUTLETS;
use crate::error::{HostError, HostErrorKind};
use crate::relay::{parse_outlets, Relay};
use crate::session::{within, SessionProvider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument, Span};

/// Merged inventory plus the hosts that could not be read
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub relays: Vec<Relay>,
    pub errors: Vec<HostError>,
}

impl DiscoveryReport {
    pub fn failed_hosts(&self) -> usize {
        self.errors.len()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Relays currently known for `host`, in index order
    pub fn relays_on<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a Relay> + 'a {
        self.relays.iter().filter(move |r| r.host == host)
    }
}

/// Concurrent multi-PDU outlet discovery
#[derive(Clone)]
pub struct Discovery {
    provider: Arc<dyn SessionProvider>,
    deadline: Option<Duration>,
    concurrency: Option<usize>,
    span: Span,
}

impl Discovery {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            provider,
            deadline: None,
            concurrency: None,
            span: Span::current(),
        }
    }

    /// Per-call bound on each dial and each remote command
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Maximum number of hosts queried at once; `None` or 0 means no limit
    pub fn with_concurrency(mut self, limit: Option<usize>) -> Self {
        self.concurrency = limit.filter(|n| *n > 0);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Query every host and return once all of them have answered or failed
    pub async fn discover<S: AsRef<str>>(&self, hosts: &[S]) -> DiscoveryReport {
        let hosts = unique_hosts(hosts);
        let limiter = self.concurrency.map(|n| Arc::new(Semaphore::new(n)));

        let mut workers = JoinSet::new();
        let mut positions = HashMap::new();

        for (pos, host) in hosts.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let limiter = limiter.clone();
            let deadline = self.deadline;
            let host = host.clone();
            let span = tracing::info_span!(parent: &self.span, "discover", host = %host);

            let handle = workers.spawn(
                async move {
                    let _permit = match limiter {
                        Some(sem) => sem.acquire_owned().await.ok(),
                        None => None,
                    };
                    (pos, query_host(provider.as_ref(), &host, deadline).await)
                }
                .instrument(span),
            );
            positions.insert(handle.id(), pos);
        }

        let mut slots: Vec<Option<Result<Vec<Relay>, HostError>>> = hosts.iter().map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((pos, result)) => slots[pos] = Some(result),
                Err(e) => {
                    let Some(&pos) = positions.get(&e.id()) else { continue };
                    slots[pos] = Some(Err(HostError::new(
                        hosts[pos].clone(),
                        HostErrorKind::Aborted(e.to_string()),
                    )));
                }
            }
        }

        let mut report = DiscoveryReport::default();
        for (host, slot) in hosts.iter().zip(slots) {
            match slot {
                Some(Ok(relays)) => report.relays.extend(relays),
                Some(Err(e)) => {
                    warn!(parent: &self.span, "{}", e);
                    report.errors.push(e);
                }
                None => report.errors.push(HostError::new(
                    host.clone(),
                    HostErrorKind::Aborted("worker never reported".into()),
                )),
            }
        }

        info!(
            parent: &self.span,
            "discovered {} relays from {}/{} hosts",
            report.relays.len(),
            hosts.len() - report.failed_hosts(),
            hosts.len()
        );
        report
    }
}

fn unique_hosts<S: AsRef<str>>(hosts: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    hosts
        .iter()
        .map(|h| h.as_ref().to_string())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

async fn query_host(
    provider: &dyn SessionProvider,
    host: &str,
    deadline: Option<Duration>,
) -> Result<Vec<Relay>, HostError> {
    let mut session = within(deadline, provider.dial(host))
        .await
        .map_err(|e| HostError::new(host, HostErrorKind::Dial(e)))?;

    let raw = within(deadline, session.run(LIST_OUTLETS))
        .await
        .map_err(|e| {
            // ssh only connects once the command is sent
            let kind = if e.is_connect_failure() { HostErrorKind::Dial(e) } else { HostErrorKind::Exec(e) };
            HostError::new(host, kind)
        })?;

    let relays = parse_outlets(host, &raw).map_err(|e| HostError::new(host, e.into()))?;
    debug!("{} relays on {}", relays.len(), host);
    Ok(relays)
}
