//! Command dispatcher
//!
//! Selects relays by name, builds one positional `uom` command per relay and
//! either reports it (dry run) or runs it. Live runs use one worker per PDU;
//! relays on the same PDU go one after the other, each over its own session.
//! A failed dial or command is logged against that relay and never stops the
//! others. Nothing is retried.

use crate::command::{Intent, NameFilter};
use crate::relay::Relay;
use crate::session::{within, SessionProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, Instrument, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Query result: the relay's summary line
    Reported(String),
    /// Command built but not sent
    DryRun,
    Executed { output: String },
    Failed { error: String },
}

/// Result for one selected relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub host: String,
    pub name: String,
    pub index: usize,
    pub command: Option<String>,
    pub status: OutcomeStatus,
}

impl DispatchOutcome {
    fn new(relay: &Relay, command: Option<String>, status: OutcomeStatus) -> Self {
        Self {
            host: relay.host.clone(),
            name: relay.name.clone(),
            index: relay.index,
            command,
            status,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// Operator-facing line
    pub fn report_line(&self) -> String {
        match (&self.status, &self.command) {
            (OutcomeStatus::Reported(line), _) => line.clone(),
            (OutcomeStatus::DryRun, Some(cmd)) => format!("{}: {}", self.host, cmd),
            (OutcomeStatus::Executed { output }, Some(cmd)) if output.trim().is_empty() => {
                format!("{}: {}: ok", self.host, cmd)
            }
            (OutcomeStatus::Executed { output }, Some(cmd)) => {
                format!("{}: {}: {}", self.host, cmd, output.trim())
            }
            (OutcomeStatus::Failed { error }, cmd) => format!(
                "{}: {:?} [{}]: {}: {}",
                self.host,
                self.name,
                self.index,
                cmd.as_deref().unwrap_or("-"),
                error
            ),
            (_, None) => format!("{}: {:?} [{}]", self.host, self.name, self.index),
        }
    }
}

/// Per-relay outcomes in inventory order
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub intent: Intent,
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    pub fn matched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn executed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Executed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn lines(&self) -> Vec<String> {
        self.outcomes.iter().map(DispatchOutcome::report_line).collect()
    }
}

/// Applies an intent to the relays selected by a name filter
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn SessionProvider>,
    deadline: Option<Duration>,
    dry_run: bool,
    span: Span,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            provider,
            deadline: None,
            dry_run: false,
            span: Span::current(),
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn dispatch(&self, inventory: &[Relay], intent: Intent, filter: &NameFilter) -> DispatchReport {
        let selected: Vec<&Relay> = inventory.iter().filter(|r| filter.matches(&r.name)).collect();
        info!(
            parent: &self.span,
            "{}: {} of {} relays match {:?}",
            intent,
            selected.len(),
            inventory.len(),
            filter.as_str()
        );

        let mut outcomes: Vec<DispatchOutcome> = selected
            .iter()
            .map(|relay| match intent.command_for(relay.index) {
                None => DispatchOutcome::new(relay, None, OutcomeStatus::Reported(relay.to_string())),
                Some(cmd) => DispatchOutcome::new(relay, Some(cmd), OutcomeStatus::DryRun),
            })
            .collect();

        if intent != Intent::Query {
            if self.dry_run {
                for outcome in &outcomes {
                    info!(parent: &self.span, "dry run: {}", outcome.report_line());
                }
            } else {
                self.execute(&mut outcomes).await;
            }
        }

        DispatchReport { intent, outcomes }
    }

    /// Run every built command, one worker per host
    async fn execute(&self, outcomes: &mut [DispatchOutcome]) {
        let mut by_host: Vec<(String, Vec<(usize, String)>)> = Vec::new();
        for (pos, outcome) in outcomes.iter().enumerate() {
            let Some(cmd) = outcome.command.clone() else { continue };
            match by_host.iter_mut().find(|(host, _)| *host == outcome.host) {
                Some((_, jobs)) => jobs.push((pos, cmd)),
                None => by_host.push((outcome.host.clone(), vec![(pos, cmd)])),
            }
        }

        let mut workers = JoinSet::new();
        let mut owners: HashMap<_, Vec<usize>> = HashMap::new();
        for (host, jobs) in by_host {
            let provider = Arc::clone(&self.provider);
            let deadline = self.deadline;
            let positions = jobs.iter().map(|(pos, _)| *pos).collect();
            let span = tracing::info_span!(parent: &self.span, "dispatch", host = %host);

            let handle = workers.spawn(run_host(provider, host, jobs, deadline).instrument(span));
            owners.insert(handle.id(), positions);
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(results) => {
                    for (pos, status) in results {
                        outcomes[pos].status = status;
                    }
                }
                Err(e) => {
                    for pos in owners.get(&e.id()).into_iter().flatten() {
                        outcomes[*pos].status = OutcomeStatus::Failed { error: format!("worker aborted: {}", e) };
                    }
                }
            }
        }

        for outcome in outcomes.iter().filter(|o| o.is_failure()) {
            error!(parent: &self.span, "{}", outcome.report_line());
        }
    }
}

async fn run_host(
    provider: Arc<dyn SessionProvider>,
    host: String,
    jobs: Vec<(usize, String)>,
    deadline: Option<Duration>,
) -> Vec<(usize, OutcomeStatus)> {
    let mut results = Vec::with_capacity(jobs.len());
    for (pos, cmd) in jobs {
        let status = match run_one(provider.as_ref(), &host, &cmd, deadline).await {
            Ok(output) => {
                info!("{}: {}", host, cmd);
                OutcomeStatus::Executed { output }
            }
            Err(error) => OutcomeStatus::Failed { error },
        };
        results.push((pos, status));
    }
    results
}

async fn run_one(
    provider: &dyn SessionProvider,
    host: &str,
    cmd: &str,
    deadline: Option<Duration>,
) -> Result<String, String> {
    let mut session = within(deadline, provider.dial(host))
        .await
        .map_err(|e| format!("dial: {}", e))?;
    let output = within(deadline, session.run(cmd)).await.map_err(|e| {
        let step = if e.is_connect_failure() { "dial" } else { "exec" };
        format!("{}: {}", step, e)
    })?;
    Ok(String::from_utf8_lossy(&output).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(host: &str, name: &str, index: usize) -> Relay {
        Relay { host: host.into(), name: name.into(), index, ..Relay::default() }
    }

    #[test]
    fn test_report_lines() {
        let r = relay("pdu", "t510", 0);
        let dry = DispatchOutcome::new(&r, Intent::Cycle.command_for(0), OutcomeStatus::DryRun);
        assert_eq!(dry.report_line(), "pdu: uom invoke relay/outlets/0/cycle");

        let failed = DispatchOutcome::new(
            &r,
            Intent::On.command_for(0),
            OutcomeStatus::Failed { error: "dial: refused".into() },
        );
        assert!(failed.is_failure());
        assert_eq!(
            failed.report_line(),
            r#"pdu: "t510" [0]: uom set relay/outlets/0/transient_state true: dial: refused"#
        );

        let done = DispatchOutcome::new(&r, Intent::Off.command_for(0), OutcomeStatus::Executed { output: "\n".into() });
        assert_eq!(done.report_line(), "pdu: uom set relay/outlets/0/transient_state false: ok");
    }

    #[test]
    fn test_report_counts() {
        let r = relay("pdu", "a", 1);
        let report = DispatchReport {
            intent: Intent::On,
            outcomes: vec![
                DispatchOutcome::new(&r, None, OutcomeStatus::Executed { output: String::new() }),
                DispatchOutcome::new(&r, None, OutcomeStatus::Failed { error: "x".into() }),
                DispatchOutcome::new(&r, None, OutcomeStatus::DryRun),
            ],
        };
        assert_eq!(report.matched(), 3);
        assert_eq!(report.executed(), 1);
        assert_eq!(report.failed(), 1);
    }
}
