//! dlpower - Query and switch networked PDU outlets
//!
//! Dials every given PDU over ssh, lists its outlets, then applies the
//! requested intent to the outlets whose names match the filters:
//! - no command / `query` : print one summary line per matching relay
//! - `on` / `off` : set the transient state
//! - `cycle` : invoke the outlet's power cycle
//!
//! Usage errors exit 2 before any PDU is contacted. Unreachable PDUs and
//! failed commands are logged; they change the exit status only with
//! `--strict`.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Plan};
use dlpower_kernel::{Discovery, Dispatcher, OpenSshProvider, SessionProvider};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Instrument};
use tracing_subscriber::EnvFilter;

fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Discovery then dispatch; returns whether every host and relay succeeded
async fn run(plan: Plan) -> Result<bool> {
    let span = tracing::info_span!("dlpower", intent = %plan.intent);

    let provider: Arc<dyn SessionProvider> =
        Arc::new(OpenSshProvider::new(plan.settings.clone()).with_span(span.clone()));

    let discovery = Discovery::new(Arc::clone(&provider))
        .with_deadline(plan.settings.deadline)
        .with_concurrency(plan.settings.concurrency)
        .with_span(span.clone());
    let inventory = discovery.discover(&plan.hosts).instrument(span.clone()).await;

    let dispatcher = Dispatcher::new(provider)
        .with_deadline(plan.settings.deadline)
        .dry_run(plan.dry_run)
        .with_span(span.clone());
    let report = dispatcher
        .dispatch(&inventory.relays, plan.intent, &plan.filter)
        .instrument(span)
        .await;

    let mut out = std::io::stdout().lock();
    for line in report.lines() {
        writeln!(out, "{}", line).context("failed to write report")?;
    }

    info!(
        "{} matched, {} executed, {} failed; {} of {} hosts unreachable",
        report.matched(),
        report.executed(),
        report.failed(),
        inventory.failed_hosts(),
        plan.hosts.len()
    );

    Ok(inventory.is_complete() && report.failed() == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env optionnel (DLPOWER_HOSTS, DLPOWER_CONFIG, RUST_LOG)
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    init_logging(args.debug);

    let plan = match args.plan().await {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    let strict = plan.strict;

    match run(plan).await {
        Ok(clean) if clean || !strict => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
