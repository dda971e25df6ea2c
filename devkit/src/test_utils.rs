/*!
Test Harness pour le moteur dlpower

Facilite l'écriture de tests avec:
- Setup automatique du `MockSessionProvider`
- Discovery et Dispatcher déjà branchés sur le mock
- Assertions sur les commandes envoyées aux PDU
*/

use crate::session_stub::{ExecutedCommand, MockSessionProvider};
use anyhow::Result;
use dlpower_kernel::{Discovery, DiscoveryReport, DispatchReport, Dispatcher, Intent, NameFilter, SessionProvider};
use std::sync::Arc;
use std::time::Duration;

/// Harness de test complet: mock + moteur
pub struct TestHarness {
    pub provider: MockSessionProvider,
    deadline: Option<Duration>,
}

impl TestHarness {
    pub fn new(provider: MockSessionProvider) -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self { provider, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn shared(&self) -> Arc<dyn SessionProvider> {
        Arc::new(self.provider.clone())
    }

    pub fn discovery(&self) -> Discovery {
        Discovery::new(self.shared()).with_deadline(self.deadline)
    }

    pub fn dispatcher(&self, dry_run: bool) -> Dispatcher {
        Dispatcher::new(self.shared())
            .with_deadline(self.deadline)
            .dry_run(dry_run)
    }

    pub async fn discover(&self, hosts: &[&str]) -> DiscoveryReport {
        self.discovery().discover(hosts).await
    }

    /// Discovery followed by dispatch, as the binary does it
    pub async fn run(&self, hosts: &[&str], intent: Intent, terms: &[&str], dry_run: bool) -> Result<(DiscoveryReport, DispatchReport)> {
        let filter = NameFilter::from_terms(terms)?;
        let inventory = self.discover(hosts).await;
        let report = self.dispatcher(dry_run).dispatch(&inventory.relays, intent, &filter).await;
        log::info!("[HARNESS] {} -> {} outcomes", intent, report.matched());
        Ok((inventory, report))
    }

    /// Assert qu'une commande a été envoyée à un hôte
    pub fn assert_command_sent(&self, host: &str, command: &str) -> Result<()> {
        let expected = ExecutedCommand { host: host.into(), command: command.into() };
        if self.provider.control_commands().contains(&expected) {
            return Ok(());
        }
        anyhow::bail!(
            "command {:?} not sent to {}; sent: {:?}",
            command,
            host,
            self.provider.control_commands()
        );
    }

    /// Assert qu'aucune commande de contrôle n'a été envoyée
    pub fn assert_no_control_commands(&self) -> Result<()> {
        let sent = self.provider.control_commands();
        if sent.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("expected no control commands, got {:?}", sent)
        }
    }
}
