/*!
Mock Session Provider pour développement sans PDU

Remplace `OpenSshProvider` dans les tests : réponses scriptées par hôte,
échecs de dial ou d'exécution à la demande, délais pour tester les
deadlines. Enregistre chaque dial et chaque commande exécutée.
*/

use async_trait::async_trait;
use dlpower_kernel::command::LIST_OUTLETS;
use dlpower_kernel::{Session, SessionError, SessionProvider};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub host: String,
    pub command: String,
}

#[derive(Debug, Clone, Default)]
struct HostScript {
    outlets_reply: Vec<u8>,
    dial_error: Option<String>,
    dial_panics: bool,
    run_error: Option<String>,
    /// Runs fail as if ssh never reached the PDU
    unreachable: bool,
    /// Commands containing one of these fail
    failing_commands: Vec<String>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MockState {
    hosts: HashMap<String, HostScript>,
    dials: Vec<String>,
    executed: Vec<ExecutedCommand>,
}

/// Scripted `SessionProvider`; clones share the same script and records
#[derive(Clone, Default)]
pub struct MockSessionProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, host: &str, edit: impl FnOnce(&mut HostScript)) {
        let mut state = self.state.lock();
        edit(state.hosts.entry(host.to_string()).or_default());
    }

    /// Raw reply to the "list outlets" query
    pub fn with_reply(self, host: &str, reply: impl Into<Vec<u8>>) -> Self {
        let reply = reply.into();
        self.script(host, |s| s.outlets_reply = reply);
        self
    }

    /// JSON reply to the "list outlets" query
    pub fn with_outlets(self, host: &str, outlets: &serde_json::Value) -> Self {
        let reply = serde_json::to_vec(outlets).unwrap_or_default();
        self.with_reply(host, reply)
    }

    pub fn failing_dial(self, host: &str, message: &str) -> Self {
        let message = message.to_string();
        self.script(host, |s| s.dial_error = Some(message));
        self
    }

    /// Dialing `host` panics, taking its worker down with it
    pub fn panicking_dial(self, host: &str) -> Self {
        self.script(host, |s| s.dial_panics = true);
        self
    }

    /// Every run on `host` fails with a connection error
    pub fn unreachable(self, host: &str) -> Self {
        self.script(host, |s| s.unreachable = true);
        self
    }

    pub fn failing_run(self, host: &str, message: &str) -> Self {
        let message = message.to_string();
        self.script(host, |s| s.run_error = Some(message));
        self
    }

    /// Any command on `host` containing `fragment` exits non-zero
    pub fn failing_command(self, host: &str, fragment: &str) -> Self {
        let fragment = fragment.to_string();
        self.script(host, |s| s.failing_commands.push(fragment));
        self
    }

    /// Every run on `host` sleeps this long first
    pub fn with_delay(self, host: &str, delay: Duration) -> Self {
        self.script(host, |s| s.delay = Some(delay));
        self
    }

    pub fn dials(&self) -> Vec<String> {
        self.state.lock().dials.clone()
    }

    pub fn dial_count(&self, host: &str) -> usize {
        self.state.lock().dials.iter().filter(|h| *h == host).count()
    }

    /// Everything run, "list outlets" queries included
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.state.lock().executed.clone()
    }

    /// Commands other than the "list outlets" query
    pub fn control_commands(&self) -> Vec<ExecutedCommand> {
        self.executed()
            .into_iter()
            .filter(|c| c.command != LIST_OUTLETS)
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.dials.clear();
        state.executed.clear();
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn dial(&self, host: &str) -> Result<Box<dyn Session>, SessionError> {
        let mut state = self.state.lock();
        state.dials.push(host.to_string());

        let script = match state.hosts.get(host) {
            Some(script) => script.clone(),
            None => {
                log::info!("[MOCK] dial {}: unknown host", host);
                return Err(refused(&format!("{}: no route to host", host)));
            }
        };
        if script.dial_panics {
            drop(state);
            panic!("[MOCK] dial {} panicked", host);
        }
        if let Some(message) = &script.dial_error {
            log::info!("[MOCK] dial {}: {}", host, message);
            return Err(refused(message));
        }

        log::info!("[MOCK] dial {}", host);
        Ok(Box::new(MockSession {
            host: host.to_string(),
            script,
            state: Arc::clone(&self.state),
        }))
    }
}

fn refused(message: &str) -> SessionError {
    SessionError::Spawn(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, message.to_string()))
}

struct MockSession {
    host: String,
    script: HostScript,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Session for MockSession {
    async fn run(&mut self, command: &str) -> Result<Vec<u8>, SessionError> {
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }

        self.state.lock().executed.push(ExecutedCommand {
            host: self.host.clone(),
            command: command.to_string(),
        });
        log::info!("[MOCK] {} $ {}", self.host, command);

        if self.script.unreachable {
            return Err(SessionError::Connect { output: format!("ssh: connect to host {} port 22: Connection refused", self.host) });
        }
        if let Some(message) = &self.script.run_error {
            return Err(SessionError::Remote { code: Some(1), output: message.clone() });
        }
        if self.script.failing_commands.iter().any(|f| command.contains(f.as_str())) {
            return Err(SessionError::Remote { code: Some(1), output: format!("{}: failed", command) });
        }

        if command == LIST_OUTLETS {
            Ok(self.script.outlets_reply.clone())
        } else {
            Ok(Vec::new())
        }
    }
}
