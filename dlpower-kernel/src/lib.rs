/*!
# dlpower kernel - Découverte et pilotage des relais PDU

Moteur du binaire `dlpower` :
- `relay` : modèle d'un relais (prise) et rendu texte
- `session` : contrat du fournisseur de sessions distantes
- `openssh` : adaptateur basé sur le client `ssh` système
- `ssh_config` : résolution alias → hôte réseau, port, clé
- `discovery` : interrogation concurrente des PDU, fusion de l'inventaire
- `dispatch` : filtrage par nom et envoi des commandes on/off/cycle
- `config` : fichier YAML optionnel et valeurs par défaut
*/

pub mod command;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod openssh;
pub mod relay;
pub mod session;
pub mod ssh_config;

pub use command::{Intent, NameFilter};
pub use config::PowerConfig;
pub use discovery::{Discovery, DiscoveryReport};
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher, OutcomeStatus};
pub use error::{HostError, HostErrorKind, SessionError, UsageError};
pub use openssh::OpenSshProvider;
pub use relay::{parse_outlets, Relay};
pub use session::{PduDescriptor, Session, SessionProvider};
