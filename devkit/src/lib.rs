/*!
# dlpower DevKit - Stubs et Utilitaires pour les tests

Bibliothèque facilitant le test du moteur dlpower sans PDU réel:
- `MockSessionProvider` : sessions scriptées par hôte
- Builders de réponses JSON `relay/outlets`
- `TestHarness` : discovery + dispatch branchés sur le mock
*/

pub mod session_stub;
pub mod fixtures;
pub mod test_utils;

pub use session_stub::{ExecutedCommand, MockSessionProvider};
pub use fixtures::{named_outlets, outlet, outlets, OutletBuilder};
pub use test_utils::TestHarness;
