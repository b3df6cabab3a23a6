mod crd;
mod events;
mod filter;
mod manager;
mod reconciler;
mod types;

pub use crd::{CapsuleConfiguration, CapsuleConfigurationSpec, DEFAULT_USER_GROUP};
pub use filter::{EventPredicate, InstanceNameFilter};
pub use manager::{run_config_controller, ConfigManager, ConfigManagerBuilder, ManagerSettings};
pub use reconciler::ConfigReconciler;
pub use types::{ReconcileError, ReconcileRequest, CONTROLLER_NAME, DEFAULT_CONFIGURATION_NAME};
