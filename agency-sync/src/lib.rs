pub mod agency;
pub mod audit;
pub mod binding;
pub mod catalog;
pub mod config;
pub mod declaration;
pub mod enterprise;
pub mod error;
pub mod iam;
pub mod lock;
pub mod models;
pub mod reconcile;
pub mod resolver;
pub mod scope;
pub mod throttle;

pub use agency::{AgencyService, Delegate};
pub use audit::{AuditReport, BindingAuditor};
pub use binding::{BindingDiff, BindingKey, diff_bindings};
pub use catalog::RoleCatalog;
pub use config::AgencySyncConfig;
pub use declaration::{AgencyBindings, EnterpriseProjectRoles, ProjectRoles};
pub use enterprise::{EnterpriseProjectClient, create_enterprise_project_client};
pub use error::{AgencySyncError, AgencySyncResult};
pub use iam::{IamClient, create_iam_client};
pub use lock::AccountLocks;
pub use reconcile::{ReconcilePlan, ReconcileReport, ReconcileService};
pub use scope::ScopeKind;
