//! Scope kinds and the per-kind attach/detach dispatch.
//!
//! A [`ScopeTarget`] is a scope instance whose human name has already been
//! resolved. Each variant carries its own identifier type so a project ID can
//! never be handed to the domain endpoint family by mistake.

use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::IamClient;
use crate::models::EnterpriseRoleAssignment;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Project,
    Domain,
    AllResources,
    EnterpriseProject
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 4] = [
        ScopeKind::Project,
        ScopeKind::Domain,
        ScopeKind::AllResources,
        ScopeKind::EnterpriseProject
    ];
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeKind::Project => "project",
            ScopeKind::Domain => "domain",
            ScopeKind::AllResources => "all resources",
            ScopeKind::EnterpriseProject => "enterprise project"
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    Attach,
    Detach
}

impl fmt::Display for BindingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingAction::Attach => f.write_str("attaching"),
            BindingAction::Detach => f.write_str("detaching")
        }
    }
}

macro_rules! scope_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

scope_id!(ProjectId);
scope_id!(DomainId);
scope_id!(EnterpriseProjectId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTarget {
    Project(ProjectId),
    Domain(DomainId),
    AllResources(DomainId),
    EnterpriseProject(EnterpriseProjectId)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    Detached,
    AlreadyAbsent
}

impl ScopeTarget {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeTarget::Project(_) => ScopeKind::Project,
            ScopeTarget::Domain(_) => ScopeKind::Domain,
            ScopeTarget::AllResources(_) => ScopeKind::AllResources,
            ScopeTarget::EnterpriseProject(_) => ScopeKind::EnterpriseProject
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ScopeTarget::Project(id) => id.as_str(),
            ScopeTarget::Domain(id) | ScopeTarget::AllResources(id) => id.as_str(),
            ScopeTarget::EnterpriseProject(id) => id.as_str()
        }
    }

    pub async fn attach(
        &self,
        iam: &dyn IamClient,
        agency_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        debug!(scope_kind = %self.kind(), scope_id = %self.id(), role_id, agency_id, "Attaching role");
        match self {
            ScopeTarget::Project(id) => {
                iam.attach_project_role(agency_id, id.as_str(), role_id)
                    .await
            }
            ScopeTarget::Domain(id) => iam.attach_domain_role(agency_id, id.as_str(), role_id).await,
            ScopeTarget::AllResources(id) => {
                iam.attach_inherited_role(agency_id, id.as_str(), role_id)
                    .await
            }
            ScopeTarget::EnterpriseProject(id) => {
                iam.attach_enterprise_project_roles(&[assignment(agency_id, id, role_id)])
                    .await
            }
        }
    }

    /// Removes the binding; a binding that is already gone counts as success.
    pub async fn detach(
        &self,
        iam: &dyn IamClient,
        agency_id: &str,
        role_id: &str
    ) -> AgencySyncResult<DetachOutcome> {
        debug!(scope_kind = %self.kind(), scope_id = %self.id(), role_id, agency_id, "Detaching role");
        let result = match self {
            ScopeTarget::Project(id) => {
                iam.detach_project_role(agency_id, id.as_str(), role_id)
                    .await
            }
            ScopeTarget::Domain(id) => iam.detach_domain_role(agency_id, id.as_str(), role_id).await,
            ScopeTarget::AllResources(id) => {
                iam.detach_inherited_role(agency_id, id.as_str(), role_id)
                    .await
            }
            ScopeTarget::EnterpriseProject(id) => {
                iam.detach_enterprise_project_roles(&[assignment(agency_id, id, role_id)])
                    .await
            }
        };

        match result {
            Ok(()) => Ok(DetachOutcome::Detached),
            Err(AgencySyncError::NotFound(_)) => Ok(DetachOutcome::AlreadyAbsent),
            Err(e) => Err(e)
        }
    }
}

fn assignment(
    agency_id: &str,
    enterprise_project_id: &EnterpriseProjectId,
    role_id: &str
) -> EnterpriseRoleAssignment {
    EnterpriseRoleAssignment {
        agency_id: agency_id.to_string(),
        enterprise_project_id: enterprise_project_id.as_str().to_string(),
        role_id: role_id.to_string()
    }
}
