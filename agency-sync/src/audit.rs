//! Rebuilds an agency's current role bindings from the remote, one scope
//! instance at a time.

use crate::config::AgencySyncConfig;
use crate::declaration::{AgencyBindings, EnterpriseProjectRoles, ProjectRoles};
use crate::enterprise::EnterpriseProjectClient;
use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::IamClient;
use crate::models::Role;
use crate::resolver::{fetch_all_enterprise_projects, fetch_all_projects};
use crate::scope::ScopeKind;
use crate::throttle::{FixedIntervalGate, Throttle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditError {
    pub scope_kind: ScopeKind,
    pub scope: String,
    pub error: String,
    pub timestamp: DateTime<Utc>
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditReport {
    pub agency_id: String,
    pub bindings: AgencyBindings,
    pub projects_queried: u32,
    pub enterprise_projects_queried: u32,
    /// Scope instances whose bindings could not be read and are missing from `bindings`.
    pub omitted: Vec<AuditError>
}

impl AuditReport {
    pub fn is_complete(&self) -> bool {
        self.omitted.is_empty()
    }

    fn omit(&mut self, scope_kind: ScopeKind, scope: &str, error: &AgencySyncError) {
        self.omitted.push(AuditError {
            scope_kind,
            scope: scope.to_string(),
            error: error.to_string(),
            timestamp: Utc::now()
        });
    }
}

pub struct BindingAuditor {
    iam: Arc<dyn IamClient>,
    enterprise: Option<Arc<dyn EnterpriseProjectClient>>,
    throttle: Arc<dyn Throttle>,
    domain_id: String,
    reserved_project_names: Vec<String>
}

impl BindingAuditor {
    pub fn new(
        config: &AgencySyncConfig,
        iam: Arc<dyn IamClient>,
        enterprise: Option<Arc<dyn EnterpriseProjectClient>>
    ) -> Self {
        Self {
            iam,
            enterprise,
            throttle: Arc::new(FixedIntervalGate::per_second(
                config.audit.requests_per_second
            )),
            domain_id: config.domain_id.clone(),
            reserved_project_names: config.audit.reserved_project_names.clone()
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Listing the scope instances is fatal on failure; a failed query for a
    /// single instance is logged and that instance is left out of the result.
    pub async fn audit(&self, agency_id: &str) -> AgencySyncResult<AuditReport> {
        let mut report = AuditReport {
            agency_id: agency_id.to_string(),
            ..Default::default()
        };

        self.audit_projects(agency_id, &mut report).await?;
        self.audit_domain(agency_id, &mut report).await;
        self.audit_all_resources(agency_id, &mut report).await;
        self.audit_enterprise_projects(agency_id, &mut report)
            .await?;

        info!(
            agency_id,
            projects = report.bindings.project_roles.len(),
            domain_roles = report.bindings.domain_roles.len(),
            all_resources_roles = report.bindings.all_resources_roles.len(),
            enterprise_projects = report.bindings.enterprise_project_roles.len(),
            omitted = report.omitted.len(),
            "Audited agency role bindings"
        );
        Ok(report)
    }

    async fn audit_projects(&self, agency_id: &str, report: &mut AuditReport) -> AgencySyncResult<()> {
        let mut projects = fetch_all_projects(self.iam.as_ref(), &self.domain_id)
            .await
            .map_err(AgencySyncError::listing("the projects of domain"))?;
        projects.sort_by(|a, b| a.name.cmp(&b.name));

        for project in projects {
            if self.reserved_project_names.contains(&project.name) {
                debug!(project = %project.name, "Skipping reserved project");
                continue;
            }

            self.throttle.acquire().await;
            report.projects_queried += 1;
            let roles = match self.iam.list_project_roles(agency_id, &project.id).await {
                Ok(roles) => roles,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => {
                    warn!(project = %project.name, error = %e, "Error querying the roles attached on project");
                    report.omit(ScopeKind::Project, &project.name, &e);
                    continue;
                }
            };

            let roles = display_names(roles);
            if !roles.is_empty() {
                report.bindings.project_roles.push(ProjectRoles {
                    project: project.name,
                    roles
                });
            }
        }

        Ok(())
    }

    async fn audit_domain(&self, agency_id: &str, report: &mut AuditReport) {
        match self.iam.list_domain_roles(agency_id, &self.domain_id).await {
            Ok(roles) => report.bindings.domain_roles = display_names(roles),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(error = %e, "Error querying the roles attached on domain");
                report.omit(ScopeKind::Domain, &self.domain_id, &e);
            }
        }
    }

    async fn audit_all_resources(&self, agency_id: &str, report: &mut AuditReport) {
        match self.iam.list_inherited_roles(agency_id, &self.domain_id).await {
            Ok(roles) => report.bindings.all_resources_roles = display_names(roles),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(error = %e, "Error querying the roles inherited to all projects");
                report.omit(ScopeKind::AllResources, &self.domain_id, &e);
            }
        }
    }

    async fn audit_enterprise_projects(
        &self,
        agency_id: &str,
        report: &mut AuditReport
    ) -> AgencySyncResult<()> {
        let Some(client) = self.enterprise.as_deref() else {
            debug!("No enterprise project endpoint configured, skipping");
            return Ok(());
        };

        let mut projects = fetch_all_enterprise_projects(client)
            .await
            .map_err(AgencySyncError::listing("enterprise projects"))?;
        projects.sort_by(|a, b| a.name.cmp(&b.name));

        for project in projects {
            self.throttle.acquire().await;
            report.enterprise_projects_queried += 1;
            let roles = match self
                .iam
                .list_enterprise_project_roles(agency_id, &project.id)
                .await
            {
                Ok(roles) => roles,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => {
                    warn!(enterprise_project = %project.name, error = %e, "Error querying the roles attached on enterprise project");
                    report.omit(ScopeKind::EnterpriseProject, &project.name, &e);
                    continue;
                }
            };

            let roles = display_names(roles);
            if !roles.is_empty() {
                report
                    .bindings
                    .enterprise_project_roles
                    .push(EnterpriseProjectRoles {
                        enterprise_project: project.name,
                        roles
                    });
            }
        }

        Ok(())
    }
}

fn display_names(roles: Vec<Role>) -> BTreeSet<String> {
    roles
        .into_iter()
        .filter_map(|role| role.display_name.filter(|name| !name.is_empty()))
        .collect()
}
