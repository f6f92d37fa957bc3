//! Name-to-ID resolution for scope instances.
//!
//! The resolver lists projects and enterprise projects at most once per
//! reconciliation run; the listings are taken lazily on the first lookup of
//! each kind.

use crate::enterprise::EnterpriseProjectClient;
use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::IamClient;
use crate::models::{EnterpriseProject, Project};
use crate::scope::{DomainId, EnterpriseProjectId, ProjectId, ScopeKind, ScopeTarget};
use std::collections::HashMap;
use tracing::debug;

pub async fn fetch_all_projects(
    iam: &dyn IamClient,
    domain_id: &str
) -> AgencySyncResult<Vec<Project>> {
    let mut all_projects = Vec::new();
    let mut page = 1;

    loop {
        let result = iam.list_projects(domain_id, page).await?;
        all_projects.extend(result.projects);

        if !result.has_more {
            break;
        }
        page += 1;
    }

    Ok(all_projects)
}

pub async fn fetch_all_enterprise_projects(
    client: &dyn EnterpriseProjectClient
) -> AgencySyncResult<Vec<EnterpriseProject>> {
    let mut all_projects = Vec::new();
    let mut offset = 0;

    loop {
        let page = client.list_enterprise_projects(offset).await?;
        all_projects.extend(page.enterprise_projects);

        match page.next_offset {
            Some(next) => offset = next,
            None => break
        }
    }

    Ok(all_projects)
}

/// Indexes by exact name; the first entry listed under a name wins.
fn index_by_name<I>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>
{
    let mut index = HashMap::new();
    for (name, id) in entries {
        index.entry(name).or_insert(id);
    }
    index
}

pub struct ScopeResolver<'a> {
    iam: &'a dyn IamClient,
    enterprise: Option<&'a dyn EnterpriseProjectClient>,
    domain_id: &'a str,
    projects: Option<HashMap<String, String>>,
    enterprise_projects: Option<HashMap<String, String>>
}

impl<'a> ScopeResolver<'a> {
    pub fn new(
        iam: &'a dyn IamClient,
        enterprise: Option<&'a dyn EnterpriseProjectClient>,
        domain_id: &'a str
    ) -> Self {
        Self {
            iam,
            enterprise,
            domain_id,
            projects: None,
            enterprise_projects: None
        }
    }

    pub async fn project_id(&mut self, name: &str) -> AgencySyncResult<ProjectId> {
        if self.projects.is_none() {
            let projects = fetch_all_projects(self.iam, self.domain_id)
                .await
                .map_err(AgencySyncError::listing("projects"))?;
            debug!(count = projects.len(), "Cached project listing");
            self.projects = Some(index_by_name(projects.into_iter().map(|p| (p.name, p.id))));
        }

        self.projects
            .as_ref()
            .and_then(|index| index.get(name))
            .map(ProjectId::new)
            .ok_or_else(|| AgencySyncError::ProjectNotFound(name.to_string()))
    }

    pub async fn enterprise_project_id(
        &mut self,
        name: &str
    ) -> AgencySyncResult<EnterpriseProjectId> {
        if self.enterprise_projects.is_none() {
            let client = self.enterprise.ok_or_else(|| {
                AgencySyncError::ConfigError(
                    "enterprise project bindings require the enterprise_project_endpoint"
                        .to_string()
                )
            })?;
            let projects = fetch_all_enterprise_projects(client)
                .await
                .map_err(AgencySyncError::listing("enterprise projects"))?;
            debug!(count = projects.len(), "Cached enterprise project listing");
            self.enterprise_projects =
                Some(index_by_name(projects.into_iter().map(|p| (p.name, p.id))));
        }

        self.enterprise_projects
            .as_ref()
            .and_then(|index| index.get(name))
            .map(EnterpriseProjectId::new)
            .ok_or_else(|| AgencySyncError::EnterpriseProjectNotFound(name.to_string()))
    }

    /// Resolves the scope half of a binding key. Account-wide kinds ignore
    /// the name and target the configured account.
    pub async fn resolve(&mut self, kind: ScopeKind, name: &str) -> AgencySyncResult<ScopeTarget> {
        match kind {
            ScopeKind::Project => Ok(ScopeTarget::Project(self.project_id(name).await?)),
            ScopeKind::Domain => Ok(ScopeTarget::Domain(DomainId::new(self.domain_id))),
            ScopeKind::AllResources => Ok(ScopeTarget::AllResources(DomainId::new(self.domain_id))),
            ScopeKind::EnterpriseProject => Ok(ScopeTarget::EnterpriseProject(
                self.enterprise_project_id(name).await?
            ))
        }
    }
}
