use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::IamClient;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Role display name to role ID, system roles overlaid by account custom roles.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    by_name: HashMap<String, String>
}

impl RoleCatalog {
    /// Builds the catalog for `domain_id`. An empty `domain_id` yields the
    /// system roles only. Any listing error aborts the load.
    pub async fn load(iam: &dyn IamClient, domain_id: &str) -> AgencySyncResult<Self> {
        let mut by_name = list_roles_by_name(iam, None)
            .await
            .map_err(AgencySyncError::listing("system-defined roles"))?;

        if !domain_id.is_empty() {
            let custom = list_roles_by_name(iam, Some(domain_id))
                .await
                .map_err(AgencySyncError::listing("custom roles"))?;
            by_name.extend(custom);
        }

        debug!(roles = by_name.len(), "Loaded role catalog");
        Ok(Self { by_name })
    }

    pub fn from_entries<I, N, R>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, R)>,
        N: Into<String>,
        R: Into<String>
    {
        Self {
            by_name: entries
                .into_iter()
                .map(|(n, r)| (n.into(), r.into()))
                .collect()
        }
    }

    pub fn role_id(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> AgencySyncResult<&str> {
        self.role_id(name)
            .ok_or_else(|| AgencySyncError::RoleNotFound(name.to_string()))
    }
}

async fn list_roles_by_name(
    iam: &dyn IamClient,
    domain_id: Option<&str>
) -> AgencySyncResult<HashMap<String, String>> {
    let mut roles = HashMap::new();
    let mut page = 1;

    loop {
        let result = iam.list_roles(domain_id, page).await?;
        for role in result.roles {
            match role.display_name {
                Some(display_name) if !display_name.is_empty() => {
                    roles.insert(display_name, role.id);
                }
                _ => warn!(role = %role.name, role_id = %role.id, "Role without display name")
            }
        }

        if !result.has_more {
            break;
        }
        page += 1;
    }

    Ok(roles)
}
