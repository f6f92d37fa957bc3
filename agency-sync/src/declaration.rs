use crate::scope::ScopeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoles {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub roles: BTreeSet<String>
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseProjectRoles {
    #[serde(default)]
    pub enterprise_project: String,
    #[serde(default)]
    pub roles: BTreeSet<String>
}

/// Declared role bindings of one agency, one collection per scope kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyBindings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_roles: Vec<ProjectRoles>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub domain_roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub all_resources_roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enterprise_project_roles: Vec<EnterpriseProjectRoles>
}

impl AgencyBindings {
    pub fn is_empty(&self) -> bool {
        ScopeKind::ALL.iter().all(|kind| self.pairs(*kind, "").is_empty())
    }

    /// Flattens one scope kind into (scope name, role name) pairs.
    ///
    /// Account-wide kinds use `domain_id` as the scope name so their keys
    /// stay comparable across snapshots.
    pub fn pairs(&self, kind: ScopeKind, domain_id: &str) -> Vec<(String, String)> {
        match kind {
            ScopeKind::Project => self
                .project_roles
                .iter()
                .flat_map(|pr| {
                    pr.roles
                        .iter()
                        .map(move |role| (pr.project.clone(), role.clone()))
                })
                .collect(),
            ScopeKind::Domain => account_pairs(&self.domain_roles, domain_id),
            ScopeKind::AllResources => account_pairs(&self.all_resources_roles, domain_id),
            ScopeKind::EnterpriseProject => self
                .enterprise_project_roles
                .iter()
                .flat_map(|er| {
                    er.roles
                        .iter()
                        .map(move |role| (er.enterprise_project.clone(), role.clone()))
                })
                .collect()
        }
    }
}

fn account_pairs(roles: &BTreeSet<String>, domain_id: &str) -> Vec<(String, String)> {
    roles
        .iter()
        .map(|role| (domain_id.to_string(), role.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_partial_declaration() {
        let bindings: AgencyBindings = serde_json::from_value(json!({
            "project_roles": [
                { "project": "proj-a", "roles": ["Admin", "Viewer", "Admin"] },
                { "roles": ["Orphan"] }
            ],
            "all_resources_roles": ["NetworkAdmin"]
        }))
        .unwrap();

        assert_eq!(bindings.project_roles.len(), 2);
        assert_eq!(bindings.project_roles[0].roles.len(), 2);
        assert!(bindings.project_roles[1].project.is_empty());
        assert!(bindings.domain_roles.is_empty());
    }

    #[test]
    fn test_pairs_per_kind() {
        let bindings = AgencyBindings {
            project_roles: vec![ProjectRoles {
                project: "proj-a".to_string(),
                roles: BTreeSet::from(["Admin".to_string(), "Viewer".to_string()])
            }],
            domain_roles: BTreeSet::from(["Billing".to_string()]),
            ..Default::default()
        };

        let project = bindings.pairs(ScopeKind::Project, "d1");
        assert_eq!(
            project,
            vec![
                ("proj-a".to_string(), "Admin".to_string()),
                ("proj-a".to_string(), "Viewer".to_string())
            ]
        );
        assert_eq!(
            bindings.pairs(ScopeKind::Domain, "d1"),
            vec![("d1".to_string(), "Billing".to_string())]
        );
        assert!(bindings.pairs(ScopeKind::AllResources, "d1").is_empty());
        assert!(!bindings.is_empty());
        assert!(AgencyBindings::default().is_empty());
    }

    #[test]
    fn test_serialization_omits_empty_kinds() {
        let bindings = AgencyBindings {
            domain_roles: BTreeSet::from(["Billing".to_string()]),
            ..Default::default()
        };
        let json = serde_json::to_value(&bindings).unwrap();
        assert_eq!(json, json!({ "domain_roles": ["Billing"] }));
    }
}
