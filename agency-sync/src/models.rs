use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_id: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<i64>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agency {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_id: String,
    /// The delegated principal: an account name or an `op_svc_*` service name.
    #[serde(rename = "trust_domain_name", default)]
    pub delegated_domain_name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Either `"FOREVER"` or a period in hours; the API returns both strings and integers.
    #[serde(default)]
    pub duration: Value,
    #[serde(default)]
    pub expire_time: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAgencyRequest {
    pub name: String,
    pub domain_id: String,
    #[serde(rename = "trust_domain_name")]
    pub delegated_domain_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAgencyRequest {
    #[serde(rename = "trust_domain_name", skip_serializing_if = "Option::is_none")]
    pub delegated_domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>
}

/// One entry of a bulk enterprise-project role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseRoleAssignment {
    pub agency_id: String,
    pub enterprise_project_id: String,
    pub role_id: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePage {
    pub roles: Vec<Role>,
    pub has_more: bool
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub has_more: bool
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseProjectPage {
    pub enterprise_projects: Vec<EnterpriseProject>,
    pub next_offset: Option<u32>
}

#[derive(Debug, Deserialize)]
pub(crate) struct RolesEnvelope {
    #[serde(default)]
    pub roles: Vec<Role>
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectsEnvelope {
    #[serde(default)]
    pub projects: Vec<Project>
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnterpriseProjectsEnvelope {
    #[serde(default)]
    pub enterprise_projects: Vec<EnterpriseProject>,
    #[serde(default)]
    pub total_count: u32
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AgencyEnvelope<T> {
    pub agency: T
}
