use crate::config::AgencySyncConfig;
use crate::error::{AgencySyncError, AgencySyncResult};
use crate::models::{
    Agency, AgencyEnvelope, CreateAgencyRequest, EnterpriseRoleAssignment, ProjectPage,
    ProjectsEnvelope, Role, RolePage, RolesEnvelope, UpdateAgencyRequest
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// The IAM API surface the reconciliation core consumes.
///
/// Each binding family has its own trio of calls; the families are never
/// aliases of one another even where their signatures coincide.
#[async_trait]
pub trait IamClient: Send + Sync {
    /// Lists one page of roles. `None` lists system roles, `Some(domain)`
    /// the custom roles defined under that account.
    async fn list_roles(&self, domain_id: Option<&str>, page: u32) -> AgencySyncResult<RolePage>;
    async fn list_projects(&self, domain_id: &str, page: u32) -> AgencySyncResult<ProjectPage>;

    async fn attach_project_role(
        &self,
        agency_id: &str,
        project_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()>;
    async fn detach_project_role(
        &self,
        agency_id: &str,
        project_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()>;
    async fn list_project_roles(
        &self,
        agency_id: &str,
        project_id: &str
    ) -> AgencySyncResult<Vec<Role>>;

    async fn attach_domain_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()>;
    async fn detach_domain_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()>;
    async fn list_domain_roles(&self, agency_id: &str, domain_id: &str)
    -> AgencySyncResult<Vec<Role>>;

    async fn attach_inherited_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()>;
    async fn detach_inherited_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()>;
    async fn list_inherited_roles(
        &self,
        agency_id: &str,
        domain_id: &str
    ) -> AgencySyncResult<Vec<Role>>;

    async fn attach_enterprise_project_roles(
        &self,
        assignments: &[EnterpriseRoleAssignment]
    ) -> AgencySyncResult<()>;
    async fn detach_enterprise_project_roles(
        &self,
        assignments: &[EnterpriseRoleAssignment]
    ) -> AgencySyncResult<()>;
    async fn list_enterprise_project_roles(
        &self,
        agency_id: &str,
        enterprise_project_id: &str
    ) -> AgencySyncResult<Vec<Role>>;

    async fn create_agency(&self, request: &CreateAgencyRequest) -> AgencySyncResult<Agency>;
    async fn get_agency(&self, agency_id: &str) -> AgencySyncResult<Agency>;
    async fn update_agency(
        &self,
        agency_id: &str,
        request: &UpdateAgencyRequest
    ) -> AgencySyncResult<Agency>;
    async fn delete_agency(&self, agency_id: &str) -> AgencySyncResult<()>;
}

pub struct HttpIamClient {
    client: Client,
    endpoint: String,
    auth_token: String,
    page_size: u32
}

#[derive(Serialize)]
struct RoleAssignmentsBody<'a> {
    role_assignments: &'a [EnterpriseRoleAssignment]
}

impl HttpIamClient {
    pub fn new(config: &AgencySyncConfig) -> AgencySyncResult<Self> {
        let client = build_http_client(config)?;

        Ok(Self {
            client,
            endpoint: config.iam_endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            page_size: config.page_size
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(method = %method, url = %url, "Making IAM API request");

        self.client
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.auth_token)
            .header("Accept", "application/json")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AgencySyncResult<T> {
        let response = check_response(self.request(Method::GET, path).send().await?, path).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, method: Method, path: &str) -> AgencySyncResult<()> {
        check_response(self.request(method, path).send().await?, path).await?;
        Ok(())
    }

    async fn send_assignments(
        &self,
        method: Method,
        assignments: &[EnterpriseRoleAssignment]
    ) -> AgencySyncResult<()> {
        let path = "/v3.0/OS-PERMISSION/subjects/agency/scopes/enterprise-project/role-assignments";
        let body = RoleAssignmentsBody {
            role_assignments: assignments
        };
        check_response(self.request(method, path).json(&body).send().await?, path).await?;
        Ok(())
    }

    fn project_role_path(agency_id: &str, project_id: &str) -> String {
        format!(
            "/v3.0/OS-AGENCY/projects/{}/agencies/{}/roles",
            project_id, agency_id
        )
    }

    fn domain_role_path(agency_id: &str, domain_id: &str) -> String {
        format!(
            "/v3.0/OS-AGENCY/domains/{}/agencies/{}/roles",
            domain_id, agency_id
        )
    }

    fn inherited_role_path(agency_id: &str, domain_id: &str, role_id: Option<&str>) -> String {
        match role_id {
            Some(role_id) => format!(
                "/v3.0/OS-INHERIT/domains/{}/agencies/{}/roles/{}/inherited_to_projects",
                domain_id, agency_id, role_id
            ),
            None => format!(
                "/v3.0/OS-INHERIT/domains/{}/agencies/{}/roles/inherited_to_projects",
                domain_id, agency_id
            )
        }
    }
}

#[async_trait]
impl IamClient for HttpIamClient {
    async fn list_roles(&self, domain_id: Option<&str>, page: u32) -> AgencySyncResult<RolePage> {
        let mut path = format!("/v3/roles?page={}&per_page={}", page, self.page_size);
        if let Some(domain_id) = domain_id {
            path.push_str(&format!("&domain_id={}", urlencoding::encode(domain_id)));
        }

        let envelope: RolesEnvelope = self.get_json(&path).await?;
        let has_more = envelope.roles.len() >= self.page_size as usize;
        Ok(RolePage {
            roles: envelope.roles,
            has_more
        })
    }

    async fn list_projects(&self, domain_id: &str, page: u32) -> AgencySyncResult<ProjectPage> {
        let path = format!(
            "/v3/projects?domain_id={}&page={}&per_page={}",
            urlencoding::encode(domain_id),
            page,
            self.page_size
        );

        let envelope: ProjectsEnvelope = self.get_json(&path).await?;
        let has_more = envelope.projects.len() >= self.page_size as usize;
        Ok(ProjectPage {
            projects: envelope.projects,
            has_more
        })
    }

    async fn attach_project_role(
        &self,
        agency_id: &str,
        project_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        let path = format!("{}/{}", Self::project_role_path(agency_id, project_id), role_id);
        self.send_empty(Method::PUT, &path).await
    }

    async fn detach_project_role(
        &self,
        agency_id: &str,
        project_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        let path = format!("{}/{}", Self::project_role_path(agency_id, project_id), role_id);
        self.send_empty(Method::DELETE, &path).await
    }

    async fn list_project_roles(
        &self,
        agency_id: &str,
        project_id: &str
    ) -> AgencySyncResult<Vec<Role>> {
        let envelope: RolesEnvelope = self
            .get_json(&Self::project_role_path(agency_id, project_id))
            .await?;
        Ok(envelope.roles)
    }

    async fn attach_domain_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        let path = format!("{}/{}", Self::domain_role_path(agency_id, domain_id), role_id);
        self.send_empty(Method::PUT, &path).await
    }

    async fn detach_domain_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        let path = format!("{}/{}", Self::domain_role_path(agency_id, domain_id), role_id);
        self.send_empty(Method::DELETE, &path).await
    }

    async fn list_domain_roles(
        &self,
        agency_id: &str,
        domain_id: &str
    ) -> AgencySyncResult<Vec<Role>> {
        let envelope: RolesEnvelope = self
            .get_json(&Self::domain_role_path(agency_id, domain_id))
            .await?;
        Ok(envelope.roles)
    }

    async fn attach_inherited_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        let path = Self::inherited_role_path(agency_id, domain_id, Some(role_id));
        self.send_empty(Method::PUT, &path).await
    }

    async fn detach_inherited_role(
        &self,
        agency_id: &str,
        domain_id: &str,
        role_id: &str
    ) -> AgencySyncResult<()> {
        let path = Self::inherited_role_path(agency_id, domain_id, Some(role_id));
        self.send_empty(Method::DELETE, &path).await
    }

    async fn list_inherited_roles(
        &self,
        agency_id: &str,
        domain_id: &str
    ) -> AgencySyncResult<Vec<Role>> {
        let envelope: RolesEnvelope = self
            .get_json(&Self::inherited_role_path(agency_id, domain_id, None))
            .await?;
        Ok(envelope.roles)
    }

    async fn attach_enterprise_project_roles(
        &self,
        assignments: &[EnterpriseRoleAssignment]
    ) -> AgencySyncResult<()> {
        self.send_assignments(Method::PUT, assignments).await
    }

    async fn detach_enterprise_project_roles(
        &self,
        assignments: &[EnterpriseRoleAssignment]
    ) -> AgencySyncResult<()> {
        self.send_assignments(Method::DELETE, assignments).await
    }

    async fn list_enterprise_project_roles(
        &self,
        agency_id: &str,
        enterprise_project_id: &str
    ) -> AgencySyncResult<Vec<Role>> {
        let path = format!(
            "/v3.0/OS-PERMISSION/enterprise-projects/{}/agencies/{}/roles",
            enterprise_project_id, agency_id
        );
        let envelope: RolesEnvelope = self.get_json(&path).await?;
        Ok(envelope.roles)
    }

    async fn create_agency(&self, request: &CreateAgencyRequest) -> AgencySyncResult<Agency> {
        let path = "/v3.0/OS-AGENCY/agencies";
        let body = AgencyEnvelope { agency: request };
        let response = check_response(
            self.request(Method::POST, path).json(&body).send().await?,
            path
        )
        .await?;
        let envelope: AgencyEnvelope<Agency> = response.json().await?;
        Ok(envelope.agency)
    }

    async fn get_agency(&self, agency_id: &str) -> AgencySyncResult<Agency> {
        let envelope: AgencyEnvelope<Agency> = self
            .get_json(&format!("/v3.0/OS-AGENCY/agencies/{}", agency_id))
            .await?;
        Ok(envelope.agency)
    }

    async fn update_agency(
        &self,
        agency_id: &str,
        request: &UpdateAgencyRequest
    ) -> AgencySyncResult<Agency> {
        let path = format!("/v3.0/OS-AGENCY/agencies/{}", agency_id);
        let body = AgencyEnvelope { agency: request };
        let response = check_response(
            self.request(Method::PUT, &path).json(&body).send().await?,
            &path
        )
        .await?;
        let envelope: AgencyEnvelope<Agency> = response.json().await?;
        Ok(envelope.agency)
    }

    async fn delete_agency(&self, agency_id: &str) -> AgencySyncResult<()> {
        self.send_empty(Method::DELETE, &format!("/v3.0/OS-AGENCY/agencies/{}", agency_id))
            .await
    }
}

pub(crate) fn build_http_client(config: &AgencySyncConfig) -> AgencySyncResult<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(AgencySyncError::HttpError)
}

/// Maps non-success statuses onto the error taxonomy; success passes through.
pub(crate) async fn check_response(response: Response, path: &str) -> AgencySyncResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(AgencySyncError::NotFound(path.to_string())),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            Err(AgencySyncError::RateLimited {
                retry_after_seconds: retry_after
            })
        }
        StatusCode::UNAUTHORIZED => Err(AgencySyncError::AuthenticationError(
            "IAM rejected the auth token".to_string()
        )),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(AgencySyncError::ApiError {
                status: status.as_u16(),
                message: body
            })
        }
    }
}

pub fn create_iam_client(config: &AgencySyncConfig) -> AgencySyncResult<Arc<dyn IamClient>> {
    Ok(Arc::new(HttpIamClient::new(config)?))
}
