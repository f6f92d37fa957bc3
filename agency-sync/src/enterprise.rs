use crate::config::AgencySyncConfig;
use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::{AUTH_TOKEN_HEADER, build_http_client, check_response};
use crate::models::{EnterpriseProjectPage, EnterpriseProjectsEnvelope};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

/// Listing side of the enterprise-project service.
#[async_trait]
pub trait EnterpriseProjectClient: Send + Sync {
    async fn list_enterprise_projects(&self, offset: u32) -> AgencySyncResult<EnterpriseProjectPage>;
}

pub struct HttpEnterpriseProjectClient {
    client: Client,
    endpoint: String,
    auth_token: String,
    page_size: u32
}

impl HttpEnterpriseProjectClient {
    pub fn new(config: &AgencySyncConfig) -> AgencySyncResult<Self> {
        let endpoint = config.enterprise_project_endpoint.as_deref().ok_or_else(|| {
            AgencySyncError::ConfigError(
                "the enterprise_project_endpoint must be specified".to_string()
            )
        })?;

        Ok(Self {
            client: build_http_client(config)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            page_size: config.page_size
        })
    }
}

#[async_trait]
impl EnterpriseProjectClient for HttpEnterpriseProjectClient {
    async fn list_enterprise_projects(&self, offset: u32) -> AgencySyncResult<EnterpriseProjectPage> {
        let path = format!(
            "/v1.0/enterprise-projects?limit={}&offset={}",
            self.page_size, offset
        );
        let url = format!("{}{}", self.endpoint, path);
        debug!(url = %url, "Making enterprise project API request");

        let response = self
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, &self.auth_token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let envelope: EnterpriseProjectsEnvelope = check_response(response, &path).await?.json().await?;

        let fetched = envelope.enterprise_projects.len() as u32;
        let next = offset + fetched;
        let next_offset = (fetched > 0 && next < envelope.total_count).then_some(next);

        Ok(EnterpriseProjectPage {
            enterprise_projects: envelope.enterprise_projects,
            next_offset
        })
    }
}

/// Returns `None` when no enterprise-project endpoint is configured.
pub fn create_enterprise_project_client(
    config: &AgencySyncConfig
) -> AgencySyncResult<Option<Arc<dyn EnterpriseProjectClient>>> {
    if config.enterprise_project_endpoint.is_none() {
        return Ok(None);
    }
    Ok(Some(Arc::new(HttpEnterpriseProjectClient::new(config)?)))
}
