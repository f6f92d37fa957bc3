//! Agency metadata: create, read, update and delete, plus the helpers that
//! normalize what the remote reports back.

use crate::config::{AgencySyncConfig, RetryConfig};
use crate::declaration::AgencyBindings;
use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::IamClient;
use crate::models::{Agency, CreateAgencyRequest, UpdateAgencyRequest};
use crate::reconcile::{ReconcileReport, ReconcileService};
use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DURATION_FOREVER: &str = "FOREVER";
pub const DURATION_ONE_DAY: &str = "ONEDAY";

/// Who an agency delegates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delegate {
    /// Another account, addressed by its domain name.
    Domain(String),
    /// A cloud service, addressed by its `op_svc_*` name.
    Service(String)
}

impl Delegate {
    pub fn classify(name: &str) -> Self {
        static SERVICE_NAME: OnceLock<Option<Regex>> = OnceLock::new();
        let is_service = SERVICE_NAME
            .get_or_init(|| Regex::new("^op_svc_[A-Za-z]+$").ok())
            .as_ref()
            .is_some_and(|re| re.is_match(name));

        if is_service {
            Self::Service(name.to_string())
        } else {
            Self::Domain(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Domain(name) | Self::Service(name) => name
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

/// Normalizes a reported validity period: a period in hours becomes whole
/// days, any other string is kept, and anything else reads as `"FOREVER"`.
pub fn normalize_duration(duration: &Value) -> String {
    match duration {
        Value::String(s) => s
            .parse::<i64>()
            .map_or_else(|_| s.clone(), |hours| (hours / 24).to_string()),
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| DURATION_FOREVER.to_string(), |hours| (hours / 24).to_string()),
        _ => DURATION_FOREVER.to_string()
    }
}

/// Request value for a declared duration: an integer when it parses as one,
/// the raw string otherwise.
pub fn duration_param(duration: &str) -> Option<Value> {
    if duration.is_empty() {
        return None;
    }
    Some(
        duration
            .parse::<i64>()
            .map_or_else(|_| Value::String(duration.to_string()), Value::from)
    )
}

/// Compares a declared duration against a normalized one; `"ONEDAY"` equals `"1"`.
pub fn durations_equal(declared: &str, normalized: &str) -> bool {
    fn canonical(d: &str) -> &str {
        if d == DURATION_ONE_DAY { "1" } else { d }
    }
    canonical(declared) == canonical(normalized)
}

pub struct AgencyService {
    iam: Arc<dyn IamClient>,
    domain_id: String,
    retry: RetryConfig
}

impl AgencyService {
    pub fn new(config: &AgencySyncConfig, iam: Arc<dyn IamClient>) -> Self {
        Self {
            iam,
            domain_id: config.domain_id.clone(),
            retry: config.retry.clone()
        }
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(Some(Duration::from_secs(self.retry.max_elapsed_seconds)))
            .build()
    }

    pub async fn create(
        &self,
        name: &str,
        delegate: &Delegate,
        description: Option<&str>,
        duration: Option<&str>
    ) -> AgencySyncResult<Agency> {
        let request = CreateAgencyRequest {
            name: name.to_string(),
            domain_id: self.domain_id.clone(),
            delegated_domain_name: delegate.name().to_string(),
            description: description.map(ToString::to_string),
            duration: duration.and_then(duration_param)
        };

        let agency = self.iam.create_agency(&request).await?;
        info!(agency_id = %agency.id, name, service = delegate.is_service(), "Created agency");
        Ok(agency)
    }

    /// Creates the agency, then attaches every declared binding.
    pub async fn create_with_bindings(
        &self,
        name: &str,
        delegate: &Delegate,
        description: Option<&str>,
        duration: Option<&str>,
        bindings: &AgencyBindings,
        reconciler: &ReconcileService
    ) -> AgencySyncResult<(Agency, ReconcileReport)> {
        let agency = self.create(name, delegate, description, duration).await?;
        let report = reconciler
            .reconcile(&agency.id, &AgencyBindings::default(), bindings)
            .await?;
        Ok((agency, report))
    }

    pub async fn get(&self, agency_id: &str) -> AgencySyncResult<Agency> {
        self.iam.get_agency(agency_id).await
    }

    pub async fn update(
        &self,
        agency_id: &str,
        request: &UpdateAgencyRequest
    ) -> AgencySyncResult<Agency> {
        let agency = backoff::future::retry_notify(
            self.retry_policy(),
            || async move { self.iam.update_agency(agency_id, request).await.map_err(classify) },
            |e: AgencySyncError, delay: Duration| {
                warn!(agency_id, error = %e, delay = ?delay, "Retrying agency update");
            }
        )
        .await?;

        info!(agency_id, "Updated agency");
        Ok(agency)
    }

    /// Deleting an agency that no longer exists succeeds. Not-found is only
    /// retried within `not_found_window_seconds` of the first attempt.
    pub async fn delete(&self, agency_id: &str) -> AgencySyncResult<()> {
        let started = Instant::now();
        let not_found_window = Duration::from_secs(self.retry.not_found_window_seconds);
        let result = backoff::future::retry_notify(
            self.retry_policy(),
            || async move {
                self.iam.delete_agency(agency_id).await.map_err(|e| {
                    if e.is_not_found() && started.elapsed() >= not_found_window {
                        backoff::Error::permanent(e)
                    } else {
                        classify(e)
                    }
                })
            },
            |e: AgencySyncError, delay: Duration| {
                warn!(agency_id, error = %e, delay = ?delay, "Retrying agency deletion");
            }
        )
        .await;

        match result {
            Ok(()) => {
                info!(agency_id, "Deleted agency");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(agency_id, "Deleting an unavailable agency");
                Ok(())
            }
            Err(e) => Err(e)
        }
    }
}

/// The remote is eventually consistent: a freshly created agency may still
/// read as not found.
fn classify(e: AgencySyncError) -> backoff::Error<AgencySyncError> {
    if let Some(seconds) = e.retry_after() {
        return backoff::Error::retry_after(e, Duration::from_secs(seconds));
    }
    if e.is_not_found() || e.is_retryable() {
        backoff::Error::transient(e)
    } else {
        backoff::Error::permanent(e)
    }
}
