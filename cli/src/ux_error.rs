use agency_sync::AgencySyncError;
use colored::Colorize;
use std::path::Path;

#[derive(Debug)]
pub struct UxError {
    pub what: String,
    pub why: Option<String>,
    pub how_to_fix: Vec<String>,
    pub suggested_command: Option<String>
}

impl UxError {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: None,
            how_to_fix: Vec::new(),
            suggested_command: None
        }
    }

    pub fn why(mut self, reason: impl Into<String>) -> Self {
        self.why = Some(reason.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.how_to_fix.push(suggestion.into());
        self
    }

    pub fn suggest(mut self, cmd: impl Into<String>) -> Self {
        self.suggested_command = Some(cmd.into());
        self
    }

    pub fn display(&self) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), self.what.white().bold());

        if let Some(why) = &self.why {
            eprintln!("       {}", why.dimmed());
        }

        if !self.how_to_fix.is_empty() {
            eprintln!();
            eprintln!("{}", "How to fix:".yellow().bold());
            for (i, fix) in self.how_to_fix.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, fix);
            }
        }

        if let Some(cmd) = &self.suggested_command {
            eprintln!();
            eprintln!("{}", "Try this:".green().bold());
            eprintln!("  $ {}", cmd.cyan());
        }
        eprintln!();
    }
}

impl std::fmt::Display for UxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl std::error::Error for UxError {}

pub fn config_invalid(path: Option<&Path>, reason: &str) -> UxError {
    let source = path.map_or_else(
        || "AGENCY_SYNC_* environment".to_string(),
        |p| p.display().to_string()
    );
    UxError::new(format!("Invalid configuration from {}", source))
        .why(reason.to_string())
        .fix("Set AGENCY_SYNC_IAM_ENDPOINT, AGENCY_SYNC_DOMAIN_ID and AGENCY_SYNC_AUTH_TOKEN")
        .fix("Or pass a configuration file with --config")
        .suggest("agencyctl --config agency-sync.yaml audit --agency-id <ID>")
}

pub fn declaration_unreadable(path: &Path, reason: &str) -> UxError {
    UxError::new(format!("Cannot read declaration '{}'", path.display()))
        .why(reason.to_string())
        .fix("Declarations are YAML, or JSON when the file ends in .json")
        .fix("Use the output of `agencyctl audit` as a starting point")
}

pub fn rate_limited(retry_after: u64) -> UxError {
    UxError::new("Rate limit exceeded")
        .why(format!(
            "The IAM service asked to retry after {} seconds",
            retry_after
        ))
        .fix("Wait before retrying")
        .fix("Lower audit.requests_per_second in the configuration")
}

pub fn authentication_failed() -> UxError {
    UxError::new("Authentication failed")
        .why("The IAM service rejected the auth token")
        .fix("Refresh the token and update AGENCY_SYNC_AUTH_TOKEN")
}

/// Turns the failures a user can act on into guided errors; everything else
/// passes through unchanged.
pub fn from_sync_error(err: AgencySyncError) -> anyhow::Error {
    match &err {
        AgencySyncError::AuthenticationError(_) => authentication_failed().into(),
        AgencySyncError::RateLimited {
            retry_after_seconds
        } => rate_limited(*retry_after_seconds).into(),
        AgencySyncError::ProjectNotFound(name) => {
            UxError::new(format!("Project '{}' does not exist", name))
                .why("Every project named in the declaration must exist in the account")
                .fix("Check the spelling; project names are case-sensitive")
                .into()
        }
        AgencySyncError::EnterpriseProjectNotFound(name) => {
            UxError::new(format!("Enterprise project '{}' does not exist", name))
                .why("Every enterprise project named in the declaration must exist")
                .fix("Check the spelling; names are case-sensitive")
                .into()
        }
        AgencySyncError::RoleNotFound(name) => {
            UxError::new(format!("Role '{}' does not exist", name))
                .why("Roles are referenced by display name, system or custom")
                .fix("Check the spelling of the role's display name")
                .into()
        }
        _ => err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_fixes() {
        let err = UxError::new("boom").why("because").fix("one").fix("two").suggest("cmd");
        assert_eq!(err.how_to_fix.len(), 2);
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.suggested_command.as_deref(), Some("cmd"));
    }

    #[test]
    fn test_unknown_project_becomes_guided() {
        let err = from_sync_error(AgencySyncError::ProjectNotFound("proj-x".to_string()));
        let ux = err.downcast_ref::<UxError>().unwrap();
        assert!(ux.what.contains("proj-x"));
    }

    #[test]
    fn test_api_errors_pass_through() {
        let err = from_sync_error(AgencySyncError::ApiError {
            status: 500,
            message: "boom".to_string()
        });
        assert!(err.downcast_ref::<UxError>().is_none());
        assert!(err.downcast_ref::<AgencySyncError>().is_some());
    }

    #[test]
    fn test_config_invalid_names_source() {
        let err = config_invalid(None, "the domain_id must be specified");
        assert!(err.what.contains("environment"));
        let err = config_invalid(Some(Path::new("cfg.yaml")), "bad");
        assert!(err.what.contains("cfg.yaml"));
    }
}
