pub mod agency;
pub mod audit;
pub mod reconcile;

use agency_sync::{AgencyBindings, AgencySyncConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::ux_error;

#[derive(Parser)]
#[command(
    name = "agencyctl",
    author,
    version,
    about = "agencyctl - converge and audit agency role bindings",
    long_about = "Applies declared role bindings to an agency and reads back what is \
                  actually bound.\n\nConfiguration comes from AGENCY_SYNC_* environment \
                  variables unless --config points at a YAML, TOML or JSON file."
)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, global = true, env = "AGENCY_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Converge an agency's role bindings from one declaration to another")]
    Reconcile(reconcile::ReconcileArgs),

    #[command(about = "Read an agency's current role bindings")]
    Audit(audit::AuditArgs),

    #[command(subcommand, about = "Inspect or delete an agency")]
    Agency(agency::AgencyCommand)
}

pub fn load_config(path: Option<&Path>) -> Result<AgencySyncConfig> {
    let loaded = match path {
        Some(path) => AgencySyncConfig::from_file(path),
        None => AgencySyncConfig::from_env()
    };
    loaded.map_err(|e| ux_error::config_invalid(path, &e.to_string()).into())
}

/// Reads a declaration file; `.json` is parsed as JSON, anything else as YAML.
pub fn load_declaration(path: &Path) -> Result<AgencyBindings> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ux_error::declaration_unreadable(path, &e.to_string()))?;

    let parsed = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| ux_error::declaration_unreadable(path, &reason).into())
}
