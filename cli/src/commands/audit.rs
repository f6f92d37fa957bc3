//! Audit command - read back what is actually bound to an agency
//!
//! The YAML printed by default is a valid declaration, so it can be saved
//! and passed to `reconcile --old` on the next run.

use agency_sync::{
    AuditReport, BindingAuditor, create_enterprise_project_client, create_iam_client,
};
use anyhow::Result;
use clap::Args;
use std::path::Path;

use crate::{output, ux_error};

#[derive(Args)]
pub struct AuditArgs {
    /// Agency whose role bindings are read
    #[arg(long)]
    pub agency_id: String,

    /// Output the full report as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: AuditArgs, config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    let iam = create_iam_client(&config)?;
    let enterprise = create_enterprise_project_client(&config)?;

    let report = BindingAuditor::new(&config, iam, enterprise)
        .audit(&args.agency_id)
        .await
        .map_err(ux_error::from_sync_error)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report)
}

fn print_report(report: &AuditReport) -> Result<()> {
    if report.bindings.is_empty() {
        println!("{{}}");
    } else {
        print!("{}", serde_yaml::to_string(&report.bindings)?);
    }

    for omitted in &report.omitted {
        output::warn(&format!(
            "{} {} could not be read: {}",
            omitted.scope_kind, omitted.scope, omitted.error
        ));
    }
    if !report.is_complete() {
        output::warn("The bindings above are incomplete; do not use them as --old");
    }
    Ok(())
}
