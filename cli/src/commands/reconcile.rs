//! Reconcile command - converge an agency from one declaration to another
//!
//! Removals are applied before additions within each scope kind. With
//! `--dry-run` only the plan is computed and nothing is sent.

use agency_sync::{
    ReconcileReport, ReconcileService, ScopeKind, create_enterprise_project_client,
    create_iam_client,
};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::{output, ux_error};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Agency whose role bindings are converged
    #[arg(long)]
    pub agency_id: String,

    /// Previously applied declaration (YAML or JSON)
    #[arg(long)]
    pub old: PathBuf,

    /// Desired declaration (YAML or JSON)
    #[arg(long)]
    pub new: PathBuf,

    /// Compute the plan without calling the IAM service
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: ReconcileArgs, config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    let old = super::load_declaration(&args.old)?;
    let new = super::load_declaration(&args.new)?;

    let iam = create_iam_client(&config)?;
    let enterprise = create_enterprise_project_client(&config)?;
    let service = ReconcileService::new(config, iam, enterprise);

    let report = if args.dry_run {
        service.dry_run(&args.agency_id, &old, &new)
    } else {
        service
            .reconcile(&args.agency_id, &old, &new)
            .await
            .map_err(ux_error::from_sync_error)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    output::header("Role Reconciliation");
    println!();
    output::field("Agency", &report.agency_id);
    println!();

    if report.plan.is_empty() {
        println!("{}", "  ✓ Already in sync".green());
        return;
    }

    for (kind, diff) in &report.plan.changes {
        output::subheader(&format!("{} bindings", kind_title(*kind)));
        for key in &diff.remove {
            output::removal(key);
        }
        for key in &diff.add {
            output::addition(key);
        }

        if !report.dry_run {
            let counts = report.counts(*kind);
            println!(
                "  {} attached, {} detached, {} already absent, {} skipped",
                counts.attached.to_string().green(),
                counts.detached.to_string().red(),
                counts.already_absent.to_string().yellow(),
                counts.skipped.to_string().yellow()
            );
        }
        println!();
    }

    if report.dry_run {
        output::hint("Remove --dry-run to apply changes");
    } else {
        output::success(&format!("{} calls issued", report.total_calls()));
    }
}

fn kind_title(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Project => "Project",
        ScopeKind::Domain => "Domain",
        ScopeKind::AllResources => "All-resources",
        ScopeKind::EnterpriseProject => "Enterprise project"
    }
}
