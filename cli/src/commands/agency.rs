use agency_sync::agency::normalize_duration;
use agency_sync::{AgencyService, Delegate, create_iam_client};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use crate::{output, ux_error};

#[derive(Subcommand)]
pub enum AgencyCommand {
    #[command(about = "Show an agency's metadata")]
    Show(AgencyArgs),

    #[command(about = "Delete an agency")]
    Delete(AgencyArgs)
}

#[derive(Args)]
pub struct AgencyArgs {
    #[arg(long)]
    pub agency_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(cmd: AgencyCommand, config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    let service = AgencyService::new(&config, create_iam_client(&config)?);

    match cmd {
        AgencyCommand::Show(args) => show(&service, &args).await,
        AgencyCommand::Delete(args) => delete(&service, &args).await
    }
}

async fn show(service: &AgencyService, args: &AgencyArgs) -> Result<()> {
    let agency = service
        .get(&args.agency_id)
        .await
        .map_err(ux_error::from_sync_error)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&agency)?);
        return Ok(());
    }

    let delegate = Delegate::classify(&agency.delegated_domain_name);
    let delegate_label = if delegate.is_service() {
        "Delegated service"
    } else {
        "Delegated domain"
    };

    output::header(&agency.name);
    println!();
    output::field("ID", &agency.id);
    output::field(delegate_label, delegate.name());
    output::field("Duration (days)", &normalize_duration(&agency.duration));
    if let Some(description) = agency.description.as_deref() {
        output::field("Description", description);
    }
    if let Some(expire_time) = agency.expire_time.as_deref() {
        output::field("Expires", expire_time);
    }
    Ok(())
}

async fn delete(service: &AgencyService, args: &AgencyArgs) -> Result<()> {
    service
        .delete(&args.agency_id)
        .await
        .map_err(ux_error::from_sync_error)?;

    if args.json {
        println!("{}", serde_json::json!({ "deleted": args.agency_id }));
    } else {
        output::success(&format!("Agency {} deleted", args.agency_id));
    }
    Ok(())
}
