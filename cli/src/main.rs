use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;
pub mod ux_error;

use commands::{Cli, Commands};
use ux_error::UxError;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Reconcile(args) => commands::reconcile::run(args, config).await,
        Commands::Audit(args) => commands::audit::run(args, config).await,
        Commands::Agency(cmd) => commands::agency::run(cmd, config).await
    };

    if let Err(e) = &result {
        if let Some(ux) = e.downcast_ref::<UxError>() {
            ux.display();
            std::process::exit(1);
        }
    }
    result
}
