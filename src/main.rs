use anyhow::Result;
use clap::Parser;

use soda_workflow::cli::commands::{
    connect, copy::CopyCommand, geocoding::GeocodingCommand, publish::PublishCommand,
    resume::ResumeCommand, show_how_to_use, visibility::VisibilityCommand,
};
use soda_workflow::cli::{Cli, Commands};
use soda_workflow::config::{config, SodaWorkflowConfig};
use soda_workflow::shutdown::ShutdownCoordinator;
use soda_workflow::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return tokio::runtime::Runtime::new()?.block_on(show_how_to_use());
    };

    SodaWorkflowConfig::load_env_file()?;
    let config = config()?;
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        let shutdown = ShutdownCoordinator::new();
        shutdown.install_signal_handlers();
        let ctx = connect(config, shutdown.token())?;

        match command {
            Commands::Publish { dataset_id } => PublishCommand::new(dataset_id).execute(&ctx).await,
            Commands::Copy { dataset_id } => CopyCommand::new(dataset_id).execute(&ctx).await,
            Commands::Visibility {
                dataset_id,
                target,
                wait,
            } => {
                VisibilityCommand::new(dataset_id, target.visibility())
                    .with_wait(wait)
                    .execute(&ctx)
                    .await
            }
            Commands::Geocoding { dataset_id, wait } => {
                GeocodingCommand::new(dataset_id)
                    .with_wait(wait)
                    .execute(&ctx)
                    .await
            }
            Commands::Resume { discard } => {
                ResumeCommand::new().with_discard(discard).execute(&ctx).await
            }
        }
    })
}
