//! toolpin - declarative CLI tool version manager

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use toolpin_cli::cmd;
use toolpin_cli::cmd::install::InstallOptions;
use toolpin_cli::cmd::policy::TrustAction;
use toolpin_cli::{Cli, Commands, PolicyCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Install {
            only_link,
            test,
            policy,
            proxy,
            max_parallelism,
        } => {
            cmd::install::install(InstallOptions {
                config,
                only_link,
                test,
                policy: policy.as_deref(),
                proxy: proxy.as_deref(),
                max_parallelism,
            })
            .await
        }
        Commands::Which { command } => cmd::which::which(config, &command).await,
        Commands::Policy { action } => {
            let (path, action) = match action {
                PolicyCommand::Allow { path } => (path, TrustAction::Allow),
                PolicyCommand::Deny { path } => (path, TrustAction::Deny),
            };
            cmd::policy::trust(config, path.as_deref(), action).await
        }
    }
}
