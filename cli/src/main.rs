use clap::Parser;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bearer_relay=info".parse()?)
                .add_directive("bearer_relay_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { port } => {
            cli::commands::start::run(cli.config, port).await?;
        }
        Commands::Origin { port } => {
            cli::commands::origin::run(cli.config, port).await?;
        }
        Commands::Fetch { url, output } => {
            cli::commands::fetch::run(cli.config, url, output).await?;
        }
        Commands::Status => {
            cli::commands::status::run(cli.config).await?;
        }
        Commands::HashKey { key } => {
            cli::commands::hash_key::run(&key);
        }
    }

    Ok(())
}
