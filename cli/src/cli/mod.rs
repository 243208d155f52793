pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bearer-relay")]
#[command(author, version, about = "Inject a bearer credential into protected requests without the page handling it")]
pub struct Cli {
    /// Path to config file (checked in order: local config.toml, ~/.config/bearer-relay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interception proxy and its HTTP ingress
    Start {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the demo origin serving a restricted image
    Origin {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load a restricted resource through an in-process proxy
    Fetch {
        /// Resource URL
        url: String,

        /// Write the body here instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show effective configuration and proxy status
    Status,

    /// Print the SHA-256 digest of an API key for the origin config
    HashKey {
        key: String,
    },
}
