//! Tessera CLI - catalog browsing and job control.
//!
//! The main entry point for the `tessera` CLI binary.

use anyhow::Result;
use clap::Parser;
use tessera_cli::{Cli, Commands};
use tessera_core::{LogFormat, init_logging_with_default};

fn main() -> Result<()> {
    // Initialize tracing
    init_logging_with_default(LogFormat::Compact, "warn");

    let cli = Cli::parse();
    let config = cli.config();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Assets(args) => tessera_cli::commands::assets::execute(args, &config).await,
            Commands::Run(args) => tessera_cli::commands::run::execute(args, &config).await,
            Commands::Watch(args) => tessera_cli::commands::watch::execute(&args, &config).await,
            Commands::Cancel(args) => tessera_cli::commands::jobs::cancel(&args, &config).await,
            Commands::Finish(args) => tessera_cli::commands::jobs::finish(&args, &config).await,
            Commands::Message(args) => tessera_cli::commands::jobs::message(args, &config).await,
        }
    })
}
