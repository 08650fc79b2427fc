//! Run command - start a job.

use anyhow::Result;
use clap::{Args, Subcommand};
use owo_colors::OwoColorize;
use tessera_client::JobStatus;
use tessera_core::ProviderId;

use super::{api_client, format_status_colored, watch};
use crate::{Config, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// What to run.
    #[command(subcommand)]
    pub target: RunTarget,

    /// Print the job and return without following it.
    #[arg(long, short = 'd', global = true)]
    pub detach: bool,
}

/// Job kinds that can be started.
#[derive(Debug, Clone, Subcommand)]
pub enum RunTarget {
    /// Scan providers for new or changed assets.
    Sources {
        /// Providers to scan (comma-separated); all when omitted.
        #[arg(long = "provider", value_delimiter = ',')]
        providers: Vec<ProviderId>,
    },
    /// Run the processing pass over scanned assets.
    Processors,
    /// Run every analyzer.
    Analyzers,
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the job cannot be started, or if a followed job ends
/// in the `error` status.
pub async fn execute(args: RunArgs, config: &Config) -> Result<()> {
    let client = api_client(config)?;

    let job = match &args.target {
        RunTarget::Sources { providers } => client.run_sources(providers).await?,
        RunTarget::Processors => client.run_processors().await?,
        RunTarget::Analyzers => client.run_analyzers().await?,
    };
    tracing::info!(job_id = %job.id, status = %job.status, "job started");

    if args.detach {
        match config.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
            OutputFormat::Text | OutputFormat::Table => {
                println!("{} Job started", "✓".green());
                println!("  Job ID: {}", job.id);
                println!("  Status: {}", format_status_colored(job.status));
                println!();
                println!("Follow it with: tessera watch {}", job.id);
            }
        }
        return Ok(());
    }

    let view = watch::follow(client, job, config).await?;
    if view.job.status == JobStatus::Error {
        anyhow::bail!("Job {} failed", view.job.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_run_args_sources_with_providers() {
        let cli = TestCli::parse_from(["test", "sources", "--provider", "1,4", "--detach"]);
        assert!(cli.args.detach);
        match cli.args.target {
            RunTarget::Sources { providers } => {
                assert_eq!(providers, vec![ProviderId::new(1), ProviderId::new(4)]);
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn test_run_args_analyzers() {
        let cli = TestCli::parse_from(["test", "analyzers"]);
        assert!(!cli.args.detach);
        assert!(matches!(cli.args.target, RunTarget::Analyzers));
    }

    #[test]
    fn test_run_args_sources_default_to_all() {
        let cli = TestCli::parse_from(["test", "sources"]);
        assert!(matches!(
            cli.args.target,
            RunTarget::Sources { ref providers } if providers.is_empty()
        ));
    }
}
