//! Experiment generator CLI
//!
//! Reads an Application definition and the Kubernetes manifests it refers to, and
//! writes an optimization Experiment (plus its supporting resources) to stdout.

mod commands;
mod config;
mod loader;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{describe, generate};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Experiment generator CLI
#[derive(Parser)]
#[command(name = "expgen")]
#[command(author, version, about = "Generate optimization experiments from Kubernetes manifests", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Write logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the configuration file (defaults to ~/.config/expgen/config.json)
    #[arg(long, global = true, env = "EXPGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate resources
    #[command(subcommand)]
    Generate(GenerateCommands),

    /// Describe the scenarios and objectives of an application
    Describe {
        /// Application file or URL
        #[arg(long, short = 'f')]
        filename: String,

        /// Output format
        #[arg(long, short)]
        output: Option<output::OutputFormat>,
    },
}

#[derive(Subcommand)]
pub enum GenerateCommands {
    /// Generate an experiment for an application
    Experiment(ExperimentArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExperimentArgs {
    /// Application file or URL
    #[arg(long, short = 'f')]
    pub filename: String,

    /// Manifests to scan instead of the application's resources
    #[arg(long = "resources", short = 'r')]
    pub resources: Vec<String>,

    /// Scenario to generate the experiment for
    #[arg(long, env = "EXPGEN_SCENARIO")]
    pub scenario: Option<String>,

    /// Objective to generate the experiment for
    #[arg(long, env = "EXPGEN_OBJECTIVE")]
    pub objective: Option<String>,

    /// Experiment name (derived from the application, scenario and objective by default)
    #[arg(long)]
    pub name: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub output: Option<output::DocumentFormat>,

    /// Also write the scanned application resources
    #[arg(long)]
    pub include_resources: bool,

    /// StormForger access token
    #[arg(long, env = "STORMFORGER_JWT", hide_env_values = true)]
    pub stormforger_jwt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the generated documents
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let config = config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate(GenerateCommands::Experiment(args)) => {
            generate::generate_experiment(args, &config).await?;
        }
        Commands::Describe { filename, output } => {
            let format = output.or(config.output).unwrap_or_default();
            describe::describe_application(&filename, format).await?;
        }
    }

    Ok(())
}
