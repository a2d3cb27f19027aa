//! `generate experiment`

use anyhow::{Context, Result};
use expgen_lib::{CredentialChain, FieldOrder, Generator};
use std::io::Write;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::{self, Config};
use crate::loader::{application_resources, Loader, Location, RemoteFileLoader};
use crate::output::{print_warning, DocumentFormat};
use crate::ExperimentArgs;

/// Generate an experiment and write it to stdout
pub async fn generate_experiment(args: ExperimentArgs, config: &Config) -> Result<()> {
    let loader = Loader::new()?;
    let application = loader.load_application(&args.filename).await?;

    let locations: Vec<Location> = if args.resources.is_empty() {
        application_resources(&application)?
    } else {
        args.resources.iter().map(|r| Location::parse(r)).collect()
    };
    if locations.is_empty() {
        print_warning("No resources to scan, set `resources` in the application or pass --resources");
    }
    let documents = loader.load_documents(&locations).await?;
    debug!(documents = documents.len(), "Scanning manifests");

    let generator = Generator {
        scenario: args.scenario.or_else(|| config.scenario.clone()),
        objective: args.objective.or_else(|| config.objective.clone()),
        experiment_name: args.name,
        include_application_resources: args.include_resources,
        trial_images: config::trial_images()?,
        loader: Arc::new(RemoteFileLoader::new(loader, Handle::current())),
        credentials: CredentialChain {
            environment_token: args.stormforger_jwt,
            ..CredentialChain::default()
        },
        ..Generator::new(application)
    };

    // Auxiliary files may be fetched over HTTP from inside the generator
    let generated = tokio::task::spawn_blocking(move || generator.generate(&documents))
        .await
        .context("Generation task failed")?
        .context("Failed to generate experiment")?;

    let format = args.output.or(config.format).unwrap_or_default();
    let order = FieldOrder::default();
    let mut stdout = std::io::stdout().lock();
    match format {
        DocumentFormat::Yaml => generated.write_yaml(&mut stdout, &order)?,
        DocumentFormat::Json => generated.write_json(&mut stdout, &order)?,
    }
    stdout.flush().context("Failed to write output")?;

    Ok(())
}
