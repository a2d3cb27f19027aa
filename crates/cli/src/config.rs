//! Configuration management for the CLI

use anyhow::{Context, Result};
use expgen_lib::TrialImages;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::{DocumentFormat, OutputFormat};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default output format for `describe`
    pub output: Option<OutputFormat>,
    /// Default document format for `generate`
    pub format: Option<DocumentFormat>,
    /// Scenario used when none is given on the command line
    pub scenario: Option<String>,
    /// Objective used when none is given on the command line
    pub objective: Option<String>,
}

impl Config {
    /// Load configuration from file, a missing file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("expgen").join("config.json"))
    }
}

/// Trial image settings read from `OPTIMIZE_TRIALS_*` environment variables
#[derive(Debug, Clone, Deserialize)]
struct TrialSettings {
    #[serde(default = "default_image_repository")]
    image_repository: String,
    #[serde(default)]
    image_tag: Option<String>,
    #[serde(default = "default_image_tag_base")]
    image_tag_base: String,
}

fn default_image_repository() -> String {
    TrialImages::default().repository
}

fn default_image_tag_base() -> String {
    TrialImages::default().tag_base
}

/// Resolve the trial job images from the environment
pub fn trial_images() -> Result<TrialImages> {
    trial_images_from(config::Environment::with_prefix("OPTIMIZE_TRIALS"))
}

fn trial_images_from(source: config::Environment) -> Result<TrialImages> {
    let settings: TrialSettings = config::Config::builder()
        .add_source(source)
        .build()
        .context("Failed to read trial image settings")?
        .try_deserialize()
        .context("Invalid trial image settings")?;

    Ok(TrialImages {
        repository: settings.image_repository,
        tag: settings.image_tag.filter(|tag| !tag.is_empty()),
        tag_base: settings.image_tag_base,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        config::Environment::with_prefix("OPTIMIZE_TRIALS").source(Some(vars))
    }

    #[test]
    fn test_trial_images_defaults() {
        let images = trial_images_from(environment(&[])).unwrap();
        assert_eq!(images, TrialImages::default());
        assert_eq!(images.image("locust"), "thestormforge/optimize-trials:v0.0.1-locust");
    }

    #[test]
    fn test_trial_images_from_environment() {
        let images = trial_images_from(environment(&[
            ("OPTIMIZE_TRIALS_IMAGE_REPOSITORY", "registry.local/trials"),
            ("OPTIMIZE_TRIALS_IMAGE_TAG_BASE", "v1.2.0"),
        ]))
        .unwrap();
        assert_eq!(images.image("stormforger"), "registry.local/trials:v1.2.0-stormforger");

        let images = trial_images_from(environment(&[("OPTIMIZE_TRIALS_IMAGE_TAG", "edge")])).unwrap();
        assert_eq!(images.image("stormforger"), "thestormforge/optimize-trials:edge");
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.scenario.is_none());

        std::fs::write(&path, r#"{"output": "json", "format": "yaml", "scenario": "browse"}"#).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(matches!(config.output, Some(OutputFormat::Json)));
        assert!(matches!(config.format, Some(DocumentFormat::Yaml)));
        assert_eq!(config.scenario.as_deref(), Some("browse"));

        std::fs::write(&path, "{").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
