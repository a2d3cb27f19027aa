//! Error types for experiment generation
//!
//! Every failure aborts the run: there is no partial output and no retry.

use thiserror::Error;

/// Errors produced while generating an experiment
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A selector could not be built from its configuration (bad regex, bad path, bad label selector)
    #[error("invalid selector configuration: {0}")]
    SelectorConfig(String),

    /// Credentials for an external load generation service could not be found
    #[error("{0}")]
    MissingCredential(String),

    /// A discovered value violates the declared numeric range or value set
    #[error("{0}")]
    ValueOutOfRange(String),

    /// A goal of the active objective did not produce any metric
    #[error("generated experiment cannot optimize for goal {0:?}")]
    UnimplementedObjective(String),

    /// The experiment has nothing to vary or nothing to measure
    #[error("{0}")]
    EmptyExperiment(String),

    /// An auxiliary file (test case, locustfile, access token) could not be loaded
    #[error("unable to load file: {path}: {reason}")]
    FileLoad { path: String, reason: String },

    /// A resource quantity string could not be parsed
    #[error("invalid quantity {0:?}")]
    InvalidQuantity(String),

    /// The application definition is inconsistent (unknown scenario, missing ingress, ...)
    #[error("{0}")]
    InvalidApplication(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    /// Shorthand for wrapping a loader failure
    pub fn file_load(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::FileLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, GenerationError>;
