//! Experiment generation library
//!
//! This crate turns an Application definition and the Kubernetes manifests it refers to
//! into an optimization Experiment:
//! - Scanning manifests for tunable fields (container resources, replicas, environment
//!   variables, config map keys)
//! - Naming parameters and deriving their ranges and baselines
//! - Translating objectives and scenarios into metric queries and trial jobs
//! - Writing the experiment and its supporting resources as YAML or JSON

pub mod api;
pub mod credentials;
pub mod document;
pub mod error;
pub mod generation;
pub mod generator;
pub mod loader;
pub mod quantity;
pub mod scan;

pub use api::{Application, Experiment};
pub use credentials::{CredentialChain, TokenIssuer};
pub use document::{FieldOrder, Node};
pub use error::{GenerationError, Result};
pub use generation::TrialImages;
pub use generator::{GeneratedExperiment, Generator};
pub use loader::{FileLoader, FsLoader};
pub use quantity::Quantity;
