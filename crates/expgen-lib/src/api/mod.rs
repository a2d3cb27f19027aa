//! Input and output data model
//!
//! - [`application`]: the Application definition (scenarios, objectives, parameter overrides)
//! - [`experiment`]: the generated Experiment
//! - [`defaults`]: name based defaulting of the application

pub mod application;
pub mod defaults;
pub mod duration;
pub mod experiment;

pub use application::*;
pub use defaults::{default_cost_weights, image_base_name, LatencyType};
pub use experiment::*;
