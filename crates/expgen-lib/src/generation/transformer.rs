//! Assembles the experiment from scan results

use super::namer::ParameterNamer;
use super::patch::PatchSet;
use super::source::{GoalTracker, Source};
use crate::api::{Experiment, Objective};
use crate::document::Node;
use crate::error::{GenerationError, Result};
use tracing::{debug, warn};

/// Result of a transformation
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub experiment: Experiment,
    /// Auxiliary documents (Secrets, ConfigMaps, RBAC) required by the experiment
    pub resources: Vec<Node>,
    /// The scanned application manifests, only when requested
    pub application_resources: Vec<Node>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer {
    pub include_application_resources: bool,
}

impl Transformer {
    /// Run every source against a fresh experiment.
    ///
    /// `nodes` are the scanned documents; they are only used for the emptiness check and,
    /// when enabled, copied to the output.
    pub fn transform(&self, nodes: &[Node], sources: &[Source], objective: Option<&Objective>) -> Result<TransformOutput> {
        let namer = ParameterNamer::new(sources.iter().filter_map(|s| s.patch.as_ref()).map(|p| p.target_ref()));
        let mut goals = GoalTracker::new(objective);
        let mut patches = PatchSet::default();
        let mut output = TransformOutput::default();
        let exp = &mut output.experiment;

        for source in sources {
            if let Some(s) = &source.experiment {
                s.update(exp)?;
            }
            if let Some(s) = &source.parameters {
                exp.spec.parameters.extend(s.parameters(&namer)?);
            }
            if let Some(s) = &source.patch {
                let edits = s.patch(&namer)?;
                if !edits.is_empty() {
                    patches.apply(s.target_ref(), edits);
                }
            }
            if let Some(s) = &source.metrics {
                exp.spec.metrics.extend(s.metrics(&mut goals)?);
            }
            if let Some(s) = &source.resources {
                output.resources.extend(s.read(exp)?);
            }
        }

        exp.spec.patches = patches.render()?;
        check_experiment(exp, nodes.len(), &goals)?;
        debug!(
            parameters = exp.spec.parameters.len(),
            metrics = exp.spec.metrics.len(),
            patches = exp.spec.patches.len(),
            resources = output.resources.len(),
            "Transformed experiment"
        );

        if self.include_application_resources {
            output.application_resources = nodes.to_vec();
        }
        Ok(output)
    }
}

fn check_experiment(exp: &mut Experiment, scanned: usize, goals: &GoalTracker) -> Result<()> {
    if exp.spec.parameters.is_empty() {
        if scanned == 0 {
            return Err(GenerationError::EmptyExperiment(
                "the application did not match any resources".into(),
            ));
        }
        return Err(GenerationError::EmptyExperiment(format!(
            "invalid experiment, no parameters found while scanning {scanned} resources"
        )));
    }
    // A goal without a metric is reported before an experiment without metrics
    goals.check()?;
    if exp.spec.metrics.is_empty() {
        return Err(GenerationError::EmptyExperiment("invalid experiment, no metrics found".into()));
    }

    // Baselines are all or nothing
    let missing: Vec<&str> = exp
        .spec
        .parameters
        .iter()
        .filter(|p| p.baseline.is_none())
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        warn!(parameters = ?missing, "Discarding baselines, some parameters have no baseline value");
        for parameter in &mut exp.spec.parameters {
            parameter.baseline = None;
        }
    }
    Ok(())
}
