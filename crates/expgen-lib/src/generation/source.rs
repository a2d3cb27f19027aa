//! Capabilities a scan result can contribute to an experiment

use super::namer::ParameterNamer;
use super::patch::PatchEdit;
use crate::api::{Experiment, Goal, Metric, Objective, Parameter};
use crate::document::{Node, TargetRef};
use crate::error::{GenerationError, Result};
use std::sync::Arc;

/// Modifies the experiment directly (trial job, setup tasks).
///
/// Parameters, patches and metrics should be contributed through their own capability.
pub trait ExperimentSource: Send + Sync {
    fn update(&self, exp: &mut Experiment) -> Result<()>;
}

/// Contributes parameters; usually paired with a [`PatchSource`] referencing them
pub trait ParameterSource: Send + Sync {
    fn parameters(&self, namer: &ParameterNamer) -> Result<Vec<Parameter>>;
}

/// Contributes edits to the patch of one resource
pub trait PatchSource: Send + Sync {
    fn target_ref(&self) -> &TargetRef;
    fn patch(&self, namer: &ParameterNamer) -> Result<Vec<PatchEdit>>;
}

/// Contributes metrics for goals of the active objective
pub trait MetricSource: Send + Sync {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>>;
}

/// Contributes additional documents to the output stream
pub trait ResourceSource: Send + Sync {
    fn read(&self, exp: &Experiment) -> Result<Vec<Node>>;
}

/// One scan result with every capability it implements.
///
/// The transformer invokes each populated capability in a fixed order: experiment update,
/// parameters, patch, metrics, then additional resources.
#[derive(Clone, Default)]
pub struct Source {
    pub experiment: Option<Arc<dyn ExperimentSource>>,
    pub parameters: Option<Arc<dyn ParameterSource>>,
    pub patch: Option<Arc<dyn PatchSource>>,
    pub metrics: Option<Arc<dyn MetricSource>>,
    pub resources: Option<Arc<dyn ResourceSource>>,
}

impl Source {
    /// A parameter site: contributes both the parameters and the patch that uses them
    pub fn parameter_site<T>(site: T) -> Self
    where
        T: ParameterSource + PatchSource + 'static,
    {
        let site = Arc::new(site);
        Self {
            parameters: Some(site.clone()),
            patch: Some(site),
            ..Default::default()
        }
    }

    /// A metric only source
    pub fn metric<T: MetricSource + 'static>(source: T) -> Self {
        Self {
            metrics: Some(Arc::new(source)),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("experiment", &self.experiment.is_some())
            .field("parameters", &self.parameters.is_some())
            .field("patch", &self.patch.as_ref().map(|p| p.target_ref().clone()))
            .field("metrics", &self.metrics.is_some())
            .field("resources", &self.resources.is_some())
            .finish()
    }
}

/// Tracks which goals of the active objective already produced a metric
#[derive(Debug, Clone, Default)]
pub struct GoalTracker {
    goals: Vec<Goal>,
    implemented: Vec<bool>,
}

impl GoalTracker {
    pub fn new(objective: Option<&Objective>) -> Self {
        let goals = objective.map(|o| o.goals.clone()).unwrap_or_default();
        let implemented = vec![false; goals.len()];
        Self { goals, implemented }
    }

    pub fn goal(&self, index: usize) -> Option<&Goal> {
        self.goals.get(index)
    }

    pub fn is_implemented(&self, index: usize) -> bool {
        self.implemented.get(index).copied().unwrap_or(true)
    }

    /// Goals still waiting for a metric, with their indices
    pub fn pending(&self) -> Vec<(usize, Goal)> {
        self.goals
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.implemented[*i])
            .map(|(i, g)| (i, g.clone()))
            .collect()
    }

    pub fn mark_implemented(&mut self, index: usize) {
        if let Some(flag) = self.implemented.get_mut(index) {
            *flag = true;
        }
    }

    /// Fail on the first goal that never produced a metric
    pub fn check(&self) -> Result<()> {
        match self.goals.iter().zip(&self.implemented).find(|(_, done)| !**done) {
            Some((goal, _)) => Err(GenerationError::UnimplementedObjective(goal.name.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective(names: &[&str]) -> Objective {
        Objective {
            name: "test".into(),
            goals: names
                .iter()
                .map(|n| Goal {
                    name: n.to_string(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_goal_tracker() {
        let mut tracker = GoalTracker::new(Some(&objective(&["cost", "p95"])));
        assert_eq!(tracker.pending().len(), 2);

        tracker.mark_implemented(0);
        assert!(tracker.is_implemented(0));
        assert_eq!(tracker.pending()[0].1.name, "p95");

        let err = tracker.check().unwrap_err();
        assert!(matches!(err, GenerationError::UnimplementedObjective(ref name) if name == "p95"));

        tracker.mark_implemented(1);
        assert!(tracker.check().is_ok());
    }

    #[test]
    fn test_no_objective_has_nothing_to_implement() {
        let tracker = GoalTracker::new(None);
        assert!(tracker.pending().is_empty());
        assert!(tracker.check().is_ok());
    }
}
