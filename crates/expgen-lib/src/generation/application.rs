//! Sources derived from the application itself rather than from scanned resources

use super::custom::CustomSource;
use super::locust::LocustSource;
use super::metrics::{DatadogMetricsSource, DurationMetricsSource, PrometheusMetricsSource, RequestsMetricsSource};
use super::prometheus::BuiltInPrometheus;
use super::source::Source;
use super::stormforger::StormForgerSource;
use super::TrialImages;
use crate::api::{Application, GoalKind, Objective, Scenario, ScenarioBackend};
use crate::credentials::CredentialChain;
use crate::document::{Node, ResourceMeta};
use crate::error::Result;
use crate::loader::{FileLoader, FsLoader};
use crate::scan::Selector;
use std::sync::Arc;

static NULL: Node = Node::Null;

/// Emits the scenario, goal and monitoring sources once per scan
#[derive(Clone)]
pub struct ApplicationSelector {
    pub application: Arc<Application>,
    pub scenario: Option<Scenario>,
    pub objective: Option<Objective>,
    pub trial_images: TrialImages,
    pub loader: Arc<dyn FileLoader>,
    pub credentials: CredentialChain,
}

impl ApplicationSelector {
    pub fn new(application: Arc<Application>, scenario: Option<Scenario>, objective: Option<Objective>) -> Self {
        Self {
            application,
            scenario,
            objective,
            trial_images: TrialImages::default(),
            loader: Arc::new(FsLoader),
            credentials: CredentialChain::default(),
        }
    }

    fn scenario_source(&self, scenario: &Scenario) -> Source {
        match &scenario.backend {
            ScenarioBackend::StormForger(stormforger) => {
                let source = Arc::new(StormForgerSource {
                    application: self.application.clone(),
                    scenario_name: scenario.name.clone(),
                    scenario: stormforger.clone(),
                    trial_images: self.trial_images.clone(),
                    credentials: self.credentials.clone(),
                    loader: self.loader.clone(),
                    access_token: Default::default(),
                });
                Source {
                    experiment: Some(source.clone()),
                    metrics: Some(source.clone()),
                    resources: Some(source),
                    ..Default::default()
                }
            }
            ScenarioBackend::Locust(locust) => {
                let source = Arc::new(LocustSource {
                    application: self.application.clone(),
                    scenario_name: scenario.name.clone(),
                    scenario: locust.clone(),
                    trial_images: self.trial_images.clone(),
                    loader: self.loader.clone(),
                });
                Source {
                    experiment: Some(source.clone()),
                    metrics: Some(source.clone()),
                    resources: Some(source),
                    ..Default::default()
                }
            }
            ScenarioBackend::Custom(custom) => {
                let source = Arc::new(CustomSource { scenario: custom.clone() });
                Source {
                    experiment: Some(source.clone()),
                    metrics: Some(source),
                    ..Default::default()
                }
            }
        }
    }
}

impl Selector for ApplicationSelector {
    fn select<'a>(&mut self, _: &'a [Node]) -> Result<Vec<&'a Node>> {
        Ok(vec![&NULL])
    }

    fn map(&self, _: &Node, _: &ResourceMeta) -> Result<Vec<Source>> {
        let mut result = Vec::new();

        if let Some(scenario) = &self.scenario {
            result.push(self.scenario_source(scenario));
        }

        let goals = self.objective.iter().flat_map(|o| o.goals.iter().enumerate());
        for (index, goal) in goals {
            match &goal.kind {
                Some(GoalKind::Requests(requests)) => result.push(Source::metric(RequestsMetricsSource {
                    index,
                    requests: requests.clone(),
                })),
                Some(GoalKind::Duration(duration)) => result.push(Source::metric(DurationMetricsSource {
                    index,
                    duration: duration.clone(),
                })),
                Some(GoalKind::Prometheus(prometheus)) => result.push(Source::metric(PrometheusMetricsSource {
                    index,
                    prometheus: prometheus.clone(),
                })),
                Some(GoalKind::Datadog(datadog)) => result.push(Source::metric(DatadogMetricsSource {
                    index,
                    datadog: datadog.clone(),
                })),
                // Scenario specific
                _ => {}
            }
        }

        let prometheus = Arc::new(BuiltInPrometheus::default());
        result.push(Source {
            experiment: Some(prometheus.clone()),
            resources: Some(prometheus),
            ..Default::default()
        });

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Goal, LocustScenario};
    use crate::scan::Scanner;

    fn objective(kinds: Vec<GoalKind>) -> Objective {
        Objective {
            name: "o".into(),
            goals: kinds
                .into_iter()
                .enumerate()
                .map(|(i, kind)| Goal {
                    name: format!("goal-{i}"),
                    kind: Some(kind),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_selects_once_without_documents() {
        let mut selector = ApplicationSelector::new(Arc::new(Application::default()), None, None);
        assert_eq!(selector.select(&[]).unwrap().len(), 1);

        let sources = Scanner::new(vec![Box::new(selector)]).scan(&[]).unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].experiment.is_some());
        assert!(sources[0].resources.is_some());
    }

    #[test]
    fn test_source_order() {
        let scenario = Scenario {
            name: "browse".into(),
            backend: ScenarioBackend::Locust(LocustScenario::default()),
        };
        let objective = objective(vec![
            GoalKind::Latency("p95".into()),
            GoalKind::Duration("trial".into()),
            GoalKind::Requests(Default::default()),
        ]);
        let selector = ApplicationSelector::new(Arc::new(Application::default()), Some(scenario), Some(objective));

        let sources = selector.map(&NULL, &ResourceMeta::default()).unwrap();
        let shape: Vec<(bool, bool, bool)> = sources
            .iter()
            .map(|s| (s.experiment.is_some(), s.metrics.is_some(), s.resources.is_some()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (true, true, true),
                (false, true, false),
                (false, true, false),
                (true, false, true),
            ]
        );
    }
}
