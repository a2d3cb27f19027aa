//! Custom trial jobs supplied as a pod template

use super::goal_metric;
use super::metrics::{trial_run_series, RequestsMetricsSource};
use super::source::{ExperimentSource, GoalTracker, MetricSource};
use crate::api::duration::format_duration;
use crate::api::{image_base_name, CustomScenario, Experiment, GoalKind, Metric};
use crate::error::Result;
use k8s_openapi::api::core::v1::Container;

#[derive(Debug, Clone)]
pub struct CustomSource {
    pub scenario: CustomScenario,
}

impl ExperimentSource for CustomSource {
    fn update(&self, exp: &mut Experiment) -> Result<()> {
        if let Some(template) = &self.scenario.pod_template {
            *exp.trial_job_pod() = template.clone();
        }

        let trial = &mut exp.spec.trial_template.spec;
        if self.scenario.initial_delay_seconds > 0 {
            trial.initial_delay_seconds = Some(self.scenario.initial_delay_seconds);
        }
        if self.scenario.approximate_runtime_seconds > 0 {
            let runtime = chrono::Duration::seconds(self.scenario.approximate_runtime_seconds.into());
            trial.approximate_runtime = Some(format_duration(runtime));
        }

        if !self.scenario.image.is_empty() {
            let pod = exp.trial_job_pod_spec();
            if pod.containers.is_empty() {
                pod.containers.push(Container::default());
            }
            pod.containers[0].image = Some(self.scenario.image.clone());
        }

        if exp.spec.trial_template.spec.job_template.is_some() {
            for container in exp.trial_job_pod_spec().containers.iter_mut() {
                if container.name.is_empty() {
                    container.name = image_base_name(container.image.as_deref().unwrap_or_default()).to_string();
                }
            }
        }
        Ok(())
    }
}

impl MetricSource for CustomSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        let mut result = Vec::new();
        for (index, goal) in goals.pending() {
            match goal.kind {
                // Pushed metrics replace the resource request calculation
                Some(GoalKind::Requests(requests)) if !self.scenario.push_gateway => {
                    result.extend(RequestsMetricsSource { index, requests }.metrics(goals)?);
                }
                Some(GoalKind::Latency(_) | GoalKind::ErrorRate(_)) if self.scenario.push_gateway => {
                    let query = format!("scalar({})", trial_run_series(&series_name(&goal.name)));
                    result.push(goal_metric(goals, index, query));
                }
                _ => {}
            }
        }
        Ok(result)
    }
}

/// Prometheus metric name for a goal (`p95-latency` becomes `p95_latency`)
fn series_name(goal: &str) -> String {
    goal.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Goal, Objective, RequestsGoal};
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
    use pretty_assertions::assert_eq;

    fn scenario(image: &str, push_gateway: bool) -> CustomScenario {
        CustomScenario {
            pod_template: Some(PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![
                        Container::default(),
                        Container {
                            image: Some("busybox".into()),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }),
                ..Default::default()
            }),
            image: image.into(),
            push_gateway,
            initial_delay_seconds: 15,
            approximate_runtime_seconds: 150,
        }
    }

    fn objective() -> Objective {
        Objective {
            name: "o".into(),
            goals: vec![
                Goal {
                    name: "p95-latency".into(),
                    kind: Some(GoalKind::Latency("percentile_95".into())),
                    ..Default::default()
                },
                Goal {
                    name: "cost".into(),
                    kind: Some(GoalKind::Requests(RequestsGoal::default())),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_trial_job() {
        let source = CustomSource {
            scenario: scenario("registry.example.com/team/loadgen:1.2", false),
        };
        let mut exp = Experiment::default();
        source.update(&mut exp).unwrap();

        let trial = &exp.spec.trial_template.spec;
        assert_eq!(trial.initial_delay_seconds, Some(15));
        assert_eq!(trial.approximate_runtime.as_deref(), Some("2m30s"));

        let containers: Vec<(String, String)> = exp
            .trial_job_pod_spec()
            .containers
            .iter()
            .map(|c| (c.name.clone(), c.image.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            containers,
            vec![
                ("loadgen".to_string(), "registry.example.com/team/loadgen:1.2".to_string()),
                ("busybox".to_string(), "busybox".to_string()),
            ]
        );
    }

    #[test]
    fn test_image_without_template() {
        let source = CustomSource {
            scenario: CustomScenario {
                image: "loadgen".into(),
                ..Default::default()
            },
        };
        let mut exp = Experiment::default();
        source.update(&mut exp).unwrap();
        assert_eq!(exp.trial_job_pod_spec().containers[0].name, "loadgen");
        assert_eq!(exp.spec.trial_template.spec.initial_delay_seconds, None);
    }

    #[test]
    fn test_requests_metrics() {
        let source = CustomSource {
            scenario: scenario("", false),
        };
        let objective = objective();
        let mut goals = GoalTracker::new(Some(&objective));
        let metrics = source.metrics(&mut goals).unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "cost");
        assert_eq!(metrics[0].target.as_ref().unwrap().kind, "PodList");
        assert!(goals.is_implemented(1));
        assert!(!goals.is_implemented(0));
    }

    #[test]
    fn test_push_gateway_metrics() {
        let source = CustomSource {
            scenario: scenario("", true),
        };
        let objective = objective();
        let mut goals = GoalTracker::new(Some(&objective));
        let metrics = source.metrics(&mut goals).unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(
            metrics[0].query,
            r#"scalar(p95_latency{job="trialRun",instance="{{ .Trial.Name }}"})"#
        );
        assert!(!goals.is_implemented(1));
    }
}
