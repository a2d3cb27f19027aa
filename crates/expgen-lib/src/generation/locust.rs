//! Locust load test scenarios

use super::metrics::{load_test_metrics, trial_run_series};
use super::source::{ExperimentSource, GoalTracker, MetricSource, ResourceSource};
use super::{file_config_map, to_node, TrialImages};
use crate::api::duration::parse_duration;
use crate::api::{Application, Experiment, LatencyType, LocustScenario, Metric};
use crate::document::Node;
use crate::error::{GenerationError, Result};
use crate::loader::FileLoader;
use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, Container, EnvVar, Volume, VolumeMount};
use std::sync::Arc;

const LOCUSTFILE_KEY: &str = "locustfile.py";

/// Runs a Locust file as the trial job
#[derive(Clone)]
pub struct LocustSource {
    pub application: Arc<Application>,
    pub scenario_name: String,
    pub scenario: LocustScenario,
    pub trial_images: TrialImages,
    pub loader: Arc<dyn FileLoader>,
}

impl LocustSource {
    fn config_map_name(&self) -> String {
        format!("{}-locustfile", self.scenario_name)
    }
}

impl ExperimentSource for LocustSource {
    fn update(&self, exp: &mut Experiment) -> Result<()> {
        let mut env = Vec::new();
        if let Some(users) = self.scenario.users {
            env.push(env_var("NUM_USERS", users.to_string()));
        }
        if let Some(spawn_rate) = self.scenario.spawn_rate {
            env.push(env_var("SPAWN_RATE", spawn_rate.to_string()));
        }
        if let Some(run_time) = self.scenario.run_time.as_deref().filter(|r| !r.is_empty()) {
            let run_time = parse_duration(run_time)?;
            env.push(env_var("RUN_TIME", run_time.num_seconds().to_string()));
        }

        let ingress_url = self.application.ingress_url();
        if ingress_url.is_empty() {
            return Err(GenerationError::InvalidApplication(
                "ingress must be configured when using Locust scenarios".into(),
            ));
        }
        env.push(env_var("HOST", ingress_url));

        let pod = exp.trial_job_pod_spec();
        pod.containers = vec![Container {
            name: "locust".into(),
            image: Some(self.trial_images.image("locust")),
            env: Some(env),
            volume_mounts: Some(vec![VolumeMount {
                name: "locustfile".into(),
                read_only: Some(true),
                mount_path: "/mnt/locust".into(),
                ..Default::default()
            }]),
            ..Default::default()
        }];
        pod.volumes = Some(vec![Volume {
            name: "locustfile".into(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(self.config_map_name()),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        Ok(())
    }
}

impl MetricSource for LocustSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        let error_rate = format!(
            "scalar({} / {})",
            trial_run_series("failure_count"),
            trial_run_series("request_count")
        );
        Ok(load_test_metrics(goals, latency_series, &error_rate))
    }
}

impl ResourceSource for LocustSource {
    fn read(&self, _: &Experiment) -> Result<Vec<Node>> {
        if self.scenario.locustfile.is_empty() {
            return Err(GenerationError::InvalidApplication(format!(
                "missing Locust file for scenario {:?}",
                self.scenario_name
            )));
        }

        let data = self.loader.load_file(&self.application, &self.scenario.locustfile)?;
        let config_map = file_config_map(self.config_map_name(), LOCUSTFILE_KEY.to_string(), data);
        Ok(vec![to_node(&config_map)?])
    }
}

fn latency_series(latency: LatencyType) -> &'static str {
    match latency {
        LatencyType::Minimum => "min_response_time",
        LatencyType::Maximum => "max_response_time",
        LatencyType::Mean => "average_response_time",
        LatencyType::Percentile50 => "p50",
        LatencyType::Percentile95 => "p95",
        LatencyType::Percentile99 => "p99",
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Goal, GoalKind, Ingress, Objective};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct StaticLoader;

    impl FileLoader for StaticLoader {
        fn load_file(&self, _: &Application, _: &str) -> Result<Vec<u8>> {
            Ok(b"from locust import HttpUser\n".to_vec())
        }
    }

    fn source(ingress: &str, locustfile: &str) -> LocustSource {
        LocustSource {
            application: Arc::new(Application {
                ingress: Some(Ingress { url: ingress.into() }),
                ..Default::default()
            }),
            scenario_name: "browse".into(),
            scenario: LocustScenario {
                locustfile: locustfile.into(),
                users: Some(50),
                spawn_rate: Some(5),
                run_time: Some("2m30s".into()),
            },
            trial_images: TrialImages::default(),
            loader: Arc::new(StaticLoader),
        }
    }

    #[test]
    fn test_trial_job() {
        let mut exp = Experiment::default();
        source("http://shop", "locustfile.py").update(&mut exp).unwrap();

        let pod = exp.trial_job_pod_spec();
        let container = &pod.containers[0];
        assert_eq!(container.name, "locust");
        assert_eq!(container.image.as_deref(), Some("thestormforge/optimize-trials:v0.0.1-locust"));

        let env: Vec<(&str, &str)> = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(
            env,
            vec![("NUM_USERS", "50"), ("SPAWN_RATE", "5"), ("RUN_TIME", "150"), ("HOST", "http://shop")]
        );

        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!((mount.mount_path.as_str(), mount.read_only), ("/mnt/locust", Some(true)));
        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.config_map.as_ref().unwrap().name.as_deref(), Some("browse-locustfile"));
    }

    #[test]
    fn test_ingress_is_required() {
        let err = source("", "locustfile.py").update(&mut Experiment::default()).unwrap_err();
        assert_eq!(err.to_string(), "ingress must be configured when using Locust scenarios");
    }

    #[test]
    fn test_locustfile_config_map() {
        let docs = source("http://shop", "locustfile.py").read(&Experiment::default()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["kind"], "ConfigMap");
        assert_eq!(docs[0]["metadata"]["name"], "browse-locustfile");
        assert_eq!(docs[0]["data"]["locustfile.py"], "from locust import HttpUser\n");

        let err = source("http://shop", "").read(&Experiment::default()).unwrap_err();
        assert_eq!(err.to_string(), r#"missing Locust file for scenario "browse""#);
    }

    struct BinaryLoader;

    impl FileLoader for BinaryLoader {
        fn load_file(&self, _: &Application, _: &str) -> Result<Vec<u8>> {
            Ok(vec![0x80, 0x04, 0x95])
        }
    }

    #[test]
    fn test_binary_locustfile() {
        let mut source = source("http://shop", "locustfile.pyc");
        source.loader = Arc::new(BinaryLoader);
        let docs = source.read(&Experiment::default()).unwrap();
        assert!(docs[0].get("data").is_none());
        // 0x80 0x04 0x95 in base64
        assert_eq!(docs[0]["binaryData"]["locustfile.py"], "gASV");
    }

    #[rstest]
    #[case("p99", r#"scalar(p99{job="trialRun",instance="{{ .Trial.Name }}"})"#)]
    #[case("mean", r#"scalar(average_response_time{job="trialRun",instance="{{ .Trial.Name }}"})"#)]
    fn test_latency_metrics(#[case] latency: &str, #[case] query: &str) {
        let objective = Objective {
            name: "o".into(),
            goals: vec![Goal {
                name: "latency".into(),
                kind: Some(GoalKind::Latency(latency.into())),
                ..Default::default()
            }],
        };
        let mut goals = GoalTracker::new(Some(&objective));
        let metrics = source("http://shop", "").metrics(&mut goals).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].query, query);
    }

    #[test]
    fn test_error_rate_metric() {
        let objective = Objective {
            name: "o".into(),
            goals: vec![Goal {
                name: "error-rate".into(),
                kind: Some(GoalKind::ErrorRate("requests".into())),
                ..Default::default()
            }],
        };
        let mut goals = GoalTracker::new(Some(&objective));
        let metrics = source("http://shop", "").metrics(&mut goals).unwrap();
        assert_eq!(
            metrics[0].query,
            r#"scalar(failure_count{job="trialRun",instance="{{ .Trial.Name }}"} / request_count{job="trialRun",instance="{{ .Trial.Name }}"})"#
        );
    }
}
