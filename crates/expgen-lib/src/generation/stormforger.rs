//! StormForger load test scenarios

use super::metrics::{load_test_metrics, trial_run_series};
use super::source::{ExperimentSource, GoalTracker, MetricSource, ResourceSource};
use super::{file_config_map, to_node, TrialImages};
use crate::api::{Application, Experiment, LatencyType, Metric, StormForgerAccessToken, StormForgerScenario};
use crate::credentials::CredentialChain;
use crate::document::Node;
use crate::error::{GenerationError, Result};
use crate::loader::FileLoader;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, ObjectFieldSelector, Secret, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

const TEST_CASE_FILE_MOUNT: &str = "/forge-init.d";

/// Runs a StormForger test case as the trial job
#[derive(Clone)]
pub struct StormForgerSource {
    pub application: Arc<Application>,
    pub scenario_name: String,
    pub scenario: StormForgerScenario,
    pub trial_images: TrialImages,
    pub credentials: CredentialChain,
    pub loader: Arc<dyn FileLoader>,
    /// Token resolved on first use, shared by the trial job and the Secret
    pub access_token: OnceLock<Option<StormForgerAccessToken>>,
}

impl StormForgerSource {
    /// Organization and name of the test case
    fn test_case(&self) -> (String, String) {
        let (mut org, mut name) = match self.scenario.test_case.split_once('/') {
            Some((org, name)) => (org.to_string(), name.to_string()),
            None => (String::new(), self.scenario.test_case.clone()),
        };

        if org.is_empty() {
            if let Some(sf) = &self.application.storm_forger {
                org = sf.organization.clone();
            }
        }
        if name.is_empty() {
            name = format!("{}-{}", self.application.name(), self.scenario_name);
        }
        (org, name)
    }

    fn config_map_name(&self) -> String {
        format!("{}-test-case-file", self.scenario_name)
    }

    fn access_token(&self, org: &str) -> Result<Option<StormForgerAccessToken>> {
        if let Some(token) = self.access_token.get() {
            return Ok(token.clone());
        }
        let token = self.credentials.resolve(&self.application, org)?;
        Ok(self.access_token.get_or_init(|| token).clone())
    }
}

impl ExperimentSource for StormForgerSource {
    fn update(&self, exp: &mut Experiment) -> Result<()> {
        let (org, test_case) = self.test_case();
        if org.is_empty() {
            return Err(GenerationError::MissingCredential("missing StormForger organization".into()));
        }
        let access_token = self
            .access_token(&org)?
            .ok_or_else(|| GenerationError::MissingCredential("missing StormForger authorization".into()))?;

        let mut container = Container {
            name: "stormforger".into(),
            image: Some(self.trial_images.image("stormforger")),
            env: Some(vec![
                EnvVar {
                    name: "TITLE".into(),
                    value_from: Some(EnvVarSource {
                        field_ref: Some(ObjectFieldSelector {
                            field_path: "metadata.name".into(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                env_var("TEST_CASE", format!("{org}/{test_case}")),
            ]),
            ..Default::default()
        };
        let mut volumes = Vec::new();
        let env = container.env.get_or_insert_with(Vec::new);

        // Without a file the test case must already exist in StormForger
        if !self.scenario.test_case_file.is_empty() {
            container.volume_mounts = Some(vec![VolumeMount {
                name: "test-case-file".into(),
                read_only: Some(true),
                mount_path: TEST_CASE_FILE_MOUNT.into(),
                ..Default::default()
            }]);
            env.push(env_var("TEST_CASE_FILE", format!("{TEST_CASE_FILE_MOUNT}/{test_case}.js")));
            volumes.push(Volume {
                name: "test-case-file".into(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(self.config_map_name()),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        let ingress_url = self.application.ingress_url();
        if !ingress_url.is_empty() {
            if !ingress_url.contains('.') {
                return Err(GenerationError::InvalidApplication(
                    "ingress should be fully qualified when using StormForger scenarios".into(),
                ));
            }
            env.push(env_var("TARGET", ingress_url));
        }

        env.push(EnvVar {
            name: "STORMFORGER_JWT".into(),
            value_from: Some(EnvVarSource {
                secret_key_ref: access_token.secret_key_ref,
                ..Default::default()
            }),
            ..Default::default()
        });

        let pod = exp.trial_job_pod_spec();
        pod.containers = vec![container];
        if !volumes.is_empty() {
            pod.volumes.get_or_insert_with(Vec::new).extend(volumes);
        }
        Ok(())
    }
}

impl MetricSource for StormForgerSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        let error_rate = format!("scalar({})", trial_run_series("error_ratio"));
        Ok(load_test_metrics(goals, latency_series, &error_rate))
    }
}

impl ResourceSource for StormForgerSource {
    fn read(&self, _: &Experiment) -> Result<Vec<Node>> {
        let mut result = Vec::new();
        let (org, test_case) = self.test_case();

        if !self.scenario.test_case_file.is_empty() {
            let data = self.loader.load_file(&self.application, &self.scenario.test_case_file)?;
            let config_map = file_config_map(self.config_map_name(), format!("{test_case}.js"), data);
            result.push(to_node(&config_map)?);
        }

        // A secret reference without a value points at a Secret managed elsewhere
        if let Some(token) = self.access_token(&org)? {
            let data = if !token.file.is_empty() {
                Some(self.loader.load_file(&self.application, &token.file)?)
            } else if !token.literal.is_empty() {
                Some(token.literal.clone().into_bytes())
            } else {
                None
            };

            if let (Some(data), Some(secret_ref)) = (data, token.secret_key_ref) {
                let secret = Secret {
                    metadata: named(secret_ref.name.unwrap_or_default()),
                    data: Some(BTreeMap::from([(secret_ref.key, ByteString(data))])),
                    ..Default::default()
                };
                result.push(to_node(&secret)?);
            }
        }

        Ok(result)
    }
}

fn latency_series(latency: LatencyType) -> &'static str {
    match latency {
        LatencyType::Minimum => "min",
        LatencyType::Maximum => "max",
        LatencyType::Mean => "mean",
        LatencyType::Percentile50 => "median",
        LatencyType::Percentile95 => "percentile_95",
        LatencyType::Percentile99 => "percentile_99",
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn named(name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        ..Default::default()
    }
}
