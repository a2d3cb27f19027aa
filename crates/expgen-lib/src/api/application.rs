//! Application definition: the input describing what to optimize and how to load it

use crate::quantity::Quantity;
use k8s_openapi::api::core::v1::{PodTemplateSpec, SecretKeySelector};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const APPLICATION_API_VERSION: &str = "apps.stormforge.io/v1alpha1";

/// Annotation recording the file an application was read from
pub const PATH_ANNOTATION: &str = "config.kubernetes.io/path";

/// Resource weights keyed by resource name (`cpu`, `memory`)
pub type ResourceList = BTreeMap<String, Quantity>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Manifest locations, relative to the application file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<Scenario>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storm_forger: Option<StormForger>,
}

fn default_api_version() -> String {
    APPLICATION_API_VERSION.to_string()
}

fn default_kind() -> String {
    "Application".to_string()
}

impl Application {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// Directory of the file the application was loaded from, if recorded
    pub fn working_directory(&self) -> Option<std::path::PathBuf> {
        let path = self.metadata.annotations.as_ref()?.get(PATH_ANNOTATION)?;
        let parent = std::path::Path::new(path).parent()?;
        Some(parent.to_path_buf())
    }

    pub fn ingress_url(&self) -> &str {
        self.ingress.as_ref().map(|i| i.url.as_str()).unwrap_or_default()
    }
}

/// Overrides for the parameter discovery selectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_resources: Option<ContainerResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<Replicas>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<EnvironmentVariable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_maps: Vec<ConfigMapKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    /// Label selector for the workloads to scan
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
    /// Regular expression restricting the container names
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_name: String,
    /// Resource names to tune, defaults to `cpu` and `memory`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub min: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub max: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_request: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replicas {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_name: String,
    /// Exact variable name
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
    pub key: String,
    #[serde(default)]
    pub create_if_not_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericValue {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingress {
    #[serde(default)]
    pub url: String,
}

/// Organization wide StormForger settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StormForger {
    #[serde(default, rename = "org", skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<StormForgerAccessToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StormForgerAccessToken {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub literal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}

/// One load generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScenario", into = "RawScenario")]
pub struct Scenario {
    pub name: String,
    pub backend: ScenarioBackend,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioBackend {
    StormForger(StormForgerScenario),
    Locust(LocustScenario),
    Custom(CustomScenario),
}

impl ScenarioBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioBackend::StormForger(_) => "stormforger",
            ScenarioBackend::Locust(_) => "locust",
            ScenarioBackend::Custom(_) => "custom",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StormForgerScenario {
    /// `org/name` or just `name`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_case: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_case_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocustScenario {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locustfile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_rate: Option<i32>,
    /// Duration such as `90s` or `5m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomScenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default)]
    pub push_gateway: bool,
    #[serde(default)]
    pub initial_delay_seconds: i32,
    #[serde(default)]
    pub approximate_runtime_seconds: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScenario {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, rename = "stormforger", skip_serializing_if = "Option::is_none")]
    storm_forger: Option<StormForgerScenario>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locust: Option<LocustScenario>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom: Option<CustomScenario>,
}

impl TryFrom<RawScenario> for Scenario {
    type Error = String;

    fn try_from(raw: RawScenario) -> Result<Self, Self::Error> {
        let mut backends = Vec::new();
        if let Some(s) = raw.storm_forger {
            backends.push(ScenarioBackend::StormForger(s));
        }
        if let Some(l) = raw.locust {
            backends.push(ScenarioBackend::Locust(l));
        }
        if let Some(c) = raw.custom {
            backends.push(ScenarioBackend::Custom(c));
        }

        match (backends.pop(), backends.is_empty()) {
            (Some(backend), true) => Ok(Scenario {
                name: raw.name,
                backend,
            }),
            _ => Err(format!(
                "scenario {:?} must configure exactly one of stormforger, locust or custom",
                raw.name
            )),
        }
    }
}

impl From<Scenario> for RawScenario {
    fn from(scenario: Scenario) -> Self {
        let mut raw = RawScenario {
            name: scenario.name,
            ..Default::default()
        };
        match scenario.backend {
            ScenarioBackend::StormForger(s) => raw.storm_forger = Some(s),
            ScenarioBackend::Locust(l) => raw.locust = Some(l),
            ScenarioBackend::Custom(c) => raw.custom = Some(c),
        }
        raw
    }
}

/// A named set of goals optimized together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

/// A single metric backed target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGoal", into = "RawGoal")]
pub struct Goal {
    pub name: String,
    pub min: Option<Quantity>,
    pub max: Option<Quantity>,
    /// `Some(false)` marks a goal that is only observed
    pub optimize: Option<bool>,
    /// `None` until configured explicitly or derived from the name
    pub kind: Option<GoalKind>,
}

impl Goal {
    pub fn is_optimized(&self) -> bool {
        self.optimize.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GoalKind {
    Requests(RequestsGoal),
    Latency(String),
    ErrorRate(String),
    Duration(String),
    Prometheus(PrometheusGoal),
    Datadog(DatadogGoal),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsGoal {
    /// Prometheus style selector (`app="web",tier!="db"`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<ResourceList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusGoal {
    pub query: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub maximize: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatadogGoal {
    pub query: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aggregator: String,
    #[serde(default)]
    pub maximize: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGoal {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optimize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requests: Option<RequestsGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prometheus: Option<PrometheusGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    datadog: Option<DatadogGoal>,
}

impl TryFrom<RawGoal> for Goal {
    type Error = String;

    fn try_from(raw: RawGoal) -> Result<Self, Self::Error> {
        let kinds: Vec<GoalKind> = [
            raw.requests.map(GoalKind::Requests),
            raw.latency.map(GoalKind::Latency),
            raw.error_rate.map(GoalKind::ErrorRate),
            raw.duration.map(GoalKind::Duration),
            raw.prometheus.map(GoalKind::Prometheus),
            raw.datadog.map(GoalKind::Datadog),
        ]
        .into_iter()
        .flatten()
        .collect();

        if kinds.len() > 1 {
            return Err(format!("goal {:?} must configure at most one metric source", raw.name));
        }

        Ok(Goal {
            name: raw.name,
            min: raw.min,
            max: raw.max,
            optimize: raw.optimize,
            kind: kinds.into_iter().next(),
        })
    }
}

impl From<Goal> for RawGoal {
    fn from(goal: Goal) -> Self {
        let mut raw = RawGoal {
            name: goal.name,
            max: goal.max,
            min: goal.min,
            optimize: goal.optimize,
            ..Default::default()
        };
        match goal.kind {
            Some(GoalKind::Requests(r)) => raw.requests = Some(r),
            Some(GoalKind::Latency(l)) => raw.latency = Some(l),
            Some(GoalKind::ErrorRate(e)) => raw.error_rate = Some(e),
            Some(GoalKind::Duration(d)) => raw.duration = Some(d),
            Some(GoalKind::Prometheus(p)) => raw.prometheus = Some(p),
            Some(GoalKind::Datadog(d)) => raw.datadog = Some(d),
            None => {}
        }
        raw
    }
}
