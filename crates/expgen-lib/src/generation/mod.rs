//! Experiment generation
//!
//! Scan results ([`Source`]s) are turned into an experiment by the [`Transformer`]. This
//! module holds the parameter sites found by the resource selectors, the metric and
//! scenario sources derived from the application, and the pieces they share.

mod application;
mod config_maps;
mod container_resources;
mod custom;
mod env_vars;
mod filters;
mod locust;
mod metrics;
mod namer;
mod patch;
mod prometheus;
mod ranges;
mod replicas;
mod source;
mod stormforger;
mod transformer;

pub use application::ApplicationSelector;
pub use config_maps::{ConfigMapKeySelector, ConfigMapValue};
pub use container_resources::{ContainerLimits, ContainerResourcesSelector, CONTAINER_RESOURCES_PATH};
pub use custom::CustomSource;
pub use env_vars::EnvironmentVariablesSelector;
pub use filters::{hash_suffix, set_cluster_role_suffix, set_experiment_labels, set_labels, set_namespace};
pub use locust::LocustSource;
pub use metrics::{DatadogMetricsSource, DurationMetricsSource, PrometheusMetricsSource, RequestsMetricsSource};
pub use namer::ParameterNamer;
pub use patch::{int_template, render_patch, template_value, PatchEdit, PatchSet};
pub use prometheus::BuiltInPrometheus;
pub use ranges::{resource_range, ResourceBounds, ResourceKind, ResourceRange};
pub use replicas::ReplicaSelector;
pub use source::{ExperimentSource, GoalTracker, MetricSource, ParameterSource, PatchSource, ResourceSource, Source};
pub use stormforger::StormForgerSource;
pub use transformer::{TransformOutput, Transformer};

use crate::api::{Metric, MetricType};
use crate::document::Node;
use crate::error::{GenerationError, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement, ObjectMeta};
use k8s_openapi::ByteString;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Trial job images, resolved by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialImages {
    pub repository: String,
    /// Explicit tag used for every job
    pub tag: Option<String>,
    /// Prefix combined with the job name when no explicit tag is set
    pub tag_base: String,
}

impl Default for TrialImages {
    fn default() -> Self {
        Self {
            repository: "thestormforge/optimize-trials".to_string(),
            tag: None,
            tag_base: "v0.0.1".to_string(),
        }
    }
}

impl TrialImages {
    /// Image reference for a trial job (`stormforger`, `locust`)
    pub fn image(&self, job: &str) -> String {
        match &self.tag {
            Some(tag) if !tag.is_empty() => format!("{}:{}", self.repository, tag),
            _ => format!("{}:{}-{}", self.repository, self.tag_base, job),
        }
    }
}

/// Metric for goal `index` carrying the goal's name, bounds and optimize flag.
///
/// The goal is marked implemented; callers adjust the type, direction and URL.
pub(crate) fn goal_metric(goals: &mut GoalTracker, index: usize, query: impl Into<String>) -> Metric {
    goals.mark_implemented(index);
    let goal = goals.goal(index).cloned().unwrap_or_default();
    Metric {
        name: goal.name,
        minimize: true,
        min: goal.min,
        max: goal.max,
        optimize: goal.optimize,
        metric_type: Some(MetricType::Prometheus),
        query: query.into(),
        url: String::new(),
        target: None,
    }
}

/// Serialize a Kubernetes object into an output document
pub(crate) fn to_node<T: Serialize>(object: &T) -> Result<Node> {
    Ok(serde_yaml::to_value(object)?)
}

/// A ConfigMap holding a single file; contents that are not UTF-8 go to `binaryData`
pub(crate) fn file_config_map(name: String, key: String, contents: Vec<u8>) -> ConfigMap {
    let mut config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        ..Default::default()
    };
    match String::from_utf8(contents) {
        Ok(text) => config_map.data = Some(BTreeMap::from([(key, text)])),
        Err(e) => config_map.binary_data = Some(BTreeMap::from([(key, ByteString(e.into_bytes()))])),
    }
    config_map
}

/// Convert a Prometheus series selector (`app="web",tier!="db"`) into a label selector
pub fn convert_prometheus_selector(selector: &str) -> Result<Option<LabelSelector>> {
    static MATCHER: OnceLock<Regex> = OnceLock::new();
    let matcher = MATCHER.get_or_init(|| {
        Regex::new(r#"^\s*([a-zA-Z_][a-zA-Z0-9_]*)(=|!=|=~|!~)"([a-zA-Z0-9\-|]+)"\s*$"#)
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    });

    if selector.trim().is_empty() {
        return Ok(None);
    }

    let mut match_labels = BTreeMap::new();
    let mut match_expressions = Vec::new();
    for part in selector.split(',') {
        let caps = matcher
            .captures(part)
            .ok_or_else(|| GenerationError::InvalidApplication(format!("invalid metric selector {selector:?}")))?;
        let (key, op, value) = (&caps[1], &caps[2], &caps[3]);

        let requirement = |operator: &str, values: Vec<String>| LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: Some(values),
        };
        match op {
            "=" => {
                match_labels.insert(key.to_string(), value.to_string());
            }
            "!=" => match_expressions.push(requirement("NotIn", vec![value.to_string()])),
            "=~" => match_expressions.push(requirement("In", value.split('|').map(String::from).collect())),
            _ => match_expressions.push(requirement("NotIn", value.split('|').map(String::from).collect())),
        }
    }

    Ok(Some(LabelSelector {
        match_labels: (!match_labels.is_empty()).then_some(match_labels),
        match_expressions: (!match_expressions.is_empty()).then_some(match_expressions),
    }))
}
