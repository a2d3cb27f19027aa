//! Metric sources for goals that do not depend on the scenario

use super::source::{GoalTracker, MetricSource};
use super::{convert_prometheus_selector, goal_metric};
use crate::api::defaults::{DURATION_TRIAL, ERROR_RATE_REQUESTS};
use crate::api::{DatadogGoal, GoalKind, LatencyType, Metric, MetricType, PrometheusGoal, RequestsGoal, ResourceList, ResourceTarget};
use crate::error::Result;
use crate::quantity::{Format, Quantity};
use tracing::warn;

/// Weighted sum of the resource requests of the pods matching a selector
#[derive(Debug, Clone)]
pub struct RequestsMetricsSource {
    pub index: usize,
    pub requests: RequestsGoal,
}

impl RequestsMetricsSource {
    fn target(&self) -> Result<ResourceTarget> {
        Ok(ResourceTarget {
            api_version: "v1".into(),
            kind: "PodList".into(),
            label_selector: convert_prometheus_selector(&self.requests.selector)?,
        })
    }
}

impl MetricSource for RequestsMetricsSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        if goals.is_implemented(self.index) {
            return Ok(Vec::new());
        }

        let weights = self.requests.weights.clone().unwrap_or_default();
        let target = self.target()?;
        let metric = goal_metric(goals, self.index, requests_query(&weights));
        let mut result = vec![Metric {
            metric_type: None,
            target: Some(target.clone()),
            ..metric
        }];

        let Some(goal) = goals.goal(self.index) else {
            return Ok(result);
        };

        // Cost goals also report the raw requests they are computed from
        let non_zero = |name: &str| weights.get(name).is_some_and(|q| !q.is_zero());
        if goal.name.contains("cost") && non_zero("cpu") && non_zero("memory") && goal.is_optimized() {
            for resource in ["cpu", "memory"] {
                let single = ResourceList::from([(resource.to_string(), Quantity::new(1, Format::DecimalSI))]);
                result.push(Metric {
                    name: format!("{}-{resource}-requests", goal.name),
                    minimize: true,
                    optimize: Some(false),
                    query: requests_query(&single),
                    target: Some(target.clone()),
                    ..Default::default()
                });
            }
        }
        Ok(result)
    }
}

/// `{{ resourceRequests .Target "cpu=0.017,memory=0.000000000003" }}`
///
/// CPU weights are per core and memory weights per gigabyte, the query evaluates
/// millicores and bytes.
fn requests_query(weights: &ResourceList) -> String {
    let weights: Vec<String> = weights
        .iter()
        .map(|(name, q)| {
            let scale = if name == "memory" { 4 } else { 1 };
            let weight = q.value() as f64 / 1000f64.powi(scale);
            format!("{name}={weight}")
        })
        .collect();
    format!("{{{{ resourceRequests .Target {:?} }}}}", weights.join(","))
}

/// Series pushed by a load test trial job, scoped to the current trial
pub(crate) fn trial_run_series(metric: &str) -> String {
    format!(r#"{metric}{{job="trialRun",instance="{{{{ .Trial.Name }}}}"}}"#)
}

/// Latency and error rate metrics reported by a load generator.
///
/// `latency_series` maps a latency measure onto the generator's series name; measures
/// it does not know about produce no metric.
pub(crate) fn load_test_metrics(
    goals: &mut GoalTracker,
    latency_series: fn(LatencyType) -> &'static str,
    error_rate_query: &str,
) -> Vec<Metric> {
    let mut result = Vec::new();
    for (index, goal) in goals.pending() {
        match &goal.kind {
            Some(GoalKind::Latency(latency)) => match LatencyType::parse(latency) {
                Some(latency) => {
                    let query = format!("scalar({})", trial_run_series(latency_series(latency)));
                    result.push(goal_metric(goals, index, query));
                }
                None => warn!(goal = %goal.name, latency = %latency, "Unrecognized latency measure"),
            },
            Some(GoalKind::ErrorRate(error_rate)) => {
                if error_rate == ERROR_RATE_REQUESTS {
                    result.push(goal_metric(goals, index, error_rate_query));
                } else {
                    warn!(goal = %goal.name, error_rate = %error_rate, "Unrecognized error rate measure");
                }
            }
            _ => {}
        }
    }
    result
}

/// Elapsed time of the trial
#[derive(Debug, Clone)]
pub struct DurationMetricsSource {
    pub index: usize,
    pub duration: String,
}

impl MetricSource for DurationMetricsSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        if goals.is_implemented(self.index) {
            return Ok(Vec::new());
        }
        if self.duration != DURATION_TRIAL {
            warn!(duration = %self.duration, "Unsupported duration goal");
            return Ok(Vec::new());
        }

        let metric = goal_metric(goals, self.index, "{{ duration .StartTime .CompletionTime }}");
        Ok(vec![Metric {
            metric_type: None,
            ..metric
        }])
    }
}

/// A user supplied Prometheus query
#[derive(Debug, Clone)]
pub struct PrometheusMetricsSource {
    pub index: usize,
    pub prometheus: PrometheusGoal,
}

impl MetricSource for PrometheusMetricsSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        if goals.is_implemented(self.index) {
            return Ok(Vec::new());
        }

        let metric = goal_metric(goals, self.index, self.prometheus.query.clone());
        Ok(vec![Metric {
            url: self.prometheus.url.clone(),
            minimize: !self.prometheus.maximize,
            ..metric
        }])
    }
}

/// A user supplied Datadog query
#[derive(Debug, Clone)]
pub struct DatadogMetricsSource {
    pub index: usize,
    pub datadog: DatadogGoal,
}

impl MetricSource for DatadogMetricsSource {
    fn metrics(&self, goals: &mut GoalTracker) -> Result<Vec<Metric>> {
        if goals.is_implemented(self.index) {
            return Ok(Vec::new());
        }

        let mut url = String::new();
        if !self.datadog.aggregator.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("aggregator", &self.datadog.aggregator)
                .finish();
            url = format!("?{query}");
        }

        let metric = goal_metric(goals, self.index, self.datadog.query.clone());
        Ok(vec![Metric {
            metric_type: Some(MetricType::Datadog),
            url,
            minimize: !self.datadog.maximize,
            ..metric
        }])
    }
}
