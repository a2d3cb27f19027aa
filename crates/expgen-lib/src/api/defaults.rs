//! Application defaulting
//!
//! Goals may be written as a bare name (`- name: p95-latency`). The tables here map
//! recognized names onto a goal configuration, and fill in scenario, objective and goal
//! names that were left out.

use super::application::{
    Application, CustomScenario, Goal, GoalKind, Objective, RequestsGoal, ResourceList, Scenario,
    ScenarioBackend,
};
use crate::quantity::{Format, Quantity};

const DEFAULT_NAME: &str = "default";

/// Recognized latency measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyType {
    Minimum,
    Maximum,
    Mean,
    Percentile50,
    Percentile95,
    Percentile99,
}

impl LatencyType {
    /// Normalize a user supplied latency identifier (`P95`, `avg`, `percentile_99`, ...)
    pub fn parse(value: &str) -> Option<Self> {
        let key: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "minimum" | "min" => Some(LatencyType::Minimum),
            "maximum" | "max" => Some(LatencyType::Maximum),
            "mean" | "average" | "avg" => Some(LatencyType::Mean),
            "percentile50" | "p50" | "median" | "med" | "50" => Some(LatencyType::Percentile50),
            "percentile95" | "p95" | "95" => Some(LatencyType::Percentile95),
            "percentile99" | "p99" | "99" => Some(LatencyType::Percentile99),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LatencyType::Minimum => "minimum",
            LatencyType::Maximum => "maximum",
            LatencyType::Mean => "mean",
            LatencyType::Percentile50 => "percentile_50",
            LatencyType::Percentile95 => "percentile_95",
            LatencyType::Percentile99 => "percentile_99",
        }
    }
}

/// The only recognized error rate measure
pub const ERROR_RATE_REQUESTS: &str = "requests";

/// The only recognized duration measure
pub const DURATION_TRIAL: &str = "trial";

type GoalSetter = fn(&mut Goal);

/// Goal names that imply a configuration
const NAMED_GOALS: &[(&[&str], GoalSetter)] = &[
    (&["error-rate", "error-ratio", "errors"], set_error_rate),
    (&["duration", "time", "time-elapsed", "elapsed-time"], set_duration),
];

fn set_error_rate(goal: &mut Goal) {
    goal.kind = Some(GoalKind::ErrorRate(ERROR_RATE_REQUESTS.to_string()));
}

fn set_duration(goal: &mut Goal) {
    goal.kind = Some(GoalKind::Duration(DURATION_TRIAL.to_string()));
}

/// Resource weightings for recognized cost names
pub fn default_cost_weights(name: &str) -> Option<ResourceList> {
    let weights: &[(&str, i64)] = match to_name(name).as_str() {
        "cost" => &[("cpu", 17), ("memory", 3)],
        "cost-gcp" | "gcp-cost" | "cost-gke" | "gke-cost" => &[("cpu", 17), ("memory", 2)],
        "cost-aws" | "aws-cost" | "cost-eks" | "eks-cost" => &[("cpu", 18), ("memory", 5)],
        "cpu-requests" | "cpu" => &[("cpu", 1)],
        "memory-requests" | "memory" => &[("memory", 1)],
        _ => return None,
    };
    Some(
        weights
            .iter()
            .map(|(k, v)| (k.to_string(), Quantity::new(*v, Format::DecimalSI)))
            .collect(),
    )
}

/// Lower case with `_` mapped to `-`
fn to_name(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '_' { '-' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

impl Application {
    /// Fill in every derivable scenario, objective and goal setting
    pub fn apply_defaults(&mut self) {
        self.scenarios.iter_mut().for_each(Scenario::apply_defaults);
        self.objectives.iter_mut().for_each(Objective::apply_defaults);
    }
}

impl Scenario {
    pub fn apply_defaults(&mut self) {
        if !self.name.is_empty() {
            return;
        }
        self.name = match &self.backend {
            ScenarioBackend::StormForger(sf) => {
                default_scenario_name(&[&sf.test_case, &sf.test_case_file])
            }
            ScenarioBackend::Locust(l) => default_scenario_name(&[&l.locustfile]),
            ScenarioBackend::Custom(c) => default_custom_scenario_name(c),
        };
    }
}

impl Objective {
    pub fn apply_defaults(&mut self) {
        self.goals.iter_mut().for_each(Goal::apply_defaults);

        if self.name.is_empty() {
            self.name = match self.goals.as_slice() {
                [goal] => goal.name.clone(),
                [a, b] => format!("{}-vs-{}", a.name, b.name),
                _ => DEFAULT_NAME.to_string(),
            };
        }
    }
}

impl Goal {
    pub fn apply_defaults(&mut self) {
        if !self.name.is_empty() && self.kind.is_none() {
            let name = to_name(&self.name);
            if let Some((_, setter)) = NAMED_GOALS.iter().find(|(names, _)| names.contains(&name.as_str())) {
                setter(self);
            } else if let Some(weights) = default_cost_weights(&name) {
                self.kind = Some(GoalKind::Requests(RequestsGoal {
                    selector: String::new(),
                    weights: Some(weights),
                }));
            } else if let Some(latency) = LatencyType::parse(&name.replace("latency", "")) {
                self.kind = Some(GoalKind::Latency(latency.as_str().to_string()));
            }
        }

        if let Some(GoalKind::Requests(requests)) = &mut self.kind {
            if requests.weights.is_none() {
                requests.weights = Some(default_cost_weights(&self.name).unwrap_or_else(|| {
                    [("cpu", 1), ("memory", 1)]
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), Quantity::new(v, Format::DecimalSI)))
                        .collect()
                }));
            }
        }

        if self.name.is_empty() {
            self.name = match &self.kind {
                Some(GoalKind::Requests(_)) => "requests".to_string(),
                Some(GoalKind::Latency(l)) if !l.is_empty() => format!("latency-{l}"),
                Some(GoalKind::Latency(_)) => "latency".to_string(),
                Some(GoalKind::ErrorRate(_)) => "error-rate".to_string(),
                Some(GoalKind::Duration(_)) => "duration".to_string(),
                Some(GoalKind::Prometheus(_)) | Some(GoalKind::Datadog(_)) | None => String::new(),
            };
        }
    }
}

fn default_scenario_name(values: &[&str]) -> String {
    for value in values {
        let base = value.rsplit('/').next().unwrap_or_default();
        if base.is_empty() || base == "." || base == "locustfile.py" {
            continue;
        }
        let stem = match base.rfind('.') {
            Some(pos) if pos > 0 => &base[..pos],
            _ => base,
        };
        return to_name(stem);
    }
    DEFAULT_NAME.to_string()
}

fn default_custom_scenario_name(custom: &CustomScenario) -> String {
    let mut image = custom.image.as_str();

    if let Some(template) = &custom.pod_template {
        if let Some(name) = template.metadata.as_ref().and_then(|m| m.name.as_deref()) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
        if let Some(first) = template.spec.as_ref().and_then(|s| s.containers.first()) {
            if !first.name.is_empty() {
                return first.name.clone();
            }
            if image.is_empty() {
                image = first.image.as_deref().unwrap_or_default();
            }
        }
    }

    if image.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        image_base_name(image).to_string()
    }
}

/// Image name without registry, repository path or tag
pub fn image_base_name(image: &str) -> &str {
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.find(':') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::application::{LocustScenario, StormForgerScenario};
    use rstest::rstest;

    fn named(name: &str) -> Goal {
        Goal {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("P95", Some(LatencyType::Percentile95))]
    #[case("percentile_99", Some(LatencyType::Percentile99))]
    #[case("avg", Some(LatencyType::Mean))]
    #[case("med", Some(LatencyType::Percentile50))]
    #[case("-min", Some(LatencyType::Minimum))]
    #[case("bogus", None)]
    fn test_latency_parse(#[case] input: &str, #[case] expected: Option<LatencyType>) {
        assert_eq!(LatencyType::parse(input), expected);
    }

    #[test]
    fn test_goal_from_name() {
        let mut goal = named("Error_Rate");
        goal.apply_defaults();
        assert_eq!(goal.kind, Some(GoalKind::ErrorRate("requests".into())));

        let mut goal = named("time-elapsed");
        goal.apply_defaults();
        assert_eq!(goal.kind, Some(GoalKind::Duration("trial".into())));

        let mut goal = named("p99-latency");
        goal.apply_defaults();
        assert_eq!(goal.kind, Some(GoalKind::Latency("percentile_99".into())));

        let mut goal = named("latency-bogus");
        goal.apply_defaults();
        assert!(goal.kind.is_none());
    }

    #[test]
    fn test_cost_goal_weights() {
        let mut goal = named("cost-aws");
        goal.apply_defaults();
        let Some(GoalKind::Requests(requests)) = goal.kind else {
            panic!("expected a requests goal");
        };
        let weights = requests.weights.unwrap();
        assert_eq!(weights["cpu"].value(), 18);
        assert_eq!(weights["memory"].value(), 5);
    }

    #[test]
    fn test_requests_without_weights() {
        let mut goal = Goal {
            kind: Some(GoalKind::Requests(RequestsGoal::default())),
            ..Default::default()
        };
        goal.apply_defaults();
        assert_eq!(goal.name, "requests");
        let Some(GoalKind::Requests(requests)) = goal.kind else {
            panic!("expected a requests goal");
        };
        assert_eq!(requests.weights.unwrap().len(), 2);
    }

    #[test]
    fn test_objective_names() {
        let mut one = Objective {
            goals: vec![Goal {
                kind: Some(GoalKind::Latency("p50".into())),
                ..Default::default()
            }],
            ..Default::default()
        };
        one.apply_defaults();
        assert_eq!(one.name, "latency-p50");

        let mut two = Objective {
            goals: vec![named("cost"), named("duration")],
            ..Default::default()
        };
        two.apply_defaults();
        assert_eq!(two.name, "cost-vs-duration");

        let mut none = Objective::default();
        none.apply_defaults();
        assert_eq!(none.name, "default");
    }

    #[test]
    fn test_scenario_names() {
        let mut sf = Scenario {
            name: String::new(),
            backend: ScenarioBackend::StormForger(StormForgerScenario {
                test_case: String::new(),
                test_case_file: "tests/Checkout_Flow.js".into(),
            }),
        };
        sf.apply_defaults();
        assert_eq!(sf.name, "checkout-flow");

        let mut locust = Scenario {
            name: String::new(),
            backend: ScenarioBackend::Locust(LocustScenario {
                locustfile: "load/locustfile.py".into(),
                ..Default::default()
            }),
        };
        locust.apply_defaults();
        assert_eq!(locust.name, "default");

        let mut custom = Scenario {
            name: String::new(),
            backend: ScenarioBackend::Custom(CustomScenario {
                image: "ghcr.io/acme/load-runner:1.2".into(),
                ..Default::default()
            }),
        };
        custom.apply_defaults();
        assert_eq!(custom.name, "load-runner");
    }
}
