//! `describe`: the scenarios and objectives of an application after defaulting

use anyhow::Result;
use expgen_lib::api::{Goal, GoalKind, ScenarioBackend};
use expgen_lib::generator::experiment_name;
use expgen_lib::Application;
use serde::Serialize;
use tabled::Tabled;

use crate::loader::Loader;
use crate::output::{print_info, print_structured, print_table, OutputFormat};

/// Row for the scenarios table
#[derive(Tabled, Serialize)]
struct ScenarioRow {
    #[tabled(rename = "Scenario")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Source")]
    source: String,
}

/// Row for the objectives table
#[derive(Tabled, Serialize)]
struct ObjectiveRow {
    #[tabled(rename = "Objective")]
    name: String,
    #[tabled(rename = "Goal")]
    goal: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Optimized")]
    optimized: bool,
}

#[derive(Serialize)]
struct Description {
    application: String,
    scenarios: Vec<ScenarioRow>,
    objectives: Vec<ObjectiveRow>,
    experiments: Vec<String>,
}

/// Describe an application
pub async fn describe_application(filename: &str, format: OutputFormat) -> Result<()> {
    let mut application = Loader::new()?.load_application(filename).await?;
    application.apply_defaults();
    let description = describe(&application);

    match format {
        OutputFormat::Table => {
            print_table("Scenarios", &description.scenarios);
            println!();
            print_table("Objectives", &description.objectives);
            for name in &description.experiments {
                print_info(&format!("Experiment: {name}"));
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_structured(&description, format)?,
    }
    Ok(())
}

fn describe(application: &Application) -> Description {
    let scenarios = application
        .scenarios
        .iter()
        .map(|s| ScenarioRow {
            name: s.name.clone(),
            kind: s.backend.kind().to_string(),
            source: scenario_source(&s.backend),
        })
        .collect();

    let objectives = application
        .objectives
        .iter()
        .flat_map(|o| {
            o.goals.iter().map(|g| ObjectiveRow {
                name: o.name.clone(),
                goal: g.name.clone(),
                metric: goal_metric(g),
                optimized: g.is_optimized(),
            })
        })
        .collect();

    // Every scenario/objective combination that can be generated
    let scenario_names: Vec<&str> = match application.scenarios.as_slice() {
        [] => vec![""],
        scenarios => scenarios.iter().map(|s| s.name.as_str()).collect(),
    };
    let objective_names: Vec<&str> = match application.objectives.as_slice() {
        [] => vec![""],
        objectives => objectives.iter().map(|o| o.name.as_str()).collect(),
    };
    let experiments = scenario_names
        .iter()
        .flat_map(|s| objective_names.iter().map(|o| experiment_name(application.name(), s, o)))
        .collect();

    Description {
        application: application.name().to_string(),
        scenarios,
        objectives,
        experiments,
    }
}

fn scenario_source(backend: &ScenarioBackend) -> String {
    match backend {
        ScenarioBackend::StormForger(sf) if !sf.test_case_file.is_empty() => sf.test_case_file.clone(),
        ScenarioBackend::StormForger(sf) => sf.test_case.clone(),
        ScenarioBackend::Locust(l) => l.locustfile.clone(),
        ScenarioBackend::Custom(c) => c.image.clone(),
    }
}

fn goal_metric(goal: &Goal) -> String {
    match &goal.kind {
        Some(GoalKind::Requests(r)) => {
            let weights = r
                .weights
                .iter()
                .flatten()
                .map(|(name, weight)| format!("{name}={weight}"))
                .collect::<Vec<_>>()
                .join(",");
            format!("requests ({weights})")
        }
        Some(GoalKind::Latency(latency)) => format!("latency ({latency})"),
        Some(GoalKind::ErrorRate(kind)) => format!("error rate ({kind})"),
        Some(GoalKind::Duration(kind)) => format!("duration ({kind})"),
        Some(GoalKind::Prometheus(p)) => format!("prometheus ({})", p.query),
        Some(GoalKind::Datadog(d)) => format!("datadog ({})", d.query),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let mut application: Application = serde_yaml::from_str(
            r#"
metadata:
  name: shop
scenarios:
- locust:
    locustfile: browse.py
- stormforger:
    testCase: acme/checkout
objectives:
- goals:
  - name: cost
  - name: p95-latency
"#,
        )
        .unwrap();
        application.apply_defaults();

        let description = describe(&application);
        let scenarios: Vec<(&str, &str)> = description
            .scenarios
            .iter()
            .map(|s| (s.name.as_str(), s.kind.as_str()))
            .collect();
        assert_eq!(scenarios, vec![("browse", "locust"), ("checkout", "stormforger")]);

        assert_eq!(description.objectives.len(), 2);
        assert_eq!(description.objectives[0].name, "cost-vs-p95-latency");
        assert!(description.objectives[0].metric.starts_with("requests ("));
        assert_eq!(description.objectives[1].metric, "latency (percentile_95)");
        assert_eq!(
            description.experiments,
            vec!["shop-browse-cost-vs-p95-latency", "shop-checkout-cost-vs-p95-latency"]
        );
    }
}
