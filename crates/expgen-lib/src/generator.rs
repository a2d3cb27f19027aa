//! Generation entry point: application in, experiment and supporting documents out

use crate::api::{Application, Experiment, Objective, Scenario};
use crate::credentials::CredentialChain;
use crate::document::{write_json_list, write_yaml_stream, FieldOrder, Node};
use crate::error::{GenerationError, Result};
use crate::generation::{
    hash_suffix, set_cluster_role_suffix, set_experiment_labels, set_labels, set_namespace, to_node,
    ApplicationSelector, ConfigMapKeySelector, ContainerResourcesSelector, EnvironmentVariablesSelector,
    ReplicaSelector, TransformOutput, Transformer, TrialImages,
};
use crate::loader::{FileLoader, FsLoader};
use crate::scan::{Scanner, Selector};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_APPLICATION: &str = "optimize.stormforge.io/application";
pub const LABEL_SCENARIO: &str = "optimize.stormforge.io/scenario";
pub const LABEL_OBJECTIVE: &str = "optimize.stormforge.io/objective";

/// Generates an experiment for one scenario and objective of an application
#[derive(Clone)]
pub struct Generator {
    pub application: Application,
    /// Scenario to use, required when the application has more than one
    pub scenario: Option<String>,
    /// Objective to use, required when the application has more than one
    pub objective: Option<String>,
    /// Overrides the name derived from the application, scenario and objective
    pub experiment_name: Option<String>,
    pub include_application_resources: bool,
    pub trial_images: TrialImages,
    pub loader: Arc<dyn FileLoader>,
    pub credentials: CredentialChain,
}

impl Generator {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            scenario: None,
            objective: None,
            experiment_name: None,
            include_application_resources: false,
            trial_images: TrialImages::default(),
            loader: Arc::new(FsLoader),
            credentials: CredentialChain::default(),
        }
    }

    /// Scan `nodes` and build the experiment
    pub fn generate(&self, nodes: &[Node]) -> Result<GeneratedExperiment> {
        let mut application = self.application.clone();
        application.apply_defaults();

        let scenario = select_by_name(&application.scenarios, self.scenario.as_deref(), "scenario", |s| &s.name)?;
        let objective = select_by_name(&application.objectives, self.objective.as_deref(), "objective", |o| &o.name)?;
        let scenario_name = scenario.map(|s| s.name.clone()).unwrap_or_default();
        let objective_name = objective.map(|o| o.name.clone()).unwrap_or_default();
        let experiment_name = match self.experiment_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => experiment_name(application.name(), &scenario_name, &objective_name),
        };
        debug!(
            application = %application.name(),
            scenario = %scenario_name,
            objective = %objective_name,
            "Generating experiment"
        );

        let scenario = scenario.cloned();
        let objective: Option<Objective> = objective.cloned();
        let application = Arc::new(application);

        let mut selectors = self.selectors(&application)?;
        selectors.push(Box::new(ApplicationSelector {
            application: application.clone(),
            scenario,
            objective: objective.clone(),
            trial_images: self.trial_images.clone(),
            loader: self.loader.clone(),
            credentials: self.credentials.clone(),
        }));

        let sources = Scanner::new(selectors).scan(nodes)?;
        let transformer = Transformer {
            include_application_resources: self.include_application_resources,
        };
        let TransformOutput {
            mut experiment,
            mut resources,
            mut application_resources,
        } = transformer.transform(nodes, &sources, objective.as_ref())?;

        // Post-processing
        let namespace = application.namespace().unwrap_or_default();
        let common_labels = BTreeMap::from([
            (LABEL_NAME.to_string(), application.name().to_string()),
            (LABEL_APPLICATION.to_string(), application.name().to_string()),
        ]);
        let suffix = hash_suffix(&experiment_name);

        experiment.metadata.name = Some(experiment_name.clone());
        if !namespace.is_empty() {
            experiment.metadata.namespace = Some(namespace.to_string());
        }
        let mut experiment_labels = common_labels.clone();
        experiment_labels.insert(LABEL_SCENARIO.to_string(), scenario_name);
        experiment_labels.insert(LABEL_OBJECTIVE.to_string(), objective_name);
        set_experiment_labels(&mut experiment, &experiment_labels);

        for node in resources.iter_mut().chain(application_resources.iter_mut()) {
            set_labels(node, &common_labels);
            set_namespace(node, namespace);
            set_cluster_role_suffix(node, &suffix);
        }

        info!(
            experiment = %experiment_name,
            parameters = experiment.spec.parameters.len(),
            metrics = experiment.spec.metrics.len(),
            resources = resources.len(),
            "Generated experiment"
        );
        Ok(GeneratedExperiment {
            experiment,
            resources,
            application_resources,
        })
    }

    /// Selectors configured by the application parameters, in declaration order
    fn selectors(&self, application: &Application) -> Result<Vec<Box<dyn Selector>>> {
        let mut result: Vec<Box<dyn Selector>> = Vec::new();

        if let Some(parameters) = &application.parameters {
            if let Some(container_resources) = &parameters.container_resources {
                result.push(Box::new(ContainerResourcesSelector::from_config(container_resources)));
            }
            if let Some(replicas) = &parameters.replicas {
                result.push(Box::new(ReplicaSelector::from_config(replicas)));
            }
            for env_var in &parameters.environment_variables {
                result.push(Box::new(EnvironmentVariablesSelector::from_config(env_var)));
            }
            for config_map in &parameters.config_maps {
                result.push(Box::new(ConfigMapKeySelector::from_config(config_map)?));
            }
        }

        if result.is_empty() {
            result.push(Box::new(ContainerResourcesSelector::default()));
        }
        Ok(result)
    }
}

/// Pick an entry by name; without a name there must be at most one entry
fn select_by_name<'a, T>(
    items: &'a [T],
    name: Option<&str>,
    what: &str,
    name_of: impl Fn(&T) -> &String,
) -> Result<Option<&'a T>> {
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        return items
            .iter()
            .find(|item| name_of(item) == name)
            .map(Some)
            .ok_or_else(|| GenerationError::InvalidApplication(format!("unknown {what} {name:?}")));
    }

    match items {
        [] => Ok(None),
        [only] => Ok(Some(only)),
        _ => {
            let names: Vec<&str> = items.iter().map(|item| name_of(item).as_str()).collect();
            Err(GenerationError::InvalidApplication(format!(
                "{what} is required (should be one of {})",
                names.join(", ")
            )))
        }
    }
}

/// `<application>-<scenario>-<objective>`, skipping empty parts
pub fn experiment_name(application: &str, scenario: &str, objective: &str) -> String {
    let clean = |name: &str| -> String {
        name.chars()
            .flat_map(char::to_lowercase)
            .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '.'))
            .collect()
    };

    [clean(application), clean(scenario), clean(objective)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Documents produced by a generation run
#[derive(Debug, Clone)]
pub struct GeneratedExperiment {
    pub experiment: Experiment,
    pub resources: Vec<Node>,
    pub application_resources: Vec<Node>,
}

impl GeneratedExperiment {
    /// Every document in output order: the experiment, auxiliary resources, application resources
    pub fn documents(&self) -> Result<Vec<Node>> {
        let mut documents = Vec::with_capacity(1 + self.resources.len() + self.application_resources.len());
        documents.push(to_node(&self.experiment)?);
        documents.extend(self.resources.iter().cloned());
        documents.extend(self.application_resources.iter().cloned());
        Ok(documents)
    }

    pub fn write_yaml<W: Write>(&self, w: W, order: &FieldOrder) -> Result<()> {
        write_yaml_stream(w, &self.documents()?, order)
    }

    pub fn write_json<W: Write>(&self, w: W, order: &FieldOrder) -> Result<()> {
        write_json_list(w, &self.documents()?, order)
    }
}
