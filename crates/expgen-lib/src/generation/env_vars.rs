//! Environment variable parameters

use super::namer::ParameterNamer;
use super::patch::{template_value, PatchEdit};
use super::source::{ParameterSource, PatchSource, Source};
use crate::api::{EnvironmentVariable, Parameter};
use crate::document::{field_path, Node, PathMatcher, ResourceMeta, TargetRef};
use crate::error::{GenerationError, Result};
use crate::scan::{GenericSelector, Selector};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const ENV_VAR_PATH: &str =
    "/spec/template/spec/containers/[name={ .ContainerName }]/env/[name={ .VariableName }]/value";

/// Finds the value of a named environment variable in pod templates
#[derive(Debug, Clone)]
pub struct EnvironmentVariablesSelector {
    pub selector: GenericSelector,
    pub path: String,
    pub container_name: String,
    /// Exact variable name, matched literally
    pub variable_name: String,
    pub value_prefix: String,
    pub value_suffix: String,
    /// Categorical values, an integer range is used when empty
    pub values: Vec<String>,
}

impl EnvironmentVariablesSelector {
    pub fn from_config(config: &EnvironmentVariable) -> Self {
        Self {
            selector: GenericSelector {
                group: "apps|extensions".into(),
                kind: "Deployment|StatefulSet".into(),
                label_selector: config.label_selector.clone(),
                ..Default::default()
            },
            path: ENV_VAR_PATH.into(),
            container_name: config.container_name.clone(),
            variable_name: config.name.clone(),
            value_prefix: config.prefix.clone(),
            value_suffix: config.suffix.clone(),
            values: config.values.clone(),
        }
    }
}

impl Selector for EnvironmentVariablesSelector {
    fn select<'a>(&mut self, nodes: &'a [Node]) -> Result<Vec<&'a Node>> {
        self.selector.select(nodes)
    }

    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Source>> {
        let container_name = if self.container_name.is_empty() {
            ".*".to_string()
        } else {
            self.container_name.clone()
        };
        let vars = BTreeMap::from([
            ("ContainerName".to_string(), container_name),
            ("VariableName".to_string(), regex::escape(&self.variable_name)),
        ]);
        let path = field_path(&self.path, &vars)?;
        let matcher = PathMatcher::new(&path)?;

        let mut result = Vec::new();
        for found in matcher.find(node, false) {
            let value = match &found.value {
                Some(Node::String(s)) => s.clone(),
                Some(Node::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            result.push(Source::parameter_site(EnvironmentVariableParameter {
                target: meta.target_ref(),
                path: found.path,
                value,
                prefix: self.value_prefix.clone(),
                suffix: self.value_suffix.clone(),
                values: self.values.clone(),
            }));
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct EnvironmentVariableParameter {
    target: TargetRef,
    path: Vec<String>,
    value: String,
    prefix: String,
    suffix: String,
    values: Vec<String>,
}

impl EnvironmentVariableParameter {
    /// The value without the configured prefix and suffix
    fn bare_value(&self) -> &str {
        let value = self.value.strip_suffix(self.suffix.as_str()).unwrap_or(&self.value);
        value.strip_prefix(self.prefix.as_str()).unwrap_or(value)
    }

    fn name(&self, namer: &ParameterNamer) -> String {
        namer.name(&self.target, &self.path, "")
    }
}

impl ParameterSource for EnvironmentVariableParameter {
    fn parameters(&self, namer: &ParameterNamer) -> Result<Vec<Parameter>> {
        let value = self.bare_value();
        let mut parameter = Parameter {
            name: self.name(namer),
            ..Default::default()
        };

        if !self.values.is_empty() {
            let baseline = if value.is_empty() { self.values[0].as_str() } else { value };
            if !self.values.iter().any(|v| v == baseline) {
                return Err(GenerationError::ValueOutOfRange(format!(
                    "expected {baseline:?} to be one of: {}",
                    self.values.join(", ")
                )));
            }
            parameter.baseline = Some(IntOrString::String(baseline.to_string()));
            parameter.values = self.values.clone();
        } else if let Ok(baseline) = value.parse::<i32>() {
            parameter.baseline = Some(IntOrString::Int(baseline));
            parameter.min = baseline / 2;
            parameter.max = baseline.saturating_mul(2);
        } else {
            parameter.min = 100;
            parameter.max = 4000;
        }

        Ok(vec![parameter])
    }
}

impl PatchSource for EnvironmentVariableParameter {
    fn target_ref(&self) -> &TargetRef {
        &self.target
    }

    fn patch(&self, namer: &ParameterNamer) -> Result<Vec<PatchEdit>> {
        let value = template_value(&self.prefix, &self.name(namer), &self.suffix);
        Ok(vec![PatchEdit::new(self.path.clone(), value)])
    }
}
