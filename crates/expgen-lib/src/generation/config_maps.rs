//! ConfigMap key parameters
//!
//! Unlike the workload selectors, a ConfigMap value that does not conform to the declared
//! range or value set fails the scan instead of being skipped.

use super::namer::ParameterNamer;
use super::patch::{template_value, PatchEdit};
use super::source::{ParameterSource, PatchSource, Source};
use crate::api::{ConfigMapKey, Parameter};
use crate::document::{FieldMatch, Node, PathMatcher, ResourceMeta, TargetRef};
use crate::error::{GenerationError, Result};
use crate::scan::{GenericSelector, Selector};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Declared shape of the value stored under the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigMapValue {
    Numeric {
        prefix: String,
        suffix: String,
        min: i32,
        max: i32,
    },
    Values(Vec<String>),
}

/// Finds one key of the `data` map of ConfigMaps
#[derive(Debug, Clone)]
pub struct ConfigMapKeySelector {
    pub selector: GenericSelector,
    pub key: String,
    pub create_if_not_present: bool,
    pub value: ConfigMapValue,
}

impl ConfigMapKeySelector {
    pub fn from_config(config: &ConfigMapKey) -> Result<Self> {
        if config.key.is_empty() {
            return Err(GenerationError::SelectorConfig("config map key is required".into()));
        }

        let value = match (&config.numeric, config.values.is_empty()) {
            (Some(numeric), _) => {
                if numeric.min > numeric.max {
                    return Err(GenerationError::SelectorConfig(format!(
                        "config map key {:?} has an empty range {} to {}",
                        config.key, numeric.min, numeric.max
                    )));
                }
                ConfigMapValue::Numeric {
                    prefix: numeric.prefix.clone(),
                    suffix: numeric.suffix.clone(),
                    min: numeric.min,
                    max: numeric.max,
                }
            }
            (None, false) => ConfigMapValue::Values(config.values.clone()),
            (None, true) => {
                return Err(GenerationError::SelectorConfig(format!(
                    "config map key {:?} must declare a numeric range or values",
                    config.key
                )));
            }
        };

        Ok(Self {
            selector: GenericSelector {
                version: "v1".into(),
                kind: "ConfigMap".into(),
                name: config.name.clone(),
                namespace: config.namespace.clone(),
                label_selector: config.label_selector.clone(),
                ..Default::default()
            },
            key: config.key.clone(),
            create_if_not_present: config.create_if_not_present,
            value,
        })
    }

    /// Check the current value and return the baseline it implies
    fn baseline(&self, current: Option<&str>) -> Result<Option<IntOrString>> {
        let Some(current) = current else {
            return Ok(None);
        };

        match &self.value {
            ConfigMapValue::Numeric {
                prefix,
                suffix,
                min,
                max,
            } => {
                let bare = current.strip_suffix(suffix.as_str()).unwrap_or(current);
                let bare = bare.strip_prefix(prefix.as_str()).unwrap_or(bare);
                let value: i32 = bare.trim().parse().map_err(|_| {
                    GenerationError::ValueOutOfRange(format!("expected {current:?} to be a numeric value"))
                })?;
                if value < *min || value > *max {
                    return Err(GenerationError::ValueOutOfRange(format!(
                        "expected {current:?} to be in the range {min} to {max}"
                    )));
                }
                Ok(Some(IntOrString::Int(value)))
            }
            ConfigMapValue::Values(values) => {
                if !values.iter().any(|v| v == current) {
                    return Err(GenerationError::ValueOutOfRange(format!(
                        "expected {current:?} to be one of: {}",
                        values.join(", ")
                    )));
                }
                Ok(Some(IntOrString::String(current.to_string())))
            }
        }
    }

    fn find(&self, node: &Node) -> Result<Vec<FieldMatch>> {
        let path = vec!["data".to_string(), self.key.clone()];
        let found = PathMatcher::new(&path)?.find(node, self.create_if_not_present);

        // A ConfigMap without any data still gets the key when creation is requested
        let has_data = node.get("data").is_some_and(|d| !d.is_null());
        if found.is_empty() && self.create_if_not_present && !has_data {
            return Ok(vec![FieldMatch { path, value: None }]);
        }
        Ok(found)
    }
}

impl Selector for ConfigMapKeySelector {
    fn select<'a>(&mut self, nodes: &'a [Node]) -> Result<Vec<&'a Node>> {
        self.selector.select(nodes)
    }

    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Source>> {
        let mut result = Vec::new();
        for found in self.find(node)? {
            let current = match &found.value {
                Some(Node::String(s)) => Some(s.clone()),
                Some(Node::Number(n)) => Some(n.to_string()),
                Some(Node::Bool(b)) => Some(b.to_string()),
                _ => None,
            };
            let baseline = self.baseline(current.as_deref()).map_err(|e| match e {
                GenerationError::ValueOutOfRange(reason) => GenerationError::ValueOutOfRange(format!(
                    "config map {:?} key {:?}: {reason}",
                    meta.name, self.key
                )),
                other => other,
            })?;

            result.push(Source::parameter_site(ConfigMapKeyParameter {
                target: meta.target_ref(),
                path: found.path,
                key: self.key.clone(),
                value: self.value.clone(),
                baseline,
            }));
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct ConfigMapKeyParameter {
    target: TargetRef,
    path: Vec<String>,
    key: String,
    value: ConfigMapValue,
    baseline: Option<IntOrString>,
}

impl ParameterSource for ConfigMapKeyParameter {
    fn parameters(&self, namer: &ParameterNamer) -> Result<Vec<Parameter>> {
        let mut parameter = Parameter {
            name: namer.name(&self.target, &self.path, &self.key),
            baseline: self.baseline.clone(),
            ..Default::default()
        };
        match &self.value {
            ConfigMapValue::Numeric { min, max, .. } => {
                parameter.min = *min;
                parameter.max = *max;
            }
            ConfigMapValue::Values(values) => parameter.values = values.clone(),
        }
        Ok(vec![parameter])
    }
}

impl PatchSource for ConfigMapKeyParameter {
    fn target_ref(&self) -> &TargetRef {
        &self.target
    }

    fn patch(&self, namer: &ParameterNamer) -> Result<Vec<PatchEdit>> {
        let name = namer.name(&self.target, &self.path, &self.key);
        let value = match &self.value {
            ConfigMapValue::Numeric { prefix, suffix, .. } => template_value(prefix, &name, suffix),
            ConfigMapValue::Values(_) => template_value("", &name, ""),
        };
        Ok(vec![PatchEdit::new(self.path.clone(), value)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NumericValue;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn config_map(data: &str) -> Node {
        serde_yaml::from_str(&format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: tuning\n{data}\n"
        ))
        .unwrap()
    }

    fn numeric(key: &str, min: i32, max: i32) -> ConfigMapKey {
        ConfigMapKey {
            key: key.into(),
            numeric: Some(NumericValue {
                prefix: String::new(),
                suffix: "ms".into(),
                min,
                max,
            }),
            ..Default::default()
        }
    }

    fn map(config: &ConfigMapKey, node: &Node) -> Result<Vec<Source>> {
        ConfigMapKeySelector::from_config(config)?.map(node, &ResourceMeta::from_node(node))
    }

    #[test]
    fn test_numeric_value_in_range() {
        let node = config_map("data:\n  timeout: 250ms\n");
        let sources = map(&numeric("timeout", 100, 1000), &node).unwrap();
        let namer = ParameterNamer::new([sources[0].patch.as_ref().unwrap().target_ref()]);

        let params = sources[0].parameters.as_ref().unwrap().parameters(&namer).unwrap();
        assert_eq!(
            params,
            vec![Parameter {
                name: "timeout".into(),
                baseline: Some(IntOrString::Int(250)),
                min: 100,
                max: 1000,
                values: Vec::new(),
            }]
        );

        let edits = sources[0].patch.as_ref().unwrap().patch(&namer).unwrap();
        assert_eq!(edits[0].value, Node::String("{{ .Values.timeout }}ms".into()));
    }

    #[rstest]
    #[case("data:\n  timeout: 5000ms\n", "in the range 100 to 1000")]
    #[case("data:\n  timeout: fast\n", "to be a numeric value")]
    fn test_numeric_value_rejected(#[case] data: &str, #[case] reason: &str) {
        let err = map(&numeric("timeout", 100, 1000), &config_map(data)).unwrap_err();
        let GenerationError::ValueOutOfRange(message) = err else {
            panic!("expected a value out of range error");
        };
        assert!(message.contains(reason), "{message}");
        assert!(message.contains("\"tuning\""), "{message}");
    }

    #[test]
    fn test_values_are_enforced() {
        let config = ConfigMapKey {
            key: "mode".into(),
            values: vec!["fast".into(), "safe".into()],
            ..Default::default()
        };
        assert_eq!(map(&config, &config_map("data:\n  mode: safe\n")).unwrap().len(), 1);

        let err = map(&config, &config_map("data:\n  mode: turbo\n")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "config map \"tuning\" key \"mode\": expected \"turbo\" to be one of: fast, safe"
        );
    }

    #[test]
    fn test_missing_key() {
        let config = numeric("timeout", 100, 1000);
        assert!(map(&config, &config_map("data:\n  other: x\n")).unwrap().is_empty());

        let create = ConfigMapKey {
            create_if_not_present: true,
            ..config
        };
        let sources = map(&create, &config_map("")).unwrap();
        assert_eq!(sources.len(), 1);
        let namer = ParameterNamer::default();
        let params = sources[0].parameters.as_ref().unwrap().parameters(&namer).unwrap();
        assert_eq!(params[0].baseline, None);
    }

    #[test]
    fn test_requires_numeric_or_values() {
        let err = ConfigMapKeySelector::from_config(&ConfigMapKey {
            key: "mode".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, GenerationError::SelectorConfig(_)));
    }
}
