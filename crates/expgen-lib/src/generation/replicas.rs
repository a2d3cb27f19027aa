//! Replica count parameters

use super::namer::ParameterNamer;
use super::patch::{int_template, PatchEdit};
use super::source::{ParameterSource, PatchSource, Source};
use crate::api::{Parameter, Replicas};
use crate::document::{field_path, Node, PathMatcher, ResourceMeta, TargetRef};
use crate::error::Result;
use crate::scan::{GenericSelector, Selector};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const REPLICAS_PATH: &str = "/spec/replicas";
const MAX_REPLICAS: i32 = 5;

/// Finds the replica count of scalable workloads
#[derive(Debug, Clone)]
pub struct ReplicaSelector {
    pub selector: GenericSelector,
    pub path: String,
    /// Treat a missing replica count as the Kubernetes default of one
    pub create_if_not_present: bool,
}

impl Default for ReplicaSelector {
    fn default() -> Self {
        Self {
            selector: GenericSelector {
                group: "apps|extensions".into(),
                kind: "Deployment|StatefulSet".into(),
                ..Default::default()
            },
            path: REPLICAS_PATH.into(),
            create_if_not_present: false,
        }
    }
}

impl ReplicaSelector {
    pub fn from_config(config: &Replicas) -> Self {
        let defaults = Self::default();
        Self {
            selector: GenericSelector {
                label_selector: config.label_selector.clone(),
                ..defaults.selector
            },
            create_if_not_present: true,
            ..defaults
        }
    }
}

impl Selector for ReplicaSelector {
    fn select<'a>(&mut self, nodes: &'a [Node]) -> Result<Vec<&'a Node>> {
        self.selector.select(nodes)
    }

    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Source>> {
        let path = field_path(&self.path, &BTreeMap::new())?;
        let matcher = PathMatcher::new(&path)?;

        let mut result = Vec::new();
        for found in matcher.find(node, self.create_if_not_present) {
            let value = match &found.value {
                Some(Node::Number(n)) => n.as_i64(),
                Some(Node::String(s)) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .unwrap_or(1);

            result.push(Source::parameter_site(ReplicaParameter {
                target: meta.target_ref(),
                path: found.path,
                value: i32::try_from(value).unwrap_or(i32::MAX),
            }));
        }
        Ok(result)
    }
}

/// A replica count found during scanning
#[derive(Debug, Clone)]
struct ReplicaParameter {
    target: TargetRef,
    path: Vec<String>,
    value: i32,
}

impl ParameterSource for ReplicaParameter {
    fn parameters(&self, namer: &ParameterNamer) -> Result<Vec<Parameter>> {
        // Nothing to tune on a scaled down workload
        if self.value <= 0 {
            return Ok(Vec::new());
        }

        Ok(vec![Parameter {
            name: namer.name(&self.target, &self.path, "replicas"),
            baseline: Some(IntOrString::Int(self.value)),
            min: 1,
            max: MAX_REPLICAS.max(self.value),
            values: Vec::new(),
        }])
    }
}

impl PatchSource for ReplicaParameter {
    fn target_ref(&self) -> &TargetRef {
        &self.target
    }

    fn patch(&self, namer: &ParameterNamer) -> Result<Vec<PatchEdit>> {
        if self.value <= 0 {
            return Ok(Vec::new());
        }
        let name = namer.name(&self.target, &self.path, "replicas");
        Ok(vec![PatchEdit::new(self.path.clone(), int_template(&name))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn deployment(spec: &str) -> Node {
        serde_yaml::from_str(&format!(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec: {spec}\n"
        ))
        .unwrap()
    }

    fn parameters(selector: &ReplicaSelector, node: &Node) -> Vec<Parameter> {
        let sources = selector.map(node, &ResourceMeta::from_node(node)).unwrap();
        let namer = ParameterNamer::new(sources.iter().filter_map(|s| s.patch.as_ref()).map(|p| p.target_ref()));
        sources
            .iter()
            .flat_map(|s| s.parameters.as_ref().unwrap().parameters(&namer).unwrap())
            .collect()
    }

    #[rstest]
    #[case("{replicas: 3}", Some((3, 1, 5)))]
    #[case("{replicas: 8}", Some((8, 1, 8)))]
    #[case("{replicas: 0}", None)]
    #[case("{}", Some((1, 1, 5)))]
    #[case("{replicas: null}", Some((1, 1, 5)))]
    fn test_replica_range(#[case] spec: &str, #[case] expected: Option<(i32, i32, i32)>) {
        let selector = ReplicaSelector::from_config(&Replicas::default());
        let params = parameters(&selector, &deployment(spec));
        let actual = params.first().map(|p| {
            let Some(IntOrString::Int(baseline)) = p.baseline else {
                panic!("expected an integer baseline");
            };
            (baseline, p.min, p.max)
        });
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_missing_replicas_without_create() {
        let selector = ReplicaSelector::default();
        assert!(parameters(&selector, &deployment("{}")).is_empty());
    }

    #[test]
    fn test_patch_uses_int_template() {
        let selector = ReplicaSelector::from_config(&Replicas::default());
        let node = deployment("{replicas: 2}");
        let sources = selector.map(&node, &ResourceMeta::from_node(&node)).unwrap();
        let patch = sources[0].patch.as_ref().unwrap();
        let namer = ParameterNamer::new([patch.target_ref()]);
        let edits = patch.patch(&namer).unwrap();
        assert_eq!(edits, vec![PatchEdit::new(vec!["spec".into(), "replicas".into()], int_template("replicas"))]);
    }
}
