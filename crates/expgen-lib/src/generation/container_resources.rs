//! Container resources (requests and limits) parameters

use super::namer::ParameterNamer;
use super::patch::{template_value, PatchEdit};
use super::ranges::{resource_range, ResourceBounds, ResourceKind, ResourceRange};
use super::source::{ParameterSource, PatchSource, Source};
use crate::api::{ContainerResources, Parameter, ResourceList};
use crate::document::{field_path, Node, PathMatcher, ResourceMeta, TargetRef};
use crate::error::{GenerationError, Result};
use crate::quantity::Quantity;
use crate::scan::{GenericSelector, Selector};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default location of container resources in a pod template
pub const CONTAINER_RESOURCES_PATH: &str =
    "/spec/template/spec/containers/[name={ .ContainerName }]/resources";

/// Per-container bounds for each resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerLimits {
    pub min: ResourceList,
    pub max: ResourceList,
    pub default_request: ResourceList,
}

impl ContainerLimits {
    pub fn bounds(&self, resource: &str) -> ResourceBounds {
        ResourceBounds {
            min: self.min.get(resource).cloned(),
            max: self.max.get(resource).cloned(),
            default_request: self.default_request.get(resource).cloned(),
        }
    }

    /// Read the `Container` limits of a LimitRange document
    fn from_limit_range(node: &Node) -> Result<Self> {
        let mut limits = Self::default();
        let items = node
            .get("spec")
            .and_then(|s| s.get("limits"))
            .and_then(Node::as_sequence)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for item in items {
            if item.get("type").and_then(Node::as_str) != Some("Container") {
                continue;
            }
            merge_missing(&mut limits.min, item.get("min"))?;
            merge_missing(&mut limits.max, item.get("max"))?;
            merge_missing(&mut limits.default_request, item.get("defaultRequest"))?;
        }
        Ok(limits)
    }

    fn or(mut self, fallback: &ContainerLimits) -> Self {
        for (list, other) in [
            (&mut self.min, &fallback.min),
            (&mut self.max, &fallback.max),
            (&mut self.default_request, &fallback.default_request),
        ] {
            for (k, v) in other {
                list.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        self
    }
}

fn merge_missing(list: &mut ResourceList, value: Option<&Node>) -> Result<()> {
    for (name, quantity) in resource_list(value)? {
        list.entry(name).or_insert(quantity);
    }
    Ok(())
}

/// Parse a `{cpu: 100m, memory: 1Gi}` style mapping
fn resource_list(value: Option<&Node>) -> Result<ResourceList> {
    let Some(mapping) = value.and_then(Node::as_mapping) else {
        return Ok(ResourceList::new());
    };

    mapping
        .iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v)))
        .map(|(k, v)| {
            let quantity = match v {
                Node::String(s) => s.parse::<Quantity>()?,
                Node::Number(n) => n.to_string().parse::<Quantity>()?,
                other => {
                    return Err(GenerationError::InvalidQuantity(format!("{k}: {other:?}")));
                }
            };
            Ok((k, quantity))
        })
        .collect()
}

/// Finds container resources specifications in pod templates
#[derive(Debug, Clone)]
pub struct ContainerResourcesSelector {
    pub selector: GenericSelector,
    /// Path template to the resources field; `{ .ContainerName }` is the container pattern
    pub path: String,
    /// Regular expression matching container names, empty matches all
    pub container_name: String,
    /// Report containers without a resources field
    pub create_if_not_present: bool,
    /// Resource names to tune
    pub resources: Vec<String>,
    /// Configured bounds, taking precedence over LimitRanges
    pub limits: ContainerLimits,
    /// Container limits captured from LimitRanges, keyed by namespace
    limit_ranges: BTreeMap<String, ContainerLimits>,
}

impl Default for ContainerResourcesSelector {
    fn default() -> Self {
        Self {
            selector: GenericSelector {
                group: "apps|extensions".into(),
                kind: "Deployment|StatefulSet".into(),
                ..Default::default()
            },
            path: CONTAINER_RESOURCES_PATH.into(),
            container_name: String::new(),
            create_if_not_present: true,
            resources: vec!["cpu".into(), "memory".into()],
            limits: ContainerLimits::default(),
            limit_ranges: BTreeMap::new(),
        }
    }
}

impl ContainerResourcesSelector {
    pub fn from_config(config: &ContainerResources) -> Self {
        let defaults = Self::default();
        Self {
            selector: GenericSelector {
                label_selector: config.label_selector.clone(),
                ..defaults.selector
            },
            container_name: config.container_name.clone(),
            resources: if config.resources.is_empty() {
                defaults.resources
            } else {
                config.resources.clone()
            },
            limits: ContainerLimits {
                min: config.min.clone(),
                max: config.max.clone(),
                default_request: config.default_request.clone(),
            },
            ..defaults
        }
    }

    fn resource_kinds(&self) -> Vec<ResourceKind> {
        self.resources
            .iter()
            .filter_map(|name| {
                let kind = ResourceKind::from_name(name);
                if kind.is_none() {
                    warn!(resource = %name, "Ignoring resource without a range policy");
                }
                kind
            })
            .collect()
    }
}

impl Selector for ContainerResourcesSelector {
    fn select<'a>(&mut self, nodes: &'a [Node]) -> Result<Vec<&'a Node>> {
        // LimitRanges are captured before any workload is mapped
        for node in nodes {
            let meta = ResourceMeta::from_node(node);
            if meta.kind != "LimitRange" || meta.api_version != "v1" {
                continue;
            }
            let captured = ContainerLimits::from_limit_range(node)?;
            debug!(namespace = %meta.namespace, name = %meta.name, "Captured LimitRange");
            let entry = self.limit_ranges.entry(meta.namespace.clone()).or_default();
            *entry = std::mem::take(entry).or(&captured);
        }

        self.selector.select(nodes)
    }

    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Source>> {
        let container_name = if self.container_name.is_empty() {
            ".*".to_string()
        } else {
            self.container_name.clone()
        };
        let path = field_path(
            &self.path,
            &BTreeMap::from([("ContainerName".to_string(), container_name)]),
        )?;
        let matcher = PathMatcher::new(&path)?;

        let limits = match self.limit_ranges.get(&meta.namespace) {
            Some(limit_range) => self.limits.clone().or(limit_range),
            None => self.limits.clone(),
        };
        let kinds = self.resource_kinds();

        let mut result = Vec::new();
        for found in matcher.find(node, self.create_if_not_present) {
            let requests = resource_list(found.value.as_ref().and_then(|v| v.get("requests")))?;
            let ranges = kinds
                .iter()
                .map(|kind| {
                    let range = resource_range(*kind, requests.get(kind.name()), &limits.bounds(kind.name()));
                    (*kind, range)
                })
                .collect();

            result.push(Source::parameter_site(ContainerResourcesParameter {
                target: meta.target_ref(),
                path: found.path,
                ranges,
            }));
        }
        Ok(result)
    }
}

/// A container resources specification found during scanning
#[derive(Debug, Clone)]
struct ContainerResourcesParameter {
    target: TargetRef,
    path: Vec<String>,
    ranges: Vec<(ResourceKind, ResourceRange)>,
}

impl ParameterSource for ContainerResourcesParameter {
    fn parameters(&self, namer: &ParameterNamer) -> Result<Vec<Parameter>> {
        Ok(self
            .ranges
            .iter()
            .map(|(kind, range)| Parameter {
                name: namer.name(&self.target, &self.path, kind.name()),
                baseline: range.baseline.map(IntOrString::Int),
                min: range.min,
                max: range.max,
                values: Vec::new(),
            })
            .collect())
    }
}

impl PatchSource for ContainerResourcesParameter {
    fn target_ref(&self) -> &TargetRef {
        &self.target
    }

    /// Limits and requests are set to the same value
    fn patch(&self, namer: &ParameterNamer) -> Result<Vec<PatchEdit>> {
        let mut edits = Vec::new();
        for (kind, range) in &self.ranges {
            let value = template_value("", &namer.name(&self.target, &self.path, kind.name()), range.suffix);
            for field in ["limits", "requests"] {
                let mut path = self.path.clone();
                path.extend([field.to_string(), kind.name().to_string()]);
                edits.push(PatchEdit::new(path, value.clone()));
            }
        }
        Ok(edits)
    }
}
