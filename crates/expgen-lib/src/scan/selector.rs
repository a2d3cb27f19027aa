//! Metadata based document selection

use crate::document::{LabelSelector, Node, ResourceMeta};
use crate::error::{GenerationError, Result};
use regex::Regex;

/// Selects documents by type, identity, labels and annotations.
///
/// The `group`, `version`, `kind`, `namespace` and `name` fields are regular expressions
/// that must match the whole value; an empty pattern matches anything. The label and
/// annotation selectors use the usual Kubernetes selector syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericSelector {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub label_selector: String,
    pub annotation_selector: String,
}

impl GenericSelector {
    /// Return the matching documents in input order
    pub fn select<'a>(&self, nodes: &'a [Node]) -> Result<Vec<&'a Node>> {
        let matcher = MetaMatcher::new(self)?;
        Ok(nodes
            .iter()
            .filter(|node| matcher.matches(&ResourceMeta::from_node(node)))
            .collect())
    }

    /// Check a single document's metadata
    pub fn matches(&self, meta: &ResourceMeta) -> Result<bool> {
        Ok(MetaMatcher::new(self)?.matches(meta))
    }
}

/// Compiled form of a [`GenericSelector`]
struct MetaMatcher {
    group: Option<Regex>,
    version: Option<Regex>,
    kind: Option<Regex>,
    namespace: Option<Regex>,
    name: Option<Regex>,
    labels: LabelSelector,
    annotations: LabelSelector,
}

impl MetaMatcher {
    fn new(selector: &GenericSelector) -> Result<Self> {
        Ok(Self {
            group: compile_anchored(&selector.group)?,
            version: compile_anchored(&selector.version)?,
            kind: compile_anchored(&selector.kind)?,
            namespace: compile_anchored(&selector.namespace)?,
            name: compile_anchored(&selector.name)?,
            labels: LabelSelector::parse(&selector.label_selector)?,
            annotations: LabelSelector::parse(&selector.annotation_selector)?,
        })
    }

    fn matches(&self, meta: &ResourceMeta) -> bool {
        let checks = [
            (&self.namespace, meta.namespace.as_str()),
            (&self.name, meta.name.as_str()),
            (&self.group, meta.group()),
            (&self.version, meta.version()),
            (&self.kind, meta.kind.as_str()),
        ];
        if checks
            .iter()
            .any(|(re, value)| re.as_ref().is_some_and(|re| !re.is_match(value)))
        {
            return false;
        }

        self.labels.matches(&meta.labels) && self.annotations.matches(&meta.annotations)
    }
}

/// Anchor a pattern so it has to match the full string; empty patterns match anything
pub(crate) fn compile_anchored(pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!("^(?:{pattern})$"))
        .map(Some)
        .map_err(|e| GenerationError::SelectorConfig(format!("invalid pattern {pattern:?}: {e}")))
}
