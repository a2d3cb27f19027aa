//! Output formatting for generated document streams

use crate::error::Result;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::io::Write;

/// Ranking of well known keys used when writing documents.
///
/// Keys found in the table are written first, in rank order; any other key keeps its
/// original relative position after them.
#[derive(Debug, Clone)]
pub struct FieldOrder {
    ranks: HashMap<String, usize>,
}

/// Common Kubernetes object fields
const OBJECT_FIELDS: &[&str] = &[
    "apiVersion", "kind", "metadata", "name", "generateName", "namespace", "labels",
    "annotations", "spec", "data", "binaryData", "stringData", "type", "roleRef",
    "subjects", "rules", "apiGroups", "resources", "verbs", "status",
];

/// Experiment fields, in the order they read most naturally
const EXPERIMENT_FIELDS: &[&str] = &[
    "optimization", "parameters", "metrics", "patches", "trialTemplate", "baseline", "min",
    "max", "values", "minimize", "optimize", "query", "url", "target", "selector", "patch",
    "targetRef", "jobTemplate", "setupServiceAccountName", "setupTasks",
    "initialDelaySeconds", "approximateRuntime",
];

impl FieldOrder {
    /// An empty table keeps every document in its serialized order
    pub fn empty() -> Self {
        Self {
            ranks: HashMap::new(),
        }
    }

    /// Append keys after the ones already ranked
    pub fn with_fields<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        for field in fields {
            let next = self.ranks.len();
            self.ranks.entry(field.to_string()).or_insert(next);
        }
        self
    }

    /// Recursively reorder every mapping in the value
    pub fn apply(&self, value: &mut Value) {
        match value {
            Value::Mapping(mapping) => {
                let mut entries: Vec<(Value, Value)> = std::mem::take(mapping).into_iter().collect();
                for (_, v) in entries.iter_mut() {
                    self.apply(v);
                }
                entries.sort_by_key(|(k, _)| {
                    k.as_str()
                        .and_then(|k| self.ranks.get(k))
                        .copied()
                        .unwrap_or(usize::MAX)
                });
                *mapping = entries.into_iter().collect::<Mapping>();
            }
            Value::Sequence(items) => items.iter_mut().for_each(|item| self.apply(item)),
            Value::Tagged(tagged) => self.apply(&mut tagged.value),
            _ => {}
        }
    }
}

impl Default for FieldOrder {
    fn default() -> Self {
        Self::empty()
            .with_fields(OBJECT_FIELDS.iter().copied())
            .with_fields(EXPERIMENT_FIELDS.iter().copied())
    }
}

/// Write documents as a multi-document YAML stream
pub fn write_yaml_stream<W: Write>(mut w: W, documents: &[Value], order: &FieldOrder) -> Result<()> {
    for (i, document) in documents.iter().enumerate() {
        let mut document = document.clone();
        order.apply(&mut document);
        if i > 0 {
            w.write_all(b"---\n")?;
        }
        serde_yaml::to_writer(&mut w, &document)?;
    }
    Ok(())
}

/// Write documents wrapped in a `v1 List`
pub fn write_json_list<W: Write>(w: W, documents: &[Value], order: &FieldOrder) -> Result<()> {
    let items = documents
        .iter()
        .map(|d| {
            let mut d = d.clone();
            order.apply(&mut d);
            d
        })
        .collect::<Vec<_>>();

    let mut list = Mapping::new();
    list.insert("apiVersion".into(), "v1".into());
    list.insert("kind".into(), "List".into());
    list.insert("items".into(), Value::Sequence(items));

    serde_json::to_writer_pretty(w, &Value::Mapping(list))?;
    Ok(())
}
