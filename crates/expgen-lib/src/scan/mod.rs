//! Resource scanning
//!
//! A [`Scanner`] runs an ordered list of [`Selector`]s over the input documents. Each
//! selector first reduces the documents to the ones it cares about and then maps every
//! selected document into zero or more [`Source`]s. The accumulated sources are handed,
//! in order, to the transformer that builds the experiment.

mod selector;

pub use selector::GenericSelector;

use crate::document::{Node, ResourceMeta};
use crate::error::Result;
use crate::generation::Source;
use tracing::debug;

/// Reduces a document list and maps the survivors into experiment sources
pub trait Selector {
    /// Return the documents this selector applies to, in input order
    fn select<'a>(&mut self, nodes: &'a [Node]) -> Result<Vec<&'a Node>>;

    /// Produce the sources discovered in one selected document
    fn map(&self, node: &Node, meta: &ResourceMeta) -> Result<Vec<Source>>;
}

/// Drives the selectors over a document list
pub struct Scanner {
    selectors: Vec<Box<dyn Selector>>,
}

impl Scanner {
    /// Create a scanner; selectors run in the supplied order
    pub fn new(selectors: Vec<Box<dyn Selector>>) -> Self {
        Self { selectors }
    }

    /// Select and map every document, returning the sources in discovery order
    pub fn scan(&mut self, nodes: &[Node]) -> Result<Vec<Source>> {
        let mut sources = Vec::new();
        for (index, selector) in self.selectors.iter_mut().enumerate() {
            let selected = selector.select(nodes)?;
            debug!(selector = index, selected = selected.len(), "Selected documents");

            for node in selected {
                let meta = ResourceMeta::from_node(node);
                let mapped = selector.map(node, &meta)?;
                debug!(
                    kind = %meta.kind,
                    name = %meta.name,
                    sources = mapped.len(),
                    "Mapped document"
                );
                sources.extend(mapped);
            }
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ParameterSource;
    use crate::api::Parameter;
    use crate::generation::ParameterNamer;
    use std::sync::Arc;

    struct Named(String);

    impl ParameterSource for Named {
        fn parameters(&self, _: &ParameterNamer) -> Result<Vec<Parameter>> {
            Ok(vec![Parameter {
                name: self.0.clone(),
                ..Default::default()
            }])
        }
    }

    /// Selects every document with a name and emits one parameter source per document
    struct EveryName;

    impl Selector for EveryName {
        fn select<'a>(&mut self, nodes: &'a [Node]) -> Result<Vec<&'a Node>> {
            Ok(nodes.iter().filter(|n| n.get("metadata").is_some()).collect())
        }

        fn map(&self, _: &Node, meta: &ResourceMeta) -> Result<Vec<Source>> {
            let source = Source {
                parameters: Some(Arc::new(Named(meta.name.clone()))),
                ..Default::default()
            };
            Ok(vec![source])
        }
    }

    #[test]
    fn test_scan_keeps_selector_and_document_order() {
        let nodes: Vec<Node> = serde_yaml::Deserializer::from_str(
            "metadata: {name: a}\n---\nkind: Unnamed\n---\nmetadata: {name: b}\n",
        )
        .map(|d| serde::Deserialize::deserialize(d).unwrap())
        .collect();

        let mut scanner = Scanner::new(vec![Box::new(EveryName), Box::new(EveryName)]);
        let sources = scanner.scan(&nodes).unwrap();
        assert_eq!(sources.len(), 4);

        let namer = ParameterNamer::default();
        let names: Vec<String> = sources
            .iter()
            .flat_map(|s| s.parameters.as_ref().unwrap().parameters(&namer).unwrap())
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "a", "b"]);
    }
}
