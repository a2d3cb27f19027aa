//! Patch synthesis
//!
//! Parameter sites contribute [`PatchEdit`]s. Edits for the same target are applied to one
//! document in discovery order, each edit only touching its own path, and the result is
//! rendered as template text.

use crate::api::PatchTemplate;
use crate::document::{set_path, Node, TargetRef};
use crate::error::Result;
use regex::{Captures, Regex};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;

/// Set `value` at `path` inside the patch of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct PatchEdit {
    pub path: Vec<String>,
    pub value: Value,
}

impl PatchEdit {
    pub fn new(path: Vec<String>, value: impl Into<Value>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }
}

/// `{{ .Values.<name> }}` with an optional prefix and suffix
pub fn template_value(prefix: &str, name: &str, suffix: &str) -> String {
    format!("{prefix}{{{{ .Values.{name} }}}}{suffix}")
}

/// A template placeholder that must render as a bare integer
pub fn int_template(name: &str) -> Value {
    Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new("int"),
        value: Value::String(template_value("", name, "")),
    }))
}

/// Patch documents keyed by target, in the order targets were first seen
#[derive(Debug, Default)]
pub struct PatchSet {
    patches: Vec<(TargetRef, Node)>,
}

impl PatchSet {
    /// Apply edits to the patch of `target`
    pub fn apply(&mut self, target: &TargetRef, edits: Vec<PatchEdit>) {
        let index = match self.patches.iter().position(|(t, _)| t == target) {
            Some(index) => index,
            None => {
                self.patches
                    .push((target.clone(), Value::Mapping(Mapping::new())));
                self.patches.len() - 1
            }
        };

        let document = &mut self.patches[index].1;
        for edit in edits {
            set_path(document, &edit.path, edit.value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Render every patch document as template text
    pub fn render(self) -> Result<Vec<PatchTemplate>> {
        self.patches
            .into_iter()
            .map(|(target, document)| {
                Ok(PatchTemplate {
                    patch_type: None,
                    patch: render_patch(&document)?,
                    target_ref: Some(target),
                })
            })
            .collect()
    }
}

/// Serialize a patch document, unwrapping integer tagged template values.
///
/// The patch is template text rather than strict YAML, so `replicas: !!int '{{ .Values.r }}'`
/// is rendered as `replicas: {{ .Values.r }}`.
pub fn render_patch(document: &Node) -> Result<String> {
    static TAGGED_INT: OnceLock<Regex> = OnceLock::new();
    let pattern = TAGGED_INT.get_or_init(|| {
        Regex::new(r#"!!?int (?:'((?:[^']|'')*)'|"((?:[^"\\]|\\.)*)")"#)
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    });

    let text = serde_yaml::to_string(document)?;
    Ok(pattern
        .replace_all(&text, |caps: &Captures<'_>| match (caps.get(1), caps.get(2)) {
            (Some(single), _) => single.as_str().replace("''", "'"),
            (_, Some(double)) => double.as_str().replace("\\\"", "\""),
            _ => String::new(),
        })
        .into_owned())
}
