//! Tree-structured resource documents
//!
//! Manifests are handled as `serde_yaml::Value` trees. This module provides the small
//! amount of structure the scanner needs on top of that: typed metadata, an object
//! reference used as a patch target, and path matching with list-membership segments
//! (`[name=<regex>]`) for locating and creating fields.

mod fieldpath;
mod format;
mod labels;

pub use fieldpath::field_path;
pub use format::{write_json_list, write_yaml_stream, FieldOrder};
pub use labels::LabelSelector;

use crate::error::{GenerationError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// A single manifest document
pub type Node = Value;

/// Type and identity information of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ResourceMeta {
    /// Read the metadata of a node, missing fields are left empty
    pub fn from_node(node: &Node) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or_default().to_string();
        let metadata = node.get("metadata");
        Self {
            api_version: text(node.get("apiVersion")),
            kind: text(node.get("kind")),
            name: text(metadata.and_then(|m| m.get("name"))),
            namespace: text(metadata.and_then(|m| m.get("namespace"))),
            labels: string_map(metadata.and_then(|m| m.get("labels"))),
            annotations: string_map(metadata.and_then(|m| m.get("annotations"))),
        }
    }

    /// API group, empty for the core group
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// API version without the group
    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }

    pub fn target_ref(&self) -> TargetRef {
        TargetRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: (!self.namespace.is_empty()).then(|| self.namespace.clone()),
        }
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Mapping(m)) = value else {
        return BTreeMap::new();
    };
    m.iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((k.as_str()?.to_string(), v))
        })
        .collect()
}

/// Reference to the object a patch applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A field located by a [`PathMatcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    /// Concrete path to the field, list segments carry the matched value (`[name=app]`)
    pub path: Vec<String>,
    /// The current value, `None` when the field was absent and creation was requested
    pub value: Option<Value>,
}

impl FieldMatch {
    /// Key/value pairs of the list-membership segments, in path order
    pub fn list_keys(&self) -> Vec<(String, String)> {
        self.path.iter().filter_map(|s| parse_list_segment(s)).collect()
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Field(String),
    Element { key: String, pattern: Regex },
}

/// Matches concrete fields against a path whose list segments hold regular expressions
#[derive(Debug, Clone)]
pub struct PathMatcher {
    segments: Vec<Segment>,
}

impl PathMatcher {
    /// Compile a path; list segment values are anchored regular expressions
    pub fn new(path: &[String]) -> Result<Self> {
        let segments = path
            .iter()
            .map(|segment| match parse_list_segment(segment) {
                Some((key, value)) => {
                    let pattern = Regex::new(&format!("^(?:{value})$")).map_err(|e| {
                        GenerationError::SelectorConfig(format!("path segment {segment:?}: {e}"))
                    })?;
                    Ok(Segment::Element { key, pattern })
                }
                None => Ok(Segment::Field(segment.clone())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// Find every field matching the path.
    ///
    /// When `create` is set, a missing final field under an otherwise matched parent is
    /// still reported (with no value).
    pub fn find(&self, node: &Node, create: bool) -> Vec<FieldMatch> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.walk(node, 0, &mut prefix, create, &mut out);
        out
    }

    fn walk(
        &self,
        node: &Node,
        index: usize,
        prefix: &mut Vec<String>,
        create: bool,
        out: &mut Vec<FieldMatch>,
    ) {
        let Some(segment) = self.segments.get(index) else {
            out.push(FieldMatch {
                path: prefix.clone(),
                value: Some(node.clone()),
            });
            return;
        };

        match segment {
            Segment::Field(name) => match node.get(name.as_str()) {
                Some(child) if !child.is_null() => {
                    prefix.push(name.clone());
                    self.walk(child, index + 1, prefix, create, out);
                    prefix.pop();
                }
                _ if create && index + 1 == self.segments.len() && node.is_mapping() => {
                    let mut path = prefix.clone();
                    path.push(name.clone());
                    out.push(FieldMatch { path, value: None });
                }
                _ => {}
            },
            Segment::Element { key, pattern } => {
                let Some(items) = node.as_sequence() else {
                    return;
                };
                for item in items {
                    let Some(value) = item.get(key.as_str()).and_then(Value::as_str) else {
                        continue;
                    };
                    if pattern.is_match(value) {
                        prefix.push(format!("[{key}={value}]"));
                        self.walk(item, index + 1, prefix, create, out);
                        prefix.pop();
                    }
                }
            }
        }
    }
}

/// Split a `[key=value]` segment
pub fn parse_list_segment(segment: &str) -> Option<(String, String)> {
    let inner = segment.strip_prefix('[')?.strip_suffix(']')?;
    let (key, value) = inner.split_once('=')?;
    Some((key.to_string(), value.to_string()))
}

/// Set a value at a concrete path, creating intermediate mappings and list elements.
///
/// Existing siblings are preserved, so repeated calls compose into one document.
pub fn set_path(root: &mut Node, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        current = child_mut(current, segment);
    }

    match parse_list_segment(last) {
        Some(_) => *child_mut(current, last) = value,
        None => {
            ensure_mapping(current).insert(Value::String(last.clone()), value);
        }
    }
}

fn child_mut<'a>(node: &'a mut Node, segment: &str) -> &'a mut Node {
    if let Some((key, wanted)) = parse_list_segment(segment) {
        if !node.is_sequence() {
            *node = Value::Sequence(Vec::new());
        }
        let Value::Sequence(items) = node else {
            unreachable!("node was just replaced with a sequence");
        };
        let position = items
            .iter()
            .position(|item| item.get(key.as_str()).and_then(Value::as_str) == Some(wanted.as_str()));
        let position = match position {
            Some(p) => p,
            None => {
                let mut element = Mapping::new();
                element.insert(Value::String(key), Value::String(wanted));
                items.push(Value::Mapping(element));
                items.len() - 1
            }
        };
        return &mut items[position];
    }

    ensure_mapping(node)
        .entry(Value::String(segment.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()))
}

fn ensure_mapping(node: &mut Node) -> &mut Mapping {
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(m) => m,
        _ => unreachable!("node was just replaced with a mapping"),
    }
}

/// Look up a value at a concrete path (list segments compare literally)
pub fn lookup<'a>(node: &'a Node, path: &[String]) -> Option<&'a Node> {
    path.iter().try_fold(node, |current, segment| match parse_list_segment(segment) {
        Some((key, wanted)) => current
            .as_sequence()?
            .iter()
            .find(|item| item.get(key.as_str()).and_then(Value::as_str) == Some(wanted.as_str())),
        None => current.get(segment.as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Node {
        serde_yaml::from_str(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
  labels:
    app: web
spec:
  replicas: 2
  template:
    spec:
      containers:
      - name: app
        resources:
          requests:
            cpu: 250m
      - name: sidecar
"#,
        )
        .unwrap()
    }

    fn path(p: &str) -> Vec<String> {
        field_path(p, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_resource_meta() {
        let meta = ResourceMeta::from_node(&deployment());
        assert_eq!(meta.group(), "apps");
        assert_eq!(meta.version(), "v1");
        assert_eq!(meta.kind, "Deployment");
        assert_eq!(meta.labels.get("app").map(String::as_str), Some("web"));

        let core = ResourceMeta {
            api_version: "v1".into(),
            ..Default::default()
        };
        assert_eq!(core.group(), "");
        assert_eq!(core.version(), "v1");
    }

    #[test]
    fn test_find_with_list_regex() {
        let matcher = PathMatcher::new(&path("/spec/template/spec/containers/[name=.*]/resources")).unwrap();

        let found = matcher.find(&deployment(), false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].list_keys(), vec![("name".to_string(), "app".to_string())]);

        let created = matcher.find(&deployment(), true);
        assert_eq!(created.len(), 2);
        assert!(created[1].value.is_none());
        assert_eq!(created[1].path[4], "[name=sidecar]");
    }

    #[test]
    fn test_invalid_list_regex() {
        let err = PathMatcher::new(&["[name=(]".to_string()]).unwrap_err();
        assert!(matches!(err, GenerationError::SelectorConfig(_)));
    }

    #[test]
    fn test_set_path_composes() {
        let mut root = Value::Mapping(Mapping::new());
        let containers = path("/spec/template/spec/containers/[name=app]");
        let mut limits = containers.clone();
        limits.extend(["resources".to_string(), "limits".to_string()]);
        let mut env = containers.clone();
        env.extend(["env".to_string(), "[name=THREADS]".to_string(), "value".to_string()]);

        set_path(&mut root, &limits, Value::String("x".into()));
        set_path(&mut root, &env, Value::String("y".into()));
        set_path(&mut root, &path("/spec/replicas"), Value::from(3));

        assert_eq!(lookup(&root, &limits), Some(&Value::String("x".into())));
        assert_eq!(lookup(&root, &env), Some(&Value::String("y".into())));
        let items = lookup(&root, &path("/spec/template/spec/containers")).unwrap();
        assert_eq!(items.as_sequence().unwrap().len(), 1);
    }
}
