//! Parameter naming
//!
//! Names are computed from the complete set of patch targets so that each name is as
//! short as possible while still unique: the kind is only included when more than one
//! kind was scanned, the namespace only when one kind and name appear in more than one
//! namespace, the resource name only when some kind has more than one resource, and the
//! list keys of the field path only when one resource has more than one site.

use crate::document::{parse_list_segment, TargetRef};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ParameterNamer {
    /// Site count per kind, name and namespace
    sites: BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>>,
    needs_kind: bool,
    needs_namespace: bool,
    needs_name: bool,
}

impl ParameterNamer {
    /// Index every patch target discovered by the scan
    pub fn new<'a>(targets: impl IntoIterator<Item = &'a TargetRef>) -> Self {
        let mut sites: BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>> = BTreeMap::new();
        for target in targets {
            *sites
                .entry(target.kind.clone())
                .or_default()
                .entry(target.name.clone())
                .or_default()
                .entry(namespace_of(target).to_string())
                .or_default() += 1;
        }

        let needs_kind = sites.len() > 1;
        let needs_namespace = sites
            .values()
            .flat_map(BTreeMap::values)
            .any(|namespaces| namespaces.len() > 1);
        let needs_name = sites.values().any(|names| names.len() > 1);
        Self {
            sites,
            needs_kind,
            needs_namespace,
            needs_name,
        }
    }

    /// Name the parameter for `leaf` at `path` of the target resource
    pub fn name(&self, target: &TargetRef, path: &[String], leaf: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();

        if self.needs_kind {
            parts.push(&target.kind);
        }
        if self.needs_namespace {
            parts.push(namespace_of(target));
        }
        if self.needs_name {
            parts.push(&target.name);
        }

        let count = self
            .sites
            .get(&target.kind)
            .and_then(|names| names.get(&target.name))
            .and_then(|namespaces| namespaces.get(namespace_of(target)))
            .copied()
            .unwrap_or_default();
        let keys: Vec<String> = if count > 1 {
            path.iter()
                .filter_map(|segment| parse_list_segment(segment))
                .map(|(_, value)| value)
                .collect()
        } else {
            Vec::new()
        };
        parts.extend(keys.iter().map(String::as_str));

        parts.push(leaf);

        // A single site without a leaf (an environment variable) is named by its last list key
        let last_key;
        if parts.iter().all(|p| p.is_empty()) {
            last_key = path.iter().rev().find_map(|segment| parse_list_segment(segment));
            if let Some((_, value)) = &last_key {
                parts.push(value);
            }
        }

        // The name is used as a template identifier
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '_' => c,
                'A'..='Z' => c.to_ascii_lowercase(),
                _ => '_',
            })
            .collect()
    }
}

fn namespace_of(target: &TargetRef) -> &str {
    target.namespace.as_deref().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(kind: &str, name: &str) -> TargetRef {
        TargetRef {
            api_version: "apps/v1".into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    fn container_path(container: &str) -> Vec<String> {
        ["spec", "template", "spec", "containers", &format!("[name={container}]"), "resources"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_single_container_uses_bare_names() {
        let web = target("Deployment", "web");
        let namer = ParameterNamer::new([&web]);
        assert_eq!(namer.name(&web, &container_path("app"), "cpu"), "cpu");
        assert_eq!(namer.name(&web, &container_path("app"), "memory"), "memory");
    }

    #[test]
    fn test_two_containers_use_container_names() {
        let web = target("Deployment", "web");
        let namer = ParameterNamer::new([&web, &web]);
        assert_eq!(namer.name(&web, &container_path("app"), "cpu"), "app_cpu");
        assert_eq!(namer.name(&web, &container_path("proxy"), "memory"), "proxy_memory");
    }

    #[test]
    fn test_two_deployments_use_resource_names_without_kind() {
        let web = target("Deployment", "web");
        let api = target("Deployment", "api");
        let namer = ParameterNamer::new([&web, &api]);
        assert_eq!(namer.name(&web, &container_path("app"), "cpu"), "web_cpu");
        assert_eq!(namer.name(&api, &container_path("app"), "memory"), "api_memory");
    }

    #[test]
    fn test_same_name_in_two_namespaces_adds_namespace() {
        let web_a = TargetRef {
            namespace: Some("a".into()),
            ..target("Deployment", "web")
        };
        let web_b = TargetRef {
            namespace: Some("b".into()),
            ..target("Deployment", "web")
        };
        let namer = ParameterNamer::new([&web_a, &web_b]);

        let names = vec![
            namer.name(&web_a, &container_path("app"), "cpu"),
            namer.name(&web_a, &container_path("app"), "memory"),
            namer.name(&web_b, &container_path("app"), "cpu"),
            namer.name(&web_b, &container_path("app"), "memory"),
        ];
        assert_eq!(names, vec!["a_cpu", "a_memory", "b_cpu", "b_memory"]);
    }

    #[test]
    fn test_two_kinds_add_kind_prefix() {
        let web = target("Deployment", "web");
        let db = target("StatefulSet", "db");
        let namer = ParameterNamer::new([&web, &db]);
        assert_eq!(namer.name(&db, &container_path("postgres"), "cpu"), "statefulset_cpu");
        assert_eq!(namer.name(&web, &["spec".into(), "replicas".into()], "replicas"), "deployment_replicas");
    }

    #[test]
    fn test_template_hostile_characters_are_replaced() {
        let web = target("Deployment", "my-web");
        let api = target("Deployment", "api");
        let namer = ParameterNamer::new([&web, &web, &api]);
        let path = vec![
            "spec".to_string(),
            "containers".to_string(),
            "[name=side-car]".to_string(),
            "env".to_string(),
            "[name=MAX_THREADS]".to_string(),
            "value".to_string(),
        ];
        assert_eq!(namer.name(&web, &path, ""), "my_web_side_car_max_threads");
    }

    #[test]
    fn test_single_site_without_leaf_uses_last_list_key() {
        let web = target("Deployment", "web");
        let namer = ParameterNamer::new([&web]);
        let path = vec![
            "spec".to_string(),
            "containers".to_string(),
            "[name=app]".to_string(),
            "env".to_string(),
            "[name=JAVA_OPTS]".to_string(),
            "value".to_string(),
        ];
        assert_eq!(namer.name(&web, &path, ""), "java_opts");
    }
}
