//! Post-processing applied to generated documents

use crate::api::Experiment;
use crate::document::{Node, ResourceMeta};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Kinds that never carry a namespace
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// `-` followed by the first six hex digits of the SHA-256 of `name`
pub fn hash_suffix(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(6);
    format!("-{encoded}")
}

/// Move a document into `namespace`.
///
/// Cluster scoped documents keep no namespace; the service account subjects of RBAC
/// bindings without a namespace are moved instead.
pub fn set_namespace(node: &mut Node, namespace: &str) {
    if namespace.is_empty() {
        return;
    }

    let meta = ResourceMeta::from_node(node);
    if !CLUSTER_SCOPED_KINDS.contains(&meta.kind.as_str()) {
        metadata_mut(node).insert("namespace".into(), namespace.into());
    }

    if is_rbac_binding(&meta) {
        if let Some(Value::Sequence(subjects)) = node.get_mut("subjects") {
            for subject in subjects.iter_mut().filter_map(Value::as_mapping_mut) {
                let is_service_account = subject.get("kind").and_then(Value::as_str) == Some("ServiceAccount");
                if is_service_account && !subject.contains_key("namespace") {
                    subject.insert("namespace".into(), namespace.into());
                }
            }
        }
    }
}

/// Merge labels into the document metadata, skipping empty values
pub fn set_labels(node: &mut Node, labels: &BTreeMap<String, String>) {
    let labels: Vec<(&String, &String)> = labels.iter().filter(|(_, v)| !v.is_empty()).collect();
    if labels.is_empty() {
        return;
    }

    let metadata = metadata_mut(node);
    if !matches!(metadata.get("labels"), Some(Value::Mapping(_))) {
        metadata.insert("labels".into(), Value::Mapping(Mapping::new()));
    }
    if let Some(Value::Mapping(existing)) = metadata.get_mut("labels") {
        for (key, value) in labels {
            existing.insert(key.as_str().into(), value.as_str().into());
        }
    }
}

/// Label the experiment, its trial job and the trial pod
pub fn set_experiment_labels(exp: &mut Experiment, labels: &BTreeMap<String, String>) {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if labels.is_empty() {
        return;
    }

    exp.metadata.labels.get_or_insert_with(BTreeMap::new).extend(labels.clone());
    if let Some(job) = exp.spec.trial_template.spec.job_template.as_mut() {
        job.metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
    if exp.spec.trial_template.spec.job_template.is_some() {
        exp.trial_job_pod()
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels);
    }
}

/// Append `suffix` to the names of cluster roles and cluster role bindings.
///
/// Bindings also have their role reference renamed so the pair stays consistent.
pub fn set_cluster_role_suffix(node: &mut Node, suffix: &str) {
    let meta = ResourceMeta::from_node(node);
    if meta.group() != "rbac.authorization.k8s.io" || !matches!(meta.kind.as_str(), "ClusterRole" | "ClusterRoleBinding")
    {
        return;
    }

    if !meta.name.is_empty() {
        metadata_mut(node).insert("name".into(), format!("{}{suffix}", meta.name).into());
    }
    if let Some(Value::Mapping(role_ref)) = node.get_mut("roleRef") {
        let renamed = role_ref
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(|name| format!("{name}{suffix}"));
        if let Some(renamed) = renamed {
            role_ref.insert("name".into(), renamed.into());
        }
    }
}

fn is_rbac_binding(meta: &ResourceMeta) -> bool {
    meta.group() == "rbac.authorization.k8s.io" && matches!(meta.kind.as_str(), "RoleBinding" | "ClusterRoleBinding")
}

fn metadata_mut(node: &mut Node) -> &mut Mapping {
    if !node.is_mapping() {
        *node = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(root) = node else {
        unreachable!("node was just replaced with a mapping");
    };
    if !matches!(root.get("metadata"), Some(Value::Mapping(_))) {
        root.insert("metadata".into(), Value::Mapping(Mapping::new()));
    }
    match root.get_mut("metadata") {
        Some(Value::Mapping(metadata)) => metadata,
        _ => unreachable!("metadata was just inserted"),
    }
}
