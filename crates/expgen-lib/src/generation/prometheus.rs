//! In-cluster Prometheus for metrics without an explicit server

use super::source::{ExperimentSource, ResourceSource};
use super::to_node;
use crate::api::{Experiment, MetricType, SetupTask};
use crate::document::Node;
use crate::error::Result;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Installs Prometheus through a setup task when a Prometheus metric has no URL
#[derive(Debug, Clone)]
pub struct BuiltInPrometheus {
    pub setup_task_name: String,
    pub cluster_role_name: String,
    pub service_account_name: String,
    pub cluster_role_binding_name: String,
}

impl Default for BuiltInPrometheus {
    fn default() -> Self {
        Self {
            setup_task_name: "monitoring".into(),
            cluster_role_name: "optimize-prometheus".into(),
            service_account_name: "optimize-setup".into(),
            cluster_role_binding_name: "optimize-setup-prometheus".into(),
        }
    }
}

impl BuiltInPrometheus {
    fn is_needed(exp: &Experiment) -> bool {
        exp.spec
            .metrics
            .iter()
            .any(|m| m.metric_type == Some(MetricType::Prometheus) && m.url.is_empty())
    }

    fn rules() -> Vec<PolicyRule> {
        let rule = |group: &str, resources: &[&str], verbs: &[&str]| PolicyRule {
            api_groups: Some(vec![group.to_string()]),
            resources: Some(resources.iter().map(|r| r.to_string()).collect()),
            verbs: verbs.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        };

        vec![
            // Managed by the setup task
            rule(RBAC_GROUP, &["clusterroles", "clusterrolebindings"], &["get", "create", "delete"]),
            rule("", &["serviceaccounts", "services", "configmaps"], &["get", "create", "delete"]),
            rule("apps", &["deployments"], &["get", "create", "delete", "list", "watch"]),
            // Delegated to the Prometheus server
            rule("", &["nodes", "nodes/metrics", "nodes/proxy", "services"], &["list", "watch", "get"]),
            rule("", &["pods"], &["list", "watch"]),
        ]
    }
}

impl ExperimentSource for BuiltInPrometheus {
    fn update(&self, exp: &mut Experiment) -> Result<()> {
        if !Self::is_needed(exp) {
            return Ok(());
        }

        debug!(task = %self.setup_task_name, "Adding built-in Prometheus setup task");
        let spec = &mut exp.spec.trial_template.spec;
        spec.setup_service_account_name = Some(self.service_account_name.clone());
        spec.setup_tasks.push(SetupTask {
            name: self.setup_task_name.clone(),
            args: vec!["prometheus".into(), "$(MODE)".into()],
        });
        Ok(())
    }
}

impl ResourceSource for BuiltInPrometheus {
    fn read(&self, exp: &Experiment) -> Result<Vec<Node>> {
        if !Self::is_needed(exp) {
            return Ok(Vec::new());
        }

        let named = |name: &str| ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        };

        let service_account = ServiceAccount {
            metadata: named(&self.service_account_name),
            ..Default::default()
        };
        let cluster_role = ClusterRole {
            metadata: named(&self.cluster_role_name),
            rules: Some(Self::rules()),
            ..Default::default()
        };
        let binding = ClusterRoleBinding {
            metadata: named(&self.cluster_role_binding_name),
            role_ref: RoleRef {
                api_group: RBAC_GROUP.into(),
                kind: "ClusterRole".into(),
                name: self.cluster_role_name.clone(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".into(),
                name: self.service_account_name.clone(),
                ..Default::default()
            }]),
        };

        Ok(vec![to_node(&service_account)?, to_node(&cluster_role)?, to_node(&binding)?])
    }
}
