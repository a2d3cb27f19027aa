//! End to end generation tests

use expgen_lib::{
    generation::hash_suffix, Application, CredentialChain, FieldOrder, FileLoader, GenerationError, Generator, Node,
    Result,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

/// Serves auxiliary files from memory
#[derive(Default)]
struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    fn with(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.as_bytes().to_vec());
        self
    }
}

impl FileLoader for MemoryLoader {
    fn load_file(&self, _: &Application, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| GenerationError::file_load(path, "not found"))
    }
}

const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
spec:
  replicas: 2
  template:
    spec:
      containers:
      - name: app
        image: shop/web:1.0
        resources:
          requests:
            cpu: 250m
            memory: 64Mi
"#;

fn documents(text: &str) -> Vec<Node> {
    serde_yaml::Deserializer::from_str(text)
        .map(|d| serde::Deserialize::deserialize(d).unwrap())
        .collect()
}

fn generator(application: &str, loader: MemoryLoader) -> Generator {
    let application: Application = serde_yaml::from_str(application).unwrap();
    Generator {
        loader: Arc::new(loader),
        credentials: CredentialChain::application_only(),
        ..Generator::new(application)
    }
}

fn kinds(documents: &[Node]) -> Vec<String> {
    documents
        .iter()
        .map(|d| d["kind"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_locust_experiment() {
    let generator = generator(
        r#"
metadata:
  name: shop
  namespace: shop
ingress:
  url: http://shop.example.com
scenarios:
- name: browse
  locust:
    locustfile: locustfile.py
    users: 10
objectives:
- name: performance
  goals:
  - name: p95-latency
  - name: error-rate
  - name: cost
"#,
        MemoryLoader::default().with("locustfile.py", "from locust import HttpUser\n"),
    );

    let generated = generator.generate(&documents(DEPLOYMENT)).unwrap();
    let exp = &generated.experiment;
    assert_eq!(exp.metadata.name.as_deref(), Some("shop-browse-performance"));
    assert_eq!(exp.metadata.namespace.as_deref(), Some("shop"));

    let labels = exp.metadata.labels.clone().unwrap_or_default();
    assert_eq!(labels["app.kubernetes.io/name"], "shop");
    assert_eq!(labels["optimize.stormforge.io/scenario"], "browse");
    assert_eq!(labels["optimize.stormforge.io/objective"], "performance");

    let parameters: Vec<(&str, i32, i32)> = exp
        .spec
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.min, p.max))
        .collect();
    assert_eq!(parameters, vec![("cpu", 120, 500), ("memory", 32, 256)]);

    let metrics: Vec<&str> = exp.spec.metrics.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        metrics,
        vec!["p95-latency", "error-rate", "cost", "cost-cpu-requests", "cost-memory-requests"]
    );

    assert_eq!(exp.spec.patches.len(), 1);
    let patch = &exp.spec.patches[0].patch;
    assert!(patch.contains("{{ .Values.cpu }}m"), "{patch}");
    assert!(patch.contains("{{ .Values.memory }}M"), "{patch}");

    let trial = &exp.spec.trial_template.spec;
    assert_eq!(trial.setup_service_account_name.as_deref(), Some("optimize-setup"));
    assert_eq!(trial.setup_tasks[0].name, "monitoring");

    let documents = generated.documents().unwrap();
    assert_eq!(
        kinds(&documents),
        vec!["Experiment", "ConfigMap", "ServiceAccount", "ClusterRole", "ClusterRoleBinding"]
    );
    assert_eq!(documents[1]["metadata"]["namespace"], "shop");
    assert_eq!(documents[2]["metadata"]["namespace"], "shop");

    let suffix = hash_suffix("shop-browse-performance");
    let role = format!("optimize-prometheus{suffix}");
    assert_eq!(documents[3]["metadata"]["name"].as_str(), Some(role.as_str()));
    assert_eq!(documents[3]["metadata"].get("namespace"), None);
    assert_eq!(documents[4]["roleRef"]["name"].as_str(), Some(role.as_str()));
    assert_eq!(documents[4]["subjects"][0]["namespace"], "shop");
}

#[test]
fn test_stormforger_experiment() {
    let generator = generator(
        r#"
metadata:
  name: shop
stormForger:
  org: acme
  accessToken:
    literal: secret-jwt
ingress:
  url: https://shop.example.com
scenarios:
- stormforger:
    testCaseFile: checkout.js
objectives:
- goals:
  - name: p99-latency
"#,
        MemoryLoader::default().with("checkout.js", "definition.session(\"checkout\")\n"),
    );

    let generated = generator.generate(&documents(DEPLOYMENT)).unwrap();
    assert_eq!(
        generated.experiment.metadata.name.as_deref(),
        Some("shop-checkout-p99-latency")
    );
    assert_eq!(generated.experiment.spec.metrics[0].query, r#"scalar(percentile_99{job="trialRun",instance="{{ .Trial.Name }}"})"#);

    let documents = generated.documents().unwrap();
    assert_eq!(
        kinds(&documents),
        vec!["Experiment", "ConfigMap", "Secret", "ServiceAccount", "ClusterRole", "ClusterRoleBinding"]
    );
    assert_eq!(documents[1]["metadata"]["name"], "checkout-test-case-file");
    assert_eq!(documents[1]["data"]["shop-checkout.js"], "definition.session(\"checkout\")\n");
    assert_eq!(documents[2]["metadata"]["name"], "stormforger-service-accounts");
    assert_eq!(documents[2]["metadata"]["labels"]["optimize.stormforge.io/application"], "shop");
}

#[test]
fn test_replicas_parameter() {
    let generator = generator(
        r#"
metadata:
  name: shop
ingress:
  url: http://shop
parameters:
  replicas: {}
scenarios:
- locust:
    locustfile: load.py
objectives:
- goals:
  - name: duration
"#,
        MemoryLoader::default().with("load.py", ""),
    );

    let generated = generator.generate(&documents(DEPLOYMENT)).unwrap();
    let parameter = &generated.experiment.spec.parameters[0];
    assert_eq!(generated.experiment.spec.parameters.len(), 1);
    assert_eq!((parameter.name.as_str(), parameter.min, parameter.max), ("replicas", 1, 5));
    assert!(generated.experiment.spec.patches[0].patch.contains("replicas: {{ .Values.replicas }}"));
    assert_eq!(generated.experiment.spec.metrics[0].query, "{{ duration .StartTime .CompletionTime }}");
}

#[test]
fn test_same_workload_in_two_namespaces() {
    let generator = generator(
        r#"
metadata:
  name: shop
ingress:
  url: http://shop
scenarios:
- locust:
    locustfile: load.py
objectives:
- goals:
  - name: cost
"#,
        MemoryLoader::default().with("load.py", ""),
    );

    let staging = DEPLOYMENT.replace("namespace: shop", "namespace: staging");
    let generated = generator
        .generate(&documents(&format!("{DEPLOYMENT}---{staging}")))
        .unwrap();
    let names: Vec<&str> = generated.experiment.spec.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["shop_cpu", "shop_memory", "staging_cpu", "staging_memory"]);
    assert!(generated
        .experiment
        .spec
        .patches
        .iter()
        .any(|p| p.patch.contains("{{ .Values.staging_cpu }}m")));
}

#[test]
fn test_unimplemented_latency_goal() {
    let generator = generator(
        r#"
metadata:
  name: shop
ingress:
  url: http://shop
scenarios:
- locust:
    locustfile: load.py
objectives:
- goals:
  - name: latency-bogus
"#,
        MemoryLoader::default().with("load.py", ""),
    );

    let err = generator.generate(&documents(DEPLOYMENT)).unwrap_err();
    assert!(matches!(err, GenerationError::UnimplementedObjective(ref goal) if goal == "latency-bogus"), "{err}");
}

#[test]
fn test_config_map_value_out_of_range() {
    let generator = generator(
        r#"
metadata:
  name: shop
parameters:
  configMaps:
  - name: tuning
    key: WORKERS
    numeric:
      min: 1
      max: 8
objectives:
- goals:
  - name: cost
"#,
        MemoryLoader::default(),
    );

    let config_map = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: tuning\ndata:\n  WORKERS: \"16\"\n";
    let err = generator.generate(&documents(config_map)).unwrap_err();
    assert!(matches!(err, GenerationError::ValueOutOfRange(_)));
    assert_eq!(
        err.to_string(),
        r#"config map "tuning" key "WORKERS": expected "16" to be in the range 1 to 8"#
    );
}

#[test]
fn test_baselines_are_dropped_together() {
    let generator = generator(
        "metadata:\n  name: shop\nobjectives:\n- goals:\n  - name: cost\n",
        MemoryLoader::default(),
    );
    let deployment = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: app
        resources:
          requests:
            cpu: 250m
            memory: 64Mi
      - name: proxy
"#;

    let generated = generator.generate(&documents(deployment)).unwrap();
    let names: Vec<&str> = generated.experiment.spec.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["app_cpu", "app_memory", "proxy_cpu", "proxy_memory"]);
    assert!(generated.experiment.spec.parameters.iter().all(|p| p.baseline.is_none()));
}

#[test]
fn test_empty_input() {
    let generator = generator(
        "metadata:\n  name: shop\nobjectives:\n- goals:\n  - name: cost\n",
        MemoryLoader::default(),
    );
    let err = generator.generate(&[]).unwrap_err();
    assert_eq!(err.to_string(), "the application did not match any resources");
}

#[test]
fn test_scenario_is_required() {
    let generator = generator(
        r#"
metadata:
  name: shop
scenarios:
- name: browse
  locust:
    locustfile: browse.py
- name: checkout
  locust:
    locustfile: checkout.py
"#,
        MemoryLoader::default(),
    );
    let err = generator.generate(&documents(DEPLOYMENT)).unwrap_err();
    assert_eq!(err.to_string(), "scenario is required (should be one of browse, checkout)");
}

#[test]
fn test_yaml_and_json_output() {
    let mut generator = generator(
        "metadata:\n  name: shop\nobjectives:\n- goals:\n  - name: cost\n",
        MemoryLoader::default(),
    );
    generator.include_application_resources = true;
    let generated = generator.generate(&documents(DEPLOYMENT)).unwrap();

    let mut yaml = Vec::new();
    generated.write_yaml(&mut yaml, &FieldOrder::default()).unwrap();
    let yaml = String::from_utf8(yaml).unwrap();
    assert!(yaml.starts_with("apiVersion: optimize.stormforge.io/v1beta2\nkind: Experiment\n"), "{yaml}");
    assert_eq!(yaml.matches("\n---\n").count(), 1);

    let mut json = Vec::new();
    generated.write_json(&mut json, &FieldOrder::default()).unwrap();
    let list: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(list["kind"], "List");
    assert_eq!(list["items"][0]["metadata"]["name"], "shop-cost");
    assert_eq!(list["items"][1]["kind"], "Deployment");
    assert_eq!(list["items"][1]["metadata"]["labels"]["app.kubernetes.io/name"], "shop");
}
