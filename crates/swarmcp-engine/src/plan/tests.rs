#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use swarmcp_domain::{
    ArtifactKind, EffectiveConfig, EffectiveProject, EffectiveSecret, EffectiveService,
    EffectiveStack, FileTarget, Instance, LABEL_FINGERPRINT, LABEL_INSTANCE, LABEL_OWNER,
    LABEL_PROJECT, LABEL_SERVICE, LABEL_STACK, NetworkAttachment, NetworkDef, ServiceSpec,
    StackType,
};
use swarmcp_secrets::SecretResolver;

use super::plan;
use crate::fingerprint::fingerprint;
use crate::manifest::load_project;
use crate::resolve::resolve;
use crate::test_support::{FakeResolver, minimal_project};

fn service(name: &str, config_data: Option<&str>, networks: &[&str]) -> EffectiveService {
    let spec: ServiceSpec = serde_yaml::from_str(
        "image: {repo: nginx, tag: '1.27'}\ndeploy: {replicas: 2}\nconfigs: [{name: site}]\nsecrets: [{name: tls, fromVault: kv/tls}]\n",
    )
    .expect("service spec");
    let spec = ServiceSpec {
        networks: networks
            .iter()
            .map(|network| NetworkAttachment {
                name: (*network).to_string(),
            })
            .collect(),
        ..spec
    };
    EffectiveService {
        name: name.to_string(),
        configs: vec![EffectiveConfig {
            name: "site".to_string(),
            data: config_data.map(|data| data.as_bytes().to_vec()),
            file: FileTarget::defaults("site", ArtifactKind::Config),
        }],
        secrets: vec![EffectiveSecret {
            name: "tls".to_string(),
            data: b"-----BEGIN KEY-----".to_vec(),
            file: FileTarget::defaults("tls", ArtifactKind::Secret),
        }],
        env: BTreeMap::from([("MODE".to_string(), "prod".to_string())]),
        networks: networks.iter().map(|network| (*network).to_string()).collect(),
        spec,
    }
}

fn project(stacks: Vec<EffectiveStack>) -> EffectiveProject {
    EffectiveProject {
        name: "shop".to_string(),
        stacks,
    }
}

fn shared_stack(services: Vec<EffectiveService>) -> EffectiveStack {
    EffectiveStack {
        name: "web".to_string(),
        stack_type: StackType::Shared,
        instance: None,
        network_defs: BTreeMap::from([(
            "back".to_string(),
            NetworkDef {
                driver: Some("macvlan".to_string()),
                internal: true,
            },
        )]),
        services,
    }
}

fn service_fingerprint(project: &EffectiveProject) -> String {
    let plan = plan(project).expect("plan");
    plan.services[0].labels[LABEL_FINGERPRINT].clone()
}

#[test]
fn minimal_project_plans_one_config_and_one_service() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    let loaded = load_project(temp.path()).expect("project");
    let resolver: Arc<dyn SecretResolver> =
        Arc::new(FakeResolver::default().with("kv/db#password", "s3cr3t"));
    let resolution = resolve(&loaded, &resolver).expect("resolve");

    let plan = plan(&resolution.project).expect("plan");
    assert!(plan.networks.is_empty());
    assert_eq!(plan.configs.len(), 1);
    assert_eq!(plan.configs[0].name, "app");
    assert_eq!(plan.configs[0].data, None);
    assert_eq!(
        plan.configs[0].labels[LABEL_FINGERPRINT],
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(plan.secrets.len(), 1);
    assert_eq!(plan.services.len(), 1);

    let service = &plan.services[0];
    assert_eq!(service.name, "proj.demo.stack.core.svc.api");
    assert_eq!(service.spec.image, "ghcr.io/demo/api:1.0.0");
    assert_eq!(service.labels[LABEL_OWNER], "swarmcp");
    assert_eq!(service.labels[LABEL_PROJECT], "demo");
    assert_eq!(service.labels[LABEL_STACK], "core");
    assert_eq!(service.labels[LABEL_SERVICE], "api");
    assert!(!service.labels.contains_key(LABEL_INSTANCE));

    let config_mount = &service.spec.configs[0];
    assert_eq!(config_mount.source, "app");
    assert_eq!(config_mount.target, "/app");
    assert_eq!(config_mount.mode, 0o444);

    let secret_mount = &service.spec.secrets[0];
    let digest = fingerprint(b"s3cr3t");
    assert_eq!(secret_mount.source, format!("db-{}", &digest[..12]));
    assert_eq!(secret_mount.target, "/run/secrets/db");
    assert_eq!((secret_mount.uid.as_str(), secret_mount.gid.as_str()), ("0", "0"));
    assert_eq!(secret_mount.mode, 0o400);
    assert_eq!(plan.secrets[0].labels[LABEL_FINGERPRINT], digest);

    assert_eq!(plan.summary[0], "networks:0 configs:1 secrets:1 services:1");
    assert!(plan.summary[1].starts_with("proj.demo.stack.core.svc.api "));
}

#[test]
fn replanning_is_byte_identical() {
    let input = project(vec![shared_stack(vec![
        service("frontend", Some("listen 80;"), &["back", "front"]),
        service("worker", None, &["back"]),
    ])]);

    let first = serde_json::to_vec(&plan(&input).expect("first")).expect("json");
    let second = serde_json::to_vec(&plan(&input).expect("second")).expect("json");
    assert_eq!(first, second);
}

#[test]
fn config_content_change_mints_new_name_and_rolls_service() {
    let before = project(vec![shared_stack(vec![service("frontend", Some("listen 80;"), &[])])]);
    let after = project(vec![shared_stack(vec![service("frontend", Some("listen 81;"), &[])])]);

    let before_plan = plan(&before).expect("before");
    let after_plan = plan(&after).expect("after");
    assert_ne!(before_plan.configs[0].name, after_plan.configs[0].name);
    assert!(before_plan.configs[0].name.starts_with("site-"));
    assert_ne!(service_fingerprint(&before), service_fingerprint(&after));
}

#[test]
fn service_fingerprint_ignores_declaration_order() {
    let mut reordered = service("frontend", Some("listen 80;"), &["front", "back"]);
    reordered.spec.networks.reverse();
    reordered.networks.reverse();

    let original = project(vec![shared_stack(vec![service(
        "frontend",
        Some("listen 80;"),
        &["front", "back"],
    )])]);
    let permuted = project(vec![shared_stack(vec![reordered])]);
    assert_eq!(service_fingerprint(&original), service_fingerprint(&permuted));

    let mut scaled = service("frontend", Some("listen 80;"), &["front", "back"]);
    scaled.spec.deploy.replicas = 3;
    assert_ne!(
        service_fingerprint(&original),
        service_fingerprint(&project(vec![shared_stack(vec![scaled])]))
    );
}

#[test]
fn networks_are_deduplicated_with_declared_drivers() {
    let input = project(vec![shared_stack(vec![
        service("frontend", None, &["back", "front"]),
        service("worker", None, &["back"]),
    ])]);

    let plan = plan(&input).expect("plan");
    let networks: Vec<_> = plan
        .networks
        .iter()
        .map(|network| (network.name.as_str(), network.driver.as_str(), network.internal))
        .collect();
    assert_eq!(
        networks,
        vec![("back", "macvlan", true), ("front", "overlay", false)]
    );
    assert!(plan.networks.iter().all(|network| network.labels.is_empty()));
    assert_eq!(plan.configs.len(), 1, "pass-through config is shared by name");
    assert_eq!(plan.secrets.len(), 1, "identical secret content shares one object");
    assert_eq!(plan.services[1].spec.secrets[0].source, plan.secrets[0].name);
}

#[test]
fn exclusive_instances_get_instance_names_and_labels() {
    let mut stack = shared_stack(vec![service("frontend", None, &[])]);
    stack.stack_type = StackType::Exclusive;
    stack.instance = Some(Instance {
        name: "blue".to_string(),
        vars: BTreeMap::new(),
    });

    let plan = plan(&project(vec![stack])).expect("plan");
    let service = &plan.services[0];
    assert_eq!(service.name, "proj.shop.stack.web.inst.blue.svc.frontend");
    assert_eq!(service.labels[LABEL_INSTANCE], "blue");
    assert_eq!(plan.secrets[0].labels[LABEL_INSTANCE], "blue");
}

#[test]
fn declared_labels_cannot_shadow_ownership() {
    let mut declared = service("frontend", None, &[]);
    declared.spec.labels = BTreeMap::from([
        (LABEL_OWNER.to_string(), "someone-else".to_string()),
        ("team".to_string(), "edge".to_string()),
    ]);

    let plan = plan(&project(vec![shared_stack(vec![declared])])).expect("plan");
    let service = &plan.services[0];
    assert_eq!(service.labels[LABEL_OWNER], "swarmcp");
    assert_eq!(service.labels["team"], "edge");
    assert_eq!(service.spec.labels["team"], "edge");
    assert_eq!(service.spec.env, vec!["MODE=prod".to_string()]);
}
