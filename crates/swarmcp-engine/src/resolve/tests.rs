#![allow(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use swarmcp_domain::{FileTarget, StackType};
use swarmcp_secrets::{SecretResolver, Unconfigured};

use super::{Resolution, resolve};
use crate::error::ResolveError;
use crate::manifest::load_project;
use crate::test_support::{FakeResolver, minimal_project, write};

fn resolve_dir(root: &Path, resolver: Arc<dyn SecretResolver>) -> Result<Resolution, ResolveError> {
    let project = load_project(root).expect("project loads");
    resolve(&project, &resolver)
}

fn db_resolver() -> Arc<FakeResolver> {
    Arc::new(FakeResolver::default().with("kv/db#password", "s3cr3t"))
}

fn layered_project(root: &Path) {
    write(
        root,
        "project.yaml",
        r"kind: Project
metadata:
  name: shop
spec:
  vars:
    domain: shop.example
  defaults:
    networks:
      front: {}
    resources:
      limits:
        memory: 512M
      reservations:
        cpus: '0.1'
  stacks:
    - name: web
      type: shared
      path: web
",
    );
    write(
        root,
        "web/stack.yaml",
        r"kind: Stack
metadata:
  name: web
spec:
  type: exclusive
  instances:
    - name: blue
      vars:
        color: '#00f'
    - name: green
      vars:
        color: '#0f0'
  defaults:
    networks:
      back:
        driver: overlay
        internal: true
  services:
    - name: frontend
      path: frontend
    - name: worker
      path: worker
",
    );
    write(
        root,
        "web/frontend/service.yaml",
        r#"kind: Service
metadata:
  name: frontend
spec:
  image: {repo: nginx, tag: "1.27"}
  deploy:
    replicas: 2
    resources:
      limits:
        cpus: '0.5'
  env:
    - name: MODE
      value: prod
  configs:
    - name: site
      template: site.conf.tmpl
  secrets:
    - name: db
      fromVault: kv/db#password
      file:
        target: /run/secrets/db-v2
        mode: "0440"
"#,
    );
    write(
        root,
        "web/frontend/site.conf.tmpl",
        "{{ instance.name }}@{{ project.vars.domain }} color={{ stack.instances.vars.color }} mode={{ service.env.MODE }} db={{ secretPath(name=\"db\") }} other={{ secretPath(name=\"cache\") }}",
    );
    write(
        root,
        "web/worker/service.yaml",
        r#"kind: Service
metadata:
  name: worker
spec:
  image: {repo: worker, tag: "2"}
  networks:
    - name: jobs
"#,
    );
}

#[test]
fn shared_stack_resolves_pass_through_config_and_store_secret() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    let resolver = db_resolver();

    let resolution = resolve_dir(temp.path(), resolver.clone()).expect("resolve");
    let project = resolution.project;
    assert_eq!(project.name, "demo");
    assert_eq!(project.stacks.len(), 1);

    let stack = &project.stacks[0];
    assert_eq!(stack.stack_type, StackType::Shared);
    assert_eq!(stack.instance, None);
    assert_eq!(stack.services.len(), 1);

    let service = &stack.services[0];
    assert_eq!(service.configs.len(), 1);
    assert_eq!(service.configs[0].data, None);
    assert_eq!(service.configs[0].file.target, "/app");
    assert_eq!(service.configs[0].file.mode, 0o444);

    assert_eq!(service.secrets.len(), 1);
    assert_eq!(service.secrets[0].data, b"s3cr3t");
    assert_eq!(
        service.secrets[0].file,
        FileTarget {
            target: "/run/secrets/db".to_string(),
            uid: "0".to_string(),
            gid: "0".to_string(),
            mode: 0o400,
        }
    );
    assert!(service.networks.is_empty());
    assert_eq!(resolver.lookups(), vec!["kv/db#password".to_string()]);
    assert!(resolution.sensitive_values.contains("s3cr3t"));
}

#[test]
fn exclusive_instances_render_with_their_own_scope() {
    let temp = tempfile::tempdir().expect("tempdir");
    layered_project(temp.path());

    let project = resolve_dir(temp.path(), db_resolver()).expect("resolve").project;
    let instances: Vec<_> = project
        .stacks
        .iter()
        .map(|stack| stack.instance_name().expect("exclusive instance"))
        .collect();
    assert_eq!(instances, vec!["blue", "green"]);
    assert!(project.stacks.iter().all(|stack| stack.stack_type == StackType::Exclusive));

    let site = &project.stacks[1].services[0].configs[0];
    assert_eq!(
        String::from_utf8(site.data.clone().expect("rendered config")).expect("utf8"),
        "green@shop.example color=#0f0 mode=prod db=/run/secrets/db-v2 other=/run/secrets/cache"
    );
    let secret = &project.stacks[0].services[0].secrets[0];
    assert_eq!(secret.file.target, "/run/secrets/db-v2");
    assert_eq!(secret.file.mode, 0o440);
}

#[test]
fn defaults_merge_networks_and_resources() {
    let temp = tempfile::tempdir().expect("tempdir");
    layered_project(temp.path());

    let project = resolve_dir(temp.path(), db_resolver()).expect("resolve").project;
    let stack = &project.stacks[0];
    let frontend = &stack.services[0];
    let worker = &stack.services[1];

    assert_eq!(frontend.networks, vec!["back", "front"]);
    assert_eq!(worker.networks, vec!["jobs"]);
    assert!(stack.network_defs.get("back").expect("back def").internal);

    let resources = &frontend.spec.deploy.resources;
    assert_eq!(resources.limits.cpus.as_deref(), Some("0.5"));
    assert_eq!(resources.limits.memory.as_deref(), Some("512M"));
    assert_eq!(resources.reservations.cpus.as_deref(), Some("0.1"));
    assert_eq!(frontend.env.get("MODE").map(String::as_str), Some("prod"));
}

#[test]
fn secret_with_both_sources_fails_naming_it() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    write(
        temp.path(),
        "stacks/core/api/service.yaml",
        r"kind: Service
metadata:
  name: api
spec:
  secrets:
    - name: tls
      fromVault: kv/tls#cert
      template: tls.tmpl
",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("ambiguous secret");
    assert!(matches!(error, ResolveError::Validation { .. }));
    let message = error.to_string();
    assert!(message.contains("\"tls\""));
    assert!(message.contains("\"api\""));
}

#[test]
fn secret_with_no_source_fails_naming_it() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    write(
        temp.path(),
        "stacks/core/api/service.yaml",
        "kind: Service\nmetadata:\n  name: api\nspec:\n  secrets:\n    - name: orphan\n",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("missing source");
    assert!(error.to_string().contains("\"orphan\""));
}

#[test]
fn secret_templates_read_the_store_and_configs_cannot() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    write(
        temp.path(),
        "stacks/core/api/service.yaml",
        r"kind: Service
metadata:
  name: api
spec:
  secrets:
    - name: dsn
      template: dsn.tmpl
  configs:
    - name: leak
      template: leak.tmpl
",
    );
    write(
        temp.path(),
        "stacks/core/api/dsn.tmpl",
        "postgres://app:{{ secret(path=\"kv/db#password\") }}@db",
    );
    write(
        temp.path(),
        "stacks/core/api/leak.tmpl",
        "{{ secret(path=\"kv/db#password\") }}",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("config cannot read secrets");
    assert!(matches!(error, ResolveError::RenderConfig { ref config, .. } if config == "leak"));

    write(temp.path(), "stacks/core/api/leak.tmpl", "path={{ secretPath(name=\"dsn\") }}");
    let resolution = resolve_dir(temp.path(), db_resolver()).expect("resolve");
    let service = &resolution.project.stacks[0].services[0];
    assert_eq!(service.secrets[0].data, b"postgres://app:s3cr3t@db");
    assert_eq!(
        service.configs[0].data.as_deref(),
        Some(b"path=/run/secrets/dsn".as_slice())
    );
    assert!(resolution.sensitive_values.contains("s3cr3t"));
    assert!(resolution.sensitive_values.contains("postgres://app:s3cr3t@db"));
}

#[test]
fn unconfigured_provider_fails_with_the_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());

    let error = resolve_dir(temp.path(), Arc::new(Unconfigured)).expect_err("no provider");
    assert!(matches!(error, ResolveError::SecretLookup { ref path, .. } if path == "kv/db#password"));
    assert!(error.to_string().contains("kv/db#password"));
}

#[test]
fn missing_service_manifest_names_the_service() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    std::fs::remove_file(temp.path().join("stacks/core/api/service.yaml")).expect("remove");

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("missing service");
    assert!(matches!(error, ResolveError::LoadService { ref service, .. } if service == "api"));
}

#[test]
fn reference_type_applies_when_stack_omits_type() {
    let temp = tempfile::tempdir().expect("tempdir");
    layered_project(temp.path());
    write(
        temp.path(),
        "web/stack.yaml",
        "kind: Stack\nmetadata:\n  name: web\nspec:\n  instances:\n    - name: blue\n  services: []\n",
    );

    let project = resolve_dir(temp.path(), db_resolver()).expect("resolve").project;
    assert_eq!(project.stacks.len(), 1);
    assert_eq!(project.stacks[0].stack_type, StackType::Shared);
    assert_eq!(project.stacks[0].instance, None);
}

#[test]
fn resolution_is_deterministic() {
    let temp = tempfile::tempdir().expect("tempdir");
    layered_project(temp.path());

    let first = resolve_dir(temp.path(), db_resolver()).expect("first");
    let second = resolve_dir(temp.path(), db_resolver()).expect("second");
    assert_eq!(first, second);
}

fn stack_with(root: &Path, body: &str) {
    write(
        root,
        "stacks/core/stack.yaml",
        &format!("kind: Stack\nmetadata:\n  name: core\nspec:\n{body}"),
    );
}

#[test]
fn repeated_instance_names_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    stack_with(
        temp.path(),
        "  type: exclusive\n  instances:\n    - name: blue\n    - name: blue\n  services:\n    - name: api\n      path: api\n",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("repeated instance");
    assert!(matches!(
        error,
        ResolveError::Duplicate { ref stack, kind: "instance", ref name } if stack == "core" && name == "blue"
    ));
    assert!(error.to_string().contains("\"blue\""));
}

#[test]
fn exclusive_instances_need_a_name() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    stack_with(
        temp.path(),
        "  type: exclusive\n  instances:\n    - name: ''\n  services:\n    - name: api\n      path: api\n",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("unnamed instance");
    assert!(matches!(error, ResolveError::UnnamedInstance { ref stack } if stack == "core"));
}

#[test]
fn shared_stacks_ignore_declared_instances() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    stack_with(
        temp.path(),
        "  instances:\n    - name: blue\n    - name: blue\n  services:\n    - name: api\n      path: api\n",
    );

    let project = resolve_dir(temp.path(), db_resolver()).expect("resolve").project;
    assert_eq!(project.stacks.len(), 1);
    assert_eq!(project.stacks[0].instance, None);
}

#[test]
fn repeated_service_references_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    stack_with(
        temp.path(),
        "  services:\n    - name: api\n      path: api\n    - name: api-again\n      path: api\n",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("repeated service");
    assert!(matches!(
        error,
        ResolveError::Duplicate { kind: "service", ref name, .. } if name == "api"
    ));
}

#[test]
fn repeated_stack_references_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    minimal_project(temp.path());
    write(
        temp.path(),
        "project.yaml",
        "kind: Project\nmetadata:\n  name: demo\nspec:\n  stacks:\n    - name: core\n      type: shared\n      path: stacks/core\n    - name: core-again\n      type: shared\n      path: stacks/core\n",
    );

    let error = resolve_dir(temp.path(), db_resolver()).expect_err("repeated stack");
    assert!(matches!(error, ResolveError::DuplicateStack { ref stack } if stack == "core"));
}
