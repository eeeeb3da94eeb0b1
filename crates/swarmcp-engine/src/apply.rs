use std::collections::BTreeSet;

use swarmcp_domain::{
    ApplyAction, ApplyReport, ApplyStepResult, ObjectKind, OwnedObject, Plan, owner_filter,
};
use tracing::{info, warn};

use crate::driver::ClusterDriver;
use crate::error::DriverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub fail_fast: bool,
    /// Project whose owned configs, secrets and services absent from the
    /// plan are removed after the plan is applied.
    pub prune: Option<String>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            fail_fast: true,
            prune: None,
        }
    }
}

/// Apply `plan` through `driver`: networks, configs, secrets, services, then
/// the optional prune. Networks are never pruned, and nothing is pruned once
/// any step has failed since older services may still mount stale objects.
#[must_use]
pub fn apply_plan(plan: &Plan, driver: &dyn ClusterDriver, options: &ApplyOptions) -> ApplyReport {
    let mut run = ApplyRun {
        driver,
        fail_fast: options.fail_fast,
        results: Vec::with_capacity(plan.object_count()),
        errors: Vec::new(),
        aborted: false,
    };

    let existing = match options.prune.as_deref().or_else(|| project_of(plan)) {
        Some(project) => run.list_owned(project),
        None => Vec::new(),
    };
    let existing: BTreeSet<(ObjectKind, &str)> = existing
        .iter()
        .map(|object| (object.kind, object.name.as_str()))
        .collect();

    for network in &plan.networks {
        run.step(ObjectKind::Network, &network.name, ApplyAction::Ensure, |driver| {
            let ids = driver.ensure_networks(std::slice::from_ref(network))?;
            Ok((ids.get(&network.name).cloned(), false))
        });
    }

    for config in &plan.configs {
        let created = config.data.is_some()
            && !existing.contains(&(ObjectKind::Config, config.name.as_str()));
        let action = if created { ApplyAction::Create } else { ApplyAction::Ensure };
        run.step(ObjectKind::Config, &config.name, action, |driver| {
            let ids = driver.ensure_configs(std::slice::from_ref(config))?;
            Ok((ids.get(&config.name).cloned(), created))
        });
    }

    for secret in &plan.secrets {
        let created = !existing.contains(&(ObjectKind::Secret, secret.name.as_str()));
        let action = if created { ApplyAction::Create } else { ApplyAction::Ensure };
        run.step(ObjectKind::Secret, &secret.name, action, |driver| {
            let ids = driver.ensure_secrets(std::slice::from_ref(secret))?;
            Ok((ids.get(&secret.name).cloned(), created))
        });
    }

    for service in &plan.services {
        let action = if existing.contains(&(ObjectKind::Service, service.name.as_str())) {
            ApplyAction::Update
        } else {
            ApplyAction::Create
        };
        run.step(ObjectKind::Service, &service.name, action, |driver| {
            let (id, updated) = driver.ensure_service(service)?;
            Ok((Some(id), updated))
        });
    }

    if let Some(project) = options.prune.as_deref() {
        if run.errors.is_empty() {
            prune_stale(&mut run, plan, project);
        } else {
            warn!(project, "skipping prune after failed apply steps");
        }
    }

    ApplyReport {
        plan: plan.clone(),
        results: run.results,
        errors: run.errors,
    }
}

/// Services go first so nothing still mounts a config or secret being removed.
fn prune_stale(run: &mut ApplyRun<'_>, plan: &Plan, project: &str) {
    let desired: BTreeSet<(ObjectKind, &str)> = plan
        .configs
        .iter()
        .map(|config| (ObjectKind::Config, config.name.as_str()))
        .chain(plan.secrets.iter().map(|secret| (ObjectKind::Secret, secret.name.as_str())))
        .chain(plan.services.iter().map(|service| (ObjectKind::Service, service.name.as_str())))
        .collect();

    let mut stale: Vec<OwnedObject> = run
        .list_owned(project)
        .into_iter()
        .filter(|object| object.kind != ObjectKind::Network)
        .filter(|object| !desired.contains(&(object.kind, object.name.as_str())))
        .collect();
    stale.sort_by_key(|object| match object.kind {
        ObjectKind::Service => 0,
        ObjectKind::Secret => 1,
        ObjectKind::Config => 2,
        ObjectKind::Network => 3,
    });

    for object in &stale {
        run.step(object.kind, &object.name, ApplyAction::Prune, |driver| {
            driver.prune(std::slice::from_ref(object))?;
            Ok((Some(object.id.clone()), true))
        });
    }
}

/// Services carry the project label; any one of them names the project.
fn project_of(plan: &Plan) -> Option<&str> {
    plan.services
        .iter()
        .find_map(|service| service.labels.get(swarmcp_domain::LABEL_PROJECT))
        .map(String::as_str)
}

struct ApplyRun<'a> {
    driver: &'a dyn ClusterDriver,
    fail_fast: bool,
    results: Vec<ApplyStepResult>,
    errors: Vec<String>,
    aborted: bool,
}

impl ApplyRun<'_> {
    fn list_owned(&mut self, project: &str) -> Vec<OwnedObject> {
        match self.driver.list_owned(&owner_filter(project)) {
            Ok(objects) => objects,
            Err(error) => {
                warn!(project, %error, "failed to list owned objects");
                self.errors.push(format!("failed to list owned objects: {error}"));
                Vec::new()
            }
        }
    }

    fn step<F>(&mut self, kind: ObjectKind, name: &str, action: ApplyAction, operation: F)
    where
        F: FnOnce(&dyn ClusterDriver) -> Result<(Option<String>, bool), DriverError>,
    {
        if self.aborted {
            return;
        }
        match operation(self.driver) {
            Ok((id, changed)) => {
                info!(%kind, name, ?action, changed, "applied");
                self.results.push(ApplyStepResult {
                    kind,
                    name: name.to_string(),
                    action,
                    id,
                    success: true,
                    changed,
                    error: None,
                });
            }
            Err(error) => {
                let message = error.to_string();
                warn!(%kind, name, error = %message, "apply step failed");
                self.errors.push(format!("{kind} {name} failed: {message}"));
                self.results.push(ApplyStepResult {
                    kind,
                    name: name.to_string(),
                    action,
                    id: None,
                    success: false,
                    changed: false,
                    error: Some(message),
                });
                if self.fail_fast {
                    self.errors
                        .push("apply aborted after first failure due to fail-fast".to_string());
                    self.aborted = true;
                }
            }
        }
    }
}
