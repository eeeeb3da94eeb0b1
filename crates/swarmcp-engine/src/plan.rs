use std::collections::BTreeSet;

use serde::Serialize;
use swarmcp_domain::{
    ConfigPayload, EffectiveProject, EffectiveService, EffectiveStack, FileTarget, Labels,
    MountReference, NameParts, NetworkSpec, Plan, SecretPayload, ServiceApply, ServiceDeployment,
    content_addressed_name, short_fingerprint,
};

use crate::error::PlanError;
use crate::fingerprint::{fingerprint, fingerprint_json};
use crate::normalize::{NormalizedService, normalize};

pub const DEFAULT_NETWORK_DRIVER: &str = "overlay";

/// Hash input for a service: its normalized spec plus the cluster objects it
/// mounts, so a config or secret content change rolls the service.
#[derive(Serialize)]
struct ServiceFingerprintInput<'a> {
    spec: &'a NormalizedService,
    mounts: Vec<&'a str>,
}

/// Turn an effective project into the desired cluster objects.
///
/// Pure: identical input yields an identical plan.
///
/// # Errors
///
/// Returns an error when a normalized service spec cannot be serialized for
/// fingerprinting.
pub fn plan(project: &EffectiveProject) -> Result<Plan, PlanError> {
    let mut builder = PlanBuilder::default();
    for (stack, service) in project.services() {
        builder.add_service(&project.name, stack, service)?;
    }
    Ok(builder.finish())
}

#[derive(Default)]
struct PlanBuilder {
    plan: Plan,
    network_names: BTreeSet<String>,
    config_names: BTreeSet<String>,
    secret_names: BTreeSet<String>,
    service_lines: Vec<String>,
}

impl PlanBuilder {
    fn add_service(
        &mut self,
        project: &str,
        stack: &EffectiveStack,
        service: &EffectiveService,
    ) -> Result<(), PlanError> {
        let parts = NameParts {
            project,
            stack: &stack.name,
            instance: stack.instance_name(),
            service: &service.name,
        };

        for network in &service.networks {
            if !self.network_names.insert(network.clone()) {
                continue;
            }
            let def = stack.network_defs.get(network);
            self.plan.networks.push(NetworkSpec {
                name: network.clone(),
                driver: def
                    .and_then(|def| def.driver.clone())
                    .filter(|driver| !driver.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_NETWORK_DRIVER.to_string()),
                internal: def.is_some_and(|def| def.internal),
                labels: Labels::new(),
            });
        }

        let mut config_mounts = Vec::with_capacity(service.configs.len());
        for config in &service.configs {
            let (name, labels) = match &config.data {
                Some(data) => {
                    let digest = fingerprint(data);
                    (
                        content_addressed_name(&config.name, &digest),
                        parts.object_labels(&digest),
                    )
                }
                // Pass-through configs carry the digest of empty content.
                None => (config.name.clone(), parts.object_labels(&fingerprint(b""))),
            };
            config_mounts.push(mount(&name, &config.file));
            if self.config_names.insert(name.clone()) {
                self.plan.configs.push(ConfigPayload {
                    name,
                    declared_name: config.name.clone(),
                    data: config.data.clone(),
                    labels,
                });
            }
        }

        let mut secret_mounts = Vec::with_capacity(service.secrets.len());
        for secret in &service.secrets {
            let digest = fingerprint(&secret.data);
            let name = content_addressed_name(&secret.name, &digest);
            secret_mounts.push(mount(&name, &secret.file));
            if self.secret_names.insert(name.clone()) {
                self.plan.secrets.push(SecretPayload {
                    name,
                    declared_name: secret.name.clone(),
                    data: secret.data.clone(),
                    labels: parts.object_labels(&digest),
                });
            }
        }

        let service_name = parts.service_name();
        let normalized = normalize(&service.spec);
        let mut mounts: Vec<&str> = config_mounts
            .iter()
            .chain(&secret_mounts)
            .map(|mount| mount.source.as_str())
            .collect();
        mounts.sort_unstable();
        let digest = fingerprint_json(&ServiceFingerprintInput {
            spec: &normalized,
            mounts,
        })
        .map_err(|source| PlanError::Fingerprint {
            service: service_name.clone(),
            source,
        })?;

        // Ownership labels are applied last so a declared label cannot
        // shadow them.
        let mut labels = service.spec.labels.clone();
        labels.extend(parts.object_labels(&digest));

        self.service_lines
            .push(format!("{service_name} {}", short_fingerprint(&digest)));
        self.plan.services.push(ServiceApply {
            name: service_name,
            labels,
            spec: ServiceDeployment {
                image: service.spec.image.to_string(),
                replicas: service.spec.deploy.replicas,
                env: service.env_decl(),
                networks: service.networks.clone(),
                constraints: service.spec.deploy.placement.constraints.clone(),
                resources: service.spec.deploy.resources.clone(),
                labels: service.spec.labels.clone(),
                configs: config_mounts,
                secrets: secret_mounts,
            },
        });
        Ok(())
    }

    fn finish(mut self) -> Plan {
        let counts = format!(
            "networks:{} configs:{} secrets:{} services:{}",
            self.plan.networks.len(),
            self.plan.configs.len(),
            self.plan.secrets.len(),
            self.plan.services.len()
        );
        self.plan.summary.push(counts);
        self.plan.summary.append(&mut self.service_lines);
        self.plan
    }
}

fn mount(source: &str, file: &FileTarget) -> MountReference {
    MountReference {
        source: source.to_string(),
        target: file.target.clone(),
        uid: file.uid.clone(),
        gid: file.gid.clone(),
        mode: file.mode,
    }
}

#[cfg(test)]
mod tests;
