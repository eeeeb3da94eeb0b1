use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rayon::prelude::*;
use swarmcp_domain::{
    ArtifactKind, EffectiveConfig, EffectiveProject, EffectiveSecret, EffectiveService,
    EffectiveStack, FileTarget, Instance, NetworkAttachment, NetworkDef, Project, SecretSource,
    Service, ServiceSpec, Stack, StackRef, StackType,
};
use swarmcp_secrets::SecretResolver;
use tracing::{debug, info};

use crate::context::{TemplateContext, env_map, git_short_sha};
use crate::error::{RenderError, ResolveError};
use crate::manifest::{load_service, load_stack};
use crate::template::{Capability, RenderEngine};

/// Effective state plus every secret value it embeds, for output redaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub project: EffectiveProject,
    pub sensitive_values: BTreeSet<String>,
}

struct LoadedStack {
    stack: Stack,
    stack_type: StackType,
    network_defs: BTreeMap<String, NetworkDef>,
    services: Vec<Service>,
}

struct ServiceJob<'a> {
    stack_index: usize,
    loaded: &'a LoadedStack,
    instance: Option<&'a Instance>,
    service: &'a Service,
}

/// Build the effective state of `project`.
///
/// Every manifest is loaded before anything renders; services then render in
/// parallel and are reassembled in declaration order.
///
/// # Errors
///
/// Returns the first failure in declaration order: a stack or service that
/// cannot be loaded, an invalid secret declaration, a template that fails to
/// render, or a failed secret lookup.
pub fn resolve(
    project: &Project,
    resolver: &Arc<dyn SecretResolver>,
) -> Result<Resolution, ResolveError> {
    let loaded = load_stacks(project)?;
    let git_sha = git_short_sha(&project.root);

    let mut effective_stacks = Vec::new();
    let mut jobs = Vec::new();
    for loaded_stack in &loaded {
        let instances: Vec<Option<&Instance>> = match loaded_stack.stack_type {
            StackType::Shared => vec![None],
            StackType::Exclusive => loaded_stack.stack.spec.instances.iter().map(Some).collect(),
        };
        for instance in instances {
            let stack_index = effective_stacks.len();
            effective_stacks.push(EffectiveStack {
                name: loaded_stack.stack.name().to_string(),
                stack_type: loaded_stack.stack_type,
                instance: instance.cloned(),
                network_defs: loaded_stack.network_defs.clone(),
                services: Vec::with_capacity(loaded_stack.services.len()),
            });
            jobs.extend(loaded_stack.services.iter().map(|service| ServiceJob {
                stack_index,
                loaded: loaded_stack,
                instance,
                service,
            }));
        }
    }

    let rendered = jobs
        .par_iter()
        .map(|job| resolve_service(project, job, &git_sha, resolver))
        .collect::<Vec<_>>();

    let mut sensitive_values = BTreeSet::new();
    for (job, result) in jobs.iter().zip(rendered) {
        let (service, secrets) = result?;
        sensitive_values.extend(secrets);
        effective_stacks[job.stack_index].services.push(service);
    }

    for stack in &effective_stacks {
        info!(
            stack = %stack.name,
            instance = stack.instance_name().unwrap_or(""),
            services = stack.services.len(),
            "resolved stack"
        );
    }

    Ok(Resolution {
        project: EffectiveProject {
            name: project.name().to_string(),
            stacks: effective_stacks,
        },
        sensitive_values,
    })
}

fn load_stacks(project: &Project) -> Result<Vec<LoadedStack>, ResolveError> {
    let loaded = project
        .spec
        .stacks
        .iter()
        .map(|reference| {
            let stack = load_stack(project, reference).map_err(|source| ResolveError::LoadStack {
                stack: reference.name.clone(),
                source,
            })?;
            let stack_type = effective_type(&stack, reference);
            check_instances(&stack, stack_type)?;

            let mut network_defs = project.spec.defaults.networks.clone();
            network_defs.extend(
                stack
                    .spec
                    .defaults
                    .networks
                    .iter()
                    .map(|(name, def)| (name.clone(), def.clone())),
            );

            let services = stack
                .spec
                .services
                .iter()
                .map(|service_ref| {
                    load_service(&stack, service_ref).map_err(|source| ResolveError::LoadService {
                        stack: stack.name().to_string(),
                        service: service_ref.name.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            check_unique(stack.name(), "service", services.iter().map(Service::name))?;

            Ok(LoadedStack {
                stack,
                stack_type,
                network_defs,
                services,
            })
        })
        .collect::<Result<Vec<_>, ResolveError>>()?;
    check_unique_stacks(loaded.iter().map(|loaded| loaded.stack.name()))?;
    Ok(loaded)
}

/// The stack's own type wins over the project's reference; exclusive otherwise.
pub(crate) fn effective_type(stack: &Stack, reference: &StackRef) -> StackType {
    stack
        .spec
        .stack_type
        .or(reference.stack_type)
        .unwrap_or_default()
}

/// Each exclusive instance becomes its own effective stack, so names must be
/// present and distinct. Shared stacks ignore declared instances.
pub(crate) fn check_instances(stack: &Stack, stack_type: StackType) -> Result<(), ResolveError> {
    if stack_type == StackType::Shared {
        return Ok(());
    }
    if stack
        .spec
        .instances
        .iter()
        .any(|instance| instance.name.trim().is_empty())
    {
        return Err(ResolveError::UnnamedInstance {
            stack: stack.name().to_string(),
        });
    }
    check_unique(
        stack.name(),
        "instance",
        stack.spec.instances.iter().map(|instance| instance.name.as_str()),
    )
}

pub(crate) fn check_unique<'a>(
    stack: &str,
    kind: &'static str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ResolveError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ResolveError::Duplicate {
                stack: stack.to_string(),
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_unique_stacks<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ResolveError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ResolveError::DuplicateStack {
                stack: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Declared networks win; otherwise every project and stack default network.
fn merged_spec(project: &Project, loaded: &LoadedStack, service: &Service) -> ServiceSpec {
    let mut spec = service.spec.clone();
    if spec.networks.is_empty() {
        spec.networks = loaded
            .network_defs
            .keys()
            .map(|name| NetworkAttachment { name: name.clone() })
            .collect();
    }
    spec.deploy.resources = spec.deploy.resources.or(&project.spec.defaults.resources);
    spec
}

fn resolve_service(
    project: &Project,
    job: &ServiceJob<'_>,
    git_sha: &str,
    resolver: &Arc<dyn SecretResolver>,
) -> Result<(EffectiveService, BTreeSet<String>), ResolveError> {
    let stack = &job.loaded.stack;
    let service = job.service;
    let stack_name = stack.name();
    let service_name = service.name();
    let spec = merged_spec(project, job.loaded, service);

    let secret_files: Vec<FileTarget> = spec
        .secrets
        .iter()
        .map(|decl| FileTarget::resolve(&decl.name, decl.file.as_ref(), ArtifactKind::Secret))
        .collect();
    let secret_targets: BTreeMap<String, String> = spec
        .secrets
        .iter()
        .zip(&secret_files)
        .map(|(decl, file)| (decl.name.clone(), file.target.clone()))
        .collect();

    let mut engine = RenderEngine::new(secret_targets, Arc::clone(resolver));
    let context = TemplateContext::build(project, stack, job.instance, service, git_sha);
    let context = tera::Context::from_serialize(&context).map_err(|source| ResolveError::Context {
        stack: stack_name.to_string(),
        service: service_name.to_string(),
        source: RenderError::Context { source },
    })?;

    let mut sensitive_values = BTreeSet::new();
    let mut secrets = Vec::with_capacity(spec.secrets.len());
    for (decl, file) in spec.secrets.iter().zip(secret_files) {
        let source = decl.source().map_err(|source| ResolveError::Validation {
            stack: stack_name.to_string(),
            service: service_name.to_string(),
            source,
        })?;
        let data = match source {
            SecretSource::Template(template) => engine
                .render_file(Capability::Secret, &service.dir.join(template), &context)
                .map_err(|source| ResolveError::RenderSecret {
                    stack: stack_name.to_string(),
                    service: service_name.to_string(),
                    secret: decl.name.clone(),
                    source,
                })?,
            SecretSource::External(path) => {
                resolver
                    .resolve_secret(path)
                    .map_err(|source| ResolveError::SecretLookup {
                        stack: stack_name.to_string(),
                        service: service_name.to_string(),
                        secret: decl.name.clone(),
                        path: path.to_string(),
                        source,
                    })?
            }
        };
        if let Some(text) = std::str::from_utf8(&data).ok().filter(|text| !text.trim().is_empty()) {
            sensitive_values.insert(text.to_string());
        }
        debug!(stack = stack_name, service = service_name, secret = %decl.name, "resolved secret");
        secrets.push(EffectiveSecret {
            name: decl.name.clone(),
            data,
            file,
        });
    }

    let mut configs = Vec::with_capacity(spec.configs.len());
    for decl in &spec.configs {
        let file = FileTarget::resolve(&decl.name, decl.file.as_ref(), ArtifactKind::Config);
        let data = match decl.template.as_deref().filter(|path| !path.as_os_str().is_empty()) {
            None => None,
            Some(template) => Some(
                engine
                    .render_file(Capability::Config, &service.dir.join(template), &context)
                    .map_err(|source| ResolveError::RenderConfig {
                        stack: stack_name.to_string(),
                        service: service_name.to_string(),
                        config: decl.name.clone(),
                        source,
                    })?,
            ),
        };
        debug!(stack = stack_name, service = service_name, config = %decl.name, "rendered config");
        configs.push(EffectiveConfig {
            name: decl.name.clone(),
            data,
            file,
        });
    }

    sensitive_values.extend(engine.sensitive_values());
    let networks = spec.networks.iter().map(|network| network.name.clone()).collect();
    Ok((
        EffectiveService {
            name: service_name.to_string(),
            env: env_map(service),
            networks,
            configs,
            secrets,
            spec,
        },
        sensitive_values,
    ))
}

#[cfg(test)]
mod tests;
