use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use swarmcp_domain::{Plan, Project};
use swarmcp_secrets::{SecretResolver, open_provider};
use tracing::info;

use crate::error::{PipelineError, ResolveError};
use crate::manifest::{load_project, load_service, load_stack};
use crate::plan::plan;
use crate::resolve::{
    Resolution, check_instances, check_unique, check_unique_stacks, effective_type, resolve,
};

/// Counts of what a valid manifest tree declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    pub stacks: usize,
    pub services: usize,
    pub configs: usize,
    pub secrets: usize,
}

/// Load every manifest under `location` and check each secret declaration,
/// without rendering anything or contacting the secret store.
///
/// # Errors
///
/// Returns the first manifest that fails to load or declaration that fails
/// validation.
pub fn validate_project(location: &Path) -> Result<(Project, ValidationSummary), PipelineError> {
    let project = load_project(location)?;
    let mut summary = ValidationSummary {
        stacks: 0,
        services: 0,
        configs: 0,
        secrets: 0,
    };

    let mut stack_names = Vec::new();
    for reference in &project.spec.stacks {
        let stack = load_stack(&project, reference).map_err(|source| ResolveError::LoadStack {
            stack: reference.name.clone(),
            source,
        })?;
        check_instances(&stack, effective_type(&stack, reference))?;
        summary.stacks += 1;
        let mut service_names = Vec::new();
        for service_ref in &stack.spec.services {
            let service =
                load_service(&stack, service_ref).map_err(|source| ResolveError::LoadService {
                    stack: stack.name().to_string(),
                    service: service_ref.name.clone(),
                    source,
                })?;
            for secret in &service.spec.secrets {
                secret.source().map_err(|source| ResolveError::Validation {
                    stack: stack.name().to_string(),
                    service: service.name().to_string(),
                    source,
                })?;
            }
            summary.services += 1;
            summary.configs += service.spec.configs.len();
            summary.secrets += service.spec.secrets.len();
            service_names.push(service.name().to_string());
        }
        check_unique(stack.name(), "service", service_names.iter().map(String::as_str))?;
        stack_names.push(stack.name().to_string());
    }
    check_unique_stacks(stack_names.iter().map(String::as_str))?;
    Ok((project, summary))
}

/// Resolve `project` with a secret-store session scoped to this call.
///
/// # Errors
///
/// Returns an error when the session cannot be opened or resolution fails;
/// an opened session is closed either way.
pub fn resolve_project(project: &Project) -> Result<Resolution, PipelineError> {
    let provider = Arc::new(open_provider(
        &project.spec.secrets_provider,
        &project.root,
    )?);
    let resolver: Arc<dyn SecretResolver> = provider.clone();
    let resolved = resolve(project, &resolver);
    provider.close();
    Ok(resolved?)
}

/// Resolve and plan an already loaded project.
///
/// Returns the plan with every secret value it was built from, so callers can
/// redact them from output.
///
/// # Errors
///
/// Returns an error when the secret store, resolution or planning fails.
pub fn plan_project(project: &Project) -> Result<(Plan, BTreeSet<String>), PipelineError> {
    let resolution = resolve_project(project)?;
    let plan = plan(&resolution.project)?;
    info!(
        project = project.name(),
        objects = plan.object_count(),
        "planned project"
    );
    Ok((plan, resolution.sensitive_values))
}

/// Load, resolve and plan the project at `location`.
///
/// # Errors
///
/// Returns an error when loading, the secret store, resolution or planning
/// fails.
pub fn build_plan_for_project(location: &Path) -> Result<(Plan, BTreeSet<String>), PipelineError> {
    let project = load_project(location)?;
    plan_project(&project)
}
