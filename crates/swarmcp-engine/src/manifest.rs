use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use swarmcp_domain::{DomainValidationError, Project, Service, ServiceRef, Stack, StackRef};
use tracing::debug;

use crate::error::ManifestLoadError;

pub const PROJECT_FILE: &str = "project.yaml";
pub const STACK_FILE: &str = "stack.yaml";
pub const SERVICE_FILE: &str = "service.yaml";

/// Load `project.yaml` from a directory, or a project file given directly.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, its kind is not
/// `Project`, or its name is empty.
pub fn load_project(location: &Path) -> Result<Project, ManifestLoadError> {
    let path = manifest_file(location, PROJECT_FILE);
    let path = fs::canonicalize(&path).map_err(|source| ManifestLoadError::Read {
        path: path.clone(),
        source,
    })?;
    let mut project: Project = read_manifest(&path)?;
    check_header(&path, "Project", &project.kind, project.name())?;
    project.root = path
        .parent()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
    Ok(project)
}

/// Load the stack a project reference points at, relative to the project root.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, its kind is not
/// `Stack`, or its name is empty.
pub fn load_stack(project: &Project, reference: &StackRef) -> Result<Stack, ManifestLoadError> {
    let path = manifest_file(&project.root.join(&reference.path), STACK_FILE);
    let mut stack: Stack = read_manifest(&path)?;
    check_header(&path, "Stack", &stack.kind, stack.name())?;
    stack.dir = parent_dir(&path);
    Ok(stack)
}

/// Load the service a stack reference points at, relative to the stack directory.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, its kind is not
/// `Service`, or its name is empty.
pub fn load_service(stack: &Stack, reference: &ServiceRef) -> Result<Service, ManifestLoadError> {
    let path = manifest_file(&stack.dir.join(&reference.path), SERVICE_FILE);
    let mut service: Service = read_manifest(&path)?;
    check_header(&path, "Service", &service.kind, service.name())?;
    service.dir = parent_dir(&path);
    Ok(service)
}

/// References may name a directory (holding the default file) or a YAML file.
fn manifest_file(location: &Path, default_name: &str) -> PathBuf {
    let is_yaml = location
        .extension()
        .is_some_and(|extension| extension == "yaml" || extension == "yml");
    if is_yaml && !location.is_dir() {
        location.to_path_buf()
    } else {
        location.join(default_name)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map_or_else(PathBuf::new, Path::to_path_buf)
}

fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ManifestLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded manifest");
    serde_yaml::from_str(&contents).map_err(|source| ManifestLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_header(
    path: &Path,
    expected: &'static str,
    kind: &str,
    name: &str,
) -> Result<(), ManifestLoadError> {
    if !kind.trim().eq_ignore_ascii_case(expected) {
        return Err(ManifestLoadError::WrongKind {
            path: path.to_path_buf(),
            expected,
            found: kind.to_string(),
        });
    }
    if name.trim().is_empty() {
        return Err(ManifestLoadError::Invalid {
            path: path.to_path_buf(),
            source: DomainValidationError::EmptyName {
                kind: match expected {
                    "Project" => "project",
                    "Stack" => "stack",
                    _ => "service",
                },
            },
        });
    }
    Ok(())
}
