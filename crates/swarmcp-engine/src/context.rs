use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use serde::Serialize;
use swarmcp_domain::{Instance, Project, Service, Stack, Vars};

/// Variables visible to config and secret templates of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateContext {
    pub project: ProjectScope,
    pub stack: StackScope,
    pub instance: InstanceScope,
    pub service: ServiceScope,
    pub git: GitScope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectScope {
    pub name: String,
    pub vars: Vars,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackScope {
    pub name: String,
    pub instances: InstanceVars,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceVars {
    pub vars: Vars,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceScope {
    pub name: String,
    pub vars: Vars,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceScope {
    pub name: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GitScope {
    pub short_sha: String,
}

impl TemplateContext {
    /// Shared stacks render with an unnamed instance and no instance vars.
    #[must_use]
    pub fn build(
        project: &Project,
        stack: &Stack,
        instance: Option<&Instance>,
        service: &Service,
        git_short_sha: &str,
    ) -> Self {
        let instance_vars = instance.map(|instance| instance.vars.clone()).unwrap_or_default();
        Self {
            project: ProjectScope {
                name: project.name().to_string(),
                vars: project.spec.vars.clone(),
            },
            stack: StackScope {
                name: stack.name().to_string(),
                instances: InstanceVars {
                    vars: instance_vars.clone(),
                },
            },
            instance: InstanceScope {
                name: instance.map(|instance| instance.name.clone()).unwrap_or_default(),
                vars: instance_vars,
            },
            service: ServiceScope {
                name: service.name().to_string(),
                env: env_map(service),
            },
            git: GitScope {
                short_sha: git_short_sha.to_string(),
            },
        }
    }
}

/// Later declarations of the same name win.
#[must_use]
pub fn env_map(service: &Service) -> BTreeMap<String, String> {
    service
        .spec
        .env
        .iter()
        .map(|var| (var.name.clone(), var.value.clone()))
        .collect()
}

/// Seven-character abbreviated HEAD id of the repository holding `root`, or empty when
/// `git` is unavailable, `root` is not in a repository, or HEAD is unborn.
#[must_use]
pub fn git_short_sha(root: &Path) -> String {
    let Ok(git) = which::which("git") else {
        return String::new();
    };
    Command::new(git)
        .arg("-C")
        .arg(root)
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_default()
}
