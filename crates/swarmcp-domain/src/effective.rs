use std::collections::BTreeMap;
use std::fmt;

use crate::manifest::{FileTarget, Instance, NetworkDef, ServiceSpec, StackType};

/// Fully merged, rendered and secret-resolved projection of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveProject {
    pub name: String,
    pub stacks: Vec<EffectiveStack>,
}

impl EffectiveProject {
    pub fn services(&self) -> impl Iterator<Item = (&EffectiveStack, &EffectiveService)> {
        self.stacks
            .iter()
            .flat_map(|stack| stack.services.iter().map(move |service| (stack, service)))
    }
}

/// One (stack, instance) pair. `instance` is `None` iff the stack is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveStack {
    pub name: String,
    pub stack_type: StackType,
    pub instance: Option<Instance>,
    /// Project network defaults overlaid with the stack's own.
    pub network_defs: BTreeMap<String, NetworkDef>,
    pub services: Vec<EffectiveService>,
}

impl EffectiveStack {
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        self.instance.as_ref().map(|instance| instance.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveService {
    pub name: String,
    /// Declared spec with network and resource defaults applied.
    pub spec: ServiceSpec,
    pub configs: Vec<EffectiveConfig>,
    pub secrets: Vec<EffectiveSecret>,
    /// Plain environment only; secrets are never exposed as env.
    pub env: BTreeMap<String, String>,
    pub networks: Vec<String>,
}

impl EffectiveService {
    /// `KEY=value` pairs sorted by key.
    #[must_use]
    pub fn env_decl(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub name: String,
    /// `None` for pass-through configs that only materialize a mount.
    pub data: Option<Vec<u8>>,
    pub file: FileTarget,
}

#[derive(Clone, PartialEq, Eq)]
pub struct EffectiveSecret {
    pub name: String,
    pub data: Vec<u8>,
    pub file: FileTarget,
}

impl fmt::Debug for EffectiveSecret {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EffectiveSecret")
            .field("name", &self.name)
            .field("data", &format_args!("<{} bytes redacted>", self.data.len()))
            .field("file", &self.file)
            .finish()
    }
}
