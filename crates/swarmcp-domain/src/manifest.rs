use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::DomainValidationError;

pub type Vars = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: ProjectSpec,
    /// Absolute directory holding `project.yaml`; set by the loader.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Project {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    #[serde(default)]
    pub defaults: ProjectDefaults,
    #[serde(default)]
    pub vars: Vars,
    #[serde(default, alias = "secretsprovider")]
    pub secrets_provider: SecretsProviderSpec,
    #[serde(default)]
    pub stacks: Vec<StackRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDefaults {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDef>,
    #[serde(default)]
    pub resources: Resources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub stack_type: Option<StackType>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackType {
    #[default]
    #[serde(alias = "Exclusive")]
    Exclusive,
    #[serde(alias = "Shared")]
    Shared,
}

impl fmt::Display for StackType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclusive => formatter.write_str("exclusive"),
            Self::Shared => formatter.write_str("shared"),
        }
    }
}

/// Which secret-store flavour a session speaks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Pick from `BAO_ADDR` / `VAULT_ADDR` at session construction.
    #[default]
    Auto,
    #[serde(alias = "openbao")]
    Bao,
    Vault,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsProviderSpec {
    #[serde(default)]
    pub backend: SecretBackend,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub role_id_path: Option<PathBuf>,
    #[serde(default)]
    pub wrapped_secret_id_path: Option<PathBuf>,
}

impl SecretsProviderSpec {
    /// A project opts into secret-store lookups by naming an address or an
    /// explicit backend (whose address then comes from the environment).
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.addr.trim().is_empty() || self.backend != SecretBackend::Auto
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: StackSpec,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Stack {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSpec {
    #[serde(default, rename = "type")]
    pub stack_type: Option<StackType>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub defaults: StackDefaults,
    #[serde(default)]
    pub services: Vec<ServiceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vars: Vars,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefaults {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDef {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: ServiceSpec,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Service {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub image: ImageRef,
    #[serde(default)]
    pub deploy: DeploySpec,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub configs: Vec<ConfigDecl>,
    #[serde(default)]
    pub secrets: Vec<SecretDecl>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub tag: String,
}

impl fmt::Display for ImageRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.repo, self.tag)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySpec {
    #[serde(default)]
    pub replicas: u64,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub resources: Resources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub reservations: CpuMem,
    #[serde(default)]
    pub limits: CpuMem,
}

impl Resources {
    /// Per-field overlay: a value set here wins, otherwise `fallback` applies.
    #[must_use]
    pub fn or(&self, fallback: &Self) -> Self {
        Self {
            reservations: self.reservations.or(&fallback.reservations),
            limits: self.limits.or(&fallback.limits),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl CpuMem {
    #[must_use]
    pub fn or(&self, fallback: &Self) -> Self {
        Self {
            cpus: non_blank(self.cpus.as_ref()).or_else(|| non_blank(fallback.cpus.as_ref())),
            memory: non_blank(self.memory.as_ref())
                .or_else(|| non_blank(fallback.memory.as_ref())),
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty()).cloned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDecl {
    pub name: String,
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub file: Option<FileTargetDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDecl {
    pub name: String,
    #[serde(default)]
    pub from_vault: Option<String>,
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub file: Option<FileTargetDecl>,
}

/// Where a declared secret's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource<'a> {
    Template(&'a std::path::Path),
    External(&'a str),
}

impl SecretDecl {
    /// Classify the declaration; exactly one source must be present.
    ///
    /// # Errors
    ///
    /// Returns an error naming the secret when neither or both of
    /// `template` and `fromVault` are set.
    pub fn source(&self) -> Result<SecretSource<'_>, DomainValidationError> {
        let template = self
            .template
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty());
        let external = self
            .from_vault
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty());

        match (template, external) {
            (Some(template), None) => Ok(SecretSource::Template(template)),
            (None, Some(path)) => Ok(SecretSource::External(path)),
            (None, None) => Err(DomainValidationError::SecretSourceMissing {
                secret: self.name.clone(),
            }),
            (Some(_), Some(_)) => Err(DomainValidationError::SecretSourceAmbiguous {
                secret: self.name.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// File targets
// ---------------------------------------------------------------------------

pub const DEFAULT_UID: &str = "0";
pub const DEFAULT_GID: &str = "0";
pub const DEFAULT_CONFIG_MODE: u32 = 0o444;
pub const DEFAULT_SECRET_MODE: u32 = 0o400;
pub const SECRET_MOUNT_DIR: &str = "/run/secrets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Config,
    Secret,
}

impl ArtifactKind {
    #[must_use]
    pub const fn default_mode(self) -> u32 {
        match self {
            Self::Config => DEFAULT_CONFIG_MODE,
            Self::Secret => DEFAULT_SECRET_MODE,
        }
    }

    #[must_use]
    pub fn default_target(self, name: &str) -> String {
        match self {
            Self::Config => format!("/{name}"),
            Self::Secret => format!("{SECRET_MOUNT_DIR}/{name}"),
        }
    }
}

/// File target as written in a manifest; every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTargetDecl {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
}

/// Fully defaulted file target carried by effective configs and secrets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileTarget {
    pub target: String,
    pub uid: String,
    pub gid: String,
    pub mode: u32,
}

impl FileTarget {
    #[must_use]
    pub fn defaults(name: &str, kind: ArtifactKind) -> Self {
        Self {
            target: kind.default_target(name),
            uid: DEFAULT_UID.to_string(),
            gid: DEFAULT_GID.to_string(),
            mode: kind.default_mode(),
        }
    }

    /// Apply each declared field over the kind's defaults independently.
    #[must_use]
    pub fn resolve(name: &str, declared: Option<&FileTargetDecl>, kind: ArtifactKind) -> Self {
        let mut out = Self::defaults(name, kind);
        let Some(declared) = declared else {
            return out;
        };
        if let Some(target) = non_blank(declared.target.as_ref()) {
            out.target = target;
        }
        if let Some(uid) = non_blank(declared.uid.as_ref()) {
            out.uid = uid;
        }
        if let Some(gid) = non_blank(declared.gid.as_ref()) {
            out.gid = gid;
        }
        if let Some(mode) = declared.mode {
            out.mode = mode;
        }
        out
    }
}

/// Modes are accepted as integers or as octal strings (`"0440"`, `"0o440"`).
fn deserialize_mode<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMode {
        Number(u32),
        Text(String),
    }

    let Some(raw) = Option::<RawMode>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match raw {
        RawMode::Number(mode) => Ok(Some(mode)),
        RawMode::Text(text) => {
            let trimmed = text.trim();
            let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
            u32::from_str_radix(digits, 8)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid octal file mode \"{text}\"")))
        }
    }
}
