use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manifest::Resources;

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub internal: bool,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    /// Cluster object name; content-addressed unless `data` is `None`.
    pub name: String,
    pub declared_name: String,
    /// `None` refers to an externally managed config of the same name.
    #[serde(with = "base64_bytes")]
    pub data: Option<Vec<u8>>,
    pub labels: Labels,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPayload {
    pub name: String,
    pub declared_name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub labels: Labels,
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SecretPayload")
            .field("name", &self.name)
            .field("declared_name", &self.declared_name)
            .field("data", &format_args!("<{} bytes redacted>", self.data.len()))
            .field("labels", &self.labels)
            .finish()
    }
}

/// A config or secret attached to a service as a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountReference {
    /// Cluster object the mount reads from.
    pub source: String,
    pub target: String,
    pub uid: String,
    pub gid: String,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeployment {
    pub image: String,
    pub replicas: u64,
    pub env: Vec<String>,
    pub networks: Vec<String>,
    pub constraints: Vec<String>,
    pub resources: Resources,
    pub labels: Labels,
    pub configs: Vec<MountReference>,
    pub secrets: Vec<MountReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceApply {
    pub name: String,
    pub labels: Labels,
    pub spec: ServiceDeployment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub networks: Vec<NetworkSpec>,
    pub configs: Vec<ConfigPayload>,
    pub secrets: Vec<SecretPayload>,
    pub services: Vec<ServiceApply>,
    pub summary: Vec<String>,
}

impl Plan {
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.networks.len() + self.configs.len() + self.secrets.len() + self.services.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Network,
    Config,
    Secret,
    Service,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network",
            Self::Config => "config",
            Self::Secret => "secret",
            Self::Service => "service",
        };
        formatter.write_str(label)
    }
}

/// A cluster object carrying this tool's ownership labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedObject {
    pub id: String,
    pub name: String,
    pub kind: ObjectKind,
    pub labels: Labels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Ensure,
    Create,
    Update,
    Prune,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStepResult {
    pub kind: ObjectKind,
    pub name: String,
    pub action: ApplyAction,
    pub id: Option<String>,
    pub success: bool,
    pub changed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub plan: Plan,
    pub results: Vec<ApplyStepResult>,
    pub errors: Vec<String>,
}

impl ApplyReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty() || self.results.iter().any(|result| !result.success)
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
