use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use swarmcp_domain::{SecretBackend, SecretsProviderSpec};
use url::Url;

use crate::error::SecretStoreError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_FILE: &str = ".vault-token";

/// Secret-store flavour; both speak the same HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Vault,
    OpenBao,
}

impl Flavor {
    /// `auto` prefers `BAO_ADDR`, then `VAULT_ADDR`, then OpenBao.
    #[must_use]
    pub fn select(backend: SecretBackend, env: &dyn Environment) -> Self {
        match backend {
            SecretBackend::Vault => Self::Vault,
            SecretBackend::Bao => Self::OpenBao,
            SecretBackend::Auto => {
                if env.var("BAO_ADDR").is_some() {
                    Self::OpenBao
                } else if env.var("VAULT_ADDR").is_some() {
                    Self::Vault
                } else {
                    Self::OpenBao
                }
            }
        }
    }

    #[must_use]
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Vault => "VAULT",
            Self::OpenBao => "BAO",
        }
    }

    fn env_key(self, suffix: &str) -> String {
        format!("{}_{suffix}", self.env_prefix())
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vault => formatter.write_str("vault"),
            Self::OpenBao => formatter.write_str("openbao"),
        }
    }
}

/// Process environment lookups, injectable for tests.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
    fn home_dir(&self) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    AppRole {
        role_id: String,
        wrapping_token: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => formatter.write_str("Token(<redacted>)"),
            Self::AppRole { role_id, .. } => formatter
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("wrapping_token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub flavor: Flavor,
    pub addr: Url,
    pub namespace: Option<String>,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl SessionSettings {
    /// Resolve connection settings from the manifest block and environment.
    /// Relative credential paths are taken relative to `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error when no address is available, the address does not
    /// parse, only one AppRole path is set, a credential file cannot be
    /// read, or no token can be found.
    pub fn from_spec(
        spec: &SecretsProviderSpec,
        base_dir: &Path,
        env: &dyn Environment,
    ) -> Result<Self, SecretStoreError> {
        let flavor = Flavor::select(spec.backend, env);
        let addr_key = flavor.env_key("ADDR");
        let raw_addr = Some(spec.addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .or_else(|| env.var(&addr_key))
            .ok_or_else(|| SecretStoreError::MissingAddress {
                flavor: flavor.to_string(),
                env_key: addr_key.clone(),
            })?;
        let addr = Url::parse(&raw_addr).map_err(|source| SecretStoreError::InvalidAddress {
            flavor: flavor.to_string(),
            addr: raw_addr.clone(),
            source,
        })?;

        let namespace = Some(spec.namespace.trim().to_string())
            .filter(|namespace| !namespace.is_empty())
            .or_else(|| env.var(&flavor.env_key("NAMESPACE")));

        let credentials = match (&spec.role_id_path, &spec.wrapped_secret_id_path) {
            (Some(role_id_path), Some(wrapped_path)) => Credentials::AppRole {
                role_id: read_credential(&base_dir.join(role_id_path))?,
                wrapping_token: read_credential(&base_dir.join(wrapped_path))?,
            },
            (None, None) => Credentials::Token(token_from_env(flavor, env)?),
            _ => return Err(SecretStoreError::PartialAppRole),
        };

        Ok(Self {
            flavor,
            addr,
            namespace,
            credentials,
            timeout: DEFAULT_TIMEOUT,
        })
    }
}

fn token_from_env(flavor: Flavor, env: &dyn Environment) -> Result<String, SecretStoreError> {
    let token_key = flavor.env_key("TOKEN");
    if let Some(token) = env.var(&token_key) {
        return Ok(token.trim().to_string());
    }
    let token_file = env
        .home_dir()
        .map(|home| home.join(TOKEN_FILE))
        .filter(|path| path.is_file());
    if let Some(path) = token_file {
        return read_credential(&path);
    }
    Err(SecretStoreError::MissingToken {
        flavor: flavor.to_string(),
        env_key: token_key,
    })
}

fn read_credential(path: &Path) -> Result<String, SecretStoreError> {
    let contents = fs::read_to_string(path).map_err(|source| SecretStoreError::ReadCredential {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(SecretStoreError::EmptyCredential {
            path: path.to_path_buf(),
        });
    }
    Ok(trimmed.to_string())
}
