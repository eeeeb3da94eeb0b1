//! Secret-store sessions for Vault-compatible servers (HashiCorp Vault and
//! OpenBao) plus the lookup interface the resolver consumes.

use std::path::Path;

use swarmcp_domain::SecretsProviderSpec;

mod error;
mod path;
mod session;
mod settings;

pub use error::SecretStoreError;
pub use path::{SecretPath, pick_field};
pub use session::{SecretSession, SessionHealth};
pub use settings::{
    Credentials, DEFAULT_TIMEOUT, Environment, Flavor, ProcessEnvironment, SessionSettings,
};

/// Resolves `<logical-path>[#<field>]` to raw secret bytes.
pub trait SecretResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the path is empty, the lookup fails, or the
    /// field cannot be selected.
    fn resolve_secret(&self, path: &str) -> Result<Vec<u8>, SecretStoreError>;
}

/// Stand-in for projects without a secrets provider; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl SecretResolver for Unconfigured {
    fn resolve_secret(&self, path: &str) -> Result<Vec<u8>, SecretStoreError> {
        Err(SecretStoreError::NotConfigured {
            path: path.to_string(),
        })
    }
}

/// A provider chosen for one resolve call.
pub enum Provider {
    Session(SecretSession),
    Unconfigured(Unconfigured),
}

impl Provider {
    /// Release the underlying session, if any.
    pub fn close(&self) {
        if let Self::Session(session) = self {
            session.close();
        }
    }
}

impl SecretResolver for Provider {
    fn resolve_secret(&self, path: &str) -> Result<Vec<u8>, SecretStoreError> {
        match self {
            Self::Session(session) => session.resolve_secret(path),
            Self::Unconfigured(unconfigured) => unconfigured.resolve_secret(path),
        }
    }
}

/// Open a session when the project names a provider address.
///
/// # Errors
///
/// Returns an error when settings cannot be resolved or authentication
/// fails.
pub fn open_provider(
    spec: &SecretsProviderSpec,
    project_root: &Path,
) -> Result<Provider, SecretStoreError> {
    if !spec.is_configured() {
        return Ok(Provider::Unconfigured(Unconfigured));
    }
    let settings = SessionSettings::from_spec(spec, project_root, &ProcessEnvironment)?;
    SecretSession::open(&settings).map(Provider::Session)
}
