use std::io;
use std::path::PathBuf;

use swarmcp_domain::DomainValidationError;
use swarmcp_secrets::SecretStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestLoadError {
    #[error("failed to read manifest: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path}: expected kind {expected}, found \"{found}\"")]
    WrongKind {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },
    #[error("{path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: DomainValidationError,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read template {path}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse template {name}: {detail}")]
    Parse {
        name: String,
        detail: String,
        #[source]
        source: tera::Error,
    },
    #[error("failed to render template {name}: {detail}")]
    Render {
        name: String,
        detail: String,
        #[source]
        source: tera::Error,
    },
    #[error("failed to build template context")]
    Context {
        #[source]
        source: tera::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("stack \"{stack}\": {source}")]
    LoadStack {
        stack: String,
        #[source]
        source: ManifestLoadError,
    },
    #[error("stack \"{stack}\" service \"{service}\": {source}")]
    LoadService {
        stack: String,
        service: String,
        #[source]
        source: ManifestLoadError,
    },
    #[error("stack \"{stack}\" is declared more than once")]
    DuplicateStack { stack: String },
    #[error("stack \"{stack}\": {kind} \"{name}\" is declared more than once")]
    Duplicate {
        stack: String,
        kind: &'static str,
        name: String,
    },
    #[error("stack \"{stack}\": instances of an exclusive stack must be named")]
    UnnamedInstance { stack: String },
    #[error("stack \"{stack}\" service \"{service}\": {source}")]
    Validation {
        stack: String,
        service: String,
        #[source]
        source: DomainValidationError,
    },
    #[error("stack \"{stack}\" service \"{service}\": {source}")]
    Context {
        stack: String,
        service: String,
        #[source]
        source: RenderError,
    },
    #[error("stack \"{stack}\" service \"{service}\" secret \"{secret}\": {source}")]
    RenderSecret {
        stack: String,
        service: String,
        secret: String,
        #[source]
        source: RenderError,
    },
    #[error("stack \"{stack}\" service \"{service}\" config \"{config}\": {source}")]
    RenderConfig {
        stack: String,
        service: String,
        config: String,
        #[source]
        source: RenderError,
    },
    #[error("stack \"{stack}\" service \"{service}\" secret \"{secret}\" ({path}): {source}")]
    SecretLookup {
        stack: String,
        service: String,
        secret: String,
        path: String,
        #[source]
        source: SecretStoreError,
    },
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to fingerprint service {service}")]
    Fingerprint {
        service: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("config \"{name}\" has no data and does not exist in the cluster")]
    MissingPassThroughConfig { name: String },
    #[error("{kind} \"{name}\": {message}")]
    Backend {
        kind: &'static str,
        name: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] ManifestLoadError),
    #[error("failed to open secret store session: {source}")]
    SecretStore {
        #[from]
        source: SecretStoreError,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}
