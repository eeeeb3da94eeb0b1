use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret path must not be empty")]
    EmptyPath,
    #[error("secret lookup for \"{path}\" requires a secrets provider; set spec.secretsProvider.addr")]
    NotConfigured { path: String },
    #[error("secret session is closed")]
    SessionClosed,
    #[error("no {flavor} address configured; set secretsProvider.addr or {env_key}")]
    MissingAddress { flavor: String, env_key: String },
    #[error("invalid {flavor} address: {addr}")]
    InvalidAddress {
        flavor: String,
        addr: String,
        #[source]
        source: url::ParseError,
    },
    #[error("roleIdPath and wrappedSecretIdPath must be set together")]
    PartialAppRole,
    #[error("failed to read credential file {path}")]
    ReadCredential {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("credential file {path} is empty")]
    EmptyCredential { path: PathBuf },
    #[error("no {flavor} token available; set {env_key} or write ~/.vault-token")]
    MissingToken { flavor: String, env_key: String },
    #[error("{operation} failed")]
    Http {
        operation: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("{operation} returned an unexpected response: {detail}")]
    MalformedResponse { operation: String, detail: String },
    #[error("no data at \"{path}\"")]
    NoData { path: String },
    #[error("field \"{field}\" not found at \"{path}\"")]
    FieldNotFound { path: String, field: String },
    #[error("field \"{field}\" at \"{path}\" is not a string")]
    NonStringField { path: String, field: String },
    #[error("could not choose a field at \"{path}\" (fields: {fields}); append #<field> to the path")]
    AmbiguousField { path: String, fields: String },
}
