use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize {document} as JSON")]
    JsonSerialize {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
