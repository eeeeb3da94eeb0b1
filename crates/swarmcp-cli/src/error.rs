use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),
    #[error(transparent)]
    Load(#[from] swarmcp_engine::ManifestLoadError),
    #[error(transparent)]
    Pipeline(#[from] swarmcp_engine::PipelineError),
    #[error(transparent)]
    Report(#[from] swarmcp_report::ReportError),
}
