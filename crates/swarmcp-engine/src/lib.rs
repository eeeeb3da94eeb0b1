mod apply;
mod context;
mod driver;
mod error;
mod fingerprint;
mod manifest;
mod normalize;
mod pipeline;
mod plan;
mod resolve;
mod template;
#[cfg(test)]
mod test_support;

pub use apply::{ApplyOptions, apply_plan};
pub use context::{TemplateContext, env_map, git_short_sha};
pub use driver::{ClusterDriver, MemoryDriver};
pub use error::{
    DriverError, ManifestLoadError, PipelineError, PlanError, RenderError, ResolveError,
};
pub use fingerprint::{fingerprint, fingerprint_json};
pub use manifest::{PROJECT_FILE, SERVICE_FILE, STACK_FILE, load_project, load_service, load_stack};
pub use normalize::{KeyValue, NormalizedService, normalize};
pub use pipeline::{
    ValidationSummary, build_plan_for_project, plan_project, resolve_project, validate_project,
};
pub use plan::{DEFAULT_NETWORK_DRIVER, plan};
pub use resolve::{Resolution, resolve};
pub use template::{Capability, RenderEngine, secret_path};
