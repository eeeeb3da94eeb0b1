use thiserror::Error;

mod effective;
mod manifest;
mod names;
mod plan;

pub use effective::{EffectiveConfig, EffectiveProject, EffectiveSecret, EffectiveService, EffectiveStack};
pub use manifest::{
    ArtifactKind, ConfigDecl, CpuMem, DEFAULT_CONFIG_MODE, DEFAULT_GID, DEFAULT_SECRET_MODE,
    DEFAULT_UID, DeploySpec, EnvVar, FileTarget, FileTargetDecl, ImageRef, Instance, Metadata,
    NetworkAttachment, NetworkDef, Placement, Project, ProjectDefaults, ProjectSpec, Resources,
    SECRET_MOUNT_DIR, SecretBackend, SecretDecl, SecretSource, SecretsProviderSpec, Service,
    ServiceRef, ServiceSpec, Stack, StackDefaults, StackRef, StackSpec, StackType, Vars,
};
pub use names::{
    LABEL_FINGERPRINT, LABEL_INSTANCE, LABEL_OWNER, LABEL_PROJECT, LABEL_SERVICE, LABEL_STACK,
    NAME_FINGERPRINT_LEN, NameParts, OWNER_VALUE, content_addressed_name, owner_filter,
    short_fingerprint,
};
pub use plan::{
    ApplyAction, ApplyReport, ApplyStepResult, ConfigPayload, Labels, MountReference,
    NetworkSpec, ObjectKind, OwnedObject, Plan, SecretPayload, ServiceApply, ServiceDeployment,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainValidationError {
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },
    #[error("secret \"{secret}\" must set either template or fromVault")]
    SecretSourceMissing { secret: String },
    #[error("secret \"{secret}\" must not set both template and fromVault")]
    SecretSourceAmbiguous { secret: String },
}
