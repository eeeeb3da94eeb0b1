use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use swarmcp_domain::{
    ConfigPayload, LABEL_FINGERPRINT, Labels, NetworkSpec, ObjectKind, OwnedObject, SecretPayload,
    ServiceApply,
};
use tracing::debug;

use crate::error::DriverError;

/// Create/update/list/delete calls against a swarm orchestrator.
///
/// Configs and secrets are immutable once created: ensuring one only creates
/// it when no object of that name exists.
pub trait ClusterDriver {
    /// # Errors
    ///
    /// Returns an error when a network cannot be created.
    fn ensure_networks(&self, networks: &[NetworkSpec]) -> Result<BTreeMap<String, String>, DriverError>;

    /// # Errors
    ///
    /// Returns an error when a config cannot be created, or a pass-through
    /// config does not exist.
    fn ensure_configs(&self, configs: &[ConfigPayload]) -> Result<BTreeMap<String, String>, DriverError>;

    /// # Errors
    ///
    /// Returns an error when a secret cannot be created.
    fn ensure_secrets(&self, secrets: &[SecretPayload]) -> Result<BTreeMap<String, String>, DriverError>;

    /// Create or update a service; `updated` is false when the existing
    /// service already carries the same fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error when the service cannot be created or updated.
    fn ensure_service(&self, service: &ServiceApply) -> Result<(String, bool), DriverError>;

    /// Every object whose labels include all of `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error when the orchestrator cannot be queried.
    fn list_owned(&self, filter: &Labels) -> Result<Vec<OwnedObject>, DriverError>;

    /// # Errors
    ///
    /// Returns an error when an object cannot be removed.
    fn prune(&self, objects: &[OwnedObject]) -> Result<(), DriverError>;
}

// ---------------------------------------------------------------------------
// In-memory driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredObject {
    id: String,
    labels: Labels,
}

#[derive(Debug, Default)]
struct ClusterState {
    next_id: u64,
    networks: BTreeMap<String, StoredObject>,
    configs: BTreeMap<String, StoredObject>,
    secrets: BTreeMap<String, StoredObject>,
    services: BTreeMap<String, StoredObject>,
}

impl ClusterState {
    fn mint_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:012x}", self.next_id)
    }

    fn objects_mut(&mut self, kind: ObjectKind) -> &mut BTreeMap<String, StoredObject> {
        match kind {
            ObjectKind::Network => &mut self.networks,
            ObjectKind::Config => &mut self.configs,
            ObjectKind::Secret => &mut self.secrets,
            ObjectKind::Service => &mut self.services,
        }
    }

    fn insert_if_absent(&mut self, kind: ObjectKind, name: &str, labels: &Labels) -> String {
        if let Some(existing) = self.objects_mut(kind).get(name) {
            return existing.id.clone();
        }
        let id = self.mint_id();
        debug!(%kind, name, id = %id, "created object");
        self.objects_mut(kind).insert(
            name.to_string(),
            StoredObject {
                id: id.clone(),
                labels: labels.clone(),
            },
        );
        id
    }
}

/// Cluster driver holding all state in memory; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    state: Mutex<ClusterState>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a config managed outside this tool, as pass-through configs expect.
    #[must_use]
    pub fn with_external_config(self, name: &str) -> Self {
        self.lock()
            .insert_if_absent(ObjectKind::Config, name, &Labels::new());
        self
    }

    /// Every object in the cluster, ordered by kind then name.
    #[must_use]
    pub fn objects(&self) -> Vec<OwnedObject> {
        let state = self.lock();
        [
            (ObjectKind::Network, &state.networks),
            (ObjectKind::Config, &state.configs),
            (ObjectKind::Secret, &state.secrets),
            (ObjectKind::Service, &state.services),
        ]
        .into_iter()
        .flat_map(|(kind, objects)| {
            objects.iter().map(move |(name, object)| OwnedObject {
                id: object.id.clone(),
                name: name.clone(),
                kind,
                labels: object.labels.clone(),
            })
        })
        .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClusterDriver for MemoryDriver {
    fn ensure_networks(&self, networks: &[NetworkSpec]) -> Result<BTreeMap<String, String>, DriverError> {
        let mut state = self.lock();
        Ok(networks
            .iter()
            .map(|network| {
                let id = state.insert_if_absent(ObjectKind::Network, &network.name, &network.labels);
                (network.name.clone(), id)
            })
            .collect())
    }

    fn ensure_configs(&self, configs: &[ConfigPayload]) -> Result<BTreeMap<String, String>, DriverError> {
        let mut state = self.lock();
        let mut ids = BTreeMap::new();
        for config in configs {
            let id = if config.data.is_some() {
                state.insert_if_absent(ObjectKind::Config, &config.name, &config.labels)
            } else {
                state
                    .configs
                    .get(&config.name)
                    .map(|existing| existing.id.clone())
                    .ok_or_else(|| DriverError::MissingPassThroughConfig {
                        name: config.name.clone(),
                    })?
            };
            ids.insert(config.name.clone(), id);
        }
        Ok(ids)
    }

    fn ensure_secrets(&self, secrets: &[SecretPayload]) -> Result<BTreeMap<String, String>, DriverError> {
        let mut state = self.lock();
        Ok(secrets
            .iter()
            .map(|secret| {
                let id = state.insert_if_absent(ObjectKind::Secret, &secret.name, &secret.labels);
                (secret.name.clone(), id)
            })
            .collect())
    }

    fn ensure_service(&self, service: &ServiceApply) -> Result<(String, bool), DriverError> {
        let mut state = self.lock();

        let missing_config = service
            .spec
            .configs
            .iter()
            .find(|mount| !state.configs.contains_key(&mount.source));
        let missing_secret = service
            .spec
            .secrets
            .iter()
            .find(|mount| !state.secrets.contains_key(&mount.source));
        if let Some(mount) = missing_config.or(missing_secret) {
            return Err(DriverError::Backend {
                kind: "service",
                name: service.name.clone(),
                message: format!("mount source \"{}\" not found", mount.source),
            });
        }

        let fingerprint = service.labels.get(LABEL_FINGERPRINT);
        if let Some(existing) = state.services.get_mut(&service.name) {
            if existing.labels.get(LABEL_FINGERPRINT) == fingerprint {
                return Ok((existing.id.clone(), false));
            }
            existing.labels.clone_from(&service.labels);
            debug!(name = %service.name, id = %existing.id, "updated service");
            return Ok((existing.id.clone(), true));
        }
        let id = state.insert_if_absent(ObjectKind::Service, &service.name, &service.labels);
        Ok((id, true))
    }

    fn list_owned(&self, filter: &Labels) -> Result<Vec<OwnedObject>, DriverError> {
        Ok(self
            .objects()
            .into_iter()
            .filter(|object| {
                filter
                    .iter()
                    .all(|(key, value)| object.labels.get(key) == Some(value))
            })
            .collect())
    }

    fn prune(&self, objects: &[OwnedObject]) -> Result<(), DriverError> {
        let mut state = self.lock();
        for object in objects {
            if state.objects_mut(object.kind).remove(&object.name).is_some() {
                debug!(kind = %object.kind, name = %object.name, "removed object");
            }
        }
        Ok(())
    }
}
