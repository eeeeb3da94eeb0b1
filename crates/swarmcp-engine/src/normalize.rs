use serde::Serialize;
use swarmcp_domain::{CpuMem, ServiceSpec};

/// Order-independent projection of a service spec, used only for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedService {
    pub image: String,
    pub replicas: u64,
    pub networks: Vec<String>,
    pub env: Vec<KeyValue>,
    pub labels: Vec<KeyValue>,
    pub configs: Vec<String>,
    pub secrets: Vec<String>,
    pub constraints: Vec<String>,
    pub limits: CpuMem,
    pub reservations: CpuMem,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Sort every name-keyed collection; scalars and constraints copy verbatim.
#[must_use]
pub fn normalize(spec: &ServiceSpec) -> NormalizedService {
    let mut networks: Vec<String> = spec.networks.iter().map(|network| network.name.clone()).collect();
    networks.sort();

    let mut env: Vec<KeyValue> = spec
        .env
        .iter()
        .map(|var| KeyValue {
            key: var.name.clone(),
            value: var.value.clone(),
        })
        .collect();
    env.sort();

    // BTreeMap iteration is already sorted by key.
    let labels = spec
        .labels
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();

    let mut configs: Vec<String> = spec.configs.iter().map(|config| config.name.clone()).collect();
    configs.sort();
    let mut secrets: Vec<String> = spec.secrets.iter().map(|secret| secret.name.clone()).collect();
    secrets.sort();

    NormalizedService {
        image: spec.image.to_string(),
        replicas: spec.deploy.replicas,
        networks,
        env,
        labels,
        configs,
        secrets,
        constraints: spec.deploy.placement.constraints.clone(),
        limits: spec.deploy.resources.limits.clone(),
        reservations: spec.deploy.resources.reservations.clone(),
    }
}
