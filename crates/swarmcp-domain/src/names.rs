use crate::plan::Labels;

pub const LABEL_OWNER: &str = "swarmcp.owner";
pub const LABEL_PROJECT: &str = "swarmcp.project";
pub const LABEL_STACK: &str = "swarmcp.stack";
pub const LABEL_INSTANCE: &str = "swarmcp.instance";
pub const LABEL_SERVICE: &str = "swarmcp.service";
pub const LABEL_FINGERPRINT: &str = "swarmcp.fingerprint";
pub const OWNER_VALUE: &str = "swarmcp";

/// Length of the fingerprint prefix used in content-addressed object names.
pub const NAME_FINGERPRINT_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameParts<'a> {
    pub project: &'a str,
    pub stack: &'a str,
    /// `None` for shared stacks.
    pub instance: Option<&'a str>,
    pub service: &'a str,
}

impl NameParts<'_> {
    /// `proj.<p>.stack.<s>[.inst.<i>].svc.<svc>`
    #[must_use]
    pub fn service_name(&self) -> String {
        let mut name = format!("proj.{}.stack.{}", self.project, self.stack);
        if let Some(instance) = self.instance.filter(|instance| !instance.is_empty()) {
            name.push_str(".inst.");
            name.push_str(instance);
        }
        name.push_str(".svc.");
        name.push_str(self.service);
        name
    }

    /// Ownership labels shared by every object this service owns.
    #[must_use]
    pub fn object_labels(&self, fingerprint: &str) -> Labels {
        let mut labels = owner_filter(self.project);
        labels.insert(LABEL_STACK.to_string(), self.stack.to_string());
        labels.insert(LABEL_SERVICE.to_string(), self.service.to_string());
        if let Some(instance) = self.instance.filter(|instance| !instance.is_empty()) {
            labels.insert(LABEL_INSTANCE.to_string(), instance.to_string());
        }
        if !fingerprint.is_empty() {
            labels.insert(LABEL_FINGERPRINT.to_string(), fingerprint.to_string());
        }
        labels
    }
}

/// Label filter selecting every object owned by `project`.
#[must_use]
pub fn owner_filter(project: &str) -> Labels {
    Labels::from([
        (LABEL_OWNER.to_string(), OWNER_VALUE.to_string()),
        (LABEL_PROJECT.to_string(), project.to_string()),
    ])
}

/// Immutable objects get a new name whenever their content changes.
#[must_use]
pub fn content_addressed_name(name: &str, fingerprint: &str) -> String {
    let end = fingerprint.len().min(NAME_FINGERPRINT_LEN);
    format!("{name}-{}", &fingerprint[..end])
}

#[must_use]
pub fn short_fingerprint(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(NAME_FINGERPRINT_LEN)]
}
