use std::collections::BTreeSet;

const REDACTED: &str = "[REDACTED]";

/// Values shorter than this are left alone; masking them would shred
/// unrelated output.
const MIN_REDACTED_LEN: usize = 3;

/// Replace every occurrence of a resolved secret value, longest first so a
/// value containing another is masked whole.
#[must_use]
pub fn redact_sensitive(text: &str, sensitive_values: &BTreeSet<String>) -> String {
    let mut values: Vec<&str> = sensitive_values
        .iter()
        .map(String::as_str)
        .filter(|value| value.trim().len() >= MIN_REDACTED_LEN)
        .collect();
    values.sort_by_key(|value| std::cmp::Reverse(value.len()));

    values
        .into_iter()
        .fold(text.to_string(), |redacted, value| redacted.replace(value, REDACTED))
}
