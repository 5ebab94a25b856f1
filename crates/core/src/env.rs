//! Environment snapshot -- the process environment read once at startup.
//!
//! Everything downstream (credential gate, secret substitution, config
//! overrides) reads from an [`EnvSnapshot`] instead of `std::env`, so a run's
//! inputs are explicit and tests never have to mutate the real environment.

use std::collections::BTreeMap;

/// Immutable view of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are dropped.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy with one variable set.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Raw lookup. Empty values are returned as-is.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Lookup that treats an empty value as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Parse a boolean flag such as `CI=true`.
    ///
    /// Returns `None` when the variable is unset or not a recognised boolean.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_flag)
    }

    /// Number of captured variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Parse the boolean spellings used by CI systems and shell scripts.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_value_counts_as_unset_for_non_empty_lookup() {
        let env = EnvSnapshot::from_pairs([("API_KEY", ""), ("SITE", "https://x")]);
        assert_eq!(env.get("API_KEY"), Some(""));
        assert_eq!(env.get_non_empty("API_KEY"), None);
        assert_eq!(env.get_non_empty("SITE"), Some("https://x"));
        assert_eq!(env.get_non_empty("MISSING"), None);
    }

    #[test]
    fn flag_accepts_common_spellings() {
        let env = EnvSnapshot::default()
            .with("A", "true")
            .with("B", "1")
            .with("C", "FALSE")
            .with("D", "maybe");
        assert_eq!(env.flag("A"), Some(true));
        assert_eq!(env.flag("B"), Some(true));
        assert_eq!(env.flag("C"), Some(false));
        assert_eq!(env.flag("D"), None);
        assert_eq!(env.flag("E"), None);
    }

    #[test]
    fn capture_sees_process_environment() {
        let env = EnvSnapshot::capture();
        assert!(!env.is_empty());
    }
}
