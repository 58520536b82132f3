//! Runtime options for the cache codec

use std::env;

use log::warn;

use super::{FORMAT_VERSION, GUARDED_VARIANT};

/// Environment variable enabling guard words around every string
pub const GUARDS_ENV: &str = "LEDGER_CACHE_GUARDS";
/// Environment variable making unreadable source files count as unchanged
pub const TRUST_MISSING_ENV: &str = "LEDGER_CACHE_TRUST_MISSING";

/// Options shared by the cache writer and reader
///
/// Images written with guards enabled carry a distinct version stamp, so a
/// reader configured the other way sees them as a different format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Bracket every string with guard words
    pub guards: bool,
    /// Treat a source file that cannot be stat'ed as changed
    pub missing_source_is_stale: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { guards: false, missing_source_is_stale: true }
    }
}

impl CodecConfig {
    /// Configuration for the guarded image variant
    pub fn verified() -> Self {
        Self { guards: true, ..Self::default() }
    }

    /// Enable or disable guard words
    pub fn with_guards(mut self, guards: bool) -> Self {
        self.guards = guards;
        self
    }

    /// Choose how unreadable source files are judged
    pub fn with_missing_source_is_stale(mut self, stale: bool) -> Self {
        self.missing_source_is_stale = stale;
        self
    }

    /// Build a configuration from `LEDGER_CACHE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(guards) = lookup(GUARDS_ENV).and_then(|v| parse_flag(GUARDS_ENV, &v)) {
            config.guards = guards;
        }
        let trust = lookup(TRUST_MISSING_ENV).and_then(|v| parse_flag(TRUST_MISSING_ENV, &v));
        if let Some(trust) = trust {
            config.missing_source_is_stale = !trust;
        }
        config
    }

    /// Version stamp written to and expected from images
    pub fn format_version(&self) -> u32 {
        if self.guards {
            FORMAT_VERSION | GUARDED_VARIANT
        } else {
            FORMAT_VERSION
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("Ignoring {key}={other:?}: expected a boolean");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = CodecConfig::from_lookup(lookup(&[]));
        assert_eq!(config, CodecConfig::default());
        assert!(config.missing_source_is_stale);
        assert_eq!(config.format_version(), FORMAT_VERSION);
    }

    #[test]
    fn test_environment_overrides() {
        let config = CodecConfig::from_lookup(lookup(&[(GUARDS_ENV, "yes"), (TRUST_MISSING_ENV, "1")]));
        assert!(config.guards);
        assert!(!config.missing_source_is_stale);
        assert_eq!(config.format_version(), FORMAT_VERSION | GUARDED_VARIANT);
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = CodecConfig::from_lookup(lookup(&[(GUARDS_ENV, "maybe")]));
        assert!(!config.guards);
    }
}
