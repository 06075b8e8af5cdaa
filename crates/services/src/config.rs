use std::env;
use std::time::Duration;

use prep_core::unlock::Gating;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_WRITE_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Knobs for talking to the progress service.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub base_url: Url,
    /// Quiet period before completions are pushed to the remote store.
    pub debounce: Duration,
    pub gating: Gating,
    /// Extra attempts after a failed remote write.
    pub write_retries: u32,
    pub retry_backoff: Duration,
}

impl SyncConfig {
    /// Defaults for everything except the service location.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            gating: Gating::Enforced,
            write_retries: DEFAULT_WRITE_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    /// Read the configuration from `PREP_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = non_blank(lookup("PREP_API_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let base_url = Url::parse(raw_url.trim()).map_err(|source| ConfigError::InvalidUrl {
            var: "PREP_API_BASE_URL",
            source,
        })?;
        let mut config = Self::new(base_url);

        if let Some(ms) = parse_number(&lookup, "PREP_SYNC_DEBOUNCE_MS")? {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(raw) = non_blank(lookup("PREP_UNLOCK_ALL")) {
            if matches!(raw.trim(), "1" | "true" | "yes" | "on") {
                config.gating = Gating::Disabled;
            }
        }
        if let Some(retries) = parse_number(&lookup, "PREP_SYNC_WRITE_RETRIES")? {
            config.write_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        }
        if let Some(ms) = parse_number(&lookup, "PREP_SYNC_RETRY_BACKOFF_MS")? {
            config.retry_backoff = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = non_blank(lookup(var)) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { var, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.gating, Gating::Enforced);
        assert_eq!(config.write_retries, 3);
        assert_eq!(config.base_url.as_str(), "http://localhost:5000/");
    }

    #[test]
    fn reads_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("PREP_API_BASE_URL", "https://api.example.com/v2/"),
            ("PREP_SYNC_DEBOUNCE_MS", "50"),
            ("PREP_UNLOCK_ALL", "true"),
            ("PREP_SYNC_WRITE_RETRIES", "0"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.path(), "/v2/");
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.gating, Gating::Disabled);
        assert_eq!(config.write_retries, 0);
    }

    #[test]
    fn rejects_garbage() {
        let err = SyncConfig::from_lookup(lookup(&[("PREP_SYNC_DEBOUNCE_MS", "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { var: "PREP_SYNC_DEBOUNCE_MS", .. }
        ));
        assert!(SyncConfig::from_lookup(lookup(&[("PREP_API_BASE_URL", "not a url")])).is_err());
    }
}
