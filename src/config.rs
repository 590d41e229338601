use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── Top-level config ──────────────────────────────────────────────

/// Engine configuration.
///
/// Every field has a default so a bare `EngineConfig::default()` (or an empty
/// config document) yields a working engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub session: SessionConfig,
}

// ─── Session lifecycle ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long an idle session lives before the expiry sweep removes it
    /// (default: 24 hours).
    #[serde(default = "default_session_lifetime_secs")]
    pub lifetime_secs: u64,

    /// How often the expiry sweeper runs (default: 5 minutes).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_session_lifetime_secs() -> u64 {
    3600 * 24
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_session_lifetime_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionConfig {
    /// Session lifetime as a chrono duration, for expiry arithmetic.
    pub fn lifetime(&self) -> chrono::Duration {
        let secs = i64::try_from(self.lifetime_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Sweep interval as a std duration, for the timer loop.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.session.lifetime_secs, 86_400);
        assert_eq!(config.session.sweep_interval_secs, 300);
    }

    #[test]
    fn empty_document_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.session.lifetime_secs, 86_400);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"session": {"lifetime_secs": 60}}"#).unwrap();
        assert_eq!(config.session.lifetime_secs, 60);
        assert_eq!(config.session.sweep_interval_secs, 300);
    }

    #[test]
    fn lifetime_converts_to_chrono_duration() {
        let config = SessionConfig {
            lifetime_secs: 90,
            ..SessionConfig::default()
        };
        assert_eq!(config.lifetime(), chrono::Duration::seconds(90));
    }
}
