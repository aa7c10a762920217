//! Konform Engine: Configuration
//!
//! All timeouts from the resource model, overridable via environment.

use std::time::Duration;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whole-scan budget
    pub scan_timeout: Duration,
    /// Per-check deadline inside the fan-out
    pub check_timeout: Duration,
    /// Per-fix generation deadline
    pub fix_timeout: Duration,
    /// In-flight scans allowed per user before `busy`
    pub max_inflight_scans_per_user: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(60),
            check_timeout: Duration::from_secs(20),
            fix_timeout: Duration::from_secs(45),
            max_inflight_scans_per_user: 2,
        }
    }
}

impl EngineConfig {
    /// Overrides from `KONFORM_*` environment variables (seconds).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let secs = |key: &str| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
        };
        if let Some(value) = secs("KONFORM_SCAN_TIMEOUT_SECS") {
            config.scan_timeout = value;
        }
        if let Some(value) = secs("KONFORM_CHECK_TIMEOUT_SECS") {
            config.check_timeout = value;
        }
        if let Some(value) = secs("KONFORM_FIX_TIMEOUT_SECS") {
            config.fix_timeout = value;
        }
        if let Some(value) = std::env::var("KONFORM_MAX_INFLIGHT_SCANS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.max_inflight_scans_per_user = value.max(1);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_resource_model() {
        let config = EngineConfig::default();
        assert_eq!(config.scan_timeout, Duration::from_secs(60));
        assert_eq!(config.check_timeout, Duration::from_secs(20));
        assert_eq!(config.fix_timeout, Duration::from_secs(45));
        assert_eq!(config.max_inflight_scans_per_user, 2);
    }
}
