//! Engine configuration types.
//!
//! `EngineConfig` represents the `forge.toml` document that tunes
//! compensation behaviour, cancellation handling and recovery backoff.

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryPolicy;

/// Top-level configuration for a Smith and its recovery driver.
///
/// All fields have defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stop compensating at the first restore failure.
    #[serde(default)]
    pub fail_fast_compensation: bool,

    /// Surface compensation failures together with the original error.
    #[serde(default)]
    pub throw_on_compensation_error: bool,

    /// Run compensation when a run fails because it was cancelled.
    #[serde(default = "default_compensate_on_cancel")]
    pub compensate_on_cancel: bool,

    /// Per-operation timeout applied by `TimeoutMiddleware`, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,

    /// Retry policy used by the recovery driver.
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

fn default_compensate_on_cancel() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_fast_compensation: false,
            throw_on_compensation_error: false,
            compensate_on_cancel: default_compensate_on_cancel(),
            operation_timeout_ms: None,
            recovery: RecoveryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert!(!config.fail_fast_compensation);
        assert!(!config.throw_on_compensation_error);
        assert!(config.compensate_on_cancel);
        assert!(config.operation_timeout_ms.is_none());
        assert_eq!(config.recovery, RecoveryPolicy::default());
    }

    #[test]
    fn test_engine_config_deserialize_empty() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
fail_fast_compensation = true
throw_on_compensation_error = true
compensate_on_cancel = false
operation_timeout_ms = 1500

[recovery]
max_attempts = 5
base_delay_ms = 50
max_delay_ms = 400
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert!(config.fail_fast_compensation);
        assert!(config.throw_on_compensation_error);
        assert!(!config.compensate_on_cancel);
        assert_eq!(config.operation_timeout_ms, Some(1500));
        assert_eq!(config.recovery.max_attempts, 5);
        assert_eq!(config.recovery.base_delay_ms, 50);
        assert!(config.recovery.exponential);
        assert_eq!(config.recovery.max_delay_ms, Some(400));
    }
}
