//! Engine configuration.
//!
//! Reads:
//! - `APPRAISAL_WEIGHT_POLICY` (optional, `strict` | `lenient`, default: `strict`)
//! - `APPRAISAL_PAGE_SIZE` (optional, default: 10, capped at 100)

use crate::domain::WeightPolicy;

/// Listing page size when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page a listing returns
pub const MAX_PAGE_SIZE: u32 = 100;

/// Invalid configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Tunables of the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub weight_policy: WeightPolicy,
    pub page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weight_policy: WeightPolicy::Strict,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn with_weight_policy(mut self, policy: WeightPolicy) -> Self {
        self.weight_policy = policy;
        self
    }

    /// Set the default page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Create from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("APPRAISAL_WEIGHT_POLICY") {
            let policy = raw.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "APPRAISAL_WEIGHT_POLICY",
                value: raw.clone(),
                reason,
            })?;
            config = config.with_weight_policy(policy);
        }

        if let Some(raw) = lookup("APPRAISAL_PAGE_SIZE") {
            let size: u32 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    var: "APPRAISAL_PAGE_SIZE",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config = config.with_page_size(size);
        }

        Ok(config)
    }
}
