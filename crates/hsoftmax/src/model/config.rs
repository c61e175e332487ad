//! Layer configuration with builder pattern.
//!
//! [`HsmConfig`] is built with `bon` and validated by `build()`.
//!
//! # Example
//!
//! ```
//! use hsoftmax::model::HsmConfig;
//!
//! // All defaults: auto threads, no score clamp
//! let config = HsmConfig::builder().build().unwrap();
//!
//! // Four threads, scores clamped to [-30, 30]
//! let config = HsmConfig::builder()
//!     .n_threads(4)
//!     .score_clamp(30.0)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.score_clamp, Some(30.0));
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::kernel::ForwardOptions;
use crate::utils::Parallelism;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The score clamp must be a positive finite number.
    #[error("score_clamp must be positive and finite, got {0}")]
    InvalidScoreClamp(f64),
}

// =============================================================================
// HsmConfig
// =============================================================================

/// Configuration of a [`HierarchicalSoftmax`](super::HierarchicalSoftmax) layer.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct HsmConfig {
    /// Number of threads. `0` uses all available cores, `1` runs sequentially.
    #[builder(default)]
    #[serde(default)]
    pub n_threads: usize,

    /// Clamp node scores to `[-c, c]` before exponentiating.
    ///
    /// `None` keeps scores unclamped, so overflowing scores show up as
    /// non-finite outputs.
    #[serde(default)]
    pub score_clamp: Option<f64>,

    /// Log a warning when a forward pass produces non-finite outputs. Default: `true`.
    #[builder(default = true)]
    #[serde(default = "default_warn_non_finite")]
    pub warn_non_finite: bool,

    /// Seed for parameter initialization. Default: 42.
    #[builder(default = 42)]
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_warn_non_finite() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

impl<S: hsm_config_builder::IsComplete> HsmConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidScoreClamp`] if `score_clamp` is not
    /// positive and finite.
    pub fn build(self) -> Result<HsmConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl HsmConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_score_clamp(self.score_clamp)
    }

    /// Forward options for a pass running under `parallelism`.
    pub fn forward_options(&self, parallelism: Parallelism) -> ForwardOptions {
        ForwardOptions {
            score_clamp: self.score_clamp,
            warn_non_finite: self.warn_non_finite,
            parallelism,
        }
    }
}

/// A clamp must be positive and finite; `None` disables clamping.
pub(crate) fn check_score_clamp(clamp: Option<f64>) -> Result<(), ConfigError> {
    match clamp {
        Some(c) if !(c.is_finite() && c > 0.0) => Err(ConfigError::InvalidScoreClamp(c)),
        _ => Ok(()),
    }
}

impl Default for HsmConfig {
    fn default() -> Self {
        Self {
            n_threads: 0,
            score_clamp: None,
            warn_non_finite: true,
            seed: 42,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
