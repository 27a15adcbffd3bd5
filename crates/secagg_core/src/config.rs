//! Per-round secure aggregation configuration.
//!
//! `SecAggConfig` is a plain value type: it is built once by the strategy (via
//! [`SecAggConfig::complete`]) and handed to the coordinator already populated.
//! Nothing here reads environment variables, files, or CLI flags — that loading
//! step belongs to the strategy, outside this crate.

use crate::error::{Result, SecAggError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Overrides the strategy may supply; any field left `None` is defaulted by
/// [`SecAggConfig::complete`] per the table in the external-interfaces section
/// of the design.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecAggParamOverrides {
    pub min_num: Option<usize>,
    pub min_frac: Option<f64>,
    pub share_num: Option<usize>,
    pub threshold: Option<usize>,
    pub clipping_range: Option<f64>,
    pub target_range: Option<u64>,
    pub max_weights_factor: Option<u64>,
    pub mod_range: Option<u64>,
    pub timeout: Option<u64>,
}

/// Fully resolved, validated configuration for one aggregation round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecAggConfig {
    pub sample_num: usize,
    pub min_num: usize,
    pub share_num: usize,
    pub threshold: usize,
    pub clipping_range: f64,
    pub target_range: u64,
    pub max_weights_factor: u64,
    pub mod_range: u64,
    pub timeout: u64,
}

impl SecAggConfig {
    /// Complete a strategy-supplied override set into a full configuration,
    /// applying the default table and then validating §3's invariants.
    pub fn complete(sample_num: usize, overrides: SecAggParamOverrides) -> Result<Self> {
        let min_num = match (overrides.min_num, overrides.min_frac) {
            (Some(n), Some(frac)) => n.max((frac * sample_num as f64).floor() as usize),
            (Some(n), None) => n,
            (None, Some(frac)) => ((frac * sample_num as f64).floor() as usize).max(2),
            (None, None) => (sample_num as f64 * 0.9).floor().max(2.0) as usize,
        };

        let mut share_num = overrides.share_num.unwrap_or(sample_num);
        if share_num != sample_num && share_num % 2 == 0 {
            warn!(share_num, "share_num is even and != sample_num, bumping by 1");
            share_num += 1;
        }

        let threshold = overrides
            .threshold
            .unwrap_or_else(|| ((share_num as f64 * 0.9).floor() as usize).max(2));

        let max_weights_factor = overrides.max_weights_factor.unwrap_or(1000);
        let clipping_range = overrides.clipping_range.unwrap_or(3.0);
        let target_range = overrides.target_range.unwrap_or(16_777_216);
        let mod_range = overrides
            .mod_range
            .unwrap_or(sample_num as u64 * target_range * max_weights_factor);
        let timeout = overrides.timeout.unwrap_or(30);

        let config = SecAggConfig {
            sample_num,
            min_num,
            share_num,
            threshold,
            clipping_range,
            target_range,
            max_weights_factor,
            mod_range,
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Enforce the invariants of §3. Called by [`Self::complete`]; also usable
    /// directly by callers that build a `SecAggConfig` by hand (e.g. tests).
    pub fn validate(&self) -> Result<()> {
        if self.sample_num < 2 {
            return Err(SecAggError::ConfigInvalid("sample_num must be >= 2".into()));
        }
        if !(2 <= self.min_num && self.min_num <= self.sample_num) {
            return Err(SecAggError::ConfigInvalid(
                "min_num must satisfy 2 <= min_num <= sample_num".into(),
            ));
        }
        if !(self.sample_num >= self.share_num && self.share_num >= self.threshold && self.threshold >= 2)
        {
            return Err(SecAggError::ConfigInvalid(
                "must satisfy sample_num >= share_num >= threshold >= 2".into(),
            ));
        }
        if self.share_num != self.sample_num && self.share_num % 2 == 0 {
            return Err(SecAggError::ConfigInvalid(
                "share_num must be odd or equal to sample_num".into(),
            ));
        }
        if self.share_num > 255 {
            return Err(SecAggError::ConfigInvalid(
                "share_num must be <= 255 (byte-indexed Shamir shares)".into(),
            ));
        }
        let required = self.sample_num as u64 * self.target_range * self.max_weights_factor;
        if self.mod_range < required {
            return Err(SecAggError::ConfigInvalid(format!(
                "mod_range {} must be >= sample_num * target_range * max_weights_factor ({})",
                self.mod_range, required
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_sane_values() {
        let cfg = SecAggConfig::complete(10, SecAggParamOverrides::default()).unwrap();
        assert_eq!(cfg.min_num, 9);
        assert_eq!(cfg.share_num, 10);
        assert_eq!(cfg.threshold, 9);
        assert_eq!(cfg.max_weights_factor, 1000);
        assert_eq!(cfg.mod_range, 10 * 16_777_216 * 1000);
    }

    #[test]
    fn even_share_num_is_bumped() {
        let overrides = SecAggParamOverrides {
            share_num: Some(4),
            ..Default::default()
        };
        let cfg = SecAggConfig::complete(10, overrides).unwrap();
        assert_eq!(cfg.share_num, 5);
    }

    #[test]
    fn rejects_threshold_above_share_num() {
        let overrides = SecAggParamOverrides {
            share_num: Some(5),
            threshold: Some(6),
            ..Default::default()
        };
        assert!(SecAggConfig::complete(10, overrides).is_err());
    }

    #[test]
    fn rejects_insufficient_mod_range() {
        let overrides = SecAggParamOverrides {
            mod_range: Some(1),
            ..Default::default()
        };
        assert!(SecAggConfig::complete(10, overrides).is_err());
    }

    #[test]
    fn min_frac_only_is_floored() {
        let overrides = SecAggParamOverrides {
            min_frac: Some(0.5),
            ..Default::default()
        };
        let cfg = SecAggConfig::complete(9, overrides).unwrap();
        assert_eq!(cfg.min_num, 4);
    }

    #[test]
    fn min_num_and_min_frac_both_set_takes_the_stricter_bound() {
        let overrides = SecAggParamOverrides {
            min_num: Some(5),
            min_frac: Some(0.9),
            ..Default::default()
        };
        let cfg = SecAggConfig::complete(100, overrides).unwrap();
        assert_eq!(cfg.min_num, 90);

        let overrides = SecAggParamOverrides {
            min_num: Some(95),
            min_frac: Some(0.9),
            ..Default::default()
        };
        let cfg = SecAggConfig::complete(100, overrides).unwrap();
        assert_eq!(cfg.min_num, 95);
    }
}
