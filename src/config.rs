//! Thresholds and tolerances driving the rule cascade.
//!
//! Every threshold the rules use lives here. The defaults are starting points;
//! a deployment overrides them with a JSON file:
//!
//! ```json
//! {
//!   "km_master": { "max_excess_km": 5.0 },
//!   "km_tempuh": { "min_observations": 3, "outlier_sigma": 2.0 },
//!   "deviation": { "absolute_km": null, "relative": 0.2 },
//!   "precision": 1
//! }
//! ```
//!
//! Missing keys fall back to their defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Largest supported rounding precision for recommended distances.
pub const MAX_PRECISION: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub km_master: KmMasterPolicy,
    pub km_tempuh: KmTempuhPolicy,
    pub deviation: DeviationPolicy,
    /// Decimal places kept on computed recommendations.
    pub precision: u32,
}

/// When is a recorded KM Master implausible enough to take the reference
/// override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmMasterPolicy {
    /// How far (km) the recorded value may exceed KM Max before it is flagged.
    pub max_excess_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmTempuhPolicy {
    /// Histories shorter than this fall through to the next rule.
    pub min_observations: usize,
    /// Observations further than this many standard deviations from the mean
    /// are left out of the aggregate. `None` keeps every observation.
    pub outlier_sigma: Option<f64>,
}

/// Shared "is this difference worth a recommendation" test.
///
/// A deviation is material when it strictly exceeds any threshold that is
/// set. With both unset nothing is material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviationPolicy {
    pub absolute_km: Option<f64>,
    /// Fraction of the recorded value, e.g. `0.2` for 20%.
    pub relative: Option<f64>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            km_master: KmMasterPolicy::default(),
            km_tempuh: KmTempuhPolicy::default(),
            deviation: DeviationPolicy::default(),
            precision: 1,
        }
    }
}

impl Default for KmTempuhPolicy {
    fn default() -> Self {
        Self {
            min_observations: 3,
            outlier_sigma: Some(2.0),
        }
    }
}

impl Default for DeviationPolicy {
    fn default() -> Self {
        Self {
            absolute_km: None,
            relative: Some(0.20),
        }
    }
}

impl CascadeConfig {
    /// Loads and validates the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: CascadeConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `path` when given, otherwise returns validated defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("km_master.max_excess_km", self.km_master.max_excess_km)?;
        if self.km_tempuh.min_observations == 0 {
            return Err(ConfigError::ZeroMinimumObservations);
        }
        if let Some(sigma) = self.km_tempuh.outlier_sigma {
            non_negative("km_tempuh.outlier_sigma", sigma)?;
        }
        if let Some(abs) = self.deviation.absolute_km {
            non_negative("deviation.absolute_km", abs)?;
        }
        if let Some(rel) = self.deviation.relative {
            non_negative("deviation.relative", rel)?;
        }
        if self.precision > MAX_PRECISION {
            return Err(ConfigError::PrecisionTooLarge {
                max: MAX_PRECISION,
                value: self.precision,
            });
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeThreshold { field, value })
    }
}
