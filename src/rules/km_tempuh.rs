use super::stats::{mean, round_to, trimmed_mean};
use super::{Fallthrough, Proposal, Rule, SourceMethod};
use crate::config::{DeviationPolicy, KmTempuhPolicy};
use crate::records::{ReferenceData, StoreRecord};

/// Recommends the typical observed delivery distance when it disagrees with
/// the recorded KM Master.
///
/// The aggregate is the mean of the KM Tempuh history after dropping
/// observations more than `outlier_sigma` population standard deviations
/// from the full-sample mean (see [`trimmed_mean`]). A single detour or a
/// mistyped odometer reading therefore cannot drag the recommendation.
/// Stores with fewer than `min_observations` trips are left to the next rule.
#[derive(Debug, Clone)]
pub struct KmTempuhRule {
    policy: KmTempuhPolicy,
    deviation: DeviationPolicy,
    precision: u32,
}

impl KmTempuhRule {
    pub fn new(policy: KmTempuhPolicy, deviation: DeviationPolicy, precision: u32) -> Self {
        Self {
            policy,
            deviation,
            precision,
        }
    }

    /// The unrounded aggregate, or `None` when the history is too short or
    /// trimming left nothing.
    pub fn aggregate(&self, history: &[f64]) -> Option<f64> {
        if history.len() < self.policy.min_observations {
            return None;
        }
        match self.policy.outlier_sigma {
            Some(sigma) => trimmed_mean(history, sigma),
            None => Some(mean(history)),
        }
    }
}

impl Rule for KmTempuhRule {
    fn method(&self) -> SourceMethod {
        SourceMethod::KmTempuh
    }

    fn evaluate(
        &self,
        record: &StoreRecord,
        _refs: &ReferenceData,
    ) -> Result<Proposal, Fallthrough> {
        let history = &record.km_tempuh_history;
        if history.len() < self.policy.min_observations {
            return Err(Fallthrough::InsufficientData {
                observed: history.len(),
                required: self.policy.min_observations,
            });
        }

        let aggregate = self.aggregate(history).ok_or(Fallthrough::AllTrimmed {
            observed: history.len(),
        })?;
        let km = round_to(aggregate, self.precision);

        let deviation = self.deviation.assess(km, record.recorded_km_master);
        if !deviation.material {
            return Err(Fallthrough::WithinThreshold {
                deviation: deviation.delta,
            });
        }

        Ok(Proposal { km })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::StoreKey;

    fn rule(min_observations: usize, outlier_sigma: Option<f64>) -> KmTempuhRule {
        KmTempuhRule::new(
            KmTempuhPolicy {
                min_observations,
                outlier_sigma,
            },
            DeviationPolicy {
                absolute_km: None,
                relative: Some(0.20),
            },
            1,
        )
    }

    fn record(recorded: f64, history: Vec<f64>) -> StoreRecord {
        StoreRecord::new(StoreKey::new("PBPNR", "T001"), recorded).with_history(history)
    }

    #[test]
    fn test_material_deviation_recommends_aggregate() {
        let record = record(10.0, vec![15.0, 16.0, 14.0, 15.0]);
        let proposal = rule(3, Some(2.0))
            .evaluate(&record, &ReferenceData::default())
            .unwrap();
        assert_eq!(proposal.km, 15.0);
    }

    #[test]
    fn test_empty_history_falls_through() {
        let miss = rule(3, Some(2.0))
            .evaluate(&record(10.0, vec![]), &ReferenceData::default())
            .unwrap_err();
        assert_eq!(
            miss,
            Fallthrough::InsufficientData {
                observed: 0,
                required: 3
            }
        );
    }

    #[test]
    fn test_short_history_falls_through() {
        let miss = rule(3, None)
            .evaluate(&record(10.0, vec![30.0, 31.0]), &ReferenceData::default())
            .unwrap_err();
        assert!(matches!(miss, Fallthrough::InsufficientData { observed: 2, .. }));
    }

    #[test]
    fn test_history_trimmed_away_falls_through() {
        // both trips sit exactly one standard deviation from the mean
        let miss = rule(2, Some(0.5))
            .evaluate(&record(10.0, vec![10.0, 20.0]), &ReferenceData::default())
            .unwrap_err();
        assert_eq!(miss, Fallthrough::AllTrimmed { observed: 2 });
        assert_eq!(miss.to_string(), "all 2 observations trimmed as outliers");
    }

    #[test]
    fn test_small_deviation_falls_through() {
        let miss = rule(3, Some(2.0))
            .evaluate(&record(14.0, vec![15.0, 15.0, 15.0]), &ReferenceData::default())
            .unwrap_err();
        assert_eq!(miss, Fallthrough::WithinThreshold { deviation: 1.0 });
    }

    #[test]
    fn test_outlier_is_trimmed() {
        let history = vec![10.0, 11.0, 9.0, 10.0, 11.0, 9.0, 10.0, 46.0];
        let record = record(20.0, history);

        let trimmed = rule(3, Some(1.5))
            .evaluate(&record, &ReferenceData::default())
            .unwrap();
        assert_eq!(trimmed.km, 10.0);

        // without trimming the 46 km trip pulls the mean to 14.5
        let untrimmed = rule(3, None)
            .evaluate(&record, &ReferenceData::default())
            .unwrap();
        assert_eq!(untrimmed.km, 14.5);
    }

    #[test]
    fn test_aggregate_is_rounded() {
        let record = record(5.0, vec![10.0, 10.0, 10.5]);
        let proposal = rule(3, None)
            .evaluate(&record, &ReferenceData::default())
            .unwrap();
        // 30.5 / 3 = 10.1666...
        assert_eq!(proposal.km, 10.2);
    }
}
