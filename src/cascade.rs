//! Priority cascade over the recommendation rules.
//!
//! Rules are tried in order for each store. The first rule that proposes a
//! distance wins and the rest are never consulted for that store. A store no
//! rule speaks for is reported as unresolved for manual review.

use crate::config::CascadeConfig;
use crate::error::{ConfigError, Exclusion};
use crate::records::{RecordStore, ReferenceData, StoreKey, StoreRecord};
use crate::rules::{Fallthrough, Rule, SourceMethod, default_rules};
use tracing::{debug, info, warn};

/// Outcome for one store.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub key: StoreKey,
    pub recorded_km_master: f64,
    pub recommended_km_master: Option<f64>,
    pub source_method: SourceMethod,
    /// `recommended - recorded`, present whenever a recommendation is.
    pub deviation: Option<f64>,
}

/// A store every rule stepped aside for, with each rule's reason in
/// priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRow {
    pub record: StoreRecord,
    pub reasons: Vec<(SourceMethod, Fallthrough)>,
}

/// Terminal state of a store after walking the cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        method: SourceMethod,
        km: f64,
        deviation: f64,
        /// Rules tried before the winning one.
        skipped: Vec<(SourceMethod, Fallthrough)>,
    },
    Unresolved {
        reasons: Vec<(SourceMethod, Fallthrough)>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeReport {
    /// One entry per evaluated store, in store key order.
    pub recommendations: Vec<Recommendation>,
    pub unresolved: Vec<UnresolvedRow>,
    /// Stores rejected before any rule ran.
    pub excluded: Vec<Exclusion>,
}

impl CascadeReport {
    pub fn count(&self, method: SourceMethod) -> usize {
        self.recommendations
            .iter()
            .filter(|r| r.source_method == method)
            .count()
    }

    pub fn resolved(&self) -> usize {
        self.recommendations.len() - self.unresolved.len()
    }
}

#[derive(Debug)]
pub struct Cascade {
    rules: Vec<Box<dyn Rule>>,
}

impl Cascade {
    /// The standard KM Master → KM Tempuh → Master Zona cascade. Fails if
    /// `config` does not validate.
    pub fn new(config: &CascadeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_rules(default_rules(config)))
    }

    /// A cascade over an arbitrary rule list; earlier rules take priority.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Walks the rules for a single record and stops at the first proposal.
    pub fn resolve(&self, record: &StoreRecord, refs: &ReferenceData) -> Resolution {
        let mut tried = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            match rule.evaluate(record, refs) {
                Ok(proposal) => {
                    return Resolution::Resolved {
                        method: rule.method(),
                        km: proposal.km,
                        deviation: proposal.km - record.recorded_km_master,
                        skipped: tried,
                    };
                }
                Err(reason) => {
                    debug!(store = %record.key, rule = %rule.method(), %reason, "Rule fell through");
                    tried.push((rule.method(), reason));
                }
            }
        }

        Resolution::Unresolved { reasons: tried }
    }

    /// Evaluates every store in `store`.
    ///
    /// Malformed records are excluded and logged; they never stop the batch.
    #[tracing::instrument(skip_all, fields(records = store.len()))]
    pub fn run(&self, store: &RecordStore, refs: &ReferenceData) -> CascadeReport {
        let mut report = CascadeReport::default();

        for record in store.iter() {
            if let Err(error) = record.validate() {
                warn!(store = %record.key, %error, "Excluding malformed record");
                report
                    .excluded
                    .push(Exclusion::new(record.key.to_string(), error));
                continue;
            }

            match self.resolve(record, refs) {
                Resolution::Resolved {
                    method,
                    km,
                    deviation,
                    ..
                } => {
                    debug!(store = %record.key, method = %method, km, deviation, "Store resolved");
                    report.recommendations.push(Recommendation {
                        key: record.key.clone(),
                        recorded_km_master: record.recorded_km_master,
                        recommended_km_master: Some(km),
                        source_method: method,
                        deviation: Some(deviation),
                    });
                }
                Resolution::Unresolved { reasons } => {
                    debug!(store = %record.key, "Store unresolved, needs manual review");
                    report.recommendations.push(Recommendation {
                        key: record.key.clone(),
                        recorded_km_master: record.recorded_km_master,
                        recommended_km_master: None,
                        source_method: SourceMethod::Unresolved,
                        deviation: None,
                    });
                    report.unresolved.push(UnresolvedRow {
                        record: record.clone(),
                        reasons,
                    });
                }
            }
        }

        info!(
            evaluated = report.recommendations.len(),
            km_master = report.count(SourceMethod::KmMaster),
            km_tempuh = report.count(SourceMethod::KmTempuh),
            master_zona = report.count(SourceMethod::MasterZona),
            unresolved = report.unresolved.len(),
            excluded = report.excluded.len(),
            "Cascade complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ReferenceTable, ZonaReferenceTable};
    use crate::rules::Proposal;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(toko: &str) -> StoreKey {
        StoreKey::new("PBPNR", toko)
    }

    fn refs() -> ReferenceData {
        ReferenceData {
            km_master: vec![(key("T001"), 12.5), (key("T004"), 50.0)]
                .into_iter()
                .collect::<ReferenceTable>(),
            zona: vec![("Z1", 8.0), ("Z2", 30.0)]
                .into_iter()
                .collect::<ZonaReferenceTable>(),
        }
    }

    #[test]
    fn test_km_master_beats_lower_tiers() {
        // History and zone would both recommend something else.
        let record = StoreRecord::new(key("T001"), 0.0)
            .with_history(vec![20.0, 21.0, 19.0])
            .with_zone("Z2");

        let cascade = Cascade::new(&CascadeConfig::default()).unwrap();
        match cascade.resolve(&record, &refs()) {
            Resolution::Resolved {
                method,
                km,
                deviation,
                skipped,
            } => {
                assert_eq!(method, SourceMethod::KmMaster);
                assert_eq!(km, 12.5);
                assert_eq!(deviation, 12.5);
                assert!(skipped.is_empty());
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn test_km_tempuh_when_reference_missing() {
        let record = StoreRecord::new(key("T002"), 10.0)
            .with_history(vec![15.0, 16.0, 14.0, 15.0])
            .with_zone("Z2");

        let cascade = Cascade::new(&CascadeConfig::default()).unwrap();
        let Resolution::Resolved {
            method, km, skipped, ..
        } = cascade.resolve(&record, &refs())
        else {
            panic!("expected resolution");
        };

        assert_eq!(method, SourceMethod::KmTempuh);
        assert_eq!(km, 15.0);
        assert_eq!(skipped.len(), 1);
        assert!(matches!(skipped[0].1, Fallthrough::MissingKey { .. }));
    }

    #[test]
    fn test_master_zona_as_last_resort() {
        let record = StoreRecord::new(key("T003"), 12.0)
            .with_history(vec![13.0])
            .with_zone("Z2");

        let cascade = Cascade::new(&CascadeConfig::default()).unwrap();
        let Resolution::Resolved { method, km, .. } = cascade.resolve(&record, &refs()) else {
            panic!("expected resolution");
        };

        assert_eq!(method, SourceMethod::MasterZona);
        assert_eq!(km, 30.0);
    }

    #[test]
    fn test_unresolved_keeps_every_reason() {
        let record = StoreRecord::new(key("T005"), 8.0).with_zone("Z1");

        let cascade = Cascade::new(&CascadeConfig::default()).unwrap();
        let Resolution::Unresolved { reasons } = cascade.resolve(&record, &refs()) else {
            panic!("expected unresolved");
        };

        let methods: Vec<SourceMethod> = reasons.iter().map(|(m, _)| *m).collect();
        assert_eq!(
            methods,
            vec![
                SourceMethod::KmMaster,
                SourceMethod::KmTempuh,
                SourceMethod::MasterZona
            ]
        );
        assert_eq!(reasons[2].1, Fallthrough::WithinThreshold { deviation: 0.0 });
    }

    #[test]
    fn test_plausible_value_in_reference_falls_to_next_tier() {
        // T004 has an override but its recorded value is fine.
        let record = StoreRecord::new(key("T004"), 20.0)
            .with_km_max(40.0)
            .with_history(vec![30.0, 30.0, 30.0]);

        let cascade = Cascade::new(&CascadeConfig::default()).unwrap();
        let Resolution::Resolved { method, km, .. } = cascade.resolve(&record, &refs()) else {
            panic!("expected resolution");
        };
        assert_eq!(method, SourceMethod::KmTempuh);
        assert_eq!(km, 30.0);
    }

    #[test]
    fn test_deviation_matches_recommendation_exactly() {
        let refs = ReferenceData {
            km_master: vec![(key("T001"), 12.37)].into_iter().collect(),
            zona: vec![("Z1", 30.0)].into_iter().collect(),
        };
        let store: RecordStore = vec![
            StoreRecord::new(key("T001"), 0.0),
            StoreRecord::new(key("T002"), 12.34).with_zone("Z1"),
        ]
        .into_iter()
        .collect();

        let report = Cascade::new(&CascadeConfig::default())
            .unwrap()
            .run(&store, &refs);

        for rec in &report.recommendations {
            let recommended = rec.recommended_km_master.unwrap();
            assert_eq!(rec.deviation, Some(recommended - rec.recorded_km_master));
        }
        assert_eq!(report.recommendations[0].deviation, Some(12.37));
        assert_eq!(report.recommendations[1].source_method, SourceMethod::MasterZona);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = CascadeConfig::default();
        config.deviation.relative = Some(f64::NAN);
        assert!(matches!(
            Cascade::new(&config),
            Err(ConfigError::NegativeThreshold { .. })
        ));

        config.deviation.relative = Some(0.2);
        config.km_tempuh.min_observations = 0;
        assert!(Cascade::new(&config).is_err());
    }

    #[derive(Debug)]
    struct FixedRule(SourceMethod, f64);

    impl Rule for FixedRule {
        fn method(&self) -> SourceMethod {
            self.0
        }

        fn evaluate(
            &self,
            _record: &StoreRecord,
            _refs: &ReferenceData,
        ) -> Result<Proposal, Fallthrough> {
            Ok(Proposal { km: self.1 })
        }
    }

    #[derive(Debug)]
    struct CountingRule(Arc<AtomicUsize>);

    impl Rule for CountingRule {
        fn method(&self) -> SourceMethod {
            SourceMethod::MasterZona
        }

        fn evaluate(
            &self,
            _record: &StoreRecord,
            _refs: &ReferenceData,
        ) -> Result<Proposal, Fallthrough> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Proposal { km: 1.0 })
        }
    }

    #[test]
    fn test_lower_rules_not_evaluated_after_a_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cascade = Cascade::with_rules(
            vec![
                Box::new(FixedRule(SourceMethod::KmMaster, 2.0)),
                Box::new(CountingRule(calls.clone())),
            ],
        );
        let store: RecordStore = vec![
            StoreRecord::new(key("T1"), 1.0),
            StoreRecord::new(key("T2"), 1.0),
        ]
        .into_iter()
        .collect();

        let report = cascade.run(&store, &ReferenceData::default());

        assert_eq!(report.count(SourceMethod::KmMaster), 2);
        assert_eq!(report.recommendations[0].deviation, Some(1.0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_excludes_malformed_and_continues() {
        let store: RecordStore = vec![
            StoreRecord::new(key("T001"), 0.0),
            StoreRecord::new(key("T002"), f64::NAN),
            StoreRecord::new(key("T005"), 8.0).with_zone("Z1"),
        ]
        .into_iter()
        .collect();

        let report = Cascade::new(&CascadeConfig::default()).unwrap().run(&store, &refs());

        assert_eq!(report.recommendations.len(), 2);
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].origin, "PBPNR/T002");
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].record.key, key("T005"));
        assert_eq!(report.resolved(), 1);

        let none_row = &report.recommendations[1];
        assert_eq!(none_row.source_method, SourceMethod::Unresolved);
        assert_eq!(none_row.recommended_km_master, None);
        assert_eq!(none_row.deviation, None);
    }

    #[test]
    fn test_run_is_idempotent() {
        let store: RecordStore = vec![
            StoreRecord::new(key("T001"), 0.0),
            StoreRecord::new(key("T002"), 10.0).with_history(vec![15.0, 16.0, 14.0, 15.0]),
            StoreRecord::new(key("T003"), 12.0).with_zone("Z2"),
            StoreRecord::new(key("T005"), 8.0).with_zone("Z1"),
        ]
        .into_iter()
        .collect();
        let cascade = Cascade::new(&CascadeConfig::default()).unwrap();
        let refs = refs();

        assert_eq!(cascade.run(&store, &refs), cascade.run(&store, &refs));
    }
}
