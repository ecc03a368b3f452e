use super::{Fallthrough, Proposal, Rule, SourceMethod};
use crate::config::KmMasterPolicy;
use crate::records::{ReferenceData, StoreRecord};

/// Takes the "Rekomendasi KM Master" override for stores whose recorded
/// distance is implausible.
///
/// A recorded value is implausible when it is zero or negative, or exceeds
/// KM Max by more than [`KmMasterPolicy::max_excess_km`]. The override is used
/// as-is, without rounding, since it is already an authoritative figure.
#[derive(Debug, Clone)]
pub struct KmMasterRule {
    policy: KmMasterPolicy,
}

impl KmMasterRule {
    pub fn new(policy: KmMasterPolicy) -> Self {
        Self { policy }
    }

    pub fn is_anomalous(&self, record: &StoreRecord) -> bool {
        let recorded = record.recorded_km_master;
        if recorded <= 0.0 {
            return true;
        }
        record
            .km_max
            .is_some_and(|km_max| recorded > km_max + self.policy.max_excess_km)
    }
}

impl Rule for KmMasterRule {
    fn method(&self) -> SourceMethod {
        SourceMethod::KmMaster
    }

    fn evaluate(
        &self,
        record: &StoreRecord,
        refs: &ReferenceData,
    ) -> Result<Proposal, Fallthrough> {
        let km = refs
            .km_master
            .get(&record.key)
            .ok_or_else(|| Fallthrough::MissingKey {
                table: "Rekomendasi KM Master",
                key: record.key.to_string(),
            })?;

        if !self.is_anomalous(record) {
            return Err(Fallthrough::NotAnomalous {
                recorded: record.recorded_km_master,
            });
        }

        Ok(Proposal { km })
    }
}
