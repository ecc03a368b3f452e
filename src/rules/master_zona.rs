use super::stats::round_to;
use super::{Fallthrough, Proposal, Rule, SourceMethod};
use crate::config::DeviationPolicy;
use crate::records::{ReferenceData, StoreRecord};

/// Last resort: the representative distance of the store's zone.
#[derive(Debug, Clone)]
pub struct MasterZonaRule {
    deviation: DeviationPolicy,
    precision: u32,
}

impl MasterZonaRule {
    pub fn new(deviation: DeviationPolicy, precision: u32) -> Self {
        Self {
            deviation,
            precision,
        }
    }
}

impl Rule for MasterZonaRule {
    fn method(&self) -> SourceMethod {
        SourceMethod::MasterZona
    }

    fn evaluate(
        &self,
        record: &StoreRecord,
        refs: &ReferenceData,
    ) -> Result<Proposal, Fallthrough> {
        let zone = record
            .zone_code
            .as_deref()
            .ok_or_else(|| Fallthrough::MissingKey {
                table: "Master Zona",
                key: record.key.to_string(),
            })?;

        let zone_km = refs.zona.get(zone).ok_or_else(|| Fallthrough::MissingKey {
            table: "Zona reference",
            key: zone.to_string(),
        })?;
        let km = round_to(zone_km, self.precision);

        let deviation = self.deviation.assess(km, record.recorded_km_master);
        if !deviation.material {
            return Err(Fallthrough::WithinThreshold {
                deviation: deviation.delta,
            });
        }

        Ok(Proposal { km })
    }
}
