//! The three recommendation rules, in priority order.
//!
//! Each rule is a pure function of a [`StoreRecord`], the [`ReferenceData`]
//! and the policy it was built with. A rule either proposes a distance or
//! explains why it stepped aside with a [`Fallthrough`]; the
//! [`Cascade`](crate::cascade::Cascade) tries them in order and keeps the
//! first proposal.

pub mod deviation;
pub mod km_master;
pub mod km_tempuh;
pub mod master_zona;
pub mod stats;

pub use km_master::KmMasterRule;
pub use km_tempuh::KmTempuhRule;
pub use master_zona::MasterZonaRule;

use crate::config::CascadeConfig;
use crate::records::{ReferenceData, StoreRecord};
use serde::Serialize;
use std::fmt::{self, Debug};
use thiserror::Error;

/// Which rule produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SourceMethod {
    #[serde(rename = "KM_MASTER")]
    KmMaster,
    #[serde(rename = "KM_TEMPUH")]
    KmTempuh,
    #[serde(rename = "MASTER_ZONA")]
    MasterZona,
    /// Nothing fired; the row needs manual review.
    #[serde(rename = "NONE")]
    Unresolved,
}

impl SourceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMethod::KmMaster => "KM_MASTER",
            SourceMethod::KmTempuh => "KM_TEMPUH",
            SourceMethod::MasterZona => "MASTER_ZONA",
            SourceMethod::Unresolved => "NONE",
        }
    }
}

impl fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A distance a rule wants to recommend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    pub km: f64,
}

/// Why a rule produced no recommendation. None of these are failures; the
/// cascade simply moves on to the next rule.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fallthrough {
    #[error("no {table} entry for {key}")]
    MissingKey { table: &'static str, key: String },

    #[error("{observed} of {required} required observations")]
    InsufficientData { observed: usize, required: usize },

    #[error("all {observed} observations trimmed as outliers")]
    AllTrimmed { observed: usize },

    #[error("recorded value {recorded} is plausible")]
    NotAnomalous { recorded: f64 },

    #[error("deviation {deviation} is within threshold")]
    WithinThreshold { deviation: f64 },
}

/// One tier of the cascade.
///
/// Implementations must be stateless so the same rule list can be reused
/// across rows and runs.
pub trait Rule: Debug + Send + Sync {
    /// Tag recorded on recommendations this rule produces.
    fn method(&self) -> SourceMethod;

    fn evaluate(
        &self,
        record: &StoreRecord,
        refs: &ReferenceData,
    ) -> Result<Proposal, Fallthrough>;
}

/// The rules in priority order, configured from `config`.
pub fn default_rules(config: &CascadeConfig) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(KmMasterRule::new(config.km_master.clone())),
        Box::new(KmTempuhRule::new(
            config.km_tempuh.clone(),
            config.deviation.clone(),
            config.precision,
        )),
        Box::new(MasterZonaRule::new(config.deviation.clone(), config.precision)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_priority_order() {
        let rules = default_rules(&CascadeConfig::default());
        let methods: Vec<SourceMethod> = rules.iter().map(|r| r.method()).collect();
        assert_eq!(
            methods,
            vec![
                SourceMethod::KmMaster,
                SourceMethod::KmTempuh,
                SourceMethod::MasterZona
            ]
        );
    }

    #[test]
    fn test_source_method_labels() {
        assert_eq!(SourceMethod::Unresolved.to_string(), "NONE");
        assert_eq!(
            serde_json::to_string(&SourceMethod::MasterZona).unwrap(),
            "\"MASTER_ZONA\""
        );
    }

    #[test]
    fn test_fallthrough_messages() {
        let miss = Fallthrough::InsufficientData {
            observed: 1,
            required: 3,
        };
        assert_eq!(miss.to_string(), "1 of 3 required observations");
    }
}
