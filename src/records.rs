//! In-memory snapshot of stores and reference tables the cascade reads from.

use crate::error::RecordError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

/// Identity of a store as seen from one Operating Point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StoreKey {
    pub op: String,
    pub toko: String,
}

impl StoreKey {
    pub fn new(op: impl Into<String>, toko: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            toko: toko.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.op, self.toko)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum StoreStatus {
    Active,
    Inactive,
    Other(String),
    #[default]
    Unknown,
}

impl StoreStatus {
    /// Parses the free-text "Status Toko" column. Matching is
    /// case-insensitive and accepts the Indonesian labels used in exports.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => StoreStatus::Unknown,
            "active" | "aktif" | "buka" => StoreStatus::Active,
            "inactive" | "tidak aktif" | "nonaktif" | "non aktif" | "tutup" => {
                StoreStatus::Inactive
            }
            _ => StoreStatus::Other(trimmed.to_string()),
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Active => f.write_str("active"),
            StoreStatus::Inactive => f.write_str("inactive"),
            StoreStatus::Other(label) => f.write_str(label),
            StoreStatus::Unknown => Ok(()),
        }
    }
}

/// Everything the rules know about one store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    pub key: StoreKey,
    pub recorded_km_master: f64,
    /// Delivery distances in the order they appear in the operational data.
    pub km_tempuh_history: Vec<f64>,
    pub km_max: Option<f64>,
    pub zone_code: Option<String>,
    pub province: Option<String>,
    pub store_status: StoreStatus,
}

impl StoreRecord {
    pub fn new(key: StoreKey, recorded_km_master: f64) -> Self {
        Self {
            key,
            recorded_km_master,
            km_tempuh_history: Vec::new(),
            km_max: None,
            zone_code: None,
            province: None,
            store_status: StoreStatus::Unknown,
        }
    }

    pub fn with_history(mut self, history: Vec<f64>) -> Self {
        self.km_tempuh_history = history;
        self
    }

    pub fn with_km_max(mut self, km_max: f64) -> Self {
        self.km_max = Some(km_max);
        self
    }

    pub fn with_zone(mut self, zone_code: impl Into<String>) -> Self {
        self.zone_code = Some(zone_code.into());
        self
    }

    /// Checks the numeric fields are usable. Records built by the loader
    /// always pass; records built by library callers might not.
    pub fn validate(&self) -> Result<(), RecordError> {
        if !self.recorded_km_master.is_finite() {
            return Err(RecordError::OutOfDomain {
                column: "KM Master".into(),
                value: self.recorded_km_master,
            });
        }
        if let Some(km_max) = self.km_max {
            if !km_max.is_finite() || km_max < 0.0 {
                return Err(RecordError::OutOfDomain {
                    column: "KM Max".into(),
                    value: km_max,
                });
            }
        }
        if let Some(bad) = self
            .km_tempuh_history
            .iter()
            .copied()
            .find(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(RecordError::OutOfDomain {
                column: "KM Tempuh".into(),
                value: bad,
            });
        }
        Ok(())
    }
}

/// Stores keyed by identity. Iteration follows key order so repeated runs
/// over the same snapshot visit rows identically.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<StoreKey, StoreRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, rejecting a second record with the same identity.
    pub fn insert(&mut self, record: StoreRecord) -> Result<(), RecordError> {
        if self.records.contains_key(&record.key) {
            return Err(RecordError::DuplicateIdentity {
                op: record.key.op.clone(),
                toko: record.key.toko.clone(),
            });
        }
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    pub fn get(&self, key: &StoreKey) -> Option<&StoreRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<StoreRecord> for RecordStore {
    /// Later duplicates are logged and dropped.
    fn from_iter<I: IntoIterator<Item = StoreRecord>>(iter: I) -> Self {
        let mut store = RecordStore::new();
        for record in iter {
            let key = record.key.clone();
            if let Err(error) = store.insert(record) {
                warn!(store = %key, %error, "Duplicate store record, keeping first");
            }
        }
        store
    }
}

/// Sparse "Rekomendasi KM Master" overrides keyed by store identity.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: HashMap<StoreKey, f64>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and keeps the existing value when `key` is already present.
    pub fn insert(&mut self, key: StoreKey, km: f64) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, km);
        true
    }

    pub fn get(&self, key: &StoreKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(StoreKey, f64)> for ReferenceTable {
    fn from_iter<I: IntoIterator<Item = (StoreKey, f64)>>(iter: I) -> Self {
        let mut table = ReferenceTable::new();
        for (key, km) in iter {
            if !table.insert(key.clone(), km) {
                warn!(store = %key, ignored = km, "Duplicate KM Master override, keeping first");
            }
        }
        table
    }
}

/// Representative UJP distance per zone code.
#[derive(Debug, Clone, Default)]
pub struct ZonaReferenceTable {
    entries: HashMap<String, f64>,
}

impl ZonaReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and keeps the existing value when `zone` is already present.
    pub fn insert(&mut self, zone: impl Into<String>, km: f64) -> bool {
        let zone = zone.into();
        if self.entries.contains_key(&zone) {
            return false;
        }
        self.entries.insert(zone, km);
        true
    }

    pub fn get(&self, zone: &str) -> Option<f64> {
        self.entries.get(zone).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ZonaReferenceTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut table = ZonaReferenceTable::new();
        for (zone, km) in iter {
            let zone = zone.into();
            if !table.insert(zone.as_str(), km) {
                warn!(zone = %zone, ignored = km, "Duplicate zone, keeping first");
            }
        }
        table
    }
}

/// The two lookup tables rules consult, bundled so the rule signature stays small.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub km_master: ReferenceTable,
    pub zona: ZonaReferenceTable,
}
