//! CSV adapter turning exported tables into a [`Snapshot`].
//!
//! Inputs are expected to be normalized already (OP codes, real store codes).
//! All cells are read as text and parsed here, so a stray value only costs
//! its own row: the row is excluded, logged and the load carries on.

use crate::error::{Exclusion, LoadError, RecordError};
use crate::records::{RecordStore, ReferenceData, StoreKey, StoreRecord, StoreStatus};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use tracing::{info, warn};

pub const OPERATIONAL: &str = "operational";
pub const MASTER_ZONA: &str = "master_zona";
pub const REFERENCE: &str = "rekomendasi_km_master";
pub const ZONA: &str = "zona_reference";

/// One trip from the operational export.
#[derive(Debug, Deserialize)]
struct OperationalRow {
    #[serde(rename = "OP")]
    op: String,
    #[serde(rename = "Toko")]
    toko: String,
    #[serde(rename = "KM Tempuh", default)]
    km_tempuh: Option<String>,
    #[serde(rename = "KM Master", default)]
    km_master: Option<String>,
    #[serde(rename = "KM Max", default)]
    km_max: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MasterZonaRow {
    #[serde(rename = "OP")]
    op: String,
    #[serde(rename = "Toko")]
    toko: String,
    #[serde(rename = "KM Master", default)]
    km_master: Option<String>,
    #[serde(rename = "Kode Zona", default)]
    zone_code: Option<String>,
    #[serde(rename = "Provinsi", default)]
    province: Option<String>,
    #[serde(rename = "Status Toko", default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    #[serde(rename = "OP")]
    op: String,
    #[serde(rename = "Toko")]
    toko: String,
    #[serde(rename = "Rekomendasi KM Master")]
    km: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZonaRow {
    #[serde(rename = "Kode Zona")]
    zone_code: String,
    #[serde(rename = "KM Zona")]
    km: Option<String>,
}

/// Paths of the four input tables.
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub operational: String,
    pub master_zona: String,
    pub reference: String,
    pub zona: String,
}

/// Everything one cascade run needs, plus the rows that did not make it.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub store: RecordStore,
    pub refs: ReferenceData,
    pub excluded: Vec<Exclusion>,
}

#[derive(Debug, Clone, Copy)]
pub struct Loader {
    delimiter: u8,
}

impl Default for Loader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl Loader {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Reads all four tables from disk and assembles the snapshot.
    #[tracing::instrument(skip_all)]
    pub fn load(&self, paths: &InputPaths) -> Result<Snapshot, LoadError> {
        let mut builder = SnapshotBuilder::default();
        builder.add_operational(&mut self.open(OPERATIONAL, &paths.operational)?)?;
        builder.add_master_zona(&mut self.open(MASTER_ZONA, &paths.master_zona)?)?;
        builder.add_reference(&mut self.open(REFERENCE, &paths.reference)?)?;
        builder.add_zona(&mut self.open(ZONA, &paths.zona)?)?;
        Ok(builder.finish())
    }

    pub fn reader<R: Read>(&self, source: R) -> csv::Reader<R> {
        ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .from_reader(source)
    }

    fn open(&self, dataset: &'static str, path: &str) -> Result<csv::Reader<File>, LoadError> {
        ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .from_path(path)
            .map_err(|source| LoadError::Open {
                dataset,
                path: path.to_string(),
                source,
            })
    }
}

#[derive(Debug, Default)]
struct OperationalAggregate {
    history: Vec<f64>,
    km_master: Option<f64>,
    km_max: Option<f64>,
}

struct Trip {
    km_tempuh: Option<f64>,
    km_master: Option<f64>,
    km_max: Option<f64>,
}

fn parse_trip(row: &OperationalRow) -> Result<(StoreKey, Trip), RecordError> {
    let key = store_key(&row.op, &row.toko)?;
    let trip = Trip {
        km_tempuh: parse_distance("KM Tempuh", row.km_tempuh.as_deref())?,
        km_master: parse_km_master(row.km_master.as_deref())?,
        km_max: parse_distance("KM Max", row.km_max.as_deref())?,
    };
    Ok((key, trip))
}

#[derive(Debug)]
struct MasterZonaEntry {
    km_master: Option<f64>,
    zone_code: Option<String>,
    province: Option<String>,
    status: StoreStatus,
}

/// Accumulates tables one at a time, then joins them into a [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    operational: BTreeMap<StoreKey, OperationalAggregate>,
    master_zona: BTreeMap<StoreKey, MasterZonaEntry>,
    refs: ReferenceData,
    excluded: Vec<Exclusion>,
}

impl SnapshotBuilder {
    /// Groups trips by store. KM Tempuh values become the history in file
    /// order; the first non-empty KM Master and KM Max per store are kept.
    pub fn add_operational<R: Read>(&mut self, rdr: &mut csv::Reader<R>) -> Result<(), LoadError> {
        let rows: Vec<(String, OperationalRow)> = read_rows(
            rdr,
            OPERATIONAL,
            &[&["OP"], &["Toko"], &["KM Tempuh"]],
            &mut self.excluded,
        )?;
        let total = rows.len();

        for (origin, row) in rows {
            let (key, trip) = match parse_trip(&row) {
                Ok(values) => values,
                Err(error) => {
                    exclude(&mut self.excluded, origin, error);
                    continue;
                }
            };

            let aggregate = self.operational.entry(key.clone()).or_default();
            if let Some(km) = trip.km_tempuh {
                aggregate.history.push(km);
            }
            keep_first(&key, "KM Master", &mut aggregate.km_master, trip.km_master);
            keep_first(&key, "KM Max", &mut aggregate.km_max, trip.km_max);
        }

        info!(
            dataset = OPERATIONAL,
            rows = total,
            stores = self.operational.len(),
            "Loaded dataset"
        );
        Ok(())
    }

    pub fn add_master_zona<R: Read>(&mut self, rdr: &mut csv::Reader<R>) -> Result<(), LoadError> {
        let rows: Vec<(String, MasterZonaRow)> = read_rows(
            rdr,
            MASTER_ZONA,
            &[&["OP"], &["Toko"], &["KM Master"], &["Kode Zona"]],
            &mut self.excluded,
        )?;
        let total = rows.len();

        for (origin, row) in rows {
            let parsed = store_key(&row.op, &row.toko).and_then(|key| {
                let km_master = parse_km_master(row.km_master.as_deref())?;
                Ok((key, km_master))
            });
            let (key, km_master) = match parsed {
                Ok(values) => values,
                Err(error) => {
                    exclude(&mut self.excluded, origin, error);
                    continue;
                }
            };

            if self.master_zona.contains_key(&key) {
                let error = RecordError::DuplicateIdentity {
                    op: key.op,
                    toko: key.toko,
                };
                exclude(&mut self.excluded, origin, error);
                continue;
            }

            self.master_zona.insert(
                key,
                MasterZonaEntry {
                    km_master,
                    zone_code: non_empty(row.zone_code),
                    province: non_empty(row.province),
                    status: StoreStatus::parse(row.status.as_deref().unwrap_or_default()),
                },
            );
        }

        info!(
            dataset = MASTER_ZONA,
            rows = total,
            stores = self.master_zona.len(),
            "Loaded dataset"
        );
        Ok(())
    }

    /// Loads "Rekomendasi KM Master". A repeated identity keeps its first value.
    pub fn add_reference<R: Read>(&mut self, rdr: &mut csv::Reader<R>) -> Result<(), LoadError> {
        let rows: Vec<(String, ReferenceRow)> = read_rows(
            rdr,
            REFERENCE,
            &[&["OP"], &["Toko"], &["Rekomendasi KM Master", "KM Master"]],
            &mut self.excluded,
        )?;

        for (origin, row) in rows {
            let parsed = store_key(&row.op, &row.toko).and_then(|key| {
                let km = parse_distance("Rekomendasi KM Master", row.km.as_deref())?
                    .ok_or_else(|| missing("Rekomendasi KM Master"))?;
                Ok((key, km))
            });

            match parsed {
                Ok((key, km)) => {
                    if !self.refs.km_master.insert(key.clone(), km) {
                        let error = RecordError::DuplicateIdentity {
                            op: key.op,
                            toko: key.toko,
                        };
                        exclude(&mut self.excluded, origin, error);
                    }
                }
                Err(error) => exclude(&mut self.excluded, origin, error),
            }
        }

        info!(
            dataset = REFERENCE,
            entries = self.refs.km_master.len(),
            "Loaded dataset"
        );
        Ok(())
    }

    pub fn add_zona<R: Read>(&mut self, rdr: &mut csv::Reader<R>) -> Result<(), LoadError> {
        let rows: Vec<(String, ZonaRow)> = read_rows(
            rdr,
            ZONA,
            &[&["Kode Zona"], &["KM Zona", "KM"]],
            &mut self.excluded,
        )?;

        for (origin, row) in rows {
            let zone = row.zone_code.trim();
            if zone.is_empty() {
                exclude(&mut self.excluded, origin, missing("Kode Zona"));
                continue;
            }

            let km = match parse_distance("KM Zona", row.km.as_deref())
                .and_then(|km| km.ok_or_else(|| missing("KM Zona")))
            {
                Ok(km) => km,
                Err(error) => {
                    exclude(&mut self.excluded, origin, error);
                    continue;
                }
            };

            if !self.refs.zona.insert(zone, km) {
                warn!(zone, "Duplicate zone in zona reference, keeping first");
            }
        }

        info!(dataset = ZONA, entries = self.refs.zona.len(), "Loaded dataset");
        Ok(())
    }

    /// Joins operational and Master Zona data per store.
    ///
    /// The recorded KM Master is taken from Master Zona when it has one,
    /// otherwise from the operational data. Stores with no recorded value in
    /// either are excluded.
    pub fn finish(self) -> Snapshot {
        let SnapshotBuilder {
            mut operational,
            mut master_zona,
            refs,
            mut excluded,
        } = self;

        let keys: BTreeSet<StoreKey> = operational
            .keys()
            .chain(master_zona.keys())
            .cloned()
            .collect();

        let mut store = RecordStore::new();
        for key in keys {
            let ops = operational.remove(&key).unwrap_or_default();
            let master = master_zona.remove(&key);

            let recorded = master
                .as_ref()
                .and_then(|m| m.km_master)
                .or(ops.km_master);
            let Some(recorded) = recorded else {
                exclude(&mut excluded, key.to_string(), missing("KM Master"));
                continue;
            };

            let mut record = StoreRecord::new(key.clone(), recorded);
            record.km_tempuh_history = ops.history;
            record.km_max = ops.km_max;
            if let Some(master) = master {
                record.zone_code = master.zone_code;
                record.province = master.province;
                record.store_status = master.status;
            }

            if let Err(error) = store.insert(record) {
                exclude(&mut excluded, key.to_string(), error);
            }
        }

        info!(
            stores = store.len(),
            excluded = excluded.len(),
            "Snapshot assembled"
        );

        Snapshot {
            store,
            refs,
            excluded,
        }
    }
}

/// Deserializes every row, excluding the ones that cannot be read. Each row is
/// paired with its origin (`dataset:line`).
///
/// `required` lists each column with its accepted header names, preferred
/// name first. A fallback header is only read when the preferred one is
/// absent.
fn read_rows<R: Read, T: DeserializeOwned>(
    rdr: &mut csv::Reader<R>,
    dataset: &'static str,
    required: &[&[&'static str]],
    excluded: &mut Vec<Exclusion>,
) -> Result<Vec<(String, T)>, LoadError> {
    let headers = rdr
        .headers()
        .map_err(|source| LoadError::Headers { dataset, source })?
        .clone();
    require_columns(dataset, &headers, required)?;
    let headers = canonical_headers(&headers, required);

    let mut rows = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => {
                let origin = locate(dataset, record.position().map(|p| p.line()));
                match record.deserialize::<T>(Some(&headers)) {
                    Ok(row) => rows.push((origin, row)),
                    Err(e) => exclude(
                        excluded,
                        origin,
                        RecordError::Unreadable {
                            message: e.to_string(),
                        },
                    ),
                }
            }
            Err(e) => {
                let origin = locate(dataset, e.position().map(|p| p.line()));
                exclude(
                    excluded,
                    origin,
                    RecordError::Unreadable {
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    Ok(rows)
}

fn require_columns(
    dataset: &'static str,
    headers: &StringRecord,
    required: &[&[&'static str]],
) -> Result<(), LoadError> {
    for alternatives in required {
        let present = alternatives
            .iter()
            .any(|column| headers.iter().any(|h| h == *column));
        if !present {
            return Err(LoadError::MissingColumn {
                dataset,
                column: alternatives[0],
            });
        }
    }
    Ok(())
}

/// Renames the first fallback header to the preferred name for every column
/// whose preferred header is missing.
fn canonical_headers(headers: &StringRecord, required: &[&[&'static str]]) -> StringRecord {
    let mut names: Vec<String> = headers.iter().map(str::to_string).collect();
    for alternatives in required {
        let Some((preferred, fallbacks)) = alternatives.split_first() else {
            continue;
        };
        if names.iter().any(|h| h == preferred) {
            continue;
        }
        let found = fallbacks
            .iter()
            .find_map(|alt| names.iter().position(|h| h == alt));
        if let Some(index) = found {
            names[index] = preferred.to_string();
        }
    }
    StringRecord::from(names)
}

fn locate(dataset: &str, line: Option<u64>) -> String {
    match line {
        Some(line) => format!("{dataset}:{line}"),
        None => dataset.to_string(),
    }
}

fn exclude(excluded: &mut Vec<Exclusion>, origin: String, error: RecordError) {
    warn!(origin = %origin, %error, "Excluding row");
    excluded.push(Exclusion::new(origin, error));
}

fn missing(column: &str) -> RecordError {
    RecordError::MissingField {
        column: column.to_string(),
    }
}

fn store_key(op: &str, toko: &str) -> Result<StoreKey, RecordError> {
    let (op, toko) = (op.trim(), toko.trim());
    if op.is_empty() {
        return Err(missing("OP"));
    }
    if toko.is_empty() {
        return Err(missing("Toko"));
    }
    Ok(StoreKey::new(op, toko))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn keep_first(key: &StoreKey, column: &str, slot: &mut Option<f64>, value: Option<f64>) {
    match (*slot, value) {
        (None, Some(v)) => *slot = Some(v),
        (Some(kept), Some(v)) if kept != v => {
            warn!(store = %key, column, kept, ignored = v, "Conflicting values in operational data, keeping first");
        }
        _ => {}
    }
}

/// Parses a distance cell. Accepts `,` as the decimal separator; empty cells
/// are `None`.
pub fn parse_km(column: &str, raw: Option<&str>) -> Result<Option<f64>, RecordError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let normalized = if raw.contains(',') && !raw.contains('.') {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };

    let value: f64 = normalized.parse().map_err(|_| RecordError::NotNumeric {
        column: column.to_string(),
        value: raw.to_string(),
    })?;

    if !value.is_finite() {
        return Err(RecordError::OutOfDomain {
            column: column.to_string(),
            value,
        });
    }
    Ok(Some(value))
}

/// Like [`parse_km`] but rejects negative values.
fn parse_distance(column: &str, raw: Option<&str>) -> Result<Option<f64>, RecordError> {
    match parse_km(column, raw)? {
        Some(value) if value < 0.0 => Err(RecordError::OutOfDomain {
            column: column.to_string(),
            value,
        }),
        other => Ok(other),
    }
}

/// Recorded KM Master may be negative; the KM Master rule flags those.
fn parse_km_master(raw: Option<&str>) -> Result<Option<f64>, RecordError> {
    parse_km("KM Master", raw)
}
