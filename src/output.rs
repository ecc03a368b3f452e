//! Report writers for a cascade run.
//!
//! Produces the recommendation table, the unresolved-rows report (both CSV)
//! and a JSON run summary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::cascade::{CascadeReport, UnresolvedRow};
use crate::config::CascadeConfig;
use crate::error::Exclusion;
use crate::rules::SourceMethod;

pub const RECOMMENDATIONS_FILE: &str = "recommendations.csv";
pub const UNRESOLVED_FILE: &str = "unresolved.csv";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Serialize)]
struct RecommendationRow<'a> {
    #[serde(rename = "OP")]
    op: &'a str,
    #[serde(rename = "Toko")]
    toko: &'a str,
    #[serde(rename = "KM Master")]
    km_master: f64,
    #[serde(rename = "Recommended KM Master")]
    recommended_km_master: Option<f64>,
    #[serde(rename = "Source Method")]
    source_method: SourceMethod,
    #[serde(rename = "Deviation")]
    deviation: Option<f64>,
}

#[derive(Debug, Serialize)]
struct UnresolvedCsvRow<'a> {
    #[serde(rename = "OP")]
    op: &'a str,
    #[serde(rename = "Toko")]
    toko: &'a str,
    #[serde(rename = "KM Master")]
    km_master: f64,
    #[serde(rename = "Kode Zona")]
    zone_code: Option<&'a str>,
    #[serde(rename = "Provinsi")]
    province: Option<&'a str>,
    #[serde(rename = "Status Toko")]
    status: String,
    #[serde(rename = "Reasons")]
    reasons: String,
}

impl<'a> From<&'a UnresolvedRow> for UnresolvedCsvRow<'a> {
    fn from(row: &'a UnresolvedRow) -> Self {
        let reasons = row
            .reasons
            .iter()
            .map(|(method, reason)| format!("{method}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ");

        UnresolvedCsvRow {
            op: &row.record.key.op,
            toko: &row.record.key.toko,
            km_master: row.record.recorded_km_master,
            zone_code: row.record.zone_code.as_deref(),
            province: row.record.province.as_deref(),
            status: row.record.store_status.to_string(),
            reasons,
        }
    }
}

/// Counts per outcome for one run, written as `summary.json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub config: CascadeConfig,
    pub evaluated: usize,
    pub km_master: usize,
    pub km_tempuh: usize,
    pub master_zona: usize,
    pub unresolved: usize,
    pub excluded: usize,
    /// Input rows and stores dropped before or during the cascade.
    pub exclusions: Vec<Exclusion>,
}

impl RunSummary {
    /// `load_exclusions` are the rows the loader dropped; they are reported
    /// ahead of any the cascade itself excluded.
    pub fn new(
        report: &CascadeReport,
        load_exclusions: &[Exclusion],
        config: &CascadeConfig,
    ) -> Self {
        let exclusions: Vec<Exclusion> = load_exclusions
            .iter()
            .chain(report.excluded.iter())
            .cloned()
            .collect();

        RunSummary {
            generated_at: Utc::now(),
            config: config.clone(),
            evaluated: report.recommendations.len(),
            km_master: report.count(SourceMethod::KmMaster),
            km_tempuh: report.count(SourceMethod::KmTempuh),
            master_zona: report.count(SourceMethod::MasterZona),
            unresolved: report.unresolved.len(),
            excluded: exclusions.len(),
            exclusions,
        }
    }
}

/// Writes one row per evaluated store. Unresolved stores have empty
/// recommendation and deviation cells.
pub fn write_recommendations(path: &Path, report: &CascadeReport) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for rec in &report.recommendations {
        writer.serialize(RecommendationRow {
            op: &rec.key.op,
            toko: &rec.key.toko,
            km_master: rec.recorded_km_master,
            recommended_km_master: rec.recommended_km_master,
            source_method: rec.source_method,
            deviation: rec.deviation,
        })?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = report.recommendations.len(), "Wrote recommendations");
    Ok(())
}

/// Writes the stores needing manual review, with every rule's reason.
pub fn write_unresolved(path: &Path, report: &CascadeReport) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for row in &report.unresolved {
        writer.serialize(UnresolvedCsvRow::from(row))?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = report.unresolved.len(), "Wrote unresolved report");
    Ok(())
}

/// Serializes a value as pretty JSON into `path`.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Writes all three reports into `output_dir`, creating it if needed.
pub fn write_reports(
    output_dir: &Path,
    report: &CascadeReport,
    summary: &RunSummary,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    write_recommendations(&output_dir.join(RECOMMENDATIONS_FILE), report)?;
    write_unresolved(&output_dir.join(UNRESOLVED_FILE), report)?;
    write_json(&output_dir.join(SUMMARY_FILE), summary)?;

    info!(output_dir = %output_dir.display(), "Reports written");
    Ok(())
}

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
