//! CSV and JSON renderings of the current batch.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::record::{RiskRecord, RiskRow};

pub const CSV_COLUMNS: [&str; 11] = [
    "county",
    "timestamp",
    "temperature_f",
    "wind_speed",
    "wind_direction",
    "relative_humidity",
    "conditions",
    "drought_level",
    "active_fires_nearby",
    "risk_score",
    "fire_danger_level",
];

pub fn rows<'a>(records: impl IntoIterator<Item = &'a RiskRecord>) -> Vec<RiskRow> {
    records.into_iter().map(RiskRecord::to_row).collect()
}

/// One header line, then one row per record in iteration order.
pub fn write_csv<W: Write>(out: W, rows: &[RiskRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    if rows.is_empty() {
        wtr.write_record(CSV_COLUMNS).context("csv: header")?;
    }
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("csv: row for {}", row.county))?;
    }
    wtr.flush().context("csv: flush")?;
    Ok(())
}

pub fn to_csv_string(rows: &[RiskRow]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, rows)?;
    String::from_utf8(buf).context("csv: output is not utf-8")
}

pub fn to_json(rows: &[RiskRow]) -> Result<String> {
    serde_json::to_string_pretty(rows).context("json: serialize rows")
}

/// Write the CSV next to `path` and rename it into place.
pub fn write_csv_file(path: &Path, rows: &[RiskRow]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let tmp = path.with_extension("csv.tmp");
    let file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    write_csv(file, rows)?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    tracing::info!(target: "engine", path = %path.display(), rows = rows.len(), "export written");
    Ok(())
}
