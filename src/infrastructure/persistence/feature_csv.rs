//! CSV input of feature tables and output of regime series.
//!
//! Feature files carry the timestamp in the first column (epoch milliseconds
//! or an RFC 3339 / ISO date-time) followed by one numeric column per
//! feature. Empty cells and `NaN` are read as missing values.

use crate::domain::market::feature_table::FeatureTable;
use crate::domain::market::market_regime::{REGIME_COLUMN, RegimeSeries, proba_column_name};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::info;

pub fn read_feature_table(path: &Path) -> Result<FeatureTable> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let table = read_feature_table_from(BufReader::new(file))
        .with_context(|| format!("Failed to read features from {}", path.display()))?;
    info!(
        "Loaded {} rows x {} features from {:?}",
        table.len(),
        table.n_features(),
        path
    );
    Ok(table)
}

pub fn read_feature_table_from<R: Read>(reader: R) -> Result<FeatureTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Missing CSV header")?.clone();
    if headers.len() < 2 {
        bail!("Expected a timestamp column followed by at least one feature column");
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", line + 1))?;
        let mut fields = record.iter();
        let stamp = fields.next().unwrap_or_default();
        index.push(
            parse_timestamp(stamp).with_context(|| format!("Bad timestamp on record {}", line + 1))?,
        );
        let row = fields
            .enumerate()
            .map(|(col, cell)| {
                parse_cell(cell).with_context(|| {
                    format!("Bad value in column '{}' on record {}", headers.get(col + 1).unwrap_or("?"), line + 1)
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    Ok(FeatureTable::from_rows(index, columns, &rows)?)
}

/// Epoch milliseconds, RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &str) -> Result<i64> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(dt.timestamp_millis());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc().timestamp_millis());
    }
    bail!("Unrecognized timestamp '{}'", raw)
}

fn parse_cell(cell: &str) -> Result<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .with_context(|| format!("'{}' is not a number", cell))
}

pub fn write_regime_series(path: &Path, series: &RegimeSeries) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_regime_series_to(file, series)?;
    info!(
        "Wrote {} regime rows ({} committed) to {:?}",
        series.len(),
        series.committed_count(),
        path
    );
    Ok(())
}

/// `timestamp,regime,regime_proba_0..`, with empty cells on unset rows.
pub fn write_regime_series_to<W: Write>(writer: W, series: &RegimeSeries) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["timestamp".to_string(), REGIME_COLUMN.to_string()];
    header.extend((0..series.n_components()).map(proba_column_name));
    wtr.write_record(&header)?;

    for (stamp, row) in series.index().iter().zip(series.rows()) {
        let mut record = vec![stamp.to_string()];
        match row {
            Some(assignment) => {
                record.push(assignment.regime.to_string());
                record.extend(assignment.posterior.probabilities().iter().map(|p| p.to_string()));
            }
            None => {
                record.extend(std::iter::repeat_n(String::new(), series.n_components() + 1));
            }
        }
        wtr.write_record(&record)?;
    }
    wtr.flush().context("Failed to flush regime CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::InputError;
    use crate::domain::market::market_regime::Posterior;

    #[test]
    fn test_reads_features_with_missing_values() {
        let input = "timestamp,ret,vol\n1000,0.1,\n2000,NaN,0.5\n3000,-0.2,0.7\n";
        let table = read_feature_table_from(input.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns(), &["ret".to_string(), "vol".to_string()]);
        assert_eq!(table.index(), &[1000, 2000, 3000]);
        assert!(table.values()[[0, 1]].is_nan());
        assert!(table.values()[[1, 0]].is_nan());
        assert_eq!(table.values()[[2, 1]], 0.7);
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000000").unwrap(), 1_700_000_000_000);
        assert_eq!(parse_timestamp("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert_eq!(parse_timestamp("1970-01-01 00:00:02").unwrap(), 2000);
        assert_eq!(parse_timestamp("1970-01-01 00:00:03+00:00").unwrap(), 3000);
        assert_eq!(parse_timestamp("1970-01-02").unwrap(), 86_400_000);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let input = "timestamp,a,b\n1,1.0,2.0\n2,3.0\n";
        let err = read_feature_table_from(input.as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::NotTabular { row: 1, .. })
        ));
    }

    #[test]
    fn test_non_increasing_index_rejected() {
        let input = "timestamp,a\n2,1.0\n1,2.0\n";
        let err = read_feature_table_from(input.as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::NonIncreasingIndex { .. })
        ));
    }

    #[test]
    fn test_writes_unset_rows_as_empty_cells() {
        let mut series = RegimeSeries::unset(vec![10, 20], 2);
        series.commit(1, Posterior::new(vec![0.25, 0.75]));

        let mut out = Vec::new();
        write_regime_series_to(&mut out, &series).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,regime,regime_proba_0,regime_proba_1");
        assert_eq!(lines[1], "10,,,");
        assert_eq!(lines[2], "20,1,0.25,0.75");
    }
}
