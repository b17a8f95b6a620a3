use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::ColumnNames;
use crate::error::ValidationError;
use crate::models::EventRecord;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

#[derive(Debug, Clone, Default)]
pub struct NormalizedRecords {
    /// Sorted ascending by timestamp.
    pub records: Vec<EventRecord>,
    pub dropped: usize,
}

pub fn read_records_from_path(
    path: &Path,
    columns: &ColumnNames,
) -> Result<NormalizedRecords, ValidationError> {
    let file = std::fs::File::open(path)?;
    read_records(file, columns)
}

pub fn read_records<R: Read>(
    source: R,
    columns: &ColumnNames,
) -> Result<NormalizedRecords, ValidationError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|header| header == name);

    let missing: Vec<String> = columns
        .required()
        .iter()
        .filter(|&&name| position(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    // All four are present after the check above.
    let [timestamp_idx, program_idx, state_idx, id_idx] =
        columns.required().map(|name| position(name).unwrap_or_default());

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row?;
        let field = |idx: usize| row.get(idx).unwrap_or_default().to_string();

        let Some(timestamp) = row.get(timestamp_idx).and_then(parse_timestamp) else {
            dropped += 1;
            continue;
        };

        records.push(EventRecord {
            timestamp,
            program: field(program_idx),
            state: field(state_idx),
            unique_id: field(id_idx),
        });
    }

    if records.is_empty() {
        return Err(ValidationError::NoValidTimestamps { dropped });
    }

    records.sort_by_key(|record| record.timestamp);

    Ok(NormalizedRecords { records, dropped })
}

/// Parses the timestamp formats seen in contact exports. Offsets are normalised to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
