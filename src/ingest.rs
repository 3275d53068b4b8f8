// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch import of structured occurrence rows
//!
//! Rows come from a CSV export (one occurrence per record, header row first)
//! or from JSONL (one occurrence object per line). Field names are matched
//! loosely (case, whitespace and a leading byte-order mark do not matter,
//! several aliases per field) and the row is rendered into a markdown report
//! whose last section is the incident summary, so imported reports rank and
//! excerpt like submitted ones.

use indicatif::ProgressBar;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::embedding::{embed_with_retry, EmbeddingProvider, RetryPolicy};
use crate::errors::Result;
use crate::store::{NewRecord, RecordStore, ORIGIN_IMPORTED};
use crate::summary::DEFAULT_SECTION;

const REFERENCE_KEYS: &[&str] = &[
    "Reference Number",
    "Occurrence Number",
    "Cadors Number",
    "CADORS No",
    "CADORS #",
    "Reference",
];
const DATE_KEYS: &[&str] = &["Occurrence Date", "Event Date", "Date"];
const TIME_KEYS: &[&str] = &["Occurrence Time", "Time"];
const TYPE_KEYS: &[&str] = &["Occurrence Type", "Type"];
const AERODROME_KEYS: &[&str] = &["Aerodrome Name", "Aerodrome"];
const LOCATION_KEYS: &[&str] = &["Occurrence Location", "Location"];
const PROVINCE_KEYS: &[&str] = &["Province"];
const COUNTRY_KEYS: &[&str] = &["Country"];
const REGISTRATION_KEYS: &[&str] = &["Registration", "Aircraft Registration"];
const MAKE_KEYS: &[&str] = &["Make", "Aircraft Make"];
const MODEL_KEYS: &[&str] = &["Model", "Aircraft Model"];
const PHASE_KEYS: &[&str] = &["Phase of Flight", "Phase"];
const OPERATOR_KEYS: &[&str] = &["Operator"];
const NARRATIVE_KEYS: &[&str] = &[
    "All Narrative (Delimited by Date)",
    "Narrative",
    "Summary",
];

/// Placeholder for fields a row does not provide.
const MISSING: &str = "-";

/// Layout of an import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Jsonl,
}

impl ImportFormat {
    /// CSV for `.csv` files, JSONL otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ImportFormat::Csv,
            _ => ImportFormat::Jsonl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Embed each report while importing
    pub embed: bool,
    /// Stop after this many rows
    pub max_rows: Option<usize>,
    /// Scope tag given to every imported record
    pub origin: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            embed: false,
            max_rows: None,
            origin: ORIGIN_IMPORTED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub duplicates: usize,
    /// Inserted rows whose embedding could not be obtained
    pub embed_failures: usize,
}

/// One input row with normalized field names.
#[derive(Debug, Clone, Default)]
pub struct ImportRow {
    fields: HashMap<String, String>,
}

impl ImportRow {
    /// Builds a row from a JSON object. Scalars are kept as text; nulls,
    /// arrays and nested objects are ignored.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let fields = object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((normalize_key(key), text))
            })
            .collect();
        Some(Self { fields })
    }

    /// Builds a row from a CSV record and the file's header row.
    pub fn from_csv(headers: &csv::StringRecord, record: &csv::StringRecord) -> Self {
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(key, value)| (normalize_key(key), value.trim().to_string()))
            .collect();
        Self { fields }
    }

    /// First non-empty value among `keys`.
    pub fn get(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.fields.get(&normalize_key(key)))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }

    fn field(&self, keys: &[&str]) -> &str {
        self.get(keys).unwrap_or(MISSING)
    }

    pub fn reference(&self) -> Option<&str> {
        self.get(REFERENCE_KEYS)
    }
}

/// Drops a byte-order mark, lowercases and collapses whitespace.
pub fn normalize_key(key: &str) -> String {
    key.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Renders a row as a markdown report. Rows without a reference yield `None`.
pub fn build_report(row: &ImportRow) -> Option<(String, String)> {
    let reference = row.reference()?.to_string();

    let date_time = match row.get(TIME_KEYS) {
        Some(time) => format!("{} {}", row.field(DATE_KEYS), time),
        None => row.field(DATE_KEYS).to_string(),
    };
    let aircraft = match row.get(MODEL_KEYS) {
        Some(model) => format!("{} {}", row.field(MAKE_KEYS), model),
        None => row.field(MAKE_KEYS).to_string(),
    };

    let lines = [
        format!("### Occurrence {}", reference),
        format!("- Occurrence Date/Time: {}", date_time),
        format!("- Type: {}", row.field(TYPE_KEYS)),
        format!(
            "- Location: {} / {} / {} / {}",
            row.field(LOCATION_KEYS),
            row.field(AERODROME_KEYS),
            row.field(PROVINCE_KEYS),
            row.field(COUNTRY_KEYS)
        ),
        format!(
            "- Aircraft: {} / {}",
            row.field(REGISTRATION_KEYS),
            aircraft
        ),
        format!("- Phase: {}", row.field(PHASE_KEYS)),
        format!("- Operator: {}", row.field(OPERATOR_KEYS)),
        String::new(),
        format!("### {}", DEFAULT_SECTION),
        row.field(NARRATIVE_KEYS).to_string(),
    ];

    Some((lines.join("\n"), reference))
}

enum RowOutcome {
    Inserted { embedded: bool },
    Duplicate,
    Skipped,
}

/// Imports JSONL rows into `store`.
///
/// Blank lines are ignored. Unparseable lines and rows without a reference
/// are counted as skipped. An embedding failure keeps the row with a null
/// vector for a later backfill.
pub fn import_jsonl<R, S>(
    reader: R,
    store: &mut S,
    mut embedder: Option<(&mut dyn EmbeddingProvider, &RetryPolicy)>,
    options: &ImportOptions,
    progress: &ProgressBar,
) -> Result<ImportStats>
where
    R: BufRead,
    S: RecordStore + ?Sized,
{
    let mut stats = ImportStats::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if options.max_rows.is_some_and(|max| stats.total >= max) {
            break;
        }

        let row = serde_json::from_str::<Value>(&line)
            .ok()
            .as_ref()
            .and_then(ImportRow::from_json);
        if row.is_none() {
            warn!("Skipping line {}: not a JSON object", line_no + 1);
        }
        add_row(&mut stats, row, line_no + 1, store, &mut embedder, options);
        progress.inc(1);
    }

    Ok(stats)
}

/// Imports CSV records into `store`. The first record is the header row.
///
/// Quoted fields may span lines. Records the parser cannot read are counted
/// as skipped; otherwise rows are handled as in [`import_jsonl`].
pub fn import_csv<R, S>(
    reader: R,
    store: &mut S,
    mut embedder: Option<(&mut dyn EmbeddingProvider, &RetryPolicy)>,
    options: &ImportOptions,
    progress: &ProgressBar,
) -> Result<ImportStats>
where
    R: Read,
    S: RecordStore + ?Sized,
{
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut stats = ImportStats::default();

    for result in reader.records() {
        if options.max_rows.is_some_and(|max| stats.total >= max) {
            break;
        }

        let (row, line) = match result {
            Ok(record) => {
                let line = record.position().map_or(0, |p| p.line() as usize);
                (Some(ImportRow::from_csv(&headers, &record)), line)
            }
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                let line = err.position().map_or(0, |p| p.line() as usize);
                warn!("Skipping line {}: {}", line, err);
                (None, line)
            }
        };
        add_row(&mut stats, row, line, store, &mut embedder, options);
        progress.inc(1);
    }

    Ok(stats)
}

/// Counts one input row, inserting it when it yields a new report.
fn add_row<S: RecordStore + ?Sized>(
    stats: &mut ImportStats,
    row: Option<ImportRow>,
    line: usize,
    store: &mut S,
    embedder: &mut Option<(&mut dyn EmbeddingProvider, &RetryPolicy)>,
    options: &ImportOptions,
) {
    stats.total += 1;
    let Some(row) = row else {
        stats.skipped += 1;
        return;
    };

    let embedder = if options.embed {
        embedder.as_mut().map(|(p, r)| (&mut **p, *r))
    } else {
        None
    };

    match import_row(&row, store, embedder, options) {
        Ok(RowOutcome::Inserted { embedded }) => {
            stats.inserted += 1;
            if options.embed && !embedded {
                stats.embed_failures += 1;
            }
        }
        Ok(RowOutcome::Duplicate) => stats.duplicates += 1,
        Ok(RowOutcome::Skipped) => stats.skipped += 1,
        Err(err) => {
            warn!("Insert failed on line {}: {}", line, err);
            stats.skipped += 1;
        }
    }
}

fn import_row<'p, S: RecordStore + ?Sized>(
    row: &ImportRow,
    store: &mut S,
    embedder: Option<(&mut (dyn EmbeddingProvider + 'p), &RetryPolicy)>,
    options: &ImportOptions,
) -> Result<RowOutcome> {
    let Some((text, reference)) = build_report(row) else {
        debug!("Skipping row without a reference");
        return Ok(RowOutcome::Skipped);
    };

    if store.find_by_external_ref(&reference)?.is_some() {
        return Ok(RowOutcome::Duplicate);
    }

    let mut record = NewRecord::new(text.as_str())
        .with_origin(options.origin.as_str())
        .with_external_ref(reference.as_str());

    let mut embedded = false;
    if let Some((provider, retry)) = embedder {
        match embed_with_retry(provider, &text, retry, store.dimension()?) {
            Ok(vector) => {
                record = record.with_vector(vector);
                embedded = true;
            }
            Err(err) => warn!("Embedding failed for {}: {}", reference, err),
        }
    }

    store.insert_record(record)?;
    Ok(RowOutcome::Inserted { embedded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::store::MemoryRecordStore;
    use crate::summary::{extract_summary, SummaryOptions};
    use std::io::Cursor;

    fn row(json: &str) -> ImportRow {
        ImportRow::from_json(&serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn keys_are_matched_loosely() {
        let r = row(r#"{"  CADORS   Number ": "2024O1234", "occurrence date": "2024-03-01"}"#);
        assert_eq!(r.reference(), Some("2024O1234"));
        assert_eq!(r.get(DATE_KEYS), Some("2024-03-01"));
        assert_eq!(r.get(TIME_KEYS), None);
    }

    #[test]
    fn numbers_become_text_and_empty_values_fall_through() {
        let r = row(r#"{"Reference": 42, "Occurrence Type": "", "Type": "Incident"}"#);
        assert_eq!(r.reference(), Some("42"));
        assert_eq!(r.get(TYPE_KEYS), Some("Incident"));
    }

    #[test]
    fn report_ends_with_incident_summary() {
        let r = row(
            r#"{"Occurrence Number": "A1", "Date": "2024-01-02", "Time": "1200Z",
                "Make": "DHC", "Model": "DHC-8", "Narrative": "Engine fire on climb."}"#,
        );
        let (text, reference) = build_report(&r).unwrap();
        assert_eq!(reference, "A1");
        assert!(text.starts_with("### Occurrence A1\n"));
        assert!(text.contains("- Occurrence Date/Time: 2024-01-02 1200Z"));
        assert!(text.contains("- Aircraft: - / DHC DHC-8"));
        assert!(text.contains("- Phase: -"));
        assert_eq!(
            extract_summary(&text, &SummaryOptions::default()),
            "Engine fire on climb."
        );
    }

    #[test]
    fn rows_without_reference_are_not_reports() {
        assert!(build_report(&row(r#"{"Narrative": "text"}"#)).is_none());
        assert!(ImportRow::from_json(&serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn import_counts_and_deduplicates() {
        let input = r#"{"Reference": "R1", "Narrative": "Bird strike on approach."}
{"Reference": "R2", "Narrative": "Hydraulic failure after takeoff."}

{"Reference": "R1", "Narrative": "Bird strike on approach."}
{"Narrative": "no reference"}
not json
"#;
        let mut store = MemoryRecordStore::new();
        let stats = import_jsonl(
            Cursor::new(input),
            &mut store,
            None,
            &ImportOptions::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(
            stats,
            ImportStats {
                total: 5,
                inserted: 2,
                skipped: 2,
                duplicates: 1,
                embed_failures: 0,
            }
        );
        let coverage = store.coverage(Some(ORIGIN_IMPORTED)).unwrap();
        assert_eq!(coverage.total, 2);
        assert_eq!(coverage.missing, 2);
        assert!(store.find_by_external_ref("R2").unwrap().is_some());
    }

    #[test]
    fn csv_import_handles_bom_and_multiline_narratives() {
        let input = "\u{feff}CADORS Number,Occurrence Date,Narrative\n\
                     2024O0001,2024-01-01,\"Bird strike on approach.\nWindshield cracked.\"\n\
                     2024O0002,2024-01-02,Hydraulic failure after takeoff.\n\
                     2024O0001,2024-01-01,Duplicate row\n\
                     ,2024-01-03,Row without a reference\n";
        let mut store = MemoryRecordStore::new();
        let stats = import_csv(
            Cursor::new(input),
            &mut store,
            None,
            &ImportOptions::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(
            stats,
            ImportStats {
                total: 4,
                inserted: 2,
                skipped: 1,
                duplicates: 1,
                embed_failures: 0,
            }
        );
        let id = store.find_by_external_ref("2024O0001").unwrap().unwrap();
        let text = store.get_record(&id).unwrap().text;
        assert!(text.contains("- Occurrence Date/Time: 2024-01-01"));
        assert_eq!(
            extract_summary(&text, &SummaryOptions::default()),
            "Bird strike on approach.\nWindshield cracked."
        );
    }

    #[test]
    fn csv_row_limit_and_format_detection() {
        let input = "Reference,Narrative\nR1,Bird strike.\nR2,Engine fire.\nR3,Runway excursion.\n";
        let mut store = MemoryRecordStore::new();
        let options = ImportOptions {
            max_rows: Some(2),
            ..Default::default()
        };
        let stats = import_csv(
            Cursor::new(input),
            &mut store,
            None,
            &options,
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.inserted, 2);

        assert_eq!(ImportFormat::from_path(Path::new("cadors.CSV")), ImportFormat::Csv);
        assert_eq!(ImportFormat::from_path(Path::new("rows.jsonl")), ImportFormat::Jsonl);
    }

    #[test]
    fn import_with_embeddings_and_row_limit() {
        let input = r#"{"Reference": "R1", "Narrative": "Bird strike on approach."}
{"Reference": "R2", "Narrative": "Hydraulic failure after takeoff."}
{"Reference": "R3", "Narrative": "Runway incursion by a vehicle."}
"#;
        let mut store = MemoryRecordStore::new();
        let mut hashing = HashingProvider::new(64);
        let provider: &mut dyn EmbeddingProvider = &mut hashing;
        let retry = RetryPolicy::none();
        let options = ImportOptions {
            embed: true,
            max_rows: Some(2),
            ..Default::default()
        };
        let stats = import_jsonl(
            Cursor::new(input),
            &mut store,
            Some((provider, &retry)),
            &options,
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.inserted, 2);
        assert_eq!(store.coverage(None).unwrap().with_vector, 2);
        assert_eq!(store.dimension().unwrap(), Some(64));
    }
}
