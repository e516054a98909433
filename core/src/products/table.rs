//! Flat delimited tables: the on-disk form of every record and product.
//!
//! Floats are written with 7 decimals, NaN as `nan` and infinities as
//! `inf`/`-inf`. Every write goes to a temp file in the target directory
//! and is renamed into place.

use crate::prelude::{StageError, StageResult};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A fixed-layout row of float columns.
pub trait TableRow: Sized {
    /// Column names in on-disk order. The order is the contract, not the names.
    const COLUMNS: &'static [&'static str];
    /// Trailing columns older files may omit; they read back as NaN.
    const OPTIONAL_TRAILING: usize = 0;

    fn to_fields(&self) -> Vec<f64>;

    /// `fields` always holds exactly `COLUMNS.len()` values.
    fn from_fields(fields: &[f64]) -> Self;
}

pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let token = if value > 0.0 { "inf" } else { "-inf" };
        token.to_string()
    } else {
        format!("{:.7}", value)
    }
}

/// Parses a numeric token; accepts `nan`, `inf` and boolean flags.
pub fn parse_value(token: &str) -> Option<f64> {
    let token = token.trim().to_ascii_lowercase();
    match token.as_str() {
        "" | "nan" => Some(f64::NAN),
        "true" => Some(1.0),
        "false" => Some(0.0),
        other => other.parse().ok(),
    }
}

pub fn read_rows<T: TableRow>(path: &Path) -> StageResult<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|err| StageError::csv(path, err))?;

    let width = T::COLUMNS.len();
    let required = width - T::OPTIONAL_TRAILING;
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| StageError::csv(path, err))?;
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        if record.len() < required {
            return Err(StageError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("expected {} columns, found {}", required, record.len()),
            });
        }
        let mut fields = Vec::with_capacity(width);
        for token in record.iter().take(width) {
            let value = parse_value(token).ok_or_else(|| StageError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("not a number: {token:?}"),
            })?;
            fields.push(value);
        }
        fields.resize(width, f64::NAN);
        rows.push(T::from_fields(&fields));
    }
    Ok(rows)
}

/// Writes `rows` as a headerless TSV, replacing `path` atomically.
pub fn write_rows<T: TableRow>(path: &Path, rows: &[T]) -> StageResult<()> {
    let records = rows
        .iter()
        .map(|row| row.to_fields().into_iter().map(format_value).collect());
    write_delimited(path, b'\t', None, records)
}

/// Writes string records, creating the parent directory when needed.
pub fn write_delimited<I>(
    path: &Path,
    delimiter: u8,
    header: Option<&[String]>,
    records: I,
) -> StageResult<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    persist_atomically(path, |file| {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_writer(file);
        if let Some(columns) = header {
            writer
                .write_record(columns)
                .map_err(|err| StageError::csv(path, err))?;
        }
        for record in records {
            writer
                .write_record(&record)
                .map_err(|err| StageError::csv(path, err))?;
        }
        writer.flush().map_err(|err| StageError::io(path, err))
    })
}

/// Fills a temp file next to `path` and renames it over `path`.
pub fn persist_atomically<F>(path: &Path, fill: F) -> StageResult<()>
where
    F: FnOnce(&mut NamedTempFile) -> StageResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| StageError::io(dir, err))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|err| StageError::io(dir, err))?;
    fill(&mut temp)?;
    temp.flush().map_err(|err| StageError::io(temp.path(), err))?;
    temp.persist(path)
        .map_err(|err| StageError::io(path, err.error))?;
    Ok(())
}
