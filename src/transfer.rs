//! CSV in and out of the store.
//!
//! Export renders any user table. Ingestion loads a directory of CSV files,
//! one table per file, replacing a table of the same name.

use crate::db::{Database, USERS_TABLE};
use crate::errors::{AppError, AppResult};
use crate::models::CellValue;
use crate::records::RecordAccessor;
use crate::schema::quote_identifier;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    fn convert(self, raw: &str) -> CellValue {
        if raw.trim().is_empty() {
            return CellValue::Null;
        }
        let trimmed = raw.trim();
        match self {
            Self::Integer => trimmed
                .parse::<i64>()
                .map(CellValue::Integer)
                .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
            Self::Real => trimmed
                .parse::<f64>()
                .map(CellValue::Real)
                .unwrap_or_else(|_| CellValue::Text(raw.to_string())),
            Self::Text => CellValue::Text(raw.to_string()),
        }
    }
}

/// Narrowest type every non-empty value fits; all-empty columns are TEXT.
pub fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let mut integer = true;
    let mut real = true;
    for value in values.map(str::trim).filter(|value| !value.is_empty()) {
        seen = true;
        integer = integer && value.parse::<i64>().is_ok();
        real = real && value.parse::<f64>().is_ok();
        if !real {
            break;
        }
    }
    match (seen, integer, real) {
        (false, _, _) => ColumnType::Text,
        (true, true, _) => ColumnType::Integer,
        (true, false, true) => ColumnType::Real,
        _ => ColumnType::Text,
    }
}

/// Table name for a CSV file: the file stem with `-` turned into `_`.
pub fn table_name_for(path: &Path) -> AppResult<String> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.replace('-', "_"))
        .filter(|stem| !stem.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("cannot name a table after {}", path.display())))?;

    if stem.eq_ignore_ascii_case(USERS_TABLE) || stem.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(AppError::Validation(format!("refusing to overwrite reserved table '{}'", stem)));
    }
    Ok(stem)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestReport {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<(String, ColumnType)>,
}

#[derive(Debug, Clone)]
pub struct CsvTransfer {
    db: Database,
    records: RecordAccessor,
}

impl CsvTransfer {
    pub fn new(db: Database, records: RecordAccessor) -> Self {
        Self { db, records }
    }

    /// Operator-level drop used by the CLI, next to ingestion.
    pub fn drop_table(&self, table: &str) -> AppResult<()> {
        self.records.drop_table(table)
    }

    pub fn export_csv(&self, table: &str) -> AppResult<String> {
        let data = self.records.read_all(table)?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&data.columns)?;
        for row in &data.rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| AppError::Io(format!("failed to finish CSV export: {}", err)))?;
        String::from_utf8(bytes).map_err(|err| AppError::Internal(err.to_string()))
    }

    /// Every `*.csv` directly inside `dir`, in file-name order. All files are
    /// parsed before any table is touched, and the tables are replaced in one
    /// transaction: a bad file leaves the store as it was.
    pub fn ingest_dir(&self, dir: &Path) -> AppResult<Vec<IngestReport>> {
        let mut paths = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        paths.sort();

        if paths.is_empty() {
            tracing::warn!(dir = %dir.display(), "no CSV files to ingest");
        }

        let parsed = paths
            .iter()
            .map(|path| ParsedCsv::read(path))
            .collect::<AppResult<Vec<_>>>()?;
        self.replace_tables(parsed)
    }

    pub fn ingest_file(&self, path: &Path) -> AppResult<IngestReport> {
        let mut reports = self.replace_tables(vec![ParsedCsv::read(path)?])?;
        reports
            .pop()
            .ok_or_else(|| AppError::Internal(format!("no report for {}", path.display())))
    }

    fn replace_tables(&self, parsed: Vec<ParsedCsv>) -> AppResult<Vec<IngestReport>> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;
        for csv in &parsed {
            csv.write(&tx)?;
        }
        tx.commit()?;

        Ok(parsed
            .into_iter()
            .map(|csv| {
                tracing::info!(table = %csv.table, rows = csv.records.len(), file = %csv.source, "CSV ingested");
                IngestReport {
                    table: csv.table,
                    rows: csv.records.len(),
                    columns: csv.headers.into_iter().zip(csv.types).collect(),
                }
            })
            .collect())
    }
}

/// One CSV file, checked and typed, not yet written.
struct ParsedCsv {
    source: String,
    table: String,
    headers: Vec<String>,
    types: Vec<ColumnType>,
    records: Vec<csv::StringRecord>,
}

impl ParsedCsv {
    fn read(path: &Path) -> AppResult<Self> {
        let table = table_name_for(path)?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect::<Vec<_>>();
        if headers.is_empty() || headers.iter().any(String::is_empty) {
            return Err(AppError::Validation(format!("{} has a blank column header", path.display())));
        }
        for (index, header) in headers.iter().enumerate() {
            if headers[..index].iter().any(|earlier| earlier.eq_ignore_ascii_case(header)) {
                return Err(AppError::Validation(format!(
                    "{} repeats column '{}'",
                    path.display(),
                    header
                )));
            }
        }

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()?;
        let types = (0..headers.len())
            .map(|index| infer_column_type(records.iter().map(|record| record.get(index).unwrap_or(""))))
            .collect::<Vec<_>>();

        Ok(Self {
            source: path.display().to_string(),
            table,
            headers,
            types,
            records,
        })
    }

    fn write(&self, tx: &rusqlite::Transaction<'_>) -> AppResult<()> {
        let quoted_table = quote_identifier(&self.table);
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quoted_table))?;
        let column_defs = self
            .headers
            .iter()
            .zip(&self.types)
            .map(|(name, kind)| format!("{} {}", quote_identifier(name), kind.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute_batch(&format!("CREATE TABLE {} ({})", quoted_table, column_defs))?;

        let placeholders = (1..=self.headers.len())
            .map(|index| format!("?{}", index))
            .collect::<Vec<_>>()
            .join(", ");
        let mut insert = tx.prepare(&format!("INSERT INTO {} VALUES ({})", quoted_table, placeholders))?;
        for record in &self.records {
            let values = self
                .types
                .iter()
                .enumerate()
                .map(|(index, kind)| kind.convert(record.get(index).unwrap_or("")))
                .collect::<Vec<_>>();
            insert.execute(rusqlite::params_from_iter(values.iter()))?;
        }
        Ok(())
    }
}
