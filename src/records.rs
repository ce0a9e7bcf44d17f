//! Schema-driven reads and writes over the open-ended domain tables.
//!
//! Reads are public. Writes are crate-internal and reached through
//! [`crate::policy::AccessGate`], which checks the caller's session first.
//! Identifier values are compared by SQLite's column affinity rules, so a text
//! id such as `"7"` matches an INTEGER column holding `7`.

use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{CellValue, TableData};
use crate::schema::{describe_on, quote_identifier, validate_table_on};
use rusqlite::{params_from_iter, OptionalExtension};
use std::collections::BTreeMap;

pub const STATUS_CHOICES: &[&str] = &["open", "in_progress", "closed", "resolved"];

#[derive(Debug, Clone)]
pub struct RecordAccessor {
    db: Database,
}

impl RecordAccessor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn read_all(&self, table: &str) -> AppResult<TableData> {
        let conn = self.db.connect()?;
        let table = validate_table_on(&conn, table)?;
        let sql = format!("SELECT * FROM {}", quote_identifier(&table));
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|index| row.get_ref(index).map(CellValue::from_value_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(TableData { table, columns, rows })
    }

    /// Types an identifier received as text. Integer-looking text becomes an
    /// integer when the identifier column stores integers; otherwise it stays text.
    pub fn identifier_value(&self, table: &str, id_column: Option<&str>, raw: &str) -> AppResult<CellValue> {
        let conn = self.db.connect()?;
        let schema = describe_on(&conn, table)?;
        let id_column = match id_column {
            Some(name) => schema.require_column(name)?,
            None => schema.identifier.as_str(),
        };

        let Ok(parsed) = raw.trim().parse::<i64>() else {
            return Ok(CellValue::Text(raw.to_string()));
        };
        let sql = format!(
            "SELECT typeof({col}) FROM {table} WHERE {col} IS NOT NULL LIMIT 1",
            col = quote_identifier(id_column),
            table = quote_identifier(&schema.table)
        );
        let stored_type: Option<String> = conn.query_row(&sql, [], |row| row.get(0)).optional()?;
        Ok(match stored_type.as_deref() {
            Some("integer") => CellValue::Integer(parsed),
            _ => CellValue::Text(raw.to_string()),
        })
    }

    /// Sets `column` on every row whose `id_column` equals `id_value`.
    pub(crate) fn update_single_column(
        &self,
        table: &str,
        id_column: &str,
        id_value: &CellValue,
        column: &str,
        new_value: &CellValue,
    ) -> AppResult<usize> {
        let conn = self.db.connect()?;
        let schema = describe_on(&conn, table)?;
        let id_column = schema.require_column(id_column)?;
        let column = schema.require_column(column)?;

        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote_identifier(&schema.table),
            quote_identifier(column),
            quote_identifier(id_column)
        );
        let affected = conn.execute(&sql, rusqlite::params![new_value, id_value])?;
        tracing::info!(table = %schema.table, column = %column, id = %id_value, affected, "record column updated");
        Ok(affected)
    }

    /// Status update keyed on the inferred identifier column.
    pub(crate) fn update_status(&self, table: &str, id_value: &CellValue, new_status: &str) -> AppResult<usize> {
        if !STATUS_CHOICES.contains(&new_status) {
            return Err(AppError::Validation(format!(
                "status '{}' is not one of {}",
                new_status,
                STATUS_CHOICES.join(", ")
            )));
        }

        let conn = self.db.connect()?;
        let schema = describe_on(&conn, table)?;
        let Some(status_column) = schema.status.as_deref() else {
            return Err(AppError::Validation(format!("table '{}' has no status column", schema.table)));
        };
        drop(conn);

        self.update_single_column(
            table,
            &schema.identifier,
            id_value,
            status_column,
            &CellValue::Text(new_status.to_string()),
        )
    }

    /// Inserts the mapped columns that exist in the table; the rest take their
    /// storage defaults. Returns the new rowid.
    pub(crate) fn insert_record(&self, table: &str, field_values: &BTreeMap<String, CellValue>) -> AppResult<i64> {
        let conn = self.db.connect()?;
        let schema = describe_on(&conn, table)?;

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<&CellValue> = Vec::new();
        for (name, value) in field_values {
            let Some(stored) = schema.column(name) else {
                tracing::debug!(table = %schema.table, column = %name, "dropping unknown column from insert");
                continue;
            };
            if columns.contains(&stored) {
                return Err(AppError::Validation(format!("column '{}' given more than once", stored)));
            }
            columns.push(stored);
            values.push(value);
        }

        if columns.is_empty() {
            return Err(AppError::Validation(format!(
                "No valid columns found for insertion into '{}'",
                schema.table
            )));
        }

        let placeholders = (1..=columns.len())
            .map(|index| format!("?{}", index))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&schema.table),
            columns
                .iter()
                .map(|column| quote_identifier(column))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders
        );
        conn.execute(&sql, params_from_iter(values))?;
        let row_id = conn.last_insert_rowid();
        tracing::info!(table = %schema.table, columns = columns.len(), row_id, "record inserted");
        Ok(row_id)
    }

    pub(crate) fn delete_record(&self, table: &str, id_column: &str, id_value: &CellValue) -> AppResult<usize> {
        let conn = self.db.connect()?;
        let schema = describe_on(&conn, table)?;
        let id_column = schema.require_column(id_column)?;

        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_identifier(&schema.table),
            quote_identifier(id_column)
        );
        let affected = conn.execute(&sql, [id_value])?;
        tracing::info!(table = %schema.table, id = %id_value, affected, "records deleted");
        Ok(affected)
    }

    pub(crate) fn drop_table(&self, table: &str) -> AppResult<()> {
        let conn = self.db.connect()?;
        let table = validate_table_on(&conn, table)?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(&table)))?;
        tracing::warn!(table = %table, "table dropped");
        Ok(())
    }
}
