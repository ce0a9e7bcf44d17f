//! Runtime discovery of user tables and of the columns that play a known role
//! (identifier, status, severity, ...) in them.
//!
//! Table and column names found here form the allow-list every query builder
//! checks before it puts an identifier into SQL text.

use crate::db::{Database, USERS_TABLE};
use crate::errors::{AppError, AppResult};
use rusqlite::Connection;
use serde::Serialize;

pub const IDENTIFIER_SUFFIX: &str = "id";

const STATUS_COLUMNS: &[&str] = &["status"];
const SEVERITY_COLUMNS: &[&str] = &["severity"];
const TIMESTAMP_COLUMNS: &[&str] = &["timestamp"];
const CATEGORY_COLUMNS: &[&str] = &["category"];
const DESCRIPTION_COLUMNS: &[&str] = &["description", "notes"];
const PRIORITY_COLUMNS: &[&str] = &["priority"];
const ASSIGNEE_COLUMNS: &[&str] = &["assigned_to", "assignee"];
const CREATED_AT_COLUMNS: &[&str] = &["created_at"];
const RESOLUTION_COLUMNS: &[&str] = &["resolution_time_hours"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: Option<String>,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Columns of one table plus the role columns resolved from their names.
/// Role fields hold the column name exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub identifier: String,
    pub status: Option<String>,
    pub severity: Option<String>,
    pub timestamp: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub created_at: Option<String>,
    pub resolution_hours: Option<String>,
}

impl TableSchema {
    pub fn from_columns(table: &str, columns: Vec<ColumnInfo>) -> AppResult<Self> {
        let names = columns.iter().map(|column| column.name.clone()).collect::<Vec<_>>();
        let identifier = infer_identifier_column(&names)
            .ok_or_else(|| AppError::Validation(format!("table '{}' has no columns", table)))?;
        let pick = |candidates: &[&str]| resolve_column(&names, candidates);

        Ok(Self {
            table: table.to_string(),
            identifier,
            status: pick(STATUS_COLUMNS),
            severity: pick(SEVERITY_COLUMNS),
            timestamp: pick(TIMESTAMP_COLUMNS),
            category: pick(CATEGORY_COLUMNS),
            description: pick(DESCRIPTION_COLUMNS),
            priority: pick(PRIORITY_COLUMNS),
            assignee: pick(ASSIGNEE_COLUMNS),
            created_at: pick(CREATED_AT_COLUMNS),
            resolution_hours: pick(RESOLUTION_COLUMNS),
            columns,
        })
    }

    /// Stored name of `name`, matched case-insensitively.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
            .map(|column| column.name.as_str())
    }

    pub fn require_column(&self, name: &str) -> AppResult<&str> {
        self.column(name).ok_or_else(|| {
            AppError::Validation(format!("column '{}' does not exist in table '{}'", name, self.table))
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn has_status_column(&self) -> bool {
        self.status.is_some()
    }

    pub fn has_severity_column(&self) -> bool {
        self.severity.is_some()
    }
}

/// First column whose name ends in [`IDENTIFIER_SUFFIX`], else the first column.
/// Nothing guarantees the result is unique per row.
pub fn infer_identifier_column(columns: &[String]) -> Option<String> {
    columns
        .iter()
        .find(|name| name.to_ascii_lowercase().ends_with(IDENTIFIER_SUFFIX))
        .or_else(|| columns.first())
        .cloned()
}

fn resolve_column(columns: &[String], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .find(|name| name.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn list_user_tables_on(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != ?1
         ORDER BY name ASC",
    )?;
    let tables = stmt
        .query_map([USERS_TABLE], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tables)
}

/// Stored name of a user table, or `NotFound` when `table` is not one.
pub(crate) fn validate_table_on(conn: &Connection, table: &str) -> AppResult<String> {
    list_user_tables_on(conn)?
        .into_iter()
        .find(|name| name == table)
        .ok_or_else(|| AppError::NotFound(format!("table '{}'", table)))
}

pub(crate) fn describe_on(conn: &Connection, table: &str) -> AppResult<TableSchema> {
    let table = validate_table_on(conn, table)?;
    let mut stmt = conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([&table], |row| {
            let declared_type: Option<String> = row.get(1)?;
            Ok(ColumnInfo {
                name: row.get(0)?,
                declared_type: declared_type.filter(|value| !value.is_empty()),
                not_null: row.get::<_, i64>(2)? != 0,
                primary_key: row.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    TableSchema::from_columns(&table, columns)
}

#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    db: Database,
}

impl SchemaIntrospector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list_user_tables(&self) -> AppResult<Vec<String>> {
        let conn = self.db.connect()?;
        list_user_tables_on(&conn)
    }

    pub fn describe(&self, table: &str) -> AppResult<TableSchema> {
        let conn = self.db.connect()?;
        describe_on(&conn, table)
    }

    pub fn infer_identifier_column(&self, table: &str) -> AppResult<String> {
        Ok(self.describe(table)?.identifier)
    }

    pub fn has_status_column(&self, table: &str) -> AppResult<bool> {
        Ok(self.describe(table)?.has_status_column())
    }

    pub fn has_severity_column(&self, table: &str) -> AppResult<bool> {
        Ok(self.describe(table)?.has_severity_column())
    }
}

#[cfg(test)]
mod tests {
    use super::{infer_identifier_column, quote_identifier, SchemaIntrospector};
    use crate::db::Database;
    use crate::errors::AppError;

    fn introspector() -> (tempfile::TempDir, SchemaIntrospector, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("data.db")).expect("db");
        let conn = db.connect().expect("connect");
        conn.execute_batch(
            "CREATE TABLE cyber_incidents (Incident_ID INTEGER, timestamp TEXT, Severity TEXT, Status TEXT, Notes TEXT);
             CREATE TABLE datasets_metadata (name TEXT, \"rows\" INTEGER, uploaded_by TEXT);",
        )
        .expect("seed tables");
        (dir, SchemaIntrospector::new(db.clone()), db)
    }

    #[test]
    fn user_tables_exclude_credentials() {
        let (_dir, introspector, _db) = introspector();
        let tables = introspector.list_user_tables().expect("list");
        assert_eq!(tables, vec!["cyber_incidents".to_string(), "datasets_metadata".to_string()]);
    }

    #[test]
    fn identifier_prefers_id_suffix_then_first_column() {
        let columns = vec!["name".to_string(), "Ticket_ID".to_string(), "id".to_string()];
        assert_eq!(infer_identifier_column(&columns).as_deref(), Some("Ticket_ID"));

        let columns = vec!["name".to_string(), "rows".to_string()];
        assert_eq!(infer_identifier_column(&columns).as_deref(), Some("name"));

        // "paid" ends in "id" too; the heuristic takes it.
        let columns = vec!["paid".to_string(), "ref".to_string()];
        assert_eq!(infer_identifier_column(&columns).as_deref(), Some("paid"));

        assert!(infer_identifier_column(&[]).is_none());
    }

    #[test]
    fn role_columns_resolve_case_insensitively() {
        let (_dir, introspector, _db) = introspector();
        let schema = introspector.describe("cyber_incidents").expect("describe");
        assert_eq!(schema.identifier, "Incident_ID");
        assert_eq!(schema.status.as_deref(), Some("Status"));
        assert_eq!(schema.severity.as_deref(), Some("Severity"));
        assert_eq!(schema.description.as_deref(), Some("Notes"));
        assert_eq!(schema.column("incident_id"), Some("Incident_ID"));
        assert!(introspector.has_status_column("cyber_incidents").expect("status"));
        assert!(!introspector.has_severity_column("datasets_metadata").expect("severity"));
        assert_eq!(
            introspector.infer_identifier_column("datasets_metadata").expect("identifier"),
            "name"
        );
    }

    #[test]
    fn unknown_and_credential_tables_are_rejected() {
        let (_dir, introspector, _db) = introspector();
        assert!(matches!(introspector.describe("users"), Err(AppError::NotFound(_))));
        assert!(matches!(
            introspector.describe("cyber_incidents; DROP TABLE users"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
