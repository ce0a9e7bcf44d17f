use crate::errors::{AppError, AppResult};
use crate::models::{RegisterOutcome, Role, UserRecord};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub const USERS_TABLE: &str = "users";

/// Salt and derived key of one user, as stored.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub salt: String,
    pub pw_hash: String,
    pub role: Role,
}

/// Handle on the dashboard's SQLite file. Every operation opens its own
/// connection and closes it when done; nothing is held across calls.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }

        let db = Self {
            db_path: path.to_path_buf(),
        };

        let conn = db.connect()?;
        conn.execute_batch(SCHEMA_SQL)?;
        ensure_schema_extensions(&conn)?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn insert_user(
        &self,
        username: &str,
        salt_hex: &str,
        hash_hex: &str,
        role: Role,
    ) -> AppResult<RegisterOutcome> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, salt, pw_hash, created_at, role) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, salt_hex, hash_hex, Utc::now().to_rfc3339(), role.as_str()],
        );

        match inserted {
            Ok(_) => Ok(RegisterOutcome::Created),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Ok(RegisterOutcome::Duplicate)
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn find_credentials(&self, username: &str) -> AppResult<Option<StoredCredential>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT salt, pw_hash, role FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(StoredCredential {
                        salt: row.get(0)?,
                        pw_hash: row.get(1)?,
                        role: parse_role(row.get::<_, Option<String>>(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    pub fn get_user(&self, username: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT id, username, role, created_at FROM users WHERE username = ?1",
                [username],
                parse_user_row,
            )
            .optional()?;
        Ok(found)
    }

    pub fn list_users(&self) -> AppResult<Vec<UserRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, username, role, created_at FROM users ORDER BY id ASC")?;
        let users = stmt
            .query_map([], parse_user_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn set_user_role(&self, username: &str, role: Role) -> AppResult<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE users SET role = ?1 WHERE username = ?2",
            params![role.as_str(), username],
        )?;
        Ok(updated > 0)
    }
}

/// Upgrades stores created before roles existed.
fn ensure_schema_extensions(conn: &Connection) -> AppResult<()> {
    if !column_exists(conn, USERS_TABLE, "role")? {
        conn.execute("ALTER TABLE users ADD COLUMN role TEXT DEFAULT 'user'", [])?;
        tracing::info!(table = USERS_TABLE, "added role column");
    }
    Ok(())
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let mut rows = stmt.query([table])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        role: parse_role(row.get::<_, Option<String>>(2)?)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_role(raw: Option<String>) -> rusqlite::Result<Role> {
    match raw {
        None => Ok(Role::User),
        Some(value) => value.parse::<Role>().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error)),
            )
        }),
    }
}

// Older rows carry naive ISO timestamps without an offset.
fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}
