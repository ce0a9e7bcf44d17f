use crate::credentials::CredentialService;
use crate::errors::{AppError, AppResult};
use crate::models::{CellValue, Role};
use crate::records::RecordAccessor;
use crate::session::Session;
use std::collections::BTreeMap;

/// Write access to domain tables and user roles. Every call checks the
/// caller's session before touching storage.
#[derive(Debug, Clone)]
pub struct AccessGate {
    records: RecordAccessor,
    credentials: CredentialService,
}

impl AccessGate {
    pub fn new(records: RecordAccessor, credentials: CredentialService) -> Self {
        Self { records, credentials }
    }

    pub fn require_login(session: &Session) -> AppResult<&str> {
        match (session.logged_in, session.username.as_deref()) {
            (true, Some(username)) => Ok(username),
            _ => Err(AppError::Unauthenticated("login required".to_string())),
        }
    }

    pub fn require_admin(session: &Session) -> AppResult<&str> {
        let username = Self::require_login(session)?;
        if session.role != Some(Role::Admin) {
            tracing::warn!(username = %username, "write refused for non-admin session");
            return Err(AppError::Policy(format!("user '{}' is not an admin", username)));
        }
        Ok(username)
    }

    pub fn update_single_column(
        &self,
        session: &Session,
        table: &str,
        id_column: &str,
        id_value: &CellValue,
        column: &str,
        new_value: &CellValue,
    ) -> AppResult<usize> {
        Self::require_admin(session)?;
        self.records
            .update_single_column(table, id_column, id_value, column, new_value)
    }

    pub fn update_status(&self, session: &Session, table: &str, id_value: &CellValue, status: &str) -> AppResult<usize> {
        Self::require_admin(session)?;
        self.records.update_status(table, id_value, status)
    }

    pub fn insert_record(&self, session: &Session, table: &str, values: &BTreeMap<String, CellValue>) -> AppResult<i64> {
        Self::require_admin(session)?;
        self.records.insert_record(table, values)
    }

    pub fn delete_record(&self, session: &Session, table: &str, id_column: &str, id_value: &CellValue) -> AppResult<usize> {
        Self::require_admin(session)?;
        self.records.delete_record(table, id_column, id_value)
    }

    pub fn drop_table(&self, session: &Session, table: &str) -> AppResult<()> {
        let username = Self::require_admin(session)?;
        tracing::warn!(username = %username, table = %table, "table drop requested");
        self.records.drop_table(table)
    }

    /// Store-only; callers go through `DashboardCore::set_role`, which also refreshes live sessions.
    pub(crate) fn set_role(&self, session: &Session, username: &str, role: Role) -> AppResult<()> {
        Self::require_admin(session)?;
        self.credentials.set_role(username, role)
    }
}

#[cfg(test)]
mod tests {
    use super::AccessGate;
    use crate::credentials::CredentialService;
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{CellValue, Role};
    use crate::records::RecordAccessor;
    use crate::session::Session;
    use std::collections::BTreeMap;

    fn gate() -> (tempfile::TempDir, AccessGate, RecordAccessor) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("data.db")).expect("db");
        db.connect()
            .expect("connect")
            .execute_batch(
                "CREATE TABLE cyber_incidents (incident_id INTEGER, status TEXT);
                 INSERT INTO cyber_incidents VALUES (10, 'open');",
            )
            .expect("seed");
        let records = RecordAccessor::new(db.clone());
        (dir, AccessGate::new(records.clone(), CredentialService::new(db)), records)
    }

    fn session_with(role: Role) -> Session {
        let mut session = Session::new();
        session.login("someone", role);
        session
    }

    #[test]
    fn every_write_is_refused_without_admin() {
        let (_dir, gate, records) = gate();
        let id = CellValue::Integer(10);
        let mut values = BTreeMap::new();
        values.insert("incident_id".to_string(), CellValue::Integer(11));

        for session in [Session::new(), session_with(Role::User)] {
            let expect_denied = |result: Result<(), AppError>| match (session.logged_in, result) {
                (false, Err(AppError::Unauthenticated(_))) | (true, Err(AppError::Policy(_))) => {}
                (_, other) => panic!("unexpected result {:?}", other),
            };
            expect_denied(gate.update_status(&session, "cyber_incidents", &id, "closed").map(|_| ()));
            expect_denied(
                gate.update_single_column(&session, "cyber_incidents", "incident_id", &id, "status", &"closed".into())
                    .map(|_| ()),
            );
            expect_denied(gate.insert_record(&session, "cyber_incidents", &values).map(|_| ()));
            expect_denied(gate.delete_record(&session, "cyber_incidents", "incident_id", &id).map(|_| ()));
            expect_denied(gate.drop_table(&session, "cyber_incidents"));
            expect_denied(gate.set_role(&session, "someone", Role::Admin));
        }

        let data = records.read_all("cyber_incidents").expect("read");
        assert_eq!(data.rows, vec![vec![CellValue::Integer(10), CellValue::from("open")]]);
    }

    #[test]
    fn admin_writes_go_through() {
        let (_dir, gate, records) = gate();
        let admin = session_with(Role::Admin);
        let affected = gate
            .update_status(&admin, "cyber_incidents", &CellValue::Integer(10), "in_progress")
            .expect("update");
        assert_eq!(affected, 1);
        let data = records.read_all("cyber_incidents").expect("read");
        assert_eq!(data.rows[0][1], CellValue::from("in_progress"));
    }
}
