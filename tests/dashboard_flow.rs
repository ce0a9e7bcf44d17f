use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ops_dashboard::assistant::{answer_at, Assistant, HELP_MESSAGE, INCIDENTS_TABLE};
use ops_dashboard::dashboard::DashboardCore;
use ops_dashboard::errors::AppError;
use ops_dashboard::models::{CellValue, LoginPayload, RegisterPayload, Role};
use ops_dashboard::summary::UNKNOWN_LABEL;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn seeded_core() -> (tempfile::TempDir, Arc<DashboardCore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let core = DashboardCore::with_assistant(&dir.path().join("data.db"), Assistant::offline()).expect("core");
    core.transfer().ingest_dir(&fixtures_dir()).expect("ingest fixtures");
    (dir, core)
}

async fn session_for(core: &DashboardCore, username: &str, role: Role) -> String {
    core.register(RegisterPayload {
        username: username.to_string(),
        password: "correct horse".to_string(),
        password_confirmation: Some("correct horse".to_string()),
        role,
    })
    .await
    .expect("register");
    core.login(LoginPayload {
        username: username.to_string(),
        password: "correct horse".to_string(),
    })
    .await
    .expect("login")
    .token
}

#[test]
fn ingested_fixtures_are_listed_and_typed() {
    let (_dir, core) = seeded_core();
    let tables = core.introspector().list_user_tables().expect("tables");
    assert_eq!(tables, vec!["cyber_incidents", "datasets_metadata", "it_tickets"]);

    let incidents = core.records().read_all(INCIDENTS_TABLE).expect("read");
    assert_eq!(incidents.row_count(), 5);
    assert_eq!(incidents.rows[0][0], CellValue::Integer(1001));

    let tickets = core.introspector().describe("it_tickets").expect("describe");
    assert_eq!(tickets.identifier, "ticket_id");
    assert_eq!(tickets.assignee.as_deref(), Some("assigned_to"));
    assert!(!tickets.has_severity_column());
}

#[test]
fn offline_heuristic_over_ingested_incidents() {
    let (_dir, core) = seeded_core();
    let incidents = core.records().read_all(INCIDENTS_TABLE).expect("read");
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).single().expect("valid");

    let recent = answer_at("show attacks in the past 2 days", &incidents, now);
    assert!(recent.starts_with("### Cyber Incidents in the Past 2 Days (2 found)"), "{}", recent);
    assert!(recent.contains("2024-06-09 14:05:00"));
    assert!(recent.contains("Severity: **High**"));
    assert!(recent.contains("Severity: **N/A**"));

    let wider = answer_at("anything in the past 30 days?", &incidents, now);
    assert!(wider.starts_with("### Cyber Incidents in the Past 30 Days (4 found)"), "{}", wider);
    assert!(wider.contains("- **2024-06-10 07:45:00** | Severity: **N/A** | Category: **DDoS**"));

    assert_eq!(
        answer_at("attacks in the past 0 days", &incidents, now),
        "No cyber incidents recorded in the past 0 days."
    );

    let phishing = answer_at("Find phishing incidents", &incidents, now);
    assert!(phishing.starts_with("Found **1** incident related to **phishing**."));

    // The breach row carries an unreadable timestamp and is dropped before matching.
    assert_eq!(
        answer_at("was there a breach", &incidents, now),
        "No incidents found related to **breach**."
    );
    assert_eq!(answer_at("hello", &incidents, now), HELP_MESSAGE);
}

#[tokio::test]
async fn only_admin_sessions_write() {
    let (_dir, core) = seeded_core();
    let admin_token = session_for(&core, "lead", Role::Admin).await;
    let viewer_token = session_for(&core, "analyst", Role::User).await;

    let id = core
        .records()
        .identifier_value(INCIDENTS_TABLE, None, "1001")
        .expect("identifier");
    assert_eq!(id, CellValue::Integer(1001));

    let viewer = core.session(Some(&viewer_token)).await;
    assert!(matches!(
        core.gate().update_status(&viewer, INCIDENTS_TABLE, &id, "closed"),
        Err(AppError::Policy(_))
    ));

    let admin = core.session(Some(&admin_token)).await;
    let affected = core
        .gate()
        .update_status(&admin, INCIDENTS_TABLE, &id, "closed")
        .expect("update");
    assert_eq!(affected, 1);

    let incidents = core.records().read_all(INCIDENTS_TABLE).expect("read");
    let status = incidents.column_index("status").expect("status column");
    assert_eq!(incidents.rows[0][status], CellValue::from("closed"));
    assert_eq!(incidents.rows[1][status], CellValue::from("in_progress"));

    core.logout(&admin_token).await;
    let logged_out = core.session(Some(&admin_token)).await;
    assert!(matches!(
        core.gate().update_status(&logged_out, INCIDENTS_TABLE, &id, "open"),
        Err(AppError::Unauthenticated(_))
    ));
}

#[test]
fn summaries_over_fixtures() {
    let (_dir, core) = seeded_core();

    let incidents = core.summaries().incidents().expect("incidents");
    assert_eq!(incidents.total, 5);
    assert_eq!(incidents.open, 3);
    assert_eq!(incidents.most_recent.as_deref(), Some("2024-06-10 07:45"));
    assert!(incidents.severity.iter().any(|bucket| bucket.label == UNKNOWN_LABEL));

    let tickets = core.summaries().tickets().expect("tickets");
    assert_eq!(tickets.total, 3);
    assert_eq!(tickets.open, 1);
    assert_eq!(tickets.average_resolution_hours, Some(3.0));

    let metadata = core.summaries().metadata().expect("metadata");
    assert_eq!(metadata.total, 2);
    assert_eq!(metadata.average_rows, Some(750.0));
    assert_eq!(metadata.most_recent_upload.as_deref(), Some("2024-05-15 16:30:00"));
}

#[test]
fn export_round_trips_the_header() {
    let (_dir, core) = seeded_core();
    let csv = core.transfer().export_csv("it_tickets").expect("export");
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("ticket_id,priority,status,assigned_to,created_at,resolution_time_hours")
    );
    assert_eq!(lines.next(), Some("T-1,High,open,alice,2024-06-01 08:00:00,"));
}
