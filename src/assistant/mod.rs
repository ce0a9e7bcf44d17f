//! Natural-language questions over the incident table.
//!
//! A configured [`AnswerProvider`] gets the first try; when there is none, or it
//! fails, the deterministic keyword/date heuristic in [`answer_at`] answers.

pub mod provider;

use crate::models::{AnswerSource, AssistantReply, CellValue, TableData};
use crate::redaction::Redactor;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use provider::{AnswerProvider, SAMPLE_ROWS};
use std::sync::Arc;

pub const INCIDENTS_TABLE: &str = "cyber_incidents";
pub const DEFAULT_DAYS: i64 = 2;
pub const KEYWORDS: &[&str] = &["phishing", "malware", "breach", "scan", "attack", "exploit"];

pub const HELP_MESSAGE: &str = "I couldn’t confidently answer that.\n\n\
Try questions like:\n\
- *Show attacks in the past 3 days*\n\
- *Find phishing incidents*\n\
- *List high severity attacks*";

pub const OFFLINE_NOTE: &str =
    "Cloud AI is used only if GENAI_API_KEY is configured. Otherwise offline analysis is applied.";
pub const FALLBACK_NOTE: &str = "The remote assistant was unavailable, so offline analysis was applied.";

const TIMESTAMP_COLUMN: &str = "timestamp";
const SEVERITY_COLUMN: &str = "severity";
const CATEGORY_COLUMN: &str = "category";
const TEXT_COLUMNS: &[&str] = &["description", "notes"];
const MISSING: &str = "N/A";

/// Accepts RFC 3339 and the common naive layouts; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

struct Incident<'a> {
    timestamp: Option<DateTime<Utc>>,
    severity: &'a CellValue,
    category: &'a CellValue,
    text: Option<&'a CellValue>,
}

fn cell_or_missing(value: &CellValue) -> String {
    if value.is_null() {
        MISSING.to_string()
    } else {
        value.to_string()
    }
}

fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// Rows with an unparsable timestamp are dropped when the table has a timestamp column.
fn load_incidents(data: &TableData) -> Vec<Incident<'_>> {
    static NULL: CellValue = CellValue::Null;
    let timestamp_index = data.column_index(TIMESTAMP_COLUMN);
    let severity_index = data.column_index(SEVERITY_COLUMN);
    let category_index = data.column_index(CATEGORY_COLUMN);
    let text_index = TEXT_COLUMNS.iter().find_map(|name| data.column_index(name));

    data.rows
        .iter()
        .filter_map(|row| {
            let timestamp = match timestamp_index {
                Some(index) => Some(row.get(index).and_then(|value| parse_timestamp(&value.to_string()))?),
                None => None,
            };
            Some(Incident {
                timestamp,
                severity: cell(row, severity_index).unwrap_or(&NULL),
                category: cell(row, category_index).unwrap_or(&NULL),
                text: cell(row, text_index),
            })
        })
        .collect()
}

/// The rows the assistant works from: with a timestamp column present, rows
/// whose timestamp does not parse are left out.
pub fn usable_incidents(data: &TableData) -> TableData {
    let Some(index) = data.column_index(TIMESTAMP_COLUMN) else {
        return data.clone();
    };
    TableData {
        table: data.table.clone(),
        columns: data.columns.clone(),
        rows: data
            .rows
            .iter()
            .filter(|row| {
                row.get(index)
                    .and_then(|value| parse_timestamp(&value.to_string()))
                    .is_some()
            })
            .cloned()
            .collect(),
    }
}

fn cell(row: &[CellValue], index: Option<usize>) -> Option<&CellValue> {
    index.and_then(|i| row.get(i))
}

fn day_count(question: &str) -> i64 {
    question
        .split_whitespace()
        .find(|token| token.chars().all(|c| c.is_ascii_digit()))
        .and_then(|token| token.parse::<i64>().ok())
        .unwrap_or(DEFAULT_DAYS)
}

fn answer_recent(incidents: &[Incident<'_>], days: i64, now: DateTime<Utc>) -> String {
    let cutoff = TimeDelta::try_days(days).and_then(|span| now.checked_sub_signed(span));
    let recent = incidents
        .iter()
        .filter(|incident| match (incident.timestamp, cutoff) {
            (Some(timestamp), Some(cutoff)) => timestamp >= cutoff,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect::<Vec<_>>();

    if recent.is_empty() {
        return format!("No cyber incidents recorded in the past {} days.", days);
    }

    let mut lines = vec![format!(
        "### Cyber Incidents in the Past {} Days ({} found)",
        days,
        recent.len()
    )];
    lines.extend(recent.iter().map(|incident| {
        format!(
            "- **{}** | Severity: **{}** | Category: **{}**",
            format_timestamp(incident.timestamp),
            cell_or_missing(incident.severity),
            cell_or_missing(incident.category)
        )
    }));
    lines.join("\n")
}

fn answer_keyword(incidents: &[Incident<'_>], word: &str) -> String {
    let hits = incidents
        .iter()
        .filter(|incident| {
            incident
                .text
                .map(|text| text.to_string().to_lowercase().contains(word))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    if hits.is_empty() {
        return format!("No incidents found related to **{}**.", word);
    }

    let noun = if hits.len() == 1 { "incident" } else { "incidents" };
    let mut lines = vec![format!("Found **{}** {} related to **{}**.", hits.len(), noun, word)];
    lines.extend(hits.iter().map(|incident| {
        format!(
            "- **{}** | Severity: **{}** | {}",
            format_timestamp(incident.timestamp),
            cell_or_missing(incident.severity),
            incident.text.map(cell_or_missing).unwrap_or_else(|| MISSING.to_string())
        )
    }));
    lines.join("\n")
}

/// Offline answer relative to `now`. Same inputs, same text.
pub fn answer_at(question: &str, incidents: &TableData, now: DateTime<Utc>) -> String {
    let question = question.trim().to_lowercase();
    let loaded = load_incidents(incidents);

    if question.contains("past") && question.contains("days") {
        return answer_recent(&loaded, day_count(&question), now);
    }

    let has_text_column = TEXT_COLUMNS.iter().any(|name| incidents.column_index(name).is_some());
    if has_text_column {
        if let Some(word) = KEYWORDS.iter().find(|word| question.contains(*word)) {
            return answer_keyword(&loaded, word);
        }
    }

    HELP_MESSAGE.to_string()
}

pub fn answer(question: &str, incidents: &TableData) -> String {
    answer_at(question, incidents, Utc::now())
}

/// Remote-first answering with offline fallback.
#[derive(Clone)]
pub struct Assistant {
    provider: Option<Arc<dyn AnswerProvider>>,
    redactor: Redactor,
}

impl Assistant {
    pub fn offline() -> Self {
        Self {
            provider: None,
            redactor: Redactor::new(),
        }
    }

    pub fn with_provider(provider: Arc<dyn AnswerProvider>, redactor: Redactor) -> Self {
        Self {
            provider: Some(provider),
            redactor,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.provider.is_some()
    }

    /// Never fails: provider errors are logged and replaced by the offline answer.
    pub async fn ask(&self, question: &str, incidents: &TableData) -> AssistantReply {
        let Some(provider) = &self.provider else {
            return AssistantReply {
                answer: answer(question, incidents),
                source: AnswerSource::Offline,
                note: Some(OFFLINE_NOTE.to_string()),
            };
        };

        let sample = usable_incidents(incidents).head_records(SAMPLE_ROWS);
        match provider.answer(question, &sample).await {
            Ok(text) => {
                tracing::info!(provider = provider.name(), sample_rows = sample.len(), "remote answer served");
                AssistantReply {
                    answer: text,
                    source: AnswerSource::Remote,
                    note: None,
                }
            }
            Err(error) => {
                let message = self.redactor.redact(&error.to_string());
                tracing::warn!(provider = provider.name(), error = %message, "remote answer failed; using offline analysis");
                AssistantReply {
                    answer: answer(question, incidents),
                    source: AnswerSource::Offline,
                    note: Some(FALLBACK_NOTE.to_string()),
                }
            }
        }
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("provider", &self.provider.as_ref().map(|provider| provider.name().to_string()))
            .finish()
    }
}
