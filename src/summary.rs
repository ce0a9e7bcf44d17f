use crate::assistant::{parse_timestamp, INCIDENTS_TABLE};
use crate::errors::{AppError, AppResult};
use crate::models::{CellValue, DistributionBucket, TableData};
use crate::records::{RecordAccessor, STATUS_CHOICES};
use crate::schema::{SchemaIntrospector, TableSchema};
use serde::Serialize;
use std::collections::HashMap;

pub const TICKETS_TABLE: &str = "it_tickets";
pub const METADATA_TABLE: &str = "datasets_metadata";
pub const UNKNOWN_LABEL: &str = "UNKNOWN";
const OPEN_STATUS: &str = "open";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TableOverview {
    pub table: String,
    pub row_count: usize,
    pub schema: TableSchema,
    pub status_update_offered: bool,
    pub severity_chart_offered: bool,
    pub status_choices: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct IncidentSummary {
    pub total: usize,
    pub open: usize,
    pub most_recent: Option<String>,
    pub severity: Vec<DistributionBucket>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TicketSummary {
    pub total: usize,
    pub open: usize,
    pub average_resolution_hours: Option<f64>,
    pub priority: Vec<DistributionBucket>,
    pub status: Vec<DistributionBucket>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MetadataSummary {
    pub total: usize,
    pub average_rows: Option<f64>,
    pub most_recent_upload: Option<String>,
    pub categories: Vec<DistributionBucket>,
}

fn bucket_label(value: &CellValue) -> String {
    match value {
        CellValue::Null => UNKNOWN_LABEL.to_string(),
        CellValue::Text(text) if text.trim().is_empty() => UNKNOWN_LABEL.to_string(),
        other => other.to_string(),
    }
}

/// Distribution of `column`, largest bucket first, ties broken by label.
pub fn value_counts(data: &TableData, column: &str) -> AppResult<Vec<DistributionBucket>> {
    let values = data.column_values(column).ok_or_else(|| {
        AppError::Validation(format!("column '{}' does not exist in table '{}'", column, data.table))
    })?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        *counts.entry(bucket_label(value)).or_default() += 1;
    }

    let mut buckets = counts
        .into_iter()
        .map(|(label, count)| DistributionBucket { label, count })
        .collect::<Vec<_>>();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Ok(buckets)
}

fn count_matching(data: &TableData, column: Option<&str>, wanted: &str) -> usize {
    column
        .and_then(|column| data.column_values(column))
        .map(|values| {
            values
                .into_iter()
                .filter(|value| value.as_text() == Some(wanted))
                .count()
        })
        .unwrap_or(0)
}

fn mean(data: &TableData, column: Option<&str>) -> Option<f64> {
    let values = column
        .and_then(|column| data.column_values(column))?
        .into_iter()
        .filter_map(CellValue::as_f64)
        .collect::<Vec<_>>();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn latest(data: &TableData, column: Option<&str>, layout: &str) -> Option<String> {
    column
        .and_then(|column| data.column_values(column))?
        .into_iter()
        .filter_map(|value| parse_timestamp(&value.to_string()))
        .max()
        .map(|latest| latest.format(layout).to_string())
}

fn counts_if_present(data: &TableData, column: Option<&str>) -> AppResult<Vec<DistributionBucket>> {
    match column {
        Some(column) => value_counts(data, column),
        None => Ok(Vec::new()),
    }
}

pub fn incident_summary(data: &TableData, schema: &TableSchema) -> AppResult<IncidentSummary> {
    Ok(IncidentSummary {
        total: data.row_count(),
        open: count_matching(data, schema.status.as_deref(), OPEN_STATUS),
        most_recent: latest(data, schema.timestamp.as_deref(), "%Y-%m-%d %H:%M"),
        severity: counts_if_present(data, schema.severity.as_deref())?,
    })
}

pub fn ticket_summary(data: &TableData, schema: &TableSchema) -> AppResult<TicketSummary> {
    Ok(TicketSummary {
        total: data.row_count(),
        open: count_matching(data, schema.status.as_deref(), OPEN_STATUS),
        average_resolution_hours: mean(data, schema.resolution_hours.as_deref())
            .map(|hours| (hours * 10.0).round() / 10.0),
        priority: counts_if_present(data, schema.priority.as_deref())?,
        status: counts_if_present(data, schema.status.as_deref())?,
    })
}

pub fn metadata_summary(data: &TableData, schema: &TableSchema) -> AppResult<MetadataSummary> {
    Ok(MetadataSummary {
        total: data.row_count(),
        average_rows: mean(data, schema.column("rows")).map(f64::round),
        most_recent_upload: latest(data, schema.column("uploaded_at"), "%Y-%m-%d %H:%M:%S"),
        categories: counts_if_present(data, schema.category.as_deref())?,
    })
}

#[derive(Debug, Clone)]
pub struct DashboardSummaries {
    records: RecordAccessor,
    introspector: SchemaIntrospector,
}

impl DashboardSummaries {
    pub fn new(records: RecordAccessor, introspector: SchemaIntrospector) -> Self {
        Self { records, introspector }
    }

    fn load(&self, table: &str) -> AppResult<(TableData, TableSchema)> {
        let schema = self.introspector.describe(table)?;
        let data = self.records.read_all(&schema.table)?;
        Ok((data, schema))
    }

    pub fn value_counts(&self, table: &str, column: &str) -> AppResult<Vec<DistributionBucket>> {
        let data = self.records.read_all(table)?;
        value_counts(&data, column)
    }

    pub fn table_overview(&self, table: &str) -> AppResult<TableOverview> {
        let (data, schema) = self.load(table)?;
        Ok(TableOverview {
            table: schema.table.clone(),
            row_count: data.row_count(),
            status_update_offered: schema.has_status_column(),
            severity_chart_offered: schema.has_severity_column(),
            status_choices: STATUS_CHOICES.iter().map(ToString::to_string).collect(),
            schema,
        })
    }

    pub fn incidents(&self) -> AppResult<IncidentSummary> {
        let (data, schema) = self.load(INCIDENTS_TABLE)?;
        incident_summary(&data, &schema)
    }

    pub fn tickets(&self) -> AppResult<TicketSummary> {
        let (data, schema) = self.load(TICKETS_TABLE)?;
        ticket_summary(&data, &schema)
    }

    pub fn metadata(&self) -> AppResult<MetadataSummary> {
        let (data, schema) = self.load(METADATA_TABLE)?;
        metadata_summary(&data, &schema)
    }
}
