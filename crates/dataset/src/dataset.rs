use annotate::{ANNOTATIONS_FIELD, Row, SpanAnnotation, parse_annotations};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Column holding the text to annotate.
pub const QUERY_FIELD: &str = "query";

#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Columns are collected in first-seen order across all records.
    pub fn from_records(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn query(&self, index: usize) -> Option<&str> {
        self.rows.get(index)?.get(QUERY_FIELD)?.as_str()
    }

    pub fn ensure_query_column(&self) -> Result<()> {
        if !self.has_column(QUERY_FIELD) {
            anyhow::bail!("Dataset must contain a '{}' column", QUERY_FIELD);
        }
        Ok(())
    }

    /// Annotations carried by a previous export, if the dataset has an
    /// `annotations` column. Rows with unreadable values get an empty list.
    pub fn seed_annotations(&self) -> Option<BTreeMap<usize, Vec<SpanAnnotation>>> {
        if !self.has_column(ANNOTATIONS_FIELD) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .enumerate()
                .map(|(index, row)| (index, seed_row(index, row.get(ANNOTATIONS_FIELD))))
                .collect(),
        )
    }
}

fn seed_row(index: usize, value: Option<&Value>) -> Vec<SpanAnnotation> {
    let parsed = match value {
        Some(Value::String(raw)) => parse_annotations(raw),
        Some(value @ Value::Array(_)) => serde_json::from_value(value.clone()),
        _ => return Vec::new(),
    };
    parsed.unwrap_or_else(|e| {
        warn!(row = index, error = %e, "Unreadable annotations field, using an empty list");
        Vec::new()
    })
}
