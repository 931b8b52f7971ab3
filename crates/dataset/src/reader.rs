use annotate::Row;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

use crate::dataset::Dataset;
use crate::export::UTF8_BOM;

pub struct DatasetReader;

impl DatasetReader {
    pub async fn read_file(path: &Path) -> Result<Dataset> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        let bytes = fs::read(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;

        Self::parse(file_name, &bytes)
    }

    /// Parse uploaded content, picking the format from the file extension.
    pub fn parse(file_name: &str, bytes: &[u8]) -> Result<Dataset> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => Self::parse_csv(bytes),
            "json" => Self::parse_json(bytes),
            _ => anyhow::bail!("Unsupported file format: {}", extension),
        }
    }

    fn parse_csv(bytes: &[u8]) -> Result<Dataset> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.context(format!("Failed to read CSV record {}", index))?;
            let row: Row = columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    // Empty cells become null, like missing values.
                    let value = match record.get(i) {
                        Some(cell) if !cell.is_empty() => Value::String(cell.to_string()),
                        _ => Value::Null,
                    };
                    (column.clone(), value)
                })
                .collect();
            rows.push(row);
        }

        Ok(Dataset::new(columns, rows))
    }

    fn parse_json(bytes: &[u8]) -> Result<Dataset> {
        let value: Value = serde_json::from_slice(bytes).context("Failed to parse JSON dataset")?;

        let Value::Array(items) = value else {
            anyhow::bail!("JSON dataset must be an array of records");
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(row) => Ok(row),
                _ => anyhow::bail!("JSON record {} is not an object", index),
            })
            .collect::<Result<Vec<Row>>>()?;

        Ok(Dataset::from_records(rows))
    }
}
