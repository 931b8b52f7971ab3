use annotate::{ANNOTATIONS_FIELD, AnnotationStore, Row};
use anyhow::{Context, Result};
use serde_json::Value;

use crate::dataset::Dataset;

/// Lets spreadsheet tools detect UTF-8.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Every dataset row with its annotations, as BOM-prefixed UTF-8 CSV.
pub fn to_csv(dataset: &Dataset, store: &AnnotationStore) -> Result<Vec<u8>> {
    let mut columns = dataset.columns.clone();
    if !dataset.has_column(ANNOTATIONS_FIELD) {
        columns.push(ANNOTATIONS_FIELD.to_string());
    }
    write_csv(&columns, &store.export_all(&dataset.rows))
}

pub fn write_csv(columns: &[String], rows: &[Row]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    writer
        .write_record(columns)
        .context("Failed to write CSV header")?;

    for row in rows {
        writer
            .write_record(columns.iter().map(|column| cell(row.get(column))))
            .context("Failed to write CSV record")?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DatasetReader;
    use annotate::{SpanAnnotation, parse_annotations};

    #[test]
    fn test_export_csv_round_trip() {
        let dataset = DatasetReader::parse("rows.json", r#"[{"query": "联想拯救者", "price": 5999}, {"query": "华为"}]"#.as_bytes()).unwrap();
        let mut store = AnnotationStore::new();
        store.initialize(dataset.len());
        store.add(0, &SpanAnnotation::new("联想", "品牌", 0, 2));
        store.set_mapping(0, 0, "brand", vec!["Lenovo".into()]);

        let bytes = to_csv(&dataset, &store).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        assert!(text.starts_with("query,price,annotations\n"));

        let reloaded = DatasetReader::parse("export.csv", &bytes).unwrap();
        assert_eq!(reloaded.columns, vec!["query", "price", "annotations"]);
        assert_eq!(reloaded.rows[0]["price"], "5999");
        assert_eq!(reloaded.rows[1]["price"], Value::Null);

        for index in 0..dataset.len() {
            let raw = reloaded.rows[index][ANNOTATIONS_FIELD].as_str().unwrap();
            assert_eq!(parse_annotations(raw).unwrap(), store.get(index));
        }
    }

    #[test]
    fn test_existing_annotations_column_is_replaced() {
        let content = "query,annotations\n联想,old\n";
        let dataset = DatasetReader::parse("rows.csv", content.as_bytes()).unwrap();
        let store = AnnotationStore::new();

        let bytes = to_csv(&dataset, &store).unwrap();
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
        assert_eq!(text, "query,annotations\n联想,[]\n");
    }
}
