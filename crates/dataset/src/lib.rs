pub mod dataset;
pub mod export;
pub mod project;
pub mod reader;

pub use dataset::{Dataset, QUERY_FIELD};
pub use export::{UTF8_BOM, to_csv, write_csv};
pub use project::{NewProject, Project, ProjectStore, ProjectSummary, validate_name};
pub use reader::DatasetReader;

use anyhow::Result;
use std::path::Path;

/// Read a dataset file and check it has a `query` column.
pub async fn load_dataset(file_path: &Path) -> Result<Dataset> {
    let dataset = DatasetReader::read_file(file_path).await?;
    dataset.ensure_query_column()?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_dataset_requires_query() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        let bad = dir.path().join("bad.csv");
        tokio::fs::write(&good, "query,id\n联想,1\n").await.unwrap();
        tokio::fs::write(&bad, "text,id\n联想,1\n").await.unwrap();

        assert_eq!(load_dataset(&good).await.unwrap().len(), 1);
        assert!(load_dataset(&bad).await.is_err());
    }
}
