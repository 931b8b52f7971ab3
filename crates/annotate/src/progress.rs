use serde::Serialize;

use crate::schema::SpanAnnotation;
use crate::store::AnnotationStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MappingProgress {
    pub total: usize,
    pub mapped: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    NotStarted,
    /// Has annotations, at least one without a mapping.
    Unmapped,
    Completed,
}

/// How many annotations over rows `0..row_count` carry a mapping.
pub fn mapping_progress(store: &AnnotationStore, row_count: usize) -> MappingProgress {
    let (total, mapped) = (0..row_count)
        .flat_map(|row| store.get(row))
        .fold((0, 0), |(total, mapped), annotation| {
            (total + 1, mapped + usize::from(annotation.is_mapped()))
        });
    let ratio = if total > 0 { mapped as f64 / total as f64 } else { 0.0 };
    MappingProgress { total, mapped, ratio }
}

pub fn row_status(annotations: &[SpanAnnotation]) -> RowStatus {
    if annotations.is_empty() {
        RowStatus::NotStarted
    } else if annotations.iter().all(SpanAnnotation::is_mapped) {
        RowStatus::Completed
    } else {
        RowStatus::Unmapped
    }
}
