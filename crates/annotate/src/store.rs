use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::schema::{Row, SpanAnnotation, serialize_annotations};

/// Column added to every exported row.
pub const ANNOTATIONS_FIELD: &str = "annotations";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Reject updates whose span overlaps another annotation of the row.
    /// Off by default: only `add` enforces non-overlap.
    pub check_overlap_on_update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    /// `existing` is the index of the first conflicting annotation.
    Overlap { existing: usize },
    InvalidSpan,
}

impl AddOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, AddOutcome::Added)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownRow,
    IndexOutOfRange,
    Overlap,
}

/// Result of a best-effort mutation. A skip is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied,
    Skipped(SkipReason),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

/// Span annotations per dataset row.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    rows: BTreeMap<usize, Vec<SpanAnnotation>>,
    options: StoreOptions,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            rows: BTreeMap::new(),
            options,
        }
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Reset to `row_count` rows with no annotations.
    pub fn initialize(&mut self, row_count: usize) {
        self.rows = (0..row_count).map(|row| (row, Vec::new())).collect();
    }

    /// Replace the whole row map, e.g. from a persisted project.
    pub fn hydrate(&mut self, rows: BTreeMap<usize, Vec<SpanAnnotation>>) {
        self.rows = rows;
    }

    pub fn snapshot(&self) -> &BTreeMap<usize, Vec<SpanAnnotation>> {
        &self.rows
    }

    /// Put `row` back to a state taken from [`snapshot`](Self::snapshot).
    /// `None` forgets the row again.
    pub fn restore_row(&mut self, row: usize, previous: Option<Vec<SpanAnnotation>>) {
        match previous {
            Some(list) => {
                self.rows.insert(row, list);
            }
            None => {
                self.rows.remove(&row);
            }
        }
    }

    /// Append a copy of `annotation` unless it overlaps an existing span.
    pub fn add(&mut self, row: usize, annotation: &SpanAnnotation) -> bool {
        self.insert(row, annotation).is_added()
    }

    /// Like [`add`](Self::add), also requiring the span to fit inside `query`.
    pub fn add_checked(&mut self, row: usize, annotation: &SpanAnnotation, query: &str) -> AddOutcome {
        if !annotation.fits(query) {
            return AddOutcome::InvalidSpan;
        }
        self.insert(row, annotation)
    }

    fn insert(&mut self, row: usize, annotation: &SpanAnnotation) -> AddOutcome {
        if annotation.is_empty_span() {
            return AddOutcome::InvalidSpan;
        }
        if let Some(existing) = first_overlap(self.get(row), annotation, None) {
            debug!(row, existing, start = annotation.start, end = annotation.end, "Rejected overlapping span");
            return AddOutcome::Overlap { existing };
        }
        self.rows.entry(row).or_default().push(annotation.clone());
        AddOutcome::Added
    }

    /// Annotations of `row`; empty for rows never recorded.
    pub fn get(&self, row: usize) -> &[SpanAnnotation] {
        self.rows.get(&row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the annotation at `index`. Skipped when the row or index is
    /// unknown; overlap is only checked when the store options ask for it.
    pub fn update(&mut self, row: usize, index: usize, annotation: &SpanAnnotation) -> MutationOutcome {
        let check_overlap = self.options.check_overlap_on_update;
        let Some(list) = self.rows.get_mut(&row) else {
            return skipped(row, index, SkipReason::UnknownRow);
        };
        if index >= list.len() {
            return skipped(row, index, SkipReason::IndexOutOfRange);
        }
        if check_overlap && first_overlap(list, annotation, Some(index)).is_some() {
            return skipped(row, index, SkipReason::Overlap);
        }
        list[index] = annotation.clone();
        MutationOutcome::Applied
    }

    pub fn remove(&mut self, row: usize, index: usize) -> MutationOutcome {
        let Some(list) = self.rows.get_mut(&row) else {
            return skipped(row, index, SkipReason::UnknownRow);
        };
        if index >= list.len() {
            return skipped(row, index, SkipReason::IndexOutOfRange);
        }
        list.remove(index);
        MutationOutcome::Applied
    }

    /// Write one category's selection into the annotation's `mapped_value`.
    /// An empty selection clears the category.
    pub fn set_mapping(
        &mut self,
        row: usize,
        index: usize,
        category: &str,
        values: Vec<String>,
    ) -> MutationOutcome {
        let mut annotation = match self.rows.get(&row) {
            None => return skipped(row, index, SkipReason::UnknownRow),
            Some(list) => match list.get(index) {
                None => return skipped(row, index, SkipReason::IndexOutOfRange),
                Some(annotation) => annotation.clone(),
            },
        };
        if values.is_empty() {
            annotation.mapped_value.remove(category);
        } else {
            annotation.mapped_value.insert(category.to_string(), values);
        }
        self.update(row, index, &annotation)
    }

    /// Number of rows holding at least one annotation.
    pub fn count_annotated_rows(&self) -> usize {
        self.rows.values().filter(|list| !list.is_empty()).count()
    }

    pub fn total_annotations(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// One output row per input row, with the row's annotations serialized
    /// into the `annotations` field.
    pub fn export_all(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                let mut exported = row.clone();
                exported.insert(
                    ANNOTATIONS_FIELD.to_string(),
                    Value::String(serialize_annotations(self.get(index))),
                );
                exported
            })
            .collect()
    }
}

fn first_overlap(list: &[SpanAnnotation], annotation: &SpanAnnotation, skip: Option<usize>) -> Option<usize> {
    list.iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .find(|(_, existing)| annotation.overlaps(existing))
        .map(|(i, _)| i)
}

fn skipped(row: usize, index: usize, reason: SkipReason) -> MutationOutcome {
    debug!(row, index, ?reason, "Skipped annotation mutation");
    MutationOutcome::Skipped(reason)
}
