pub mod labels;
pub mod progress;
pub mod schema;
pub mod store;
pub mod vocab;

pub use labels::{CategoryMap, LabelConfig};
pub use progress::{MappingProgress, RowStatus, mapping_progress, row_status};
pub use schema::{MappedValue, Row, SpanAnnotation, locate, parse_annotations, serialize_annotations};
pub use store::{ANNOTATIONS_FIELD, AddOutcome, AnnotationStore, MutationOutcome, SkipReason, StoreOptions};
pub use vocab::{Suggestion, Vocabulary, VocabularyMapper};

/// Annotations, vocabulary and label configuration of one project.
#[derive(Debug, Clone)]
pub struct Annotator {
    store: AnnotationStore,
    vocab: VocabularyMapper,
    labels: LabelConfig,
}

impl Annotator {
    pub fn new(store: AnnotationStore, vocab: VocabularyMapper, labels: LabelConfig) -> Self {
        Self { store, vocab, labels }
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    pub fn vocab(&self) -> &VocabularyMapper {
        &self.vocab
    }

    pub fn vocab_mut(&mut self) -> &mut VocabularyMapper {
        &mut self.vocab
    }

    pub fn labels(&self) -> &LabelConfig {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut LabelConfig {
        &mut self.labels
    }

    /// Candidates for each category configured for the annotation's label.
    /// `None` when the annotation does not exist; empty when no vocabulary is
    /// loaded.
    pub fn suggestions(&self, row: usize, index: usize) -> Option<Vec<Suggestion>> {
        let annotation = self.store.get(row).get(index)?;
        if !self.vocab.has_vocabulary() {
            return Some(Vec::new());
        }
        Some(
            self.vocab
                .suggest_for_label(&annotation.text, &annotation.label, &self.labels),
        )
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(AnnotationStore::new(), VocabularyMapper::new(), LabelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestions_follow_annotation_label() {
        let mut annotator = Annotator::default();
        annotator.store_mut().initialize(1);
        annotator
            .store_mut()
            .add(0, &SpanAnnotation::new("联想", "品牌", 0, 2));

        assert_eq!(annotator.suggestions(0, 0), Some(Vec::new()));
        assert_eq!(annotator.suggestions(0, 1), None);

        annotator.vocab_mut().add_candidate("brand", "联想");
        annotator.vocab_mut().add_candidate("brand", "华为");

        let suggestions = annotator.suggestions(0, 0).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].category, "brand");
        assert_eq!(suggestions[0].candidates, vec!["联想".to_string()]);
    }
}
