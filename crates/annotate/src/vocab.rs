use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::labels::LabelConfig;

/// Category -> canonical candidate strings.
pub type Vocabulary = BTreeMap<String, Vec<String>>;

/// Candidates offered for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub category: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VocabularyMapper {
    vocab: Vocabulary,
}

impl VocabularyMapper {
    pub fn new() -> Self {
        Self {
            vocab: Vocabulary::new(),
        }
    }

    /// Replace the whole vocabulary. No merging.
    pub fn load(&mut self, vocab: Vocabulary) {
        self.vocab = vocab;
    }

    pub fn has_vocabulary(&self) -> bool {
        !self.vocab.is_empty()
    }

    /// Candidate count per category.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.vocab
            .iter()
            .map(|(category, candidates)| (category.clone(), candidates.len()))
            .collect()
    }

    pub fn candidates(&self, category: &str) -> &[String] {
        self.vocab.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// For each category, the candidates that contain `text` or are contained
    /// in it. When nothing matches the full candidate list is returned so the
    /// whole pool stays selectable.
    pub fn suggest(&self, text: &str, label: &str, categories: &[String]) -> Vec<Suggestion> {
        categories
            .iter()
            .map(|category| {
                let pool = self.candidates(category);
                let matched: Vec<String> = pool
                    .iter()
                    .filter(|candidate| text.contains(candidate.as_str()) || candidate.contains(text))
                    .cloned()
                    .collect();
                debug!(label, category = category.as_str(), matched = matched.len(), pool = pool.len(), "Vocabulary lookup");
                Suggestion {
                    category: category.clone(),
                    candidates: if matched.is_empty() { pool.to_vec() } else { matched },
                }
            })
            .collect()
    }

    /// [`suggest`](Self::suggest) over the categories configured for `label`.
    pub fn suggest_for_label(&self, text: &str, label: &str, labels: &LabelConfig) -> Vec<Suggestion> {
        self.suggest(text, label, labels.categories_for(label))
    }

    /// Append `candidate` unless already present. Returns whether it was added.
    pub fn add_candidate(&mut self, category: &str, candidate: &str) -> bool {
        let candidates = self.vocab.entry(category.to_string()).or_default();
        if candidates.iter().any(|c| c == candidate) {
            return false;
        }
        candidates.push(candidate.to_string());
        true
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}

impl Default for VocabularyMapper {
    fn default() -> Self {
        Self::new()
    }
}
