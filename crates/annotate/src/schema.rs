use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Category name -> canonical strings selected for that category.
pub type MappedValue = BTreeMap<String, Vec<String>>;

/// One dataset row: the original fields in column order.
pub type Row = serde_json::Map<String, Value>;

/// A labeled span of one row's `query`.
///
/// `start` and `end` are half-open character offsets (not bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanAnnotation {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, deserialize_with = "lenient_mapped_value")]
    pub mapped_value: MappedValue,
}

impl SpanAnnotation {
    pub fn new(text: impl Into<String>, label: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            start,
            end,
            mapped_value: MappedValue::new(),
        }
    }

    /// Two spans overlap unless one ends at or before the other starts.
    pub fn overlaps(&self, other: &SpanAnnotation) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn is_empty_span(&self) -> bool {
        self.start >= self.end
    }

    /// Checks `start < end <= chars(query)`.
    pub fn fits(&self, query: &str) -> bool {
        !self.is_empty_span() && self.end <= query.chars().count()
    }

    /// The slice of `query` covered by this span, if it fits.
    pub fn covered<'a>(&self, query: &'a str) -> Option<&'a str> {
        if !self.fits(query) {
            return None;
        }
        let byte_at = |chars: usize| {
            query
                .char_indices()
                .nth(chars)
                .map(|(byte, _)| byte)
                .unwrap_or(query.len())
        };
        Some(&query[byte_at(self.start)..byte_at(self.end)])
    }

    /// Mapped once any category holds at least one selection.
    pub fn is_mapped(&self) -> bool {
        self.mapped_value.values().any(|values| !values.is_empty())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "text": self.text,
            "label": self.label,
            "start": self.start,
            "end": self.end,
            "mapped_value": self.mapped_value,
        })
    }
}

/// Character offsets of the first occurrence of `text` in `query`.
pub fn locate(query: &str, text: &str) -> Option<(usize, usize)> {
    if text.is_empty() {
        return None;
    }
    let byte_start = query.find(text)?;
    let start = query[..byte_start].chars().count();
    Some((start, start + text.chars().count()))
}

/// Stable textual form of a row's annotation list, used by exports.
pub fn serialize_annotations(annotations: &[SpanAnnotation]) -> String {
    Value::Array(annotations.iter().map(SpanAnnotation::to_json).collect()).to_string()
}

/// Inverse of [`serialize_annotations`]. Blank input is an empty list.
pub fn parse_annotations(raw: &str) -> serde_json::Result<Vec<SpanAnnotation>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

// Older project files carry scalar selections or a non-object mapped_value.
fn lenient_mapped_value<'de, D>(deserializer: D) -> Result<MappedValue, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(map) = Value::deserialize(deserializer)? else {
        return Ok(MappedValue::new());
    };
    Ok(map
        .into_iter()
        .map(|(category, value)| (category, selection(value)))
        .collect())
}

fn selection(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => vec![s],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_allows_touching_spans() {
        let a = SpanAnnotation::new("联想", "品牌", 0, 2);
        let touching = SpanAnnotation::new("拯救者", "型号", 2, 5);
        let inside = SpanAnnotation::new("想", "品牌", 1, 2);

        assert!(!a.overlaps(&touching));
        assert!(!touching.overlaps(&a));
        assert!(a.overlaps(&inside));
        assert!(inside.overlaps(&a));
    }

    #[test]
    fn test_locate_uses_character_offsets() {
        let query = "联想拯救者 i7 笔记本";
        assert_eq!(locate(query, "拯救者"), Some((2, 5)));
        assert_eq!(locate(query, "i7"), Some((6, 8)));
        assert_eq!(locate(query, "macbook"), None);
        assert_eq!(locate(query, ""), None);
    }

    #[test]
    fn test_fits_and_covered() {
        let query = "联想拯救者";
        let span = SpanAnnotation::new("拯救者", "型号", 2, 5);
        assert!(span.fits(query));
        assert_eq!(span.covered(query), Some("拯救者"));

        let too_long = SpanAnnotation::new("x", "型号", 3, 6);
        assert!(!too_long.fits(query));
        assert_eq!(too_long.covered(query), None);

        let empty = SpanAnnotation::new("", "型号", 3, 3);
        assert!(!empty.fits(query));
    }

    #[test]
    fn test_lenient_mapped_value() {
        let raw = r#"{"text":"i7","label":"cpu","start":0,"end":2,
            "mapped_value":{"cpu_brand":"Intel","cpu_gen":"","cpu_model":["i7-13700H"]}}"#;
        let ann: SpanAnnotation = serde_json::from_str(raw).unwrap();
        assert_eq!(ann.mapped_value["cpu_brand"], vec!["Intel".to_string()]);
        assert!(ann.mapped_value["cpu_gen"].is_empty());
        assert_eq!(ann.mapped_value["cpu_model"], vec!["i7-13700H".to_string()]);

        let missing = r#"{"text":"i7","label":"cpu","start":0,"end":2}"#;
        let ann: SpanAnnotation = serde_json::from_str(missing).unwrap();
        assert!(ann.mapped_value.is_empty());

        let not_object = r#"{"text":"i7","label":"cpu","start":0,"end":2,"mapped_value":"Intel"}"#;
        let ann: SpanAnnotation = serde_json::from_str(not_object).unwrap();
        assert!(ann.mapped_value.is_empty());
    }

    #[test]
    fn test_serialized_form_is_readable_and_parses_back() {
        let mut ann = SpanAnnotation::new("联想", "品牌", 0, 2);
        ann.mapped_value
            .insert("brand".to_string(), vec!["Lenovo".to_string()]);

        let text = serialize_annotations(std::slice::from_ref(&ann));
        assert_eq!(
            text,
            r#"[{"text":"联想","label":"品牌","start":0,"end":2,"mapped_value":{"brand":["Lenovo"]}}]"#
        );
        assert_eq!(parse_annotations(&text).unwrap(), vec![ann]);
        assert_eq!(serialize_annotations(&[]), "[]");
        assert!(parse_annotations("  ").unwrap().is_empty());
        assert!(parse_annotations("[{'text': 'x'}]").is_err());
    }
}
