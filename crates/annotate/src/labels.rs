use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label -> vocabulary categories offered when mapping a span with that label.
pub type CategoryMap = BTreeMap<String, Vec<String>>;

const DEFAULT_LABEL_MAP: &[(&str, &[&str])] = &[
    ("品类", &["category"]),
    ("品牌", &["brand"]),
    ("型号", &["model"]),
    ("年份", &["release_year"]),
    ("价格", &["price"]),
    ("cpu", &["cpu_brand", "cpu_series", "cpu_family", "cpu_model", "cpu_gen"]),
    ("gpu", &["gpu_type", "gpu_brand", "gpu_series", "gpu_model"]),
    ("内存", &["memory_capacity_gb"]),
    ("存储", &["storage_capacity_gb"]),
    ("屏幕尺寸", &["screen_size_inch"]),
    ("屏幕分辨率", &["screen_resolution"]),
    ("颜色", &["color"]),
    ("其他", &["other"]),
    ("ai", &["ai"]),
];

/// The project's selectable labels plus its label-category map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub labels: Vec<String>,
    pub category_map: CategoryMap,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABEL_MAP.iter().map(|(label, _)| label.to_string()).collect(),
            category_map: default_category_map(),
        }
    }
}

impl LabelConfig {
    /// Default labels followed by any label the map introduces.
    pub fn from_category_map(category_map: CategoryMap) -> Self {
        let mut config = Self::default();
        config.set_category_map(category_map);
        config
    }

    pub fn categories_for(&self, label: &str) -> &[String] {
        self.category_map.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Overwrite the category map; new labels become selectable.
    pub fn set_category_map(&mut self, category_map: CategoryMap) {
        for label in category_map.keys() {
            if !self.labels.contains(label) {
                self.labels.push(label.clone());
            }
        }
        self.category_map = category_map;
    }

    /// Returns false for blank or already present labels.
    pub fn add_label(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || self.labels.iter().any(|l| l == label) {
            return false;
        }
        self.labels.push(label.to_string());
        true
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label);
        self.labels.len() != before
    }
}

pub fn default_category_map() -> CategoryMap {
    DEFAULT_LABEL_MAP
        .iter()
        .map(|(label, categories)| {
            (
                label.to_string(),
                categories.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}
