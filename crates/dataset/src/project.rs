use annotate::{
    AnnotationStore, Annotator, CategoryMap, LabelConfig, SpanAnnotation, StoreOptions, Vocabulary,
    VocabularyMapper,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::export::write_csv;
use crate::reader::DatasetReader;

const ANNOTATIONS_SUFFIX: &str = "_annotations.json";
const VOCAB_SUFFIX: &str = "_vocab.json";
const LABEL_MAP_SUFFIX: &str = "_label_map.json";
const SIDE_FILE_SUFFIXES: [&str; 3] = [ANNOTATIONS_SUFFIX, VOCAB_SUFFIX, LABEL_MAP_SUFFIX];

static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w-]+$").expect("project name pattern is valid"));

/// An opened project: its rows plus everything annotated on them.
pub struct Project {
    pub name: String,
    pub dataset: Dataset,
    pub annotator: Annotator,
}

impl Project {
    pub fn summary(&self) -> ProjectSummary {
        let store = self.annotator.store();
        ProjectSummary {
            name: self.name.clone(),
            rows: self.dataset.len(),
            annotated_rows: store.count_annotated_rows(),
            total_annotations: store.total_annotations(),
            has_vocabulary: self.annotator.vocab().has_vocabulary(),
            progress: annotate::mapping_progress(store, self.dataset.len()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub rows: usize,
    pub annotated_rows: usize,
    pub total_annotations: usize,
    pub has_vocabulary: bool,
    pub progress: annotate::MappingProgress,
}

/// Uploaded content for a new project.
pub struct NewProject<'a> {
    pub name: &'a str,
    pub file_name: &'a str,
    pub content: &'a [u8],
    pub vocabulary: Option<Vocabulary>,
    pub label_map: Option<CategoryMap>,
}

/// Projects stored as flat files in one directory:
/// `<name>.csv|json`, `<name>_annotations.json`, `<name>_vocab.json`,
/// `<name>_label_map.json`.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    dir: PathBuf,
}

impl ProjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn list_projects(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.dir)
            .await
            .context(format!("Failed to create project directory: {:?}", self.dir))?;

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if SIDE_FILE_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
                continue;
            }
            if let Some(name) = file_name
                .strip_suffix(".csv")
                .or_else(|| file_name.strip_suffix(".json"))
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    pub async fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.data_file(name).await.is_some()
    }

    pub async fn create_project(&self, new: NewProject<'_>, options: StoreOptions) -> Result<Project> {
        validate_name(new.name)?;
        if self.data_file(new.name).await.is_some() {
            anyhow::bail!("Project already exists: {}", new.name);
        }

        let dataset = DatasetReader::parse(new.file_name, new.content)?;
        dataset.ensure_query_column()?;

        fs::create_dir_all(&self.dir)
            .await
            .context(format!("Failed to create project directory: {:?}", self.dir))?;

        let is_json = new.file_name.to_ascii_lowercase().ends_with(".json");
        let data = if is_json {
            serde_json::to_vec(&dataset.rows)?
        } else {
            write_csv(&dataset.columns, &dataset.rows)?
        };
        let data_path = self.path(new.name, if is_json { ".json" } else { ".csv" });
        write_atomic(&data_path, &data).await?;

        let mut store = AnnotationStore::with_options(options);
        match dataset.seed_annotations() {
            Some(seeded) => store.hydrate(seeded),
            None => store.initialize(dataset.len()),
        }

        let mut vocab = VocabularyMapper::new();
        if let Some(vocabulary) = new.vocabulary {
            vocab.load(vocabulary);
        }
        let has_label_map = new.label_map.is_some();
        let labels = match new.label_map {
            Some(map) => LabelConfig::from_category_map(map),
            None => LabelConfig::default(),
        };

        let project = Project {
            name: new.name.to_string(),
            dataset,
            annotator: Annotator::new(store, vocab, labels),
        };

        self.save_annotations(&project).await?;
        if project.annotator.vocab().has_vocabulary() {
            self.save_vocabulary(&project).await?;
        }
        if has_label_map {
            self.save_label_map(&project).await?;
        }

        info!(project = new.name, rows = project.dataset.len(), "Created project");
        Ok(project)
    }

    pub async fn open_project(&self, name: &str, options: StoreOptions) -> Result<Project> {
        validate_name(name)?;
        let data_path = self
            .data_file(name)
            .await
            .ok_or_else(|| anyhow::anyhow!("Project data file not found: {}", name))?;

        let dataset = DatasetReader::read_file(&data_path).await?;

        let mut store = AnnotationStore::with_options(options);
        let annotations_path = self.path(name, ANNOTATIONS_SUFFIX);
        if fs::try_exists(&annotations_path).await.unwrap_or(false) {
            let raw = fs::read(&annotations_path)
                .await
                .context(format!("Failed to read annotations: {:?}", annotations_path))?;
            store.hydrate(hydrate_annotations(&raw));
        } else {
            store.initialize(dataset.len());
        }

        let mut vocab = VocabularyMapper::new();
        if let Some(vocabulary) = self.read_json::<Vocabulary>(name, VOCAB_SUFFIX).await? {
            vocab.load(vocabulary);
        }

        let labels = match self.read_json::<CategoryMap>(name, LABEL_MAP_SUFFIX).await? {
            Some(map) => LabelConfig::from_category_map(map),
            None => LabelConfig::default(),
        };

        info!(
            project = name,
            rows = dataset.len(),
            annotated_rows = store.count_annotated_rows(),
            "Opened project"
        );

        Ok(Project {
            name: name.to_string(),
            dataset,
            annotator: Annotator::new(store, vocab, labels),
        })
    }

    pub async fn save_annotations(&self, project: &Project) -> Result<()> {
        let json = serde_json::to_vec(project.annotator.store().snapshot())?;
        write_atomic(&self.path(&project.name, ANNOTATIONS_SUFFIX), &json).await
    }

    pub async fn save_vocabulary(&self, project: &Project) -> Result<()> {
        let json = serde_json::to_vec(project.annotator.vocab().vocabulary())?;
        write_atomic(&self.path(&project.name, VOCAB_SUFFIX), &json).await
    }

    pub async fn save_label_map(&self, project: &Project) -> Result<()> {
        let json = serde_json::to_vec(&project.annotator.labels().category_map)?;
        write_atomic(&self.path(&project.name, LABEL_MAP_SUFFIX), &json).await
    }

    async fn data_file(&self, name: &str) -> Option<PathBuf> {
        for extension in [".csv", ".json"] {
            let path = self.path(name, extension);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str, suffix: &str) -> Result<Option<T>> {
        let path = self.path(name, suffix);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let raw = fs::read(&path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;
        let value = serde_json::from_slice(&raw).context(format!("Failed to parse {:?}", path))?;
        Ok(Some(value))
    }

    fn path(&self, name: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, suffix))
    }
}

/// Names must also not end like a side file, or `<name>.json` would be
/// shadowed by another project's vocabulary, annotations or label map.
pub fn validate_name(name: &str) -> Result<()> {
    if !PROJECT_NAME.is_match(name) {
        anyhow::bail!("Invalid project name: {:?}", name);
    }
    let data_file = format!("{}.json", name);
    if SIDE_FILE_SUFFIXES.iter().any(|suffix| data_file.ends_with(suffix)) {
        anyhow::bail!("Project name clashes with a project side file: {:?}", name);
    }
    Ok(())
}

/// Row map from a persisted annotations file. Bad keys are dropped and bad
/// rows become empty rather than failing the whole project.
fn hydrate_annotations(raw: &[u8]) -> BTreeMap<usize, Vec<SpanAnnotation>> {
    let object = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            warn!("Annotations file is not an object, starting empty");
            return BTreeMap::new();
        }
        Err(e) => {
            warn!(error = %e, "Annotations file is not valid JSON, starting empty");
            return BTreeMap::new();
        }
    };

    let mut rows = BTreeMap::new();
    for (key, value) in object {
        let Ok(row) = key.parse::<usize>() else {
            warn!(key = key.as_str(), "Skipping annotations under a non-numeric row key");
            continue;
        };
        let annotations = serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(row, error = %e, "Unreadable annotations for row, using an empty list");
            Vec::new()
        });
        rows.insert(row, annotations);
    }
    rows
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .await
        .context(format!("Failed to write file: {:?}", tmp))?;
    fs::rename(&tmp, path)
        .await
        .context(format!("Failed to replace file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload<'a>(name: &'a str, file_name: &'a str, content: &'a str) -> NewProject<'a> {
        NewProject {
            name,
            file_name,
            content: content.as_bytes(),
            vocabulary: None,
            label_map: None,
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("laptops_2024").is_ok());
        assert!(validate_name("笔记本-query").is_ok());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("a b").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_validate_name_rejects_side_file_names() {
        assert!(validate_name("p_vocab").is_err());
        assert!(validate_name("p_annotations").is_err());
        assert!(validate_name("p_label_map").is_err());
        assert!(validate_name("_vocab").is_err());
        assert!(validate_name("vocab").is_ok());
        assert!(validate_name("p_vocabulary").is_ok());
    }

    #[tokio::test]
    async fn test_side_file_name_cannot_shadow_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectStore::new(dir.path());

        let shadowing = upload("p_vocab", "rows.json", r#"[{"query": "联想"}]"#);
        assert!(projects.create_project(shadowing, StoreOptions::default()).await.is_err());
        assert!(!dir.path().join("p_vocab.json").exists());

        let vocabulary = Vocabulary::from([("brand".to_string(), vec!["联想".to_string()])]);
        let owner = NewProject {
            vocabulary: Some(vocabulary),
            ..upload("p", "rows.csv", "query\n联想\n")
        };
        projects.create_project(owner, StoreOptions::default()).await.unwrap();
        assert_eq!(projects.list_projects().await.unwrap(), vec!["p"]);
    }

    #[tokio::test]
    async fn test_create_and_reopen_project() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectStore::new(dir.path());

        let mut vocabulary = Vocabulary::new();
        vocabulary.insert("brand".into(), vec!["联想".into(), "华为".into()]);
        let new = NewProject {
            vocabulary: Some(vocabulary),
            ..upload("laptops", "rows.csv", "query\n联想拯救者\n华为笔记本\n")
        };
        let mut project = projects.create_project(new, StoreOptions::default()).await.unwrap();
        assert_eq!(project.dataset.len(), 2);

        project
            .annotator
            .store_mut()
            .add(0, &SpanAnnotation::new("联想", "品牌", 0, 2));
        project.annotator.store_mut().set_mapping(0, 0, "brand", vec!["联想".into()]);
        project.annotator.vocab_mut().add_candidate("brand", "小米");
        projects.save_annotations(&project).await.unwrap();
        projects.save_vocabulary(&project).await.unwrap();

        assert_eq!(projects.list_projects().await.unwrap(), vec!["laptops"]);
        assert!(projects.exists("laptops").await);
        assert!(!projects.exists("desktops").await);

        let reopened = projects.open_project("laptops", StoreOptions::default()).await.unwrap();
        assert_eq!(reopened.dataset.query(1), Some("华为笔记本"));
        assert_eq!(reopened.annotator.store().get(0), project.annotator.store().get(0));
        assert!(reopened.annotator.store().get(1).is_empty());
        assert_eq!(reopened.annotator.vocab().stats()["brand"], 3);
        assert_eq!(reopened.annotator.labels(), &LabelConfig::default());
        assert!(!dir.path().join("laptops_label_map.json").exists());
    }

    #[tokio::test]
    async fn test_create_seeds_annotations_and_label_map() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectStore::new(dir.path());

        let mut label_map = CategoryMap::new();
        label_map.insert("系列".into(), vec!["series".into()]);
        let content = r#"[{"query": "拯救者", "annotations": [{"text": "拯救者", "label": "系列", "start": 0, "end": 3}]}]"#;
        let new = NewProject {
            label_map: Some(label_map),
            ..upload("seeded", "rows.json", content)
        };
        projects.create_project(new, StoreOptions::default()).await.unwrap();
        assert!(dir.path().join("seeded.json").exists());

        let project = projects.open_project("seeded", StoreOptions::default()).await.unwrap();
        assert_eq!(project.annotator.store().get(0)[0].label, "系列");
        assert_eq!(project.annotator.labels().categories_for("系列"), ["series"]);
        assert!(project.annotator.labels().categories_for("品牌").is_empty());
        assert_eq!(project.summary().annotated_rows, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_missing_query() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectStore::new(dir.path());

        projects
            .create_project(upload("p", "rows.csv", "query\nx\n"), StoreOptions::default())
            .await
            .unwrap();
        assert!(projects
            .create_project(upload("p", "rows.csv", "query\ny\n"), StoreOptions::default())
            .await
            .is_err());
        assert!(projects
            .create_project(upload("q", "rows.csv", "text\ny\n"), StoreOptions::default())
            .await
            .is_err());
        assert_eq!(projects.list_projects().await.unwrap(), vec!["p"]);
    }

    #[tokio::test]
    async fn test_open_tolerates_bad_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectStore::new(dir.path());
        projects
            .create_project(upload("p", "rows.csv", "query\n联想\n华为\n"), StoreOptions::default())
            .await
            .unwrap();

        let raw = r#"{"0": [{"text": "联想", "label": "品牌", "start": 0, "end": 2}], "1": "oops", "x": []}"#;
        tokio::fs::write(dir.path().join("p_annotations.json"), raw).await.unwrap();

        let project = projects.open_project("p", StoreOptions::default()).await.unwrap();
        let store = project.annotator.store();
        assert_eq!(store.get(0).len(), 1);
        assert!(store.get(1).is_empty());
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_open_without_annotations_file_initializes_rows() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("raw.csv"), "query\na\nb\nc\n").await.unwrap();

        let projects = ProjectStore::new(dir.path());
        let project = projects.open_project("raw", StoreOptions::default()).await.unwrap();
        assert_eq!(project.annotator.store().snapshot().len(), 3);
        assert!(projects.open_project("missing", StoreOptions::default()).await.is_err());
    }
}
