use annotate::StoreOptions;
use axum::http::StatusCode;
use dashmap::DashMap;
use dataset::{Project, ProjectStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

pub type SharedProject = Arc<Mutex<Project>>;

/// Project files on disk plus the projects opened so far.
pub struct AppState {
    pub projects: ProjectStore,
    pub options: StoreOptions,
    open: DashMap<String, SharedProject>,
}

impl AppState {
    pub fn new(projects: ProjectStore, options: StoreOptions) -> Self {
        Self {
            projects,
            options,
            open: DashMap::new(),
        }
    }

    /// The named project, opened from disk on first use.
    pub async fn project(&self, name: &str) -> Result<SharedProject, StatusCode> {
        let cached = self.open.get(name).map(|p| p.value().clone());
        if let Some(project) = cached {
            return Ok(project);
        }

        if !self.projects.exists(name).await {
            return Err(StatusCode::NOT_FOUND);
        }

        let project = self
            .projects
            .open_project(name, self.options)
            .await
            .map_err(internal)?;

        Ok(self
            .open
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(project)))
            .value()
            .clone())
    }

    pub fn insert(&self, project: Project) -> SharedProject {
        let name = project.name.clone();
        let shared = Arc::new(Mutex::new(project));
        self.open.insert(name, shared.clone());
        shared
    }
}

pub fn internal(e: anyhow::Error) -> StatusCode {
    error!(error = %e, "Request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}
