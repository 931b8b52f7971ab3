use annotate::{
    AddOutcome, CategoryMap, LabelConfig, MappingProgress, MutationOutcome, Row, RowStatus, SpanAnnotation,
    Suggestion, Vocabulary, locate, mapping_progress, row_status,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use dataset::{NewProject, Project, ProjectSummary, validate_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::state::{AppState, internal};

/// Write the annotations file, putting `row` back to `previous` when the
/// write fails so memory never runs ahead of disk.
async fn save_row(
    state: &AppState,
    project: &mut Project,
    row: usize,
    previous: Option<Vec<SpanAnnotation>>,
) -> Result<(), StatusCode> {
    if let Err(e) = state.projects.save_annotations(project).await {
        project.annotator.store_mut().restore_row(row, previous);
        return Err(internal(e));
    }
    Ok(())
}

async fn save_vocabulary(state: &AppState, project: &mut Project, previous: Vocabulary) -> Result<(), StatusCode> {
    if let Err(e) = state.projects.save_vocabulary(project).await {
        project.annotator.vocab_mut().load(previous);
        return Err(internal(e));
    }
    Ok(())
}

async fn save_label_map(state: &AppState, project: &mut Project, previous: LabelConfig) -> Result<(), StatusCode> {
    if let Err(e) = state.projects.save_label_map(project).await {
        *project.annotator.labels_mut() = previous;
        return Err(internal(e));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    name: String,
    /// Used for its extension: `.csv` or `.json`.
    file_name: String,
    content: String,
    vocabulary: Option<Vocabulary>,
    label_map: Option<CategoryMap>,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    summary: ProjectSummary,
    labels: Vec<String>,
}

#[derive(Serialize)]
pub struct RowResponse {
    index: usize,
    query: Option<String>,
    fields: Row,
    annotations: Vec<SpanAnnotation>,
    status: RowStatus,
}

#[derive(Deserialize)]
pub struct AddAnnotationRequest {
    text: String,
    label: String,
    /// Located from `text` when either offset is missing.
    start: Option<usize>,
    end: Option<usize>,
}

#[derive(Serialize)]
pub struct AddAnnotationResponse {
    index: usize,
    annotation: SpanAnnotation,
}

#[derive(Deserialize)]
pub struct MappingRequest {
    values: Vec<String>,
}

#[derive(Serialize)]
pub struct VocabularyResponse {
    stats: BTreeMap<String, usize>,
    vocabulary: Vocabulary,
}

#[derive(Deserialize)]
pub struct CandidateRequest {
    candidate: String,
}

#[derive(Deserialize)]
pub struct LabelRequest {
    label: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn list_projects(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, StatusCode> {
    let names = state.projects.list_projects().await.map_err(internal)?;
    Ok(Json(names))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), StatusCode> {
    validate_name(&req.name).map_err(|_| StatusCode::BAD_REQUEST)?;
    if state.projects.exists(&req.name).await {
        return Err(StatusCode::CONFLICT);
    }

    let new = NewProject {
        name: &req.name,
        file_name: &req.file_name,
        content: req.content.as_bytes(),
        vocabulary: req.vocabulary,
        label_map: req.label_map,
    };
    let project = state
        .projects
        .create_project(new, state.options)
        .await
        .map_err(|e| {
            warn!(project = req.name.as_str(), error = %e, "Project creation rejected");
            StatusCode::BAD_REQUEST
        })?;

    let response = ProjectResponse {
        summary: project.summary(),
        labels: project.annotator.labels().labels.clone(),
    };
    state.insert(project);

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProjectResponse>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;

    Ok(Json(ProjectResponse {
        summary: project.summary(),
        labels: project.annotator.labels().labels.clone(),
    }))
}

pub async fn get_row(
    State(state): State<Arc<AppState>>,
    Path((name, row)): Path<(String, usize)>,
) -> Result<Json<RowResponse>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;

    let fields = project.dataset.rows.get(row).ok_or(StatusCode::NOT_FOUND)?.clone();
    let annotations = project.annotator.store().get(row).to_vec();

    Ok(Json(RowResponse {
        index: row,
        query: project.dataset.query(row).map(str::to_string),
        fields,
        status: row_status(&annotations),
        annotations,
    }))
}

pub async fn add_annotation(
    State(state): State<Arc<AppState>>,
    Path((name, row)): Path<(String, usize)>,
    Json(req): Json<AddAnnotationRequest>,
) -> Result<Response, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    if row >= project.dataset.len() {
        return Err(StatusCode::NOT_FOUND);
    }
    if req.text.is_empty() || !project.annotator.labels().labels.contains(&req.label) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let query = project.dataset.query(row).unwrap_or_default().to_string();
    let (start, end) = match (req.start, req.end) {
        (Some(start), Some(end)) => (start, end),
        _ => locate(&query, &req.text).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?,
    };
    let annotation = SpanAnnotation::new(req.text, req.label, start, end);

    let previous = project.annotator.store().snapshot().get(&row).cloned();
    let outcome = project.annotator.store_mut().add_checked(row, &annotation, &query);
    match outcome {
        AddOutcome::Added => {
            save_row(&state, &mut project, row, previous).await?;
            let index = project.annotator.store().get(row).len() - 1;
            info!(project = name.as_str(), row, index, label = annotation.label.as_str(), "Added annotation");
            Ok((StatusCode::CREATED, Json(AddAnnotationResponse { index, annotation })).into_response())
        }
        AddOutcome::Overlap { .. } => Ok((StatusCode::CONFLICT, Json(outcome)).into_response()),
        AddOutcome::InvalidSpan => Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(outcome)).into_response()),
    }
}

pub async fn update_annotation(
    State(state): State<Arc<AppState>>,
    Path((name, row, index)): Path<(String, usize, usize)>,
    Json(annotation): Json<SpanAnnotation>,
) -> Result<Json<MutationOutcome>, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    let previous = project.annotator.store().snapshot().get(&row).cloned();
    let outcome = project.annotator.store_mut().update(row, index, &annotation);
    if outcome.is_applied() {
        save_row(&state, &mut project, row, previous).await?;
    }
    Ok(Json(outcome))
}

pub async fn delete_annotation(
    State(state): State<Arc<AppState>>,
    Path((name, row, index)): Path<(String, usize, usize)>,
) -> Result<Json<MutationOutcome>, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    let previous = project.annotator.store().snapshot().get(&row).cloned();
    let outcome = project.annotator.store_mut().remove(row, index);
    if outcome.is_applied() {
        save_row(&state, &mut project, row, previous).await?;
    }
    Ok(Json(outcome))
}

pub async fn set_mapping(
    State(state): State<Arc<AppState>>,
    Path((name, row, index, category)): Path<(String, usize, usize, String)>,
    Json(req): Json<MappingRequest>,
) -> Result<Json<MutationOutcome>, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    let previous = project.annotator.store().snapshot().get(&row).cloned();
    let outcome = project
        .annotator
        .store_mut()
        .set_mapping(row, index, &category, req.values);
    if outcome.is_applied() {
        save_row(&state, &mut project, row, previous).await?;
    }
    Ok(Json(outcome))
}

pub async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    Path((name, row, index)): Path<(String, usize, usize)>,
) -> Result<Json<Vec<Suggestion>>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;

    let suggestions = project
        .annotator
        .suggestions(row, index)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(suggestions))
}

pub async fn get_vocabulary(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<VocabularyResponse>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;

    let vocab = project.annotator.vocab();
    Ok(Json(VocabularyResponse {
        stats: vocab.stats(),
        vocabulary: vocab.vocabulary().clone(),
    }))
}

pub async fn replace_vocabulary(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(vocabulary): Json<Vocabulary>,
) -> Result<Json<BTreeMap<String, usize>>, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    let previous = project.annotator.vocab().vocabulary().clone();
    project.annotator.vocab_mut().load(vocabulary);
    save_vocabulary(&state, &mut project, previous).await?;
    Ok(Json(project.annotator.vocab().stats()))
}

pub async fn add_candidate(
    State(state): State<Arc<AppState>>,
    Path((name, category)): Path<(String, String)>,
    Json(req): Json<CandidateRequest>,
) -> Result<StatusCode, StatusCode> {
    if req.candidate.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    let previous = project.annotator.vocab().vocabulary().clone();
    if !project.annotator.vocab_mut().add_candidate(&category, &req.candidate) {
        return Ok(StatusCode::OK);
    }
    save_vocabulary(&state, &mut project, previous).await?;
    Ok(StatusCode::CREATED)
}

pub async fn get_label_map(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CategoryMap>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;
    Ok(Json(project.annotator.labels().category_map.clone()))
}

pub async fn replace_label_map(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(map): Json<CategoryMap>,
) -> Result<Json<CategoryMap>, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    let previous = project.annotator.labels().clone();
    project.annotator.labels_mut().set_category_map(map);
    save_label_map(&state, &mut project, previous).await?;
    Ok(Json(project.annotator.labels().category_map.clone()))
}

pub async fn list_labels(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;
    Ok(Json(project.annotator.labels().labels.clone()))
}

pub async fn add_label(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<LabelRequest>,
) -> Result<StatusCode, StatusCode> {
    if req.label.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    if project.annotator.labels_mut().add_label(&req.label) {
        Ok(StatusCode::CREATED)
    } else {
        Err(StatusCode::CONFLICT)
    }
}

pub async fn remove_label(
    State(state): State<Arc<AppState>>,
    Path((name, label)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    let project = state.project(&name).await?;
    let mut project = project.lock().await;

    if project.annotator.labels_mut().remove_label(&label) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MappingProgress>, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;
    Ok(Json(mapping_progress(project.annotator.store(), project.dataset.len())))
}

pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, StatusCode> {
    let project = state.project(&name).await?;
    let project = project.lock().await;

    let csv = dataset::to_csv(&project.dataset, project.annotator.store()).map_err(internal)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"annotations.csv\""),
        ],
        csv,
    )
        .into_response())
}
