pub mod config;
pub mod routes;
pub mod state;

pub use config::{AppConfig, LogFormat};
pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    let annotation = "/projects/:name/rows/:row/annotations/:index";

    Router::new()
        .route("/health", get(routes::health_check))
        .route("/projects", get(routes::list_projects).post(routes::create_project))
        .route("/projects/:name", get(routes::get_project))
        .route("/projects/:name/rows/:row", get(routes::get_row))
        .route("/projects/:name/rows/:row/annotations", post(routes::add_annotation))
        .route(
            annotation,
            put(routes::update_annotation).delete(routes::delete_annotation),
        )
        .route(&format!("{annotation}/mapping/:category"), put(routes::set_mapping))
        .route(&format!("{annotation}/suggestions"), get(routes::get_suggestions))
        .route(
            "/projects/:name/vocabulary",
            get(routes::get_vocabulary).put(routes::replace_vocabulary),
        )
        .route("/projects/:name/vocabulary/:category", post(routes::add_candidate))
        .route(
            "/projects/:name/label-map",
            get(routes::get_label_map).put(routes::replace_label_map),
        )
        .route(
            "/projects/:name/labels",
            get(routes::list_labels).post(routes::add_label),
        )
        .route("/projects/:name/labels/:label", delete(routes::remove_label))
        .route("/projects/:name/progress", get(routes::get_progress))
        .route("/projects/:name/export", get(routes::export_csv))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
