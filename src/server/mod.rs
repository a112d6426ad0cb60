//! Web server for the issue API.
//!
//! All four operations live on a single route,
//! `/api/issues/{project}`. Success and client-error responses are both
//! HTTP 200 with the outcome in the JSON body; the only 500 is a storage
//! failure while listing. That wire contract is fixed, consumers key off
//! the `result`/`error` fields.

use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::models::{Issue, IssueFilter, IssuePatch};
use crate::storage::{self, Storage};

/// Default port for the issue API.
pub const DEFAULT_PORT: u16 = 3030;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Document store (wrapped in a Mutex, one storage round-trip at a time)
    pub store: Arc<Mutex<Storage>>,
}

impl AppState {
    /// Build state around an opened store.
    pub fn new(storage: Storage) -> Self {
        Self {
            store: Arc::new(Mutex::new(storage)),
        }
    }
}

/// Build the issue API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/issues/{project}",
            get(list_issues)
                .post(create_issue)
                .put(update_issue)
                .delete(delete_issue),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the issue API server.
pub async fn start_server(
    data_dir: &Path,
    port: u16,
    host: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Storage::open_or_init(data_dir)?;
    let app = build_router(AppState::new(storage));

    let host_addr: std::net::IpAddr = host
        .parse()
        .map_err(|e| format!("Invalid host address '{}': {}", host, e))?;
    let addr = SocketAddr::from((host_addr, port));

    tracing::info!(
        %addr,
        data_dir = %data_dir.display(),
        commit = env!("CPN_GIT_COMMIT"),
        built = env!("CPN_BUILD_TIMESTAMP"),
        "starting capstan issue API"
    );
    println!("Capstan issue API listening at http://{}", addr);
    println!("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves when the process receives Ctrl+C, draining in-flight requests.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}

/// List issues in a project, narrowed by query-parameter filters.
async fn list_issues(
    State(state): State<AppState>,
    AxumPath(project): AxumPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let filter = IssueFilter::from_params(&project, &params);

    let storage = state.store.lock().await;
    match storage.find_issues(&filter) {
        Ok(issues) => (StatusCode::OK, Json(serde_json::json!(issues))),
        Err(e) => {
            tracing::error!(error = %e, project = %project, "issue query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "could not retrieve issues",
                    "details": e.to_string()
                })),
            )
        }
    }
}

/// Request body for creating an issue
#[derive(Debug, Deserialize)]
struct CreateIssueRequest {
    issue_title: Option<String>,
    issue_text: Option<String>,
    created_by: Option<String>,
    assigned_to: Option<String>,
    status_text: Option<String>,
}

/// Returns true if a required field is present and non-empty after trimming.
fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Create an issue in a project.
async fn create_issue(
    State(state): State<AppState>,
    AxumPath(project): AxumPath<String>,
    Json(request): Json<CreateIssueRequest>,
) -> Json<serde_json::Value> {
    if !present(&request.issue_title)
        || !present(&request.issue_text)
        || !present(&request.created_by)
    {
        return Json(serde_json::json!({ "error": "required field(s) missing" }));
    }

    let issue = Issue::new(
        storage::generate_issue_id(),
        project,
        request.issue_title.unwrap_or_default(),
        request.issue_text.unwrap_or_default(),
        request.created_by.unwrap_or_default(),
        request.assigned_to.unwrap_or_default(),
        request.status_text.unwrap_or_default(),
    );

    let mut storage = state.store.lock().await;
    match storage.create_issue(&issue) {
        Ok(()) => Json(serde_json::json!(issue)),
        Err(e) => {
            tracing::error!(error = %e, id = %issue.id, "issue save failed");
            Json(serde_json::json!({
                "error": "could not save issue",
                "details": e.to_string()
            }))
        }
    }
}

/// Request body for updating an issue
#[derive(Debug, Deserialize)]
struct UpdateIssueRequest {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(flatten)]
    patch: IssuePatch,
}

/// Apply a partial update to one issue.
///
/// Validation short-circuits in order: missing `_id`, empty patch,
/// malformed `_id`, then no match on `_id` + project. Malformed and
/// missing are deliberately the same "could not update" on the wire.
async fn update_issue(
    State(state): State<AppState>,
    AxumPath(project): AxumPath<String>,
    Json(request): Json<UpdateIssueRequest>,
) -> Json<serde_json::Value> {
    let Some(id) = request.id.filter(|s| !s.is_empty()) else {
        return Json(serde_json::json!({ "error": "missing _id" }));
    };

    if request.patch.is_empty() {
        return Json(serde_json::json!({
            "error": "no update field(s) sent",
            "_id": id
        }));
    }

    if storage::validate_issue_id(&id).is_err() {
        return Json(serde_json::json!({ "error": "could not update", "_id": id }));
    }

    let mut storage = state.store.lock().await;
    match storage.update_issue(&id, &project, &request.patch) {
        Ok(_) => Json(serde_json::json!({
            "result": "successfully updated",
            "_id": id
        })),
        Err(crate::Error::NotFound(_)) => {
            Json(serde_json::json!({ "error": "could not update", "_id": id }))
        }
        Err(e) => {
            tracing::error!(error = %e, id = %id, "issue update failed");
            Json(serde_json::json!({ "error": "could not update", "_id": id }))
        }
    }
}

/// Request body for deleting an issue
#[derive(Debug, Deserialize)]
struct DeleteIssueRequest {
    #[serde(rename = "_id")]
    id: Option<String>,
}

/// Delete one issue by `_id` within a project.
async fn delete_issue(
    State(state): State<AppState>,
    AxumPath(project): AxumPath<String>,
    Json(request): Json<DeleteIssueRequest>,
) -> Json<serde_json::Value> {
    let Some(id) = request.id.filter(|s| !s.is_empty()) else {
        return Json(serde_json::json!({ "error": "missing _id" }));
    };

    if storage::validate_issue_id(&id).is_err() {
        return Json(serde_json::json!({ "error": "could not delete", "_id": id }));
    }

    let mut storage = state.store.lock().await;
    match storage.delete_issue(&id, &project) {
        Ok(()) => Json(serde_json::json!({
            "result": "successfully deleted",
            "_id": id
        })),
        Err(crate::Error::NotFound(_)) => {
            Json(serde_json::json!({ "error": "could not delete", "_id": id }))
        }
        Err(e) => {
            tracing::error!(error = %e, id = %id, "issue delete failed");
            Json(serde_json::json!({ "error": "could not delete", "_id": id }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_requires_non_whitespace() {
        assert!(present(&Some("T".to_string())));
        assert!(!present(&Some(String::new())));
        assert!(!present(&Some("   ".to_string())));
        assert!(!present(&None));
    }

    #[test]
    fn test_update_request_flattens_patch() {
        let body = r#"{"_id": "cpn-3f9a12bc04de", "open": false, "ignored": 1}"#;
        let request: UpdateIssueRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.id.as_deref(), Some("cpn-3f9a12bc04de"));
        assert_eq!(request.patch.open, Some(false));
        assert!(request.patch.issue_title.is_none());
    }

    #[test]
    fn test_update_request_without_id() {
        let body = r#"{"open": false}"#;
        let request: UpdateIssueRequest = serde_json::from_str(body).unwrap();
        assert!(request.id.is_none());
        assert!(!request.patch.is_empty());
    }
}
