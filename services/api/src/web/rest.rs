//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use cognify_core::domain::{DocumentArtifact, SessionSummary, Turn};
use cognify_core::ports::PortError;
use cognify_core::progress;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        list_sessions_handler,
        list_turns_handler,
        list_artifacts_handler,
        rename_session_handler,
        delete_session_handler,
        upload_document_handler,
    ),
    components(
        schemas(
            CreateSessionResponse,
            SessionSummaryResponse,
            TurnResponse,
            ArtifactResponse,
            RenameSessionRequest,
            UploadDocumentResponse,
        )
    ),
    tags(
        (name = "Cognify API", description = "API endpoints for the voice tutoring session manager.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after successfully creating a session.
#[derive(Serialize, ToSchema)]
pub struct CreateSessionResponse {
    session_id: Uuid,
    title: String,
}

/// One session in the history listing, most recently active first.
#[derive(Serialize, ToSchema)]
pub struct SessionSummaryResponse {
    session_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    turn_count: u32,
    artifact_count: u32,
    correct_count: u32,
    total_evaluated: u32,
    /// Absent until at least one answer has been evaluated.
    mastery_percent: Option<u32>,
}

impl SessionSummaryResponse {
    fn from_domain(summary: SessionSummary) -> Self {
        let session = summary.session;
        Self {
            session_id: session.id,
            title: session.title.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            turn_count: summary.turn_count,
            artifact_count: summary.artifact_count,
            correct_count: session.correct_count,
            total_evaluated: session.total_evaluated,
            mastery_percent: progress::mastery_percent(
                session.correct_count,
                session.total_evaluated,
            ),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TurnResponse {
    id: Uuid,
    role: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl TurnResponse {
    fn from_domain(turn: Turn) -> Self {
        Self {
            id: turn.id,
            role: turn.role.as_str().to_string(),
            text: turn.text,
            created_at: turn.created_at,
        }
    }
}

/// A document artifact without its (potentially large) extracted text.
#[derive(Serialize, ToSchema)]
pub struct ArtifactResponse {
    id: Uuid,
    file_name: String,
    chapter_index: Vec<String>,
    uploaded_at: DateTime<Utc>,
}

impl ArtifactResponse {
    fn from_domain(artifact: DocumentArtifact) -> Self {
        Self {
            id: artifact.id,
            file_name: artifact.file_name,
            chapter_index: artifact.chapter_index,
            uploaded_at: artifact.uploaded_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RenameSessionRequest {
    title: String,
}

/// The response payload after a successful document upload.
#[derive(Serialize, ToSchema)]
pub struct UploadDocumentResponse {
    file_name: String,
    chapter_index: Vec<String>,
}

fn port_error_response(e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PortError::CapabilityUnavailable(_) | PortError::ModelUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PortError::Storage(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create a new, empty tutoring session.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created successfully", body = CreateSessionResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session_id = app_state
        .store
        .create_session()
        .await
        .map_err(port_error_response)?;
    let title = app_state
        .store
        .load_session(session_id)
        .await
        .map_err(port_error_response)?
        .map(|s| s.title)
        .unwrap_or_default();

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id, title }),
    ))
}

/// List all sessions with their counts and mastery, most recently active first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Session summaries", body = [SessionSummaryResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let summaries = app_state
        .store
        .list_sessions_summary()
        .await
        .map_err(port_error_response)?;

    let response: Vec<SessionSummaryResponse> = summaries
        .into_iter()
        .map(SessionSummaryResponse::from_domain)
        .collect();
    Ok(Json(response))
}

/// List a session's turns in conversation order.
#[utoipa::path(
    get,
    path = "/sessions/{id}/turns",
    params(("id" = Uuid, Path, description = "The session id")),
    responses(
        (status = 200, description = "Turns in ascending creation order", body = [TurnResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_turns_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let turns = app_state
        .store
        .list_turns(id)
        .await
        .map_err(port_error_response)?;
    let response: Vec<TurnResponse> = turns.into_iter().map(TurnResponse::from_domain).collect();
    Ok(Json(response))
}

/// List a session's document artifacts in upload order.
#[utoipa::path(
    get,
    path = "/sessions/{id}/artifacts",
    params(("id" = Uuid, Path, description = "The session id")),
    responses(
        (status = 200, description = "Artifacts in ascending upload order", body = [ArtifactResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_artifacts_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let artifacts = app_state
        .store
        .list_artifacts(id)
        .await
        .map_err(port_error_response)?;
    let response: Vec<ArtifactResponse> = artifacts
        .into_iter()
        .map(ArtifactResponse::from_domain)
        .collect();
    Ok(Json(response))
}

/// Rename a session.
#[utoipa::path(
    put,
    path = "/sessions/{id}/title",
    params(("id" = Uuid, Path, description = "The session id")),
    request_body = RenameSessionRequest,
    responses(
        (status = 204, description = "Session renamed"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn rename_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .store
        .rename_session(id, &payload.title)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a session and everything it owns. Irreversible.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "The session id")),
    responses(
        (status = 204, description = "Session and all owned turns/artifacts deleted"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .store
        .delete_session(id)
        .await
        .map_err(port_error_response)?;
    info!("Deleted session {id} with all owned turns and artifacts.");
    Ok(StatusCode::NO_CONTENT)
}

/// Upload a document into a session.
///
/// Accepts a multipart/form-data request with a single file part. The text is
/// extracted, a chapter index is generated (best effort), and the artifact
/// becomes the session's active document.
#[utoipa::path(
    post,
    path = "/sessions/{id}/documents",
    params(("id" = Uuid, Path, description = "The session id")),
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Artifact stored", body = UploadDocumentResponse),
        (status = 400, description = "Bad request (e.g., missing file)"),
        (status = 404, description = "Session not found"),
        (status = 422, description = "Text extraction failed"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (file_name, file_bytes) = if let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.file_name().unwrap_or("document.pdf").to_string();
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        (name, data.to_vec())
    } else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include a file".to_string(),
        ));
    };

    let extracted_text = app_state
        .extractor
        .extract(&file_name, &file_bytes)
        .await
        .map_err(port_error_response)?;

    // Best effort: a failed generation stores the sentinel label, never an error.
    let chapter_index = app_state.indexer.generate_index(&extracted_text).await;

    match app_state
        .store
        .add_artifact(id, &file_name, &extracted_text, &chapter_index)
        .await
    {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(UploadDocumentResponse {
                file_name,
                chapter_index,
            }),
        )),
        Err(e) => {
            error!("Failed to store artifact: {e:?}");
            Err(port_error_response(e))
        }
    }
}
