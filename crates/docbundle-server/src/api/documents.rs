// ABOUTME: Document API handlers: record, fetch, update payload, delete, list unassigned.
// ABOUTME: Payload updates cascade into the snapshots of every bundle holding the document.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use docbundle_core::{DocType, Document, NewDocument, OrgId};
use serde::Deserialize;
use serde_json::Value;

use crate::api::{ApiError, JsonBody, OrgQuery, QueryParams, parse_id, resolve_org};
use crate::app_state::SharedState;

/// Request body for recording a document.
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    #[serde(default)]
    pub org_id: Option<OrgId>,
    pub doc_type: String,
    #[serde(default)]
    pub source_filename: Option<String>,
    #[serde(default)]
    pub source_mime: Option<String>,
    #[serde(default)]
    pub document_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDataRequest {
    pub document_data: Value,
}

/// POST /api/documents - Record an extracted document.
pub async fn create_document(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<CreateDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let org_id = resolve_org(&state, req.org_id)?;
    let doc_type: DocType = req
        .doc_type
        .parse()
        .map_err(|e: docbundle_core::UnknownDocType| ApiError::BadRequest(e.to_string()))?;

    let input = NewDocument {
        org_id,
        doc_type,
        source_filename: req.source_filename,
        source_mime: req.source_mime,
        document_data: req.document_data,
    };
    let document = state
        .with_store(move |store| store.insert_document(input))
        .await?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents/unassigned - Documents of the org that belong to no bundle.
pub async fn list_unassigned(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<OrgQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let org_id = resolve_org(&state, query.org_id)?;
    let documents = state
        .with_store(move |store| store.list_unassigned_documents(org_id))
        .await?;
    Ok(Json(documents))
}

/// GET /api/documents/{id}
pub async fn get_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_id(&id, "document")?;
    state
        .with_store(move |store| store.get_document(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("document not found".to_string()))
}

/// PUT /api/documents/{id}/data - Replace the extraction payload.
pub async fn update_document_data(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateDataRequest>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_id(&id, "document")?;
    let document = state
        .with_store(move |store| store.update_document_data(id, req.document_data))
        .await?;
    Ok(Json(document))
}

/// DELETE /api/documents/{id}
pub async fn delete_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "document")?;
    state
        .with_store(move |store| store.delete_document(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
