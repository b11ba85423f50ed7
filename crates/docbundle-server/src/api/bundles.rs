// ABOUTME: Bundle API handlers: bundle-for-document upsert, lookup, membership edits, refresh, delete.
// ABOUTME: Natural-key and exclusive-membership conflicts surface as 409 responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use docbundle_core::{Bundle, BundleDocument, BundleSummary, DocType, NaturalKey, OrgId};
use docbundle_store::{AssignOutcome, BundleStore, Entity, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::{ApiError, JsonBody, OrgQuery, QueryParams, parse_id, resolve_org};
use crate::app_state::SharedState;

/// A bundle together with its membership edges.
#[derive(Debug, Serialize)]
pub struct BundleDetail {
    #[serde(flatten)]
    pub bundle: Bundle,
    pub documents: Vec<BundleDocument>,
}

#[derive(Debug, Deserialize)]
pub struct BundleDocumentRequest {
    pub document_id: Uuid,
    #[serde(default)]
    pub org_id: Option<OrgId>,
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub document_id: Uuid,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub snapshot: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub org_id: Option<OrgId>,
    pub po_number: Option<String>,
    pub invoice_number: Option<String>,
}

fn load_detail(store: &BundleStore, bundle_id: Uuid) -> Result<BundleDetail, StoreError> {
    let bundle = store
        .get_bundle(bundle_id)?
        .ok_or_else(|| StoreError::not_found(Entity::Bundle, bundle_id))?;
    let documents = store.list_members(bundle_id)?;
    Ok(BundleDetail { bundle, documents })
}

/// GET /api/bundles - Bundles of the org, most recently updated first.
pub async fn list_bundles(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<OrgQuery>,
) -> Result<Json<Vec<BundleSummary>>, ApiError> {
    let org_id = resolve_org(&state, query.org_id)?;
    let bundles = state
        .with_store(move |store| store.list_bundles(org_id))
        .await?;
    Ok(Json(bundles))
}

/// POST /api/bundles - Put a document into the bundle owning its natural key.
/// 201 when a bundle was created, 200 otherwise.
pub async fn bundle_document(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<BundleDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let org_id = resolve_org(&state, req.org_id)?;
    let retry = state.retry;
    let assignment = state
        .with_store(move |store| store.bundle_document(org_id, req.document_id, &retry))
        .await?;

    let status = match assignment.outcome {
        AssignOutcome::Created => StatusCode::CREATED,
        AssignOutcome::Attached | AssignOutcome::AlreadyAssigned => StatusCode::OK,
    };
    Ok((status, Json(assignment)))
}

/// GET /api/bundles/lookup - Find a bundle by PO or invoice number.
pub async fn lookup_bundle(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<LookupQuery>,
) -> Result<Json<Bundle>, ApiError> {
    let org_id = resolve_org(&state, query.org_id)?;
    let key = match (query.po_number, query.invoice_number) {
        (Some(po), None) => NaturalKey::PoNumber(po),
        (None, Some(invoice)) => NaturalKey::InvoiceNumber(invoice),
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of po_number or invoice_number is required".to_string(),
            ));
        }
    };

    state
        .with_store(move |store| store.find_by_natural_key(org_id, &key))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no bundle for that key".to_string()))
}

/// GET /api/bundles/{id} - Bundle with its members.
pub async fn get_bundle(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<BundleDetail>, ApiError> {
    let bundle_id = parse_id(&id, "bundle")?;
    let detail = state
        .with_store(move |store| load_detail(store, bundle_id))
        .await?;
    Ok(Json(detail))
}

/// POST /api/bundles/{id}/add - Attach a document. The membership type
/// defaults to the document's own doc type.
pub async fn attach_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<AttachRequest>,
) -> Result<Json<BundleDetail>, ApiError> {
    let bundle_id = parse_id(&id, "bundle")?;
    let doc_type = req
        .doc_type
        .as_deref()
        .map(str::parse::<DocType>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let detail = state
        .with_store(move |store| {
            let doc_type = match doc_type {
                Some(t) => t,
                None => {
                    store
                        .get_document(req.document_id)?
                        .ok_or_else(|| StoreError::not_found(Entity::Document, req.document_id))?
                        .doc_type
                }
            };
            store.attach_document(bundle_id, req.document_id, doc_type, req.snapshot)?;
            load_detail(store, bundle_id)
        })
        .await?;
    Ok(Json(detail))
}

/// DELETE /api/bundles/{id}/documents/{document_id} - Detach a document.
pub async fn detach_document(
    State(state): State<SharedState>,
    Path((id, document_id)): Path<(String, String)>,
) -> Result<Json<BundleDetail>, ApiError> {
    let bundle_id = parse_id(&id, "bundle")?;
    let document_id = parse_id(&document_id, "document")?;
    let detail = state
        .with_store(move |store| {
            store.detach_document(bundle_id, document_id)?;
            load_detail(store, bundle_id)
        })
        .await?;
    Ok(Json(detail))
}

/// POST /api/bundles/{id}/refresh - Recompute snapshots from live document data.
pub async fn refresh_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let bundle_id = parse_id(&id, "bundle")?;
    let snapshot = state
        .with_store(move |store| store.refresh_snapshot(bundle_id))
        .await?;
    Ok(Json(serde_json::json!({ "documents_snapshot": snapshot })))
}

/// DELETE /api/bundles/{id}
pub async fn delete_bundle(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let bundle_id = parse_id(&id, "bundle")?;
    state
        .with_store(move |store| store.delete_bundle(bundle_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
