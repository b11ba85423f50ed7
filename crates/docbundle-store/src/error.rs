// ABOUTME: Error taxonomy for bundle store operations: not found, conflict, validation, storage.
// ABOUTME: Conflicts carry enough detail for callers to redirect a create into an attach.

use std::fmt;

use docbundle_core::{DocType, OrgId};
use thiserror::Error;
use uuid::Uuid;

/// The kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Document,
    Bundle,
    Membership,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Document => "document",
            Entity::Bundle => "bundle",
            Entity::Membership => "bundle membership",
        })
    }
}

/// A uniqueness or ownership invariant that the write would have violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("org {org_id} already has a bundle for PO number {po_number}")]
    PoNumberTaken { org_id: OrgId, po_number: String },

    #[error("org {org_id} already has a bundle for invoice number {invoice_number}")]
    InvoiceNumberTaken {
        org_id: OrgId,
        invoice_number: String,
    },

    #[error("document {document_id} already belongs to another bundle")]
    DocumentAlreadyBundled {
        document_id: Uuid,
        bundle_id: Option<Uuid>,
    },

    #[error("document {document_id} is the primary document of an existing bundle")]
    PrimaryDocumentInUse {
        document_id: Uuid,
        bundle_id: Option<Uuid>,
    },

    #[error("primary document {document_id} cannot be detached from bundle {bundle_id}")]
    PrimaryDocumentDetach { bundle_id: Uuid, document_id: Uuid },

    #[error("primary document {document_id} of bundle {bundle_id} must stay typed as {doc_type}")]
    PrimaryDocumentRetype {
        bundle_id: Uuid,
        document_id: Uuid,
        doc_type: DocType,
    },

    #[error("primary document {document_id} of bundle {bundle_id} is shared with another bundle")]
    SharedPrimaryDocument { bundle_id: Uuid, document_id: Uuid },
}

/// Errors that can occur during bundle store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// True when another bundle in the org already claims one of the natural
    /// keys. The recovery path is lookup-then-attach.
    pub fn is_key_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict(Conflict::PoNumberTaken { .. } | Conflict::InvoiceNumberTaken { .. })
        )
    }
}

/// Reject missing or non-positive organization ids.
pub(crate) fn validate_org(org_id: OrgId) -> Result<(), StoreError> {
    if org_id <= 0 {
        return Err(StoreError::Validation(format!(
            "org_id must be a positive integer, got {org_id}"
        )));
    }
    Ok(())
}
