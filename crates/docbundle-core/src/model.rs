// ABOUTME: Defines the Document, Bundle, and BundleDocument records shared across docbundle crates.
// ABOUTME: These mirror the rows of the documents, bundles, and bundle_documents tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::doc_type::DocType;

/// Organization identifier. Every bundle and document is scoped to one org.
pub type OrgId = i64;

/// A previously ingested document. Owned by the ingestion side; the bundle
/// store reads `document_data` and maintains `assigned_bundles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub org_id: OrgId,
    pub doc_type: DocType,
    pub source_filename: Option<String>,
    pub source_mime: Option<String>,
    pub document_data: Option<Value>,
    pub assigned_bundles: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for recording a freshly extracted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub org_id: OrgId,
    pub doc_type: DocType,
    #[serde(default)]
    pub source_filename: Option<String>,
    #[serde(default)]
    pub source_mime: Option<String>,
    #[serde(default)]
    pub document_data: Option<Value>,
}

impl NewDocument {
    /// Create a document input with no source metadata.
    pub fn new(org_id: OrgId, doc_type: DocType, document_data: Value) -> Self {
        Self {
            org_id,
            doc_type,
            source_filename: None,
            source_mime: None,
            document_data: Some(document_data),
        }
    }
}

/// A group of related documents sharing a business identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: Uuid,
    pub org_id: OrgId,
    pub primary_document_id: Uuid,
    pub key_po_number: Option<String>,
    pub key_invoice_number: Option<String>,
    pub key_summary: Option<Value>,
    pub documents_snapshot: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership edge tying a document to a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDocument {
    pub bundle_id: Uuid,
    pub document_id: Uuid,
    pub doc_type: DocType,
    pub added_at: DateTime<Utc>,
    pub document_snapshot: Option<Value>,
}

/// Bundle row plus member count, for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub id: Uuid,
    pub org_id: OrgId,
    pub primary_document_id: Uuid,
    pub key_po_number: Option<String>,
    pub key_invoice_number: Option<String>,
    pub key_summary: Option<Value>,
    pub document_count: usize,
    pub updated_at: DateTime<Utc>,
}
