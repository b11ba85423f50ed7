// ABOUTME: Classification of ingested documents as produced by the upstream extraction workflow.
// ABOUTME: Invoices and purchase orders are exclusive: each may belong to at most one bundle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a doc type string is not one of the recognized classifications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized doc type: {0}")]
pub struct UnknownDocType(pub String);

/// The kind of a document, as stored in `documents.doc_type` and
/// `bundle_documents.doc_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Invoice,
    PurchaseOrder,
    Bol,
    Inspection,
    UsdaInspection,
    ColdStorageInvoice,
}

impl DocType {
    pub const ALL: [DocType; 6] = [
        DocType::Invoice,
        DocType::PurchaseOrder,
        DocType::Bol,
        DocType::Inspection,
        DocType::UsdaInspection,
        DocType::ColdStorageInvoice,
    ];

    /// The database and wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Invoice => "invoice",
            DocType::PurchaseOrder => "purchase_order",
            DocType::Bol => "bol",
            DocType::Inspection => "inspection",
            DocType::UsdaInspection => "usda_inspection",
            DocType::ColdStorageInvoice => "cold_storage_invoice",
        }
    }

    /// Whether a document of this type may belong to at most one bundle.
    /// Must stay in sync with the `bundle_documents` partial unique index.
    pub fn is_exclusive(self) -> bool {
        matches!(self, DocType::Invoice | DocType::PurchaseOrder)
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = UnknownDocType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        DocType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownDocType(s.to_string()))
    }
}
