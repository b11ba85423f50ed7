// ABOUTME: Pure computation of the denormalized bundle snapshot and key summary.
// ABOUTME: The store calls these inside write transactions; nothing here touches storage.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::doc_type::DocType;
use crate::keys::NaturalKeys;

/// One member document as seen by the snapshot: its edge metadata plus the
/// live `document_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSource {
    pub document_id: Uuid,
    pub doc_type: DocType,
    pub added_at: DateTime<Utc>,
    pub primary: bool,
    pub data: Option<Value>,
}

/// Compute a bundle's `documents_snapshot` from its members.
///
/// Deterministic: entries are ordered by `added_at`, then document id, so the
/// same membership and data always produce an identical value.
pub fn compute_snapshot(sources: &[SnapshotSource]) -> Value {
    let mut ordered: Vec<&SnapshotSource> = sources.iter().collect();
    ordered.sort_by(|a, b| {
        a.added_at
            .cmp(&b.added_at)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });

    Value::Array(
        ordered
            .into_iter()
            .map(|s| {
                json!({
                    "document_id": s.document_id.to_string(),
                    "doc_type": s.doc_type.as_str(),
                    "added_at": s.added_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                    "primary": s.primary,
                    "data": s.data.clone().unwrap_or(Value::Null),
                })
            })
            .collect(),
    )
}

/// Build the `key_summary` digest for a bundle anchored on a document.
/// Only fields that are present end up in the object.
pub fn summarize_keys(keys: &NaturalKeys, doc_type: DocType, data: Option<&Value>) -> Value {
    let mut summary = Map::new();
    summary.insert("source_doc_type".to_string(), json!(doc_type.as_str()));
    if let Some(po) = &keys.po_number {
        summary.insert("po_number".to_string(), json!(po));
    }
    if let Some(inv) = &keys.invoice_number {
        summary.insert("invoice_number".to_string(), json!(inv));
    }
    if let Some(data) = data {
        for (field, key) in [("vendorName", "vendor_name"), ("brand", "brand")] {
            if let Some(v) = data.get(field).and_then(Value::as_str).map(str::trim)
                && !v.is_empty()
            {
                summary.insert(key.to_string(), json!(v));
            }
        }
    }
    Value::Object(summary)
}
