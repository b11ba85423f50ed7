// ABOUTME: Column encoding helpers shared by the store modules.
// ABOUTME: UUIDs, timestamps, and JSON are stored as TEXT and parsed back into typed values.

use chrono::{DateTime, SecondsFormat, Utc};
use docbundle_core::{Bundle, BundleDocument, DocType, Document};
use rusqlite::Row;
use rusqlite::types::Type;
use serde_json::Value;
use uuid::Uuid;

pub(crate) const DOCUMENT_COLUMNS: &str = "id, org_id, doc_type, source_filename, source_mime, \
     document_data, assigned_bundles, created_at, updated_at";

pub(crate) const BUNDLE_COLUMNS: &str = "id, org_id, primary_document_id, key_po_number, \
     key_invoice_number, key_summary, documents_snapshot, created_at, updated_at";

pub(crate) const MEMBER_COLUMNS: &str =
    "bundle_id, document_id, doc_type, added_at, document_snapshot";

/// Fixed-width RFC 3339 so that TEXT ordering matches time ordering.
pub(crate) fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn json_text(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

pub(crate) fn opt_json_text(value: Option<&Value>) -> Result<Option<String>, serde_json::Error> {
    value.map(serde_json::to_string).transpose()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn doc_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DocType> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn uuid_list_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<Uuid>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

/// Map a row selected with `DOCUMENT_COLUMNS`.
pub(crate) fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: uuid_at(row, 0)?,
        org_id: row.get(1)?,
        doc_type: doc_type_at(row, 2)?,
        source_filename: row.get(3)?,
        source_mime: row.get(4)?,
        document_data: json_at(row, 5)?,
        assigned_bundles: uuid_list_at(row, 6)?,
        created_at: ts_at(row, 7)?,
        updated_at: ts_at(row, 8)?,
    })
}

/// Map a row selected with `BUNDLE_COLUMNS`.
pub(crate) fn bundle_from_row(row: &Row<'_>) -> rusqlite::Result<Bundle> {
    Ok(Bundle {
        id: uuid_at(row, 0)?,
        org_id: row.get(1)?,
        primary_document_id: uuid_at(row, 2)?,
        key_po_number: row.get(3)?,
        key_invoice_number: row.get(4)?,
        key_summary: json_at(row, 5)?,
        documents_snapshot: json_at(row, 6)?.unwrap_or_else(|| Value::Array(Vec::new())),
        created_at: ts_at(row, 7)?,
        updated_at: ts_at(row, 8)?,
    })
}

/// Map a row selected with `MEMBER_COLUMNS`.
pub(crate) fn member_from_row(row: &Row<'_>) -> rusqlite::Result<BundleDocument> {
    Ok(BundleDocument {
        bundle_id: uuid_at(row, 0)?,
        document_id: uuid_at(row, 1)?,
        doc_type: doc_type_at(row, 2)?,
        added_at: ts_at(row, 3)?,
        document_snapshot: json_at(row, 4)?,
    })
}
