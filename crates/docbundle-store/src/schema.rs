// ABOUTME: DDL for the documents, bundles, and bundle_documents tables and their indexes.
// ABOUTME: Migrations are idempotent and record the applied version in schema_meta.

use rusqlite::{Connection, OptionalExtension, params};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    org_id INTEGER NOT NULL,
    doc_type TEXT NOT NULL,
    source_filename TEXT,
    source_mime TEXT,
    document_data TEXT,
    assigned_bundles TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_org ON documents(org_id, created_at);

CREATE TABLE IF NOT EXISTS bundles (
    id TEXT PRIMARY KEY,
    org_id INTEGER NOT NULL,
    primary_document_id TEXT NOT NULL
        REFERENCES documents(id) ON DELETE RESTRICT,
    key_po_number TEXT,
    key_invoice_number TEXT,
    key_summary TEXT,
    documents_snapshot TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS bundles_org_po_key
    ON bundles(org_id, key_po_number) WHERE key_po_number IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS bundles_org_invoice_key
    ON bundles(org_id, key_invoice_number) WHERE key_invoice_number IS NOT NULL;

CREATE INDEX IF NOT EXISTS bundles_primary_document ON bundles(primary_document_id);

CREATE TABLE IF NOT EXISTS bundle_documents (
    bundle_id TEXT NOT NULL REFERENCES bundles(id) ON DELETE CASCADE,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    doc_type TEXT NOT NULL,
    added_at TEXT NOT NULL,
    document_snapshot TEXT,
    PRIMARY KEY (bundle_id, document_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS bundle_documents_exclusive_document
    ON bundle_documents(document_id) WHERE doc_type IN ('invoice', 'purchase_order');

CREATE INDEX IF NOT EXISTS bundle_documents_document ON bundle_documents(document_id);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Apply the schema and record its version.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_V1)?;
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the recorded schema version, if any.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.parse().ok()))
}
