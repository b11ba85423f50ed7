// ABOUTME: Document records consumed by the bundle store: insert, payload update, delete, listing.
// ABOUTME: Keeps assigned_bundles and bundle snapshots consistent with every document write.

use chrono::{DateTime, Utc};
use docbundle_core::{Document, NewDocument, OrgId};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::bundles::{refresh_member_snapshots, rewrite_bundle_snapshot};
use crate::constraint::{Violation, violation};
use crate::error::{Conflict, Entity, StoreError, validate_org};
use crate::rows::{DOCUMENT_COLUMNS, document_from_row, json_text, opt_json_text, ts};
use crate::store::BundleStore;

impl BundleStore {
    /// Record a newly extracted document. It starts with no bundles.
    pub fn insert_document(&mut self, doc: NewDocument) -> Result<Document, StoreError> {
        validate_org(doc.org_id)?;
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            org_id: doc.org_id,
            doc_type: doc.doc_type,
            source_filename: doc.source_filename,
            source_mime: doc.source_mime,
            document_data: doc.document_data,
            assigned_bundles: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO documents (id, org_id, doc_type, source_filename, source_mime,
                                    document_data, assigned_bundles, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?7)",
            params![
                document.id.to_string(),
                document.org_id,
                document.doc_type.as_str(),
                document.source_filename,
                document.source_mime,
                opt_json_text(document.document_data.as_ref())?,
                ts(&now),
            ],
        )?;

        tracing::debug!(document_id = %document.id, doc_type = %document.doc_type, "document recorded");
        Ok(document)
    }

    /// Fetch a document by id.
    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        load_document(&self.conn, id)
    }

    /// Replace a document's payload and refresh the snapshots of every bundle
    /// it belongs to, in one transaction.
    pub fn update_document_data(&mut self, id: Uuid, data: Value) -> Result<Document, StoreError> {
        let now = Utc::now();
        let tx = self.write_tx()?;

        let updated = tx.execute(
            "UPDATE documents SET document_data = ?1, updated_at = ?2 WHERE id = ?3",
            params![json_text(&data)?, ts(&now), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found(Entity::Document, id));
        }

        for bundle_id in bundles_containing(&tx, id)? {
            refresh_member_snapshots(&tx, bundle_id)?;
            rewrite_bundle_snapshot(&tx, bundle_id, now)?;
        }

        let document = load_document(&tx, id)?.ok_or_else(|| StoreError::not_found(Entity::Document, id))?;
        tx.commit()?;
        Ok(document)
    }

    /// Delete a document. Rejected while any bundle uses it as its primary
    /// document; otherwise its memberships cascade away and the affected
    /// bundles' snapshots are recomputed.
    pub fn delete_document(&mut self, id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        let tx = self.write_tx()?;

        let affected = bundles_containing(&tx, id)?;
        let deleted = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
            .map_err(|e| match violation(&e) {
                Some(Violation::ForeignKey) => StoreError::Conflict(Conflict::PrimaryDocumentInUse {
                    document_id: id,
                    bundle_id: primary_of(&tx, id).ok().flatten(),
                }),
                _ => StoreError::Sqlite(e),
            })?;
        if deleted == 0 {
            return Err(StoreError::not_found(Entity::Document, id));
        }

        for bundle_id in affected {
            rewrite_bundle_snapshot(&tx, bundle_id, now)?;
        }

        tx.commit()?;
        tracing::info!(document_id = %id, "document deleted");
        Ok(())
    }

    /// Documents in the org that belong to no bundle, newest first.
    pub fn list_unassigned_documents(&self, org_id: OrgId) -> Result<Vec<Document>, StoreError> {
        validate_org(org_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE org_id = ?1 AND assigned_bundles = '[]'
             ORDER BY created_at DESC, id"
        ))?;

        let rows = stmt.query_map(params![org_id], document_from_row)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }
}

pub(crate) fn load_document(conn: &Connection, id: Uuid) -> Result<Option<Document>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id.to_string()],
            document_from_row,
        )
        .optional()?)
}

/// Ids of every bundle the document is a member of, from the membership table.
pub(crate) fn bundles_containing(conn: &Connection, document_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT bundle_id FROM bundle_documents WHERE document_id = ?1 ORDER BY added_at, bundle_id",
    )?;
    let rows = stmt.query_map(params![document_id.to_string()], |row| {
        crate::rows::uuid_at(row, 0)
    })?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn primary_of(conn: &Connection, document_id: Uuid) -> Result<Option<Uuid>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id FROM bundles WHERE primary_document_id = ?1 ORDER BY created_at LIMIT 1",
            params![document_id.to_string()],
            |row| crate::rows::uuid_at(row, 0),
        )
        .optional()?)
}

/// Append a bundle id to the document's `assigned_bundles`, keeping order and
/// skipping duplicates.
pub(crate) fn add_assigned(
    conn: &Connection,
    document_id: Uuid,
    bundle_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mut assigned = assigned_bundles(conn, document_id)?;
    if assigned.contains(&bundle_id) {
        return Ok(());
    }
    assigned.push(bundle_id);
    write_assigned(conn, document_id, &assigned, now)
}

/// Remove a bundle id from the document's `assigned_bundles`.
pub(crate) fn remove_assigned(
    conn: &Connection,
    document_id: Uuid,
    bundle_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mut assigned = assigned_bundles(conn, document_id)?;
    let before = assigned.len();
    assigned.retain(|b| *b != bundle_id);
    if assigned.len() == before {
        return Ok(());
    }
    write_assigned(conn, document_id, &assigned, now)
}

fn assigned_bundles(conn: &Connection, document_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
    conn.query_row(
        "SELECT assigned_bundles FROM documents WHERE id = ?1",
        params![document_id.to_string()],
        |row| crate::rows::uuid_list_at(row, 0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(Entity::Document, document_id))
}

fn write_assigned(
    conn: &Connection,
    document_id: Uuid,
    assigned: &[Uuid],
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE documents SET assigned_bundles = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(assigned)?, ts(&now), document_id.to_string()],
    )?;
    Ok(())
}
