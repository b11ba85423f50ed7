// ABOUTME: Bundle operations: create, attach, detach, refresh snapshot, natural-key lookup, delete.
// ABOUTME: Each write is one transaction; uniqueness is left to the schema's indexes to decide.

use chrono::{DateTime, Utc};
use docbundle_core::{
    Bundle, BundleDocument, BundleSummary, DocType, NaturalKey, NaturalKeys, OrgId, SnapshotSource,
    compute_snapshot,
};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::constraint::{Violation, violation};
use crate::documents::{add_assigned, load_document, remove_assigned};
use crate::error::{Conflict, Entity, StoreError, validate_org};
use crate::rows::{
    BUNDLE_COLUMNS, MEMBER_COLUMNS, bundle_from_row, doc_type_at, json_at, json_text,
    member_from_row, opt_json_text, ts, ts_at, uuid_at,
};
use crate::store::BundleStore;

/// Input for CreateBundle.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBundle {
    pub org_id: OrgId,
    pub primary_document_id: Uuid,
    pub keys: NaturalKeys,
    pub summary: Option<Value>,
}

impl NewBundle {
    pub fn new(org_id: OrgId, primary_document_id: Uuid) -> Self {
        Self {
            org_id,
            primary_document_id,
            keys: NaturalKeys::default(),
            summary: None,
        }
    }

    pub fn with_po_number(mut self, po_number: &str) -> Self {
        self.keys = NaturalKeys::new(Some(po_number), self.keys.invoice_number.as_deref());
        self
    }

    pub fn with_invoice_number(mut self, invoice_number: &str) -> Self {
        self.keys = NaturalKeys::new(self.keys.po_number.as_deref(), Some(invoice_number));
        self
    }

    pub fn with_keys(mut self, keys: NaturalKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_summary(mut self, summary: Value) -> Self {
        self.summary = Some(summary);
        self
    }
}

impl BundleStore {
    /// Create a bundle anchored on a primary document.
    ///
    /// The insert itself is the uniqueness check: a PO or invoice number the
    /// org already uses surfaces as a conflict from the partial unique index,
    /// and the caller should attach to the existing bundle instead. The
    /// primary document is recorded as a member typed with its own doc type.
    pub fn create_bundle(&mut self, bundle: NewBundle) -> Result<Uuid, StoreError> {
        validate_org(bundle.org_id)?;
        let keys = NaturalKeys::new(
            bundle.keys.po_number.as_deref(),
            bundle.keys.invoice_number.as_deref(),
        );
        let now = Utc::now();
        let tx = self.write_tx()?;

        let primary = load_document(&tx, bundle.primary_document_id)?
            .ok_or_else(|| StoreError::not_found(Entity::Document, bundle.primary_document_id))?;
        if primary.org_id != bundle.org_id {
            return Err(StoreError::Validation(format!(
                "document {} belongs to org {}, not org {}",
                primary.id, primary.org_id, bundle.org_id
            )));
        }

        let bundle_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO bundles (id, org_id, primary_document_id, key_po_number,
                                  key_invoice_number, key_summary, documents_snapshot,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?7)",
            params![
                bundle_id.to_string(),
                bundle.org_id,
                primary.id.to_string(),
                keys.po_number,
                keys.invoice_number,
                opt_json_text(bundle.summary.as_ref())?,
                ts(&now),
            ],
        )
        .map_err(|e| key_conflict(e, bundle.org_id, &keys, primary.id))?;

        insert_member(
            &tx,
            bundle_id,
            primary.id,
            primary.doc_type,
            now,
            primary.document_data.as_ref(),
        )?;
        add_assigned(&tx, primary.id, bundle_id, now)?;
        rewrite_bundle_snapshot(&tx, bundle_id, now)?;
        tx.commit()?;

        tracing::info!(
            bundle_id = %bundle_id,
            org_id = bundle.org_id,
            primary_document_id = %primary.id,
            po_number = keys.po_number.as_deref().unwrap_or(""),
            invoice_number = keys.invoice_number.as_deref().unwrap_or(""),
            "bundle created"
        );
        Ok(bundle_id)
    }

    /// Attach a document to a bundle.
    ///
    /// Invoices and purchase orders already in a different bundle are rejected
    /// by the exclusive-membership index. Attaching a document that is already
    /// a member updates its doc type and snapshot in place, except that the
    /// primary document's edge keeps the document's own type. Without an
    /// explicit snapshot the edge stores the document's current payload.
    pub fn attach_document(
        &mut self,
        bundle_id: Uuid,
        document_id: Uuid,
        doc_type: DocType,
        snapshot: Option<Value>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let tx = self.write_tx()?;

        let bundle = load_bundle(&tx, bundle_id)?
            .ok_or_else(|| StoreError::not_found(Entity::Bundle, bundle_id))?;
        let document = load_document(&tx, document_id)?
            .ok_or_else(|| StoreError::not_found(Entity::Document, document_id))?;
        if document.org_id != bundle.org_id {
            return Err(StoreError::Validation(format!(
                "document {} belongs to org {}, bundle {} to org {}",
                document.id, document.org_id, bundle.id, bundle.org_id
            )));
        }

        if document_id == bundle.primary_document_id && doc_type != document.doc_type {
            return Err(Conflict::PrimaryDocumentRetype {
                bundle_id,
                document_id,
                doc_type: document.doc_type,
            }
            .into());
        }

        let snapshot = snapshot.or(document.document_data);
        insert_member(&tx, bundle_id, document_id, doc_type, now, snapshot.as_ref())?;
        add_assigned(&tx, document_id, bundle_id, now)?;
        rewrite_bundle_snapshot(&tx, bundle_id, now)?;
        tx.commit()?;

        tracing::debug!(bundle_id = %bundle_id, document_id = %document_id, doc_type = %doc_type, "document attached");
        Ok(())
    }

    /// Remove a document from a bundle. The document itself is kept and its
    /// `assigned_bundles` is pruned in the same transaction.
    pub fn detach_document(&mut self, bundle_id: Uuid, document_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        let tx = self.write_tx()?;

        let bundle = load_bundle(&tx, bundle_id)?
            .ok_or_else(|| StoreError::not_found(Entity::Bundle, bundle_id))?;
        if bundle.primary_document_id == document_id {
            return Err(Conflict::PrimaryDocumentDetach {
                bundle_id,
                document_id,
            }
            .into());
        }

        let removed = tx.execute(
            "DELETE FROM bundle_documents WHERE bundle_id = ?1 AND document_id = ?2",
            params![bundle_id.to_string(), document_id.to_string()],
        )?;
        if removed == 0 {
            return Err(StoreError::not_found(
                Entity::Membership,
                format!("{bundle_id}/{document_id}"),
            ));
        }

        remove_assigned(&tx, document_id, bundle_id, now)?;
        rewrite_bundle_snapshot(&tx, bundle_id, now)?;
        tx.commit()?;

        tracing::debug!(bundle_id = %bundle_id, document_id = %document_id, "document detached");
        Ok(())
    }

    /// Recompute every member snapshot and the bundle's `documents_snapshot`
    /// from live document data. Writes only when something changed, so
    /// repeated calls are no-ops.
    pub fn refresh_snapshot(&mut self, bundle_id: Uuid) -> Result<Value, StoreError> {
        let now = Utc::now();
        let tx = self.write_tx()?;

        if load_bundle(&tx, bundle_id)?.is_none() {
            return Err(StoreError::not_found(Entity::Bundle, bundle_id));
        }
        refresh_member_snapshots(&tx, bundle_id)?;
        let snapshot = rewrite_bundle_snapshot(&tx, bundle_id, now)?;
        tx.commit()?;

        tracing::debug!(bundle_id = %bundle_id, "snapshot refreshed");
        Ok(snapshot)
    }

    /// Find the bundle in the org that claims the given PO or invoice number.
    pub fn find_by_natural_key(
        &self,
        org_id: OrgId,
        key: &NaturalKey,
    ) -> Result<Option<Bundle>, StoreError> {
        validate_org(org_id)?;
        let column = match key {
            NaturalKey::PoNumber(_) => "key_po_number",
            NaturalKey::InvoiceNumber(_) => "key_invoice_number",
        };
        let value = key.value().trim();
        if value.is_empty() {
            return Ok(None);
        }

        Ok(self
            .conn
            .query_row(
                &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE org_id = ?1 AND {column} = ?2"),
                params![org_id, value],
                bundle_from_row,
            )
            .optional()?)
    }

    /// Delete a bundle. Memberships cascade; member documents are kept and
    /// their `assigned_bundles` pruned.
    pub fn delete_bundle(&mut self, bundle_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        let tx = self.write_tx()?;

        let bundle = load_bundle(&tx, bundle_id)?
            .ok_or_else(|| StoreError::not_found(Entity::Bundle, bundle_id))?;

        let sharing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM bundles WHERE primary_document_id = ?1 AND id <> ?2",
            params![bundle.primary_document_id.to_string(), bundle_id.to_string()],
            |row| row.get(0),
        )?;
        if sharing > 0 {
            return Err(Conflict::SharedPrimaryDocument {
                bundle_id,
                document_id: bundle.primary_document_id,
            }
            .into());
        }

        let members: Vec<Uuid> = members_of(&tx, bundle_id)?
            .into_iter()
            .map(|m| m.document_id)
            .collect();

        tx.execute("DELETE FROM bundles WHERE id = ?1", params![bundle_id.to_string()])?;
        for document_id in members {
            remove_assigned(&tx, document_id, bundle_id, now)?;
        }
        tx.commit()?;

        tracing::info!(bundle_id = %bundle_id, org_id = bundle.org_id, "bundle deleted");
        Ok(())
    }

    /// Fetch a bundle by id.
    pub fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<Bundle>, StoreError> {
        load_bundle(&self.conn, bundle_id)
    }

    /// List the org's bundles with member counts, most recently updated first.
    pub fn list_bundles(&self, org_id: OrgId) -> Result<Vec<BundleSummary>, StoreError> {
        validate_org(org_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.org_id, b.primary_document_id, b.key_po_number, b.key_invoice_number,
                    b.key_summary, b.updated_at,
                    (SELECT COUNT(*) FROM bundle_documents bd WHERE bd.bundle_id = b.id)
             FROM bundles b
             WHERE b.org_id = ?1
             ORDER BY b.updated_at DESC, b.id",
        )?;

        let rows = stmt.query_map(params![org_id], |row| {
            let count: i64 = row.get(7)?;
            Ok(BundleSummary {
                id: uuid_at(row, 0)?,
                org_id: row.get(1)?,
                primary_document_id: uuid_at(row, 2)?,
                key_po_number: row.get(3)?,
                key_invoice_number: row.get(4)?,
                key_summary: json_at(row, 5)?,
                updated_at: ts_at(row, 6)?,
                document_count: usize::try_from(count).unwrap_or_default(),
            })
        })?;

        let mut bundles = Vec::new();
        for row in rows {
            bundles.push(row?);
        }
        Ok(bundles)
    }

    /// Membership edges of a bundle, in the order they were added.
    pub fn list_members(&self, bundle_id: Uuid) -> Result<Vec<BundleDocument>, StoreError> {
        if load_bundle(&self.conn, bundle_id)?.is_none() {
            return Err(StoreError::not_found(Entity::Bundle, bundle_id));
        }
        members_of(&self.conn, bundle_id)
    }
}

pub(crate) fn load_bundle(conn: &Connection, bundle_id: Uuid) -> Result<Option<Bundle>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE id = ?1"),
            params![bundle_id.to_string()],
            bundle_from_row,
        )
        .optional()?)
}

fn members_of(conn: &Connection, bundle_id: Uuid) -> Result<Vec<BundleDocument>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMBER_COLUMNS} FROM bundle_documents
         WHERE bundle_id = ?1 ORDER BY added_at, document_id"
    ))?;
    let rows = stmt.query_map(params![bundle_id.to_string()], member_from_row)?;

    let mut members = Vec::new();
    for row in rows {
        members.push(row?);
    }
    Ok(members)
}

/// Insert or update a membership edge, translating index violations into
/// conflicts.
fn insert_member(
    conn: &Connection,
    bundle_id: Uuid,
    document_id: Uuid,
    doc_type: DocType,
    added_at: DateTime<Utc>,
    snapshot: Option<&Value>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO bundle_documents (bundle_id, document_id, doc_type, added_at, document_snapshot)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(bundle_id, document_id) DO UPDATE SET
            doc_type = excluded.doc_type,
            document_snapshot = excluded.document_snapshot",
        params![
            bundle_id.to_string(),
            document_id.to_string(),
            doc_type.as_str(),
            ts(&added_at),
            opt_json_text(snapshot)?,
        ],
    )
    .map_err(|e| match violation(&e) {
        Some(v) if v.is_exactly(&["bundle_documents.document_id"]) => {
            StoreError::Conflict(Conflict::DocumentAlreadyBundled {
                document_id,
                bundle_id: exclusive_owner(conn, document_id).ok().flatten(),
            })
        }
        Some(Violation::ForeignKey) => StoreError::not_found(Entity::Document, document_id),
        _ => StoreError::Sqlite(e),
    })?;
    Ok(())
}

/// The bundle currently holding an exclusive-type membership for the document.
fn exclusive_owner(conn: &Connection, document_id: Uuid) -> Result<Option<Uuid>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT bundle_id FROM bundle_documents
             WHERE document_id = ?1 AND doc_type IN ('invoice', 'purchase_order')",
            params![document_id.to_string()],
            |row| uuid_at(row, 0),
        )
        .optional()?)
}

/// Translate a failed bundle insert into the natural-key conflict that caused it.
fn key_conflict(err: rusqlite::Error, org_id: OrgId, keys: &NaturalKeys, primary: Uuid) -> StoreError {
    match violation(&err) {
        Some(v) if v.on_column("bundles.key_po_number") => Conflict::PoNumberTaken {
            org_id,
            po_number: keys.po_number.clone().unwrap_or_default(),
        }
        .into(),
        Some(v) if v.on_column("bundles.key_invoice_number") => Conflict::InvoiceNumberTaken {
            org_id,
            invoice_number: keys.invoice_number.clone().unwrap_or_default(),
        }
        .into(),
        Some(Violation::ForeignKey) => StoreError::not_found(Entity::Document, primary),
        _ => StoreError::Sqlite(err),
    }
}

/// Recompute `documents_snapshot` from the members' live document data and
/// store it if it differs. Returns the current snapshot.
pub(crate) fn rewrite_bundle_snapshot(
    conn: &Connection,
    bundle_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Value, StoreError> {
    let (primary_id, stored): (String, Option<String>) = conn
        .query_row(
            "SELECT primary_document_id, documents_snapshot FROM bundles WHERE id = ?1",
            params![bundle_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(Entity::Bundle, bundle_id))?;

    let mut stmt = conn.prepare(
        "SELECT bd.document_id, bd.doc_type, bd.added_at, d.document_data
         FROM bundle_documents bd
         JOIN documents d ON d.id = bd.document_id
         WHERE bd.bundle_id = ?1",
    )?;
    let rows = stmt.query_map(params![bundle_id.to_string()], |row| {
        let document_id = uuid_at(row, 0)?;
        Ok(SnapshotSource {
            primary: document_id.to_string() == primary_id,
            document_id,
            doc_type: doc_type_at(row, 1)?,
            added_at: ts_at(row, 2)?,
            data: json_at(row, 3)?,
        })
    })?;
    let mut sources = Vec::new();
    for row in rows {
        sources.push(row?);
    }

    let snapshot = compute_snapshot(&sources);
    let current: Option<Value> = stored.map(|s| serde_json::from_str(&s)).transpose()?;
    if current.as_ref() != Some(&snapshot) {
        conn.execute(
            "UPDATE bundles SET documents_snapshot = ?1, updated_at = ?2 WHERE id = ?3",
            params![json_text(&snapshot)?, ts(&now), bundle_id.to_string()],
        )?;
    }
    Ok(snapshot)
}

/// Copy each member's live `document_data` into its edge snapshot where the
/// two differ.
pub(crate) fn refresh_member_snapshots(conn: &Connection, bundle_id: Uuid) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT bd.document_id, bd.document_snapshot, d.document_data
         FROM bundle_documents bd
         JOIN documents d ON d.id = bd.document_id
         WHERE bd.bundle_id = ?1",
    )?;
    let rows = stmt.query_map(params![bundle_id.to_string()], |row| {
        Ok((uuid_at(row, 0)?, json_at(row, 1)?, json_at(row, 2)?))
    })?;

    let mut stale = Vec::new();
    for row in rows {
        let (document_id, edge, live) = row?;
        if edge != live {
            stale.push((document_id, live));
        }
    }

    for (document_id, live) in stale {
        conn.execute(
            "UPDATE bundle_documents SET document_snapshot = ?1
             WHERE bundle_id = ?2 AND document_id = ?3",
            params![
                opt_json_text(live.as_ref())?,
                bundle_id.to_string(),
                document_id.to_string()
            ],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbundle_core::{Document, NewDocument};
    use serde_json::json;

    fn doc(store: &mut BundleStore, org: OrgId, doc_type: DocType, data: Value) -> Document {
        store.insert_document(NewDocument::new(org, doc_type, data)).unwrap()
    }

    fn po(store: &mut BundleStore, number: &str) -> Document {
        doc(store, 1, DocType::PurchaseOrder, json!({ "poNumber": number }))
    }

    #[test]
    fn create_bundle_records_primary_membership() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let primary = po(&mut store, "PO-100");

        let bundle_id = store
            .create_bundle(
                NewBundle::new(1, primary.id)
                    .with_po_number(" PO-100 ")
                    .with_summary(json!({ "po_number": "PO-100" })),
            )
            .unwrap();

        let bundle = store.get_bundle(bundle_id).unwrap().unwrap();
        assert_eq!(bundle.org_id, 1);
        assert_eq!(bundle.primary_document_id, primary.id);
        assert_eq!(bundle.key_po_number.as_deref(), Some("PO-100"));
        assert!(bundle.key_invoice_number.is_none());
        assert_eq!(bundle.key_summary, Some(json!({ "po_number": "PO-100" })));
        assert_eq!(bundle.documents_snapshot.as_array().unwrap().len(), 1);
        assert_eq!(bundle.documents_snapshot[0]["primary"], true);

        let members = store.list_members(bundle_id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].doc_type, DocType::PurchaseOrder);

        let primary = store.get_document(primary.id).unwrap().unwrap();
        assert_eq!(primary.assigned_bundles, vec![bundle_id]);
    }

    #[test]
    fn create_bundle_with_missing_primary_is_not_found() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let err = store.create_bundle(NewBundle::new(1, Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::Document, .. }));
    }

    #[test]
    fn create_bundle_rejects_cross_org_primary() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let other = doc(&mut store, 2, DocType::Bol, json!({}));
        let err = store.create_bundle(NewBundle::new(1, other.id)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn duplicate_po_number_conflicts_then_attach_succeeds() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let doc_a = po(&mut store, "PO-100");
        let doc_b = doc(&mut store, 1, DocType::Invoice, json!({ "invoiceNumber": "INV-1" }));

        let b1 = store
            .create_bundle(NewBundle::new(1, doc_a.id).with_po_number("PO-100"))
            .unwrap();

        let err = store
            .create_bundle(NewBundle::new(1, doc_b.id).with_po_number("PO-100"))
            .unwrap_err();
        match &err {
            StoreError::Conflict(Conflict::PoNumberTaken { org_id, po_number }) => {
                assert_eq!(*org_id, 1);
                assert_eq!(po_number, "PO-100");
            }
            other => panic!("expected PoNumberTaken, got {other:?}"),
        }
        assert!(err.is_key_conflict());

        // The failed create left nothing behind.
        assert_eq!(store.list_bundles(1).unwrap().len(), 1);
        assert!(store.get_document(doc_b.id).unwrap().unwrap().assigned_bundles.is_empty());

        store.attach_document(b1, doc_b.id, DocType::Invoice, None).unwrap();
        assert_eq!(store.list_members(b1).unwrap().len(), 2);
        assert_eq!(
            store.get_document(doc_b.id).unwrap().unwrap().assigned_bundles,
            vec![b1]
        );
    }

    #[test]
    fn duplicate_invoice_number_conflicts() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = doc(&mut store, 1, DocType::ColdStorageInvoice, json!({}));
        let b = doc(&mut store, 1, DocType::ColdStorageInvoice, json!({}));

        store
            .create_bundle(NewBundle::new(1, a.id).with_invoice_number("INV-7"))
            .unwrap();
        let err = store
            .create_bundle(NewBundle::new(1, b.id).with_invoice_number("INV-7"))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(Conflict::InvoiceNumberTaken { .. })
        ));
    }

    #[test]
    fn same_key_is_allowed_in_different_orgs() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-100");
        let b = doc(&mut store, 2, DocType::PurchaseOrder, json!({ "poNumber": "PO-100" }));

        store
            .create_bundle(NewBundle::new(1, a.id).with_po_number("PO-100"))
            .unwrap();
        store
            .create_bundle(NewBundle::new(2, b.id).with_po_number("PO-100"))
            .unwrap();
    }

    #[test]
    fn bundles_without_keys_never_collide() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = doc(&mut store, 1, DocType::Inspection, json!({}));
        let b = doc(&mut store, 1, DocType::Inspection, json!({}));
        store.create_bundle(NewBundle::new(1, a.id)).unwrap();
        store.create_bundle(NewBundle::new(1, b.id)).unwrap();
        assert_eq!(store.list_bundles(1).unwrap().len(), 2);
    }

    #[test]
    fn exclusive_document_cannot_join_two_bundles() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let b = po(&mut store, "PO-2");
        let doc_c = po(&mut store, "PO-3");
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();
        let b2 = store.create_bundle(NewBundle::new(1, b.id)).unwrap();

        store
            .attach_document(b1, doc_c.id, DocType::PurchaseOrder, None)
            .unwrap();
        let err = store
            .attach_document(b2, doc_c.id, DocType::PurchaseOrder, None)
            .unwrap_err();
        match err {
            StoreError::Conflict(Conflict::DocumentAlreadyBundled { document_id, bundle_id }) => {
                assert_eq!(document_id, doc_c.id);
                assert_eq!(bundle_id, Some(b1));
            }
            other => panic!("expected DocumentAlreadyBundled, got {other:?}"),
        }
        assert_eq!(
            store.get_document(doc_c.id).unwrap().unwrap().assigned_bundles,
            vec![b1]
        );
    }

    #[test]
    fn non_exclusive_document_can_join_many_bundles() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let b = po(&mut store, "PO-2");
        let doc_d = doc(&mut store, 1, DocType::Inspection, json!({ "grade": "A" }));
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();
        let b2 = store.create_bundle(NewBundle::new(1, b.id)).unwrap();

        store.attach_document(b1, doc_d.id, DocType::Inspection, None).unwrap();
        store.attach_document(b2, doc_d.id, DocType::Inspection, None).unwrap();

        assert_eq!(
            store.get_document(doc_d.id).unwrap().unwrap().assigned_bundles,
            vec![b1, b2]
        );
    }

    #[test]
    fn reattach_to_same_bundle_is_idempotent() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let inv = doc(&mut store, 1, DocType::Invoice, json!({ "invoiceNumber": "INV-1" }));
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();

        store.attach_document(b1, inv.id, DocType::Invoice, None).unwrap();
        store
            .attach_document(b1, inv.id, DocType::Invoice, Some(json!({ "pinned": true })))
            .unwrap();

        let members = store.list_members(b1).unwrap();
        assert_eq!(members.len(), 2);
        let edge = members.iter().find(|m| m.document_id == inv.id).unwrap();
        assert_eq!(edge.document_snapshot, Some(json!({ "pinned": true })));
        assert_eq!(
            store.get_document(inv.id).unwrap().unwrap().assigned_bundles,
            vec![b1]
        );
    }

    #[test]
    fn attach_validates_references() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let other_org = doc(&mut store, 2, DocType::Bol, json!({}));
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();

        let err = store
            .attach_document(Uuid::new_v4(), a.id, DocType::Bol, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::Bundle, .. }));

        let err = store
            .attach_document(b1, Uuid::new_v4(), DocType::Bol, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::Document, .. }));

        let err = store
            .attach_document(b1, other_org.id, DocType::Bol, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn detach_prunes_assigned_bundles_and_snapshot() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let inv = doc(&mut store, 1, DocType::Invoice, json!({ "invoiceNumber": "INV-1" }));
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();
        store.attach_document(b1, inv.id, DocType::Invoice, None).unwrap();

        store.detach_document(b1, inv.id).unwrap();

        assert!(store.get_document(inv.id).unwrap().unwrap().assigned_bundles.is_empty());
        assert_eq!(store.list_members(b1).unwrap().len(), 1);
        let bundle = store.get_bundle(b1).unwrap().unwrap();
        assert_eq!(bundle.documents_snapshot.as_array().unwrap().len(), 1);

        // Once detached, the invoice is free to join another bundle.
        let b = po(&mut store, "PO-2");
        let b2 = store.create_bundle(NewBundle::new(1, b.id)).unwrap();
        store.attach_document(b2, inv.id, DocType::Invoice, None).unwrap();
    }

    #[test]
    fn detach_errors() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let loose = doc(&mut store, 1, DocType::Bol, json!({}));
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();

        let err = store.detach_document(b1, loose.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::Membership, .. }));

        let err = store.detach_document(b1, a.id).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(Conflict::PrimaryDocumentDetach { .. })
        ));

        let err = store.detach_document(Uuid::new_v4(), a.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::Bundle, .. }));
    }

    #[test]
    fn primary_edge_cannot_be_retyped() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-100");
        let b1 = store
            .create_bundle(NewBundle::new(1, a.id).with_po_number("PO-100"))
            .unwrap();

        let err = store
            .attach_document(b1, a.id, DocType::Inspection, None)
            .unwrap_err();
        match err {
            StoreError::Conflict(Conflict::PrimaryDocumentRetype {
                bundle_id,
                document_id,
                doc_type,
            }) => {
                assert_eq!(bundle_id, b1);
                assert_eq!(document_id, a.id);
                assert_eq!(doc_type, DocType::PurchaseOrder);
            }
            other => panic!("expected PrimaryDocumentRetype, got {other:?}"),
        }
        assert_eq!(store.list_members(b1).unwrap()[0].doc_type, DocType::PurchaseOrder);

        // The purchase order still holds its exclusive slot.
        let err = store
            .create_bundle(NewBundle::new(1, a.id).with_po_number("PO-200"))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(Conflict::DocumentAlreadyBundled { .. })
        ));
        assert_eq!(store.get_document(a.id).unwrap().unwrap().assigned_bundles, vec![b1]);
        store.delete_bundle(b1).unwrap();

        // Re-attaching under its own type stays a plain snapshot update.
        let b2 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();
        store
            .attach_document(b2, a.id, DocType::PurchaseOrder, Some(json!({ "pinned": true })))
            .unwrap();
        assert_eq!(
            store.list_members(b2).unwrap()[0].document_snapshot,
            Some(json!({ "pinned": true }))
        );
    }

    #[test]
    fn refresh_snapshot_is_idempotent() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let insp = doc(&mut store, 1, DocType::Inspection, json!({ "grade": "A" }));
        let b1 = store.create_bundle(NewBundle::new(1, a.id)).unwrap();
        store
            .attach_document(b1, insp.id, DocType::Inspection, Some(json!({ "old": true })))
            .unwrap();

        let first = store.refresh_snapshot(b1).unwrap();
        let after_first = store.get_bundle(b1).unwrap().unwrap();
        let second = store.refresh_snapshot(b1).unwrap();
        let after_second = store.get_bundle(b1).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first.documents_snapshot, after_second.documents_snapshot);
        assert_eq!(after_first.updated_at, after_second.updated_at);

        // Edge snapshots were brought up to date with live data.
        let members = store.list_members(b1).unwrap();
        let edge = members.iter().find(|m| m.document_id == insp.id).unwrap();
        assert_eq!(edge.document_snapshot, Some(json!({ "grade": "A" })));
    }

    #[test]
    fn refresh_missing_bundle_is_not_found() {
        let mut store = BundleStore::open_in_memory().unwrap();
        assert!(store.refresh_snapshot(Uuid::new_v4()).unwrap_err().is_not_found());
    }

    #[test]
    fn find_by_natural_key_scopes_to_org() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-100");
        let b1 = store
            .create_bundle(
                NewBundle::new(1, a.id)
                    .with_po_number("PO-100")
                    .with_invoice_number("INV-100"),
            )
            .unwrap();

        let found = store
            .find_by_natural_key(1, &NaturalKey::PoNumber("PO-100".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b1);
        let found = store
            .find_by_natural_key(1, &NaturalKey::InvoiceNumber(" INV-100 ".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b1);

        assert!(store
            .find_by_natural_key(2, &NaturalKey::PoNumber("PO-100".to_string()))
            .unwrap()
            .is_none());
        assert!(store
            .find_by_natural_key(1, &NaturalKey::PoNumber("PO-999".to_string()))
            .unwrap()
            .is_none());
        assert!(store
            .find_by_natural_key(1, &NaturalKey::PoNumber("  ".to_string()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_bundle_cascades_memberships_but_keeps_documents() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let inv = doc(&mut store, 1, DocType::Invoice, json!({}));
        let b1 = store
            .create_bundle(NewBundle::new(1, a.id).with_po_number("PO-1"))
            .unwrap();
        store.attach_document(b1, inv.id, DocType::Invoice, None).unwrap();

        store.delete_bundle(b1).unwrap();

        assert!(store.get_bundle(b1).unwrap().is_none());
        let edges: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM bundle_documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(edges, 0);
        for id in [a.id, inv.id] {
            let d = store.get_document(id).unwrap().unwrap();
            assert!(d.assigned_bundles.is_empty());
        }

        // The key is free again and the former primary can be deleted.
        let b2 = store
            .create_bundle(NewBundle::new(1, inv.id).with_po_number("PO-1"))
            .unwrap();
        assert_ne!(b1, b2);
        store.delete_document(a.id).unwrap();
    }

    #[test]
    fn delete_bundle_rejects_shared_primary() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let insp = doc(&mut store, 1, DocType::Inspection, json!({}));
        let b1 = store.create_bundle(NewBundle::new(1, insp.id)).unwrap();
        // Non-exclusive documents can anchor more than one bundle.
        let b2 = store.create_bundle(NewBundle::new(1, insp.id)).unwrap();

        let err = store.delete_bundle(b1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(Conflict::SharedPrimaryDocument { .. })
        ));
        assert!(store.get_bundle(b2).unwrap().is_some());
    }

    #[test]
    fn delete_missing_bundle_is_not_found() {
        let mut store = BundleStore::open_in_memory().unwrap();
        assert!(store.delete_bundle(Uuid::new_v4()).unwrap_err().is_not_found());
    }

    #[test]
    fn list_bundles_counts_members() {
        let mut store = BundleStore::open_in_memory().unwrap();
        let a = po(&mut store, "PO-1");
        let insp = doc(&mut store, 1, DocType::Inspection, json!({}));
        let b1 = store
            .create_bundle(NewBundle::new(1, a.id).with_po_number("PO-1"))
            .unwrap();
        store.attach_document(b1, insp.id, DocType::Inspection, None).unwrap();

        let listed = store.list_bundles(1).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b1);
        assert_eq!(listed[0].document_count, 2);
        assert_eq!(listed[0].key_po_number.as_deref(), Some("PO-1"));
        assert!(store.list_bundles(2).unwrap().is_empty());
    }
}
