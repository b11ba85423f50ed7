// ABOUTME: Natural keys (PO number, invoice number) used to deduplicate bundles per organization.
// ABOUTME: Extracts keys from a document's extraction payload according to its doc type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::doc_type::DocType;

/// A single business identifier to look a bundle up by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalKey {
    PoNumber(String),
    InvoiceNumber(String),
}

impl NaturalKey {
    pub fn value(&self) -> &str {
        match self {
            NaturalKey::PoNumber(v) | NaturalKey::InvoiceNumber(v) => v,
        }
    }
}

/// The pair of optional natural keys a bundle may claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaturalKeys {
    pub po_number: Option<String>,
    pub invoice_number: Option<String>,
}

impl NaturalKeys {
    /// Build keys from raw strings, trimming and dropping blanks.
    pub fn new(po_number: Option<&str>, invoice_number: Option<&str>) -> Self {
        Self {
            po_number: po_number.and_then(normalize),
            invoice_number: invoice_number.and_then(normalize),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.po_number.is_none() && self.invoice_number.is_none()
    }

    /// Derive the keys a document of the given type contributes, reading the
    /// camelCase field names the extraction workflow emits.
    pub fn extract(doc_type: DocType, data: &Value) -> Self {
        match doc_type {
            DocType::PurchaseOrder => Self::new(text_field(data, "poNumber"), None),
            DocType::Invoice => Self::new(
                text_field(data, "poReference").or_else(|| text_field(data, "customerPONumber")),
                text_field(data, "invoiceNumber"),
            ),
            DocType::ColdStorageInvoice => Self::new(None, text_field(data, "invoiceNumber")),
            DocType::Bol => Self::new(text_field(data, "customerPONumber"), None),
            DocType::Inspection | DocType::UsdaInspection => Self::default(),
        }
    }

    /// Lookup candidates in priority order: PO first, then invoice.
    pub fn candidates(&self) -> Vec<NaturalKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(po) = &self.po_number {
            keys.push(NaturalKey::PoNumber(po.clone()));
        }
        if let Some(inv) = &self.invoice_number {
            keys.push(NaturalKey::InvoiceNumber(inv.clone()));
        }
        keys
    }
}

fn text_field<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_keys_are_dropped() {
        let keys = NaturalKeys::new(Some("  "), Some(" INV-9 "));
        assert!(keys.po_number.is_none());
        assert_eq!(keys.invoice_number.as_deref(), Some("INV-9"));
        assert!(!keys.is_empty());
        assert!(NaturalKeys::new(None, Some("")).is_empty());
    }

    #[test]
    fn purchase_order_contributes_po_number() {
        let keys = NaturalKeys::extract(
            DocType::PurchaseOrder,
            &json!({ "poNumber": "PO-100", "invoiceNumber": "ignored" }),
        );
        assert_eq!(keys, NaturalKeys::new(Some("PO-100"), None));
    }

    #[test]
    fn invoice_prefers_po_reference_over_customer_po() {
        let keys = NaturalKeys::extract(
            DocType::Invoice,
            &json!({
                "invoiceNumber": "INV-1",
                "poReference": "PO-100",
                "customerPONumber": "CUST-7"
            }),
        );
        assert_eq!(keys, NaturalKeys::new(Some("PO-100"), Some("INV-1")));

        let keys = NaturalKeys::extract(
            DocType::Invoice,
            &json!({ "invoiceNumber": "INV-2", "customerPONumber": "CUST-7" }),
        );
        assert_eq!(keys.po_number.as_deref(), Some("CUST-7"));
    }

    #[test]
    fn inspections_have_no_keys() {
        let keys = NaturalKeys::extract(DocType::Inspection, &json!({ "lotOrPo": "PO-100" }));
        assert!(keys.is_empty());
    }

    #[test]
    fn non_string_fields_are_ignored() {
        let keys = NaturalKeys::extract(DocType::PurchaseOrder, &json!({ "poNumber": 100 }));
        assert!(keys.is_empty());
    }

    #[test]
    fn candidates_put_po_first() {
        let keys = NaturalKeys::new(Some("PO-1"), Some("INV-1"));
        assert_eq!(
            keys.candidates(),
            vec![
                NaturalKey::PoNumber("PO-1".to_string()),
                NaturalKey::InvoiceNumber("INV-1".to_string())
            ]
        );
        assert_eq!(keys.candidates()[1].value(), "INV-1");
    }
}
