// ABOUTME: Core library for docbundle, containing the document bundling domain types.
// ABOUTME: Defines documents, bundles, membership edges, natural keys, and snapshot computation.

pub mod doc_type;
pub mod keys;
pub mod model;
pub mod snapshot;

pub use doc_type::{DocType, UnknownDocType};
pub use keys::{NaturalKey, NaturalKeys};
pub use model::{Bundle, BundleDocument, BundleSummary, Document, NewDocument, OrgId};
pub use snapshot::{SnapshotSource, compute_snapshot, summarize_keys};
