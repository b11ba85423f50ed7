// ABOUTME: Persistence layer for docbundle, binding related documents into bundles in SQLite.
// ABOUTME: Enforces natural-key and exclusive-membership invariants with database constraints.

mod constraint;
mod rows;

pub mod assign;
pub mod bundles;
pub mod documents;
pub mod error;
pub mod schema;
pub mod store;

pub use assign::{AssignOutcome, Assignment, RetryPolicy};
pub use bundles::NewBundle;
pub use error::{Conflict, Entity, StoreError};
pub use store::{BundleStore, StoreOptions};
