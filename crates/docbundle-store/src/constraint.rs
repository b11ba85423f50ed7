// ABOUTME: Classifies SQLite constraint failures into the unique index or foreign key that fired.
// ABOUTME: Lets the store report conflicts detected by the database instead of pre-checking.

use rusqlite::{ErrorCode, ffi};

/// Which kind of constraint rejected a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Violation {
    /// A unique index or primary key. Holds the `table.column` list SQLite
    /// reports, e.g. `bundles.org_id, bundles.key_po_number`.
    Unique(String),
    ForeignKey,
    Other,
}

impl Violation {
    /// True when the unique violation involves the given `table.column`.
    pub(crate) fn on_column(&self, qualified: &str) -> bool {
        match self {
            Violation::Unique(cols) => cols.split(',').any(|c| c.trim() == qualified),
            _ => false,
        }
    }

    /// True when the violated unique constraint is exactly the given column
    /// list (order-sensitive, as SQLite reports index columns in order).
    pub(crate) fn is_exactly(&self, qualified: &[&str]) -> bool {
        match self {
            Violation::Unique(cols) => {
                let reported: Vec<&str> = cols.split(',').map(str::trim).collect();
                reported == qualified
            }
            _ => false,
        }
    }
}

/// Return the constraint violation behind an error, if it is one.
pub(crate) fn violation(err: &rusqlite::Error) -> Option<Violation> {
    let rusqlite::Error::SqliteFailure(code, message) = err else {
        return None;
    };
    if code.code != ErrorCode::ConstraintViolation {
        return None;
    }

    let message = message.as_deref().unwrap_or_default();
    Some(match code.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Violation::Unique(
            message
                .strip_prefix("UNIQUE constraint failed: ")
                .unwrap_or(message)
                .to_string(),
        ),
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Violation::ForeignKey,
        _ => Violation::Other,
    })
}
