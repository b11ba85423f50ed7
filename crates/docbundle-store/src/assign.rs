// ABOUTME: Bundle-for-document upsert: attach to the bundle owning the document's natural key or create one.
// ABOUTME: Losing a natural-key race is retried as lookup-then-attach with bounded exponential backoff.

use std::time::Duration;

use docbundle_core::{NaturalKeys, OrgId, summarize_keys};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bundles::NewBundle;
use crate::error::{Entity, StoreError, validate_org};
use crate::store::BundleStore;

/// How often and how patiently `bundle_document` retries after losing a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each following retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, conflicts surface immediately.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        self.base_delay.saturating_mul(1 << shift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOutcome {
    Created,
    Attached,
    AlreadyAssigned,
}

/// Result of `bundle_document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub bundle_id: Uuid,
    pub outcome: AssignOutcome,
}

impl BundleStore {
    /// Put a document into the bundle that owns its natural key, creating
    /// that bundle when none exists yet.
    pub fn bundle_document(
        &mut self,
        org_id: OrgId,
        document_id: Uuid,
        retry: &RetryPolicy,
    ) -> Result<Assignment, StoreError> {
        validate_org(org_id)?;
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_bundle_document(org_id, document_id) {
                Err(err) if err.is_key_conflict() && attempt < attempts => {
                    let delay = retry.delay(attempt);
                    tracing::warn!(
                        document_id = %document_id,
                        attempt,
                        delay = ?delay,
                        error = %err,
                        "lost natural-key race, retrying as attach"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn try_bundle_document(
        &mut self,
        org_id: OrgId,
        document_id: Uuid,
    ) -> Result<Assignment, StoreError> {
        let document = self
            .get_document(document_id)?
            .ok_or_else(|| StoreError::not_found(Entity::Document, document_id))?;
        if document.org_id != org_id {
            return Err(StoreError::Validation(format!(
                "document {} belongs to org {}, not org {}",
                document.id, document.org_id, org_id
            )));
        }

        let keys = document
            .document_data
            .as_ref()
            .map(|data| NaturalKeys::extract(document.doc_type, data))
            .unwrap_or_default();

        for key in keys.candidates() {
            if let Some(bundle) = self.find_by_natural_key(org_id, &key)? {
                self.attach_document(bundle.id, document.id, document.doc_type, None)?;
                tracing::info!(
                    bundle_id = %bundle.id,
                    document_id = %document.id,
                    key = key.value(),
                    "document attached to existing bundle"
                );
                return Ok(Assignment {
                    bundle_id: bundle.id,
                    outcome: AssignOutcome::Attached,
                });
            }
        }

        if let Some(&bundle_id) = document.assigned_bundles.first() {
            return Ok(Assignment {
                bundle_id,
                outcome: AssignOutcome::AlreadyAssigned,
            });
        }

        let summary = summarize_keys(&keys, document.doc_type, document.document_data.as_ref());
        let bundle_id = self.create_bundle(
            NewBundle::new(org_id, document.id)
                .with_keys(keys)
                .with_summary(summary),
        )?;
        Ok(Assignment {
            bundle_id,
            outcome: AssignOutcome::Created,
        })
    }
}
