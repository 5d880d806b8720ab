//! Business operations over the document store.
//!
//! Services sit between the HTTP handlers and [`Storage`]. They take the
//! current time as an argument so every lifecycle rule can be tested with a
//! fixed clock.
//!
//! # Writes
//!
//! A mutation reads the document with its revision, applies a pure
//! transition from [`crate::model`], and writes back only if the revision is
//! unchanged. On a lost race the whole cycle is retried, up to
//! [`MAX_WRITE_ATTEMPTS`] times, before the caller sees
//! [`AppError::Conflict`].

pub mod alerts;
pub mod predictions;
pub mod reports;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::query::Pagination;
use crate::storage::{Document, Storage, StorageError, Versioned};

pub use alerts::AlertService;
pub use predictions::PredictionService;
pub use reports::ReportService;

pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// Fields a partial update may never overwrite.
const PROTECTED_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Whether a transition changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Modified,
    Unchanged,
}

/// Read-modify-write of one document under optimistic concurrency.
///
/// `apply` may run several times and must be a pure function of the
/// document. Modified documents are stamped with `now`, re-validated and
/// written only if nobody else wrote since they were read.
pub(crate) async fn modify<D, F>(
    storage: &Storage,
    id: &str,
    now: DateTime<Utc>,
    mut apply: F,
) -> AppResult<D>
where
    D: Document,
    F: FnMut(&mut D) -> AppResult<Change>,
{
    let entity = D::COLLECTION.entity();

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let Some(Versioned { mut doc, rev }) = storage.find_versioned::<D>(id).await? else {
            return Err(AppError::not_found(entity, id));
        };

        if apply(&mut doc)? == Change::Unchanged {
            return Ok(doc);
        }

        doc.touch(now);
        doc.validate()?;

        if storage.replace(&doc, rev).await? {
            return Ok(doc);
        }

        debug!(entity, id, attempt, "Revision changed underneath write, retrying");
    }

    Err(AppError::Conflict { entity })
}

/// Shallow merge of a JSON object into a document.
///
/// Top-level fields of `patch` replace those of `current`, except the
/// identity and timestamp fields. The result must still deserialize.
pub(crate) fn merge_patch<D: Document>(current: &D, patch: &Value) -> AppResult<D> {
    let Value::Object(patch) = patch else {
        return Err(AppError::Validation(
            "Update body must be a JSON object".to_string(),
        ));
    };

    let mut merged = serde_json::to_value(current).map_err(StorageError::from)?;
    if let Value::Object(target) = &mut merged {
        for (key, value) in patch {
            if !PROTECTED_FIELDS.contains(&key.as_str()) {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    serde_json::from_value(merged).map_err(|e| AppError::Validation(e.to_string()))
}
