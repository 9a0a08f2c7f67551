//! Best-effort application of JSON Patch operations.
//!
//! Only `replace`, `add` and `remove` are applied. Each operation in a batch
//! is independent: a failure is logged and recorded in the [`BatchOutcome`]
//! and the remaining operations still run.

use crate::error::{PatchError, PatchResult};
use crate::{Document, JsonValue, pointer};
use json_patch::PatchOperation;

/// Result of applying one batch of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of operations that were applied.
    pub applied: usize,
    /// Operations that were skipped, in batch order.
    pub failures: Vec<PatchFailure>,
}

impl BatchOutcome {
    /// Total number of operations seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied + self.failures.len()
    }

    /// Whether every operation was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A skipped operation and the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure {
    /// Position of the operation in its batch.
    pub index: usize,
    /// Why it failed.
    pub error: PatchError,
}

/// Apply a single raw operation record to `doc`.
///
/// # Errors
///
/// Returns [`PatchError::Decode`] when the record is not an operation,
/// [`PatchError::Unsupported`] for `move`, `copy`, `test` or unknown kinds,
/// and [`PatchError::Pointer`] when the path cannot be resolved.
pub fn apply_one(doc: &mut Document, op: &JsonValue) -> PatchResult<()> {
    match op.get("op").and_then(JsonValue::as_str) {
        Some("add" | "remove" | "replace") => {}
        Some(other) => {
            return Err(PatchError::Unsupported {
                op: other.to_owned(),
            });
        }
        None => {
            return Err(PatchError::Decode {
                reason: "missing string field 'op'".into(),
            });
        }
    }

    let decoded: PatchOperation =
        serde_json::from_value(op.clone()).map_err(|e| PatchError::Decode {
            reason: e.to_string(),
        })?;

    match decoded {
        PatchOperation::Replace(op) => {
            let path = op.path.as_str();
            pointer::set(doc, path, op.value).map_err(|source| PatchError::Pointer {
                op: "replace",
                path: path.to_owned(),
                source,
            })
        }
        PatchOperation::Add(op) => {
            let path = op.path.as_str();
            pointer::insert(doc, path, op.value).map_err(|source| PatchError::Pointer {
                op: "add",
                path: path.to_owned(),
                source,
            })
        }
        PatchOperation::Remove(op) => {
            let path = op.path.as_str();
            pointer::remove(doc, path)
                .map(drop)
                .map_err(|source| PatchError::Pointer {
                    op: "remove",
                    path: path.to_owned(),
                    source,
                })
        }
        other => Err(PatchError::Unsupported {
            op: operation_name(&other).to_owned(),
        }),
    }
}

/// Apply every operation in `ops`, in order, skipping the ones that fail.
///
/// Never fails as a whole. Each skipped operation is logged at `warn` and
/// returned in [`BatchOutcome::failures`].
pub fn apply_batch(doc: &mut Document, ops: &[JsonValue]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for (index, op) in ops.iter().enumerate() {
        match apply_one(doc, op) {
            Ok(()) => outcome.applied += 1,
            Err(error) => {
                tracing::warn!(index, %error, "skipping patch operation");
                outcome.failures.push(PatchFailure { index, error });
            }
        }
    }
    outcome
}

fn operation_name(op: &PatchOperation) -> &'static str {
    match op {
        PatchOperation::Add(_) => "add",
        PatchOperation::Remove(_) => "remove",
        PatchOperation::Replace(_) => "replace",
        PatchOperation::Move(_) => "move",
        PatchOperation::Copy(_) => "copy",
        PatchOperation::Test(_) => "test",
    }
}
