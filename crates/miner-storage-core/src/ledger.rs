//! Capacity ledger: decides whether a batch fits or must trigger eviction.

use crate::error::StorageError;
use crate::models::DataEntity;

/// Bytes in one GB as used by the operator-facing size hint.
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

pub fn gb_to_bytes(gb: u64) -> u64 {
    gb.saturating_mul(BYTES_PER_GB)
}

/// What ingestion must do before upserting a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPlan {
    Proceed,
    Evict { target_bytes: u64 },
}

/// Total declared content size of a batch.
pub fn batch_size(entities: &[DataEntity]) -> u64 {
    entities
        .iter()
        .fold(0u64, |acc, e| acc.saturating_add(e.content_size_bytes))
}

/// Reject a batch that could never fit, even into an empty store.
pub fn check_batch(added_size: u64, capacity: u64) -> Result<(), StorageError> {
    if added_size > capacity {
        return Err(StorageError::CapacityExceeded {
            requested: added_size,
            capacity,
        });
    }
    Ok(())
}

/// Decide whether `added_size` bytes fit on top of `current_size`.
///
/// When they don't, at least a tenth of the capacity is reclaimed so that
/// near-full stores don't evict on every insert, and never less than the
/// batch itself. A store already over capacity (for example after the
/// capacity was lowered) must also shed its excess, so the target is never
/// below `current_size + added_size - capacity`.
pub fn plan_capacity(current_size: u64, added_size: u64, capacity: u64) -> CapacityPlan {
    let projected = current_size.saturating_add(added_size);
    if projected <= capacity {
        return CapacityPlan::Proceed;
    }
    CapacityPlan::Evict {
        target_bytes: (capacity / 10).max(added_size).max(projected - capacity),
    }
}
