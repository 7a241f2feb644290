//! Payload fragmentation
//!
//! The acoustic channel carries at most [`MAX_FRAGMENT_SIZE`] payload bytes
//! per frame. Larger payloads are split into contiguous, sequence-tagged
//! fragments that the receiving firmware reassembles.

#![warn(missing_docs)]

use crate::command_types::OperationId;
use crate::error::{RouterError, RouterResult};
use serde::{Deserialize, Serialize};

pub use acomms_core::MAX_FRAGMENT_SIZE;

/// A bounded slice of an operation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Operation the fragment belongs to
    pub parent_operation_id: OperationId,
    /// Zero-based position in the sequence
    pub sequence_index: usize,
    /// Number of fragments in the sequence
    pub sequence_count: usize,
    /// Payload slice
    pub bytes: Vec<u8>,
}

impl Fragment {
    /// True when this unit carries the whole payload
    pub fn is_whole(&self) -> bool {
        self.sequence_count == 1
    }
}

/// Split `payload` into units of at most `max_size` bytes.
///
/// A payload that fits yields a single whole-payload unit (an empty payload
/// included). Otherwise the result has `ceil(len / max_size)` fragments whose
/// in-order concatenation is the payload.
pub fn fragment(
    parent: OperationId,
    payload: &[u8],
    max_size: usize,
) -> RouterResult<Vec<Fragment>> {
    if max_size == 0 {
        return Err(RouterError::InvalidFragmentSize(max_size));
    }

    if payload.len() <= max_size {
        return Ok(vec![Fragment {
            parent_operation_id: parent,
            sequence_index: 0,
            sequence_count: 1,
            bytes: payload.to_vec(),
        }]);
    }

    let count = payload.len().div_ceil(max_size);
    Ok(payload
        .chunks(max_size)
        .enumerate()
        .map(|(index, chunk)| Fragment {
            parent_operation_id: parent,
            sequence_index: index,
            sequence_count: count,
            bytes: chunk.to_vec(),
        })
        .collect())
}

/// Rebuild a payload from a complete fragment set, in any order.
///
/// Returns `None` if fragments are missing, duplicated, belong to different
/// operations or disagree on the sequence count.
pub fn reassemble(fragments: &[Fragment]) -> Option<Vec<u8>> {
    let first = fragments.first()?;
    let count = first.sequence_count;
    if count == 0 || fragments.len() != count {
        return None;
    }

    let mut slots: Vec<Option<&[u8]>> = vec![None; count];
    for f in fragments {
        if f.parent_operation_id != first.parent_operation_id
            || f.sequence_count != count
            || f.sequence_index >= count
        {
            return None;
        }
        let slot = &mut slots[f.sequence_index];
        if slot.is_some() {
            return None;
        }
        *slot = Some(&f.bytes);
    }

    let mut payload = Vec::with_capacity(fragments.iter().map(|f| f.bytes.len()).sum());
    for slot in slots {
        payload.extend_from_slice(slot?);
    }
    Some(payload)
}
