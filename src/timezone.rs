use std::collections::HashSet;

use chrono::FixedOffset;
use log::{debug, info};

use crate::track::TrackIndex;

/// Offset to assume for capture times that carry none.
///
/// Returns the offset when every sample in the index shares a single UTC
/// offset. A track that spans several offsets (or carries no zone at all)
/// gives no default, and naive capture times are then compared as they
/// are.
pub fn default_offset(index: &TrackIndex) -> Option<FixedOffset> {
    let offsets: HashSet<FixedOffset> = index
        .samples()
        .iter()
        .filter_map(|sample| sample.timestamp.offset())
        .collect();

    if offsets.len() == 1 {
        let offset = offsets.into_iter().next();
        if let Some(offset) = offset {
            info!("Using track timezone {} for capture times without one", offset);
        }
        offset
    } else {
        debug!("Track has {} distinct UTC offsets, no default timezone", offsets.len());
        None
    }
}
