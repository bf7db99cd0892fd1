use std::cmp::Ordering;

use chrono::Duration;

use crate::{
    error::{Error, Result},
    timestamp::{abs_gap, Timestamp},
    track::{TimedLocation, TrackIndex},
};

/// Index of the item nearest to a target in a slice sorted ascending.
///
/// `order` compares an item with the target and `gap` measures how far an
/// item is from it. The search finds the first item ordered after the
/// target, then picks between it and its predecessor: the predecessor
/// only when strictly closer, so ties go to the later item. Targets
/// outside the slice clamp to the first or last item.
///
/// Returns `None` for an empty slice.
pub fn nearest_index<T, D, F, G>(items: &[T], mut order: F, mut gap: G) -> Option<usize>
where
    D: PartialOrd,
    F: FnMut(&T) -> Ordering,
    G: FnMut(&T) -> D,
{
    if items.is_empty() {
        return None;
    }
    let p = items.partition_point(|item| order(item) != Ordering::Greater);
    if p == 0 {
        return Some(0);
    }
    if p == items.len() {
        return Some(items.len() - 1);
    }
    if gap(&items[p - 1]) < gap(&items[p]) {
        Some(p - 1)
    } else {
        Some(p)
    }
}

/// A track sample chosen for a capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMatch<'a> {
    pub sample: &'a TimedLocation,
    /// Time between the capture time and the sample. Informational only.
    pub certainty: Duration,
}

/// Find the track sample closest in time to `t`.
///
/// `t` must share the index's timezone awareness; resolve naive capture
/// times against the track's default offset first.
pub fn match_time<'a>(index: &'a TrackIndex, t: &Timestamp) -> Result<TrackMatch<'a>> {
    let samples = index.samples();
    let first = samples.first().ok_or(Error::EmptyIndex)?;
    first.timestamp.ensure_comparable(t)?;

    let key = t.sort_key();
    let i = nearest_index(
        samples,
        |sample| sample.timestamp.sort_key().cmp(&key),
        |sample| abs_gap(sample.timestamp.sort_key(), key),
    )
    .ok_or(Error::EmptyIndex)?;

    let sample = &samples[i];
    Ok(TrackMatch {
        sample,
        certainty: abs_gap(sample.timestamp.sort_key(), key),
    })
}
