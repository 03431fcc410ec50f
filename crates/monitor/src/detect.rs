//! Change detection.

use pitbot_core::{ManifestRecord, Marker, ReleaseEvent};

/// Compare a freshly fetched manifest against the last known marker.
///
/// Any difference is a release, including a marker that moved backwards.
/// A channel with no recorded marker releases on its first successful fetch.
pub fn detect(
    title_key: &str,
    channel_key: &str,
    record: ManifestRecord,
    last: Option<&Marker>,
) -> Option<ReleaseEvent> {
    if last == Some(&record.marker) {
        return None;
    }
    Some(ReleaseEvent {
        title_key: title_key.to_string(),
        channel_key: channel_key.to_string(),
        previous: last.cloned(),
        record,
    })
}
