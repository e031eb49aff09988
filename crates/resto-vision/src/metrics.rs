//! Vision metrics.

use metrics::counter;

/// Metric name constants.
pub mod names {
    /// Faces analyzed.
    pub const FACES_TOTAL: &str = "resto_faces_total";

    /// Faces ignored for being below the minimum size.
    pub const FACES_DROPPED_TOTAL: &str = "resto_faces_dropped_total";

    /// Faces whose emotion could not be classified.
    pub const CLASSIFICATION_FAILURES_TOTAL: &str = "resto_classification_failures_total";

    /// Tracks opened, by person type.
    pub const TRACKS_OPENED_TOTAL: &str = "resto_tracks_opened_total";

    /// Tracks closed.
    pub const TRACKS_CLOSED_TOTAL: &str = "resto_tracks_closed_total";

    /// Table changes detected from the video.
    pub const SCENE_CHANGES_TOTAL: &str = "resto_scene_changes_total";
}

pub fn record_faces(analyzed: usize, dropped: usize) {
    counter!(names::FACES_TOTAL).increment(analyzed as u64);
    if dropped > 0 {
        counter!(names::FACES_DROPPED_TOTAL).increment(dropped as u64);
    }
}

pub fn record_classification_failure() {
    counter!(names::CLASSIFICATION_FAILURES_TOTAL).increment(1);
}

pub fn record_track_opened(person_type: &str) {
    counter!(names::TRACKS_OPENED_TOTAL, "person_type" => person_type.to_string()).increment(1);
}

pub fn record_tracks_closed(count: usize) {
    if count > 0 {
        counter!(names::TRACKS_CLOSED_TOTAL).increment(count as u64);
    }
}

pub fn record_scene_change() {
    counter!(names::SCENE_CHANGES_TOTAL).increment(1);
}
