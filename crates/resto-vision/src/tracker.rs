//! IoU-based person tracker.
//!
//! Associates each frame's face detections with live tracks by global
//! greedy IoU assignment. Track ids are monotonic and never reused: a
//! person who reappears after their track closed gets a new id.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use resto_models::{BoundingBox, PersonType, TrackId};

use crate::frame::FaceDetection;
use crate::metrics::{record_track_opened, record_tracks_closed};

/// Tracker parameters.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to continue a track
    pub iou_threshold: f64,
    /// Consecutive missed frames tolerated before a track closes
    pub max_misses: u32,
    /// Bounding boxes kept per track
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_misses: 5,
            history_len: 30,
        }
    }
}

/// Lifecycle state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Created this frame or not yet matched since
    New,
    /// Matched in the most recent frame
    Active,
    /// Missed one or more recent frames, not yet closed
    Lost,
    /// Final
    Closed,
}

/// One physically distinct person.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub person_type: PersonType,
    pub staff_identity: Option<String>,
    pub status: TrackStatus,
    /// Most recent boxes, oldest first
    pub history: VecDeque<BoundingBox>,
    pub hits: u32,
    pub misses: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Track {
    pub fn last_bbox(&self) -> Option<&BoundingBox> {
        self.history.back()
    }

    pub fn is_staff(&self) -> bool {
        self.person_type == PersonType::Staff
    }

    /// Display id, e.g. `guest_4`.
    pub fn person_id(&self) -> String {
        format!("{}_{}", self.person_type.as_str(), self.id)
    }

    /// Staff name, or `Guest N`.
    pub fn display_name(&self) -> String {
        match &self.staff_identity {
            Some(name) => name.clone(),
            None => format!("Guest {}", self.id),
        }
    }
}

/// Track assigned to one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Index into the frame's detections
    pub detection: usize,
    pub track_id: TrackId,
    /// True when the detection started a new track
    pub is_new: bool,
}

/// Outcome of one tracker update.
#[derive(Debug, Clone, Default)]
pub struct TrackerUpdate {
    /// One entry per detection, in detection order
    pub assignments: Vec<Assignment>,
    /// Tracks closed by this update
    pub closed: Vec<Track>,
}

/// Person tracker. Feed it frames strictly in order.
pub struct PersonTracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, Track>,
    next_track_id: u64,
}

impl PersonTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_track_id: 1,
        }
    }

    /// Associate one frame's detections with tracks.
    pub fn update(&mut self, detections: &[FaceDetection], at: DateTime<Utc>) -> TrackerUpdate {
        // Eligible (iou, detection, track) pairs.
        let mut pairs: Vec<(f64, usize, TrackId)> = Vec::new();
        for (det_idx, det) in detections.iter().enumerate() {
            for track in self.tracks.values() {
                if identity_conflict(track, det) {
                    continue;
                }
                let Some(last) = track.last_bbox() else {
                    continue;
                };
                let iou = last.iou(&det.bbox);
                if iou >= self.config.iou_threshold {
                    pairs.push((iou, det_idx, track.id));
                }
            }
        }

        pairs.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut det_track: Vec<Option<TrackId>> = vec![None; detections.len()];
        let mut matched_tracks: Vec<TrackId> = Vec::new();
        for (_, det_idx, track_id) in pairs {
            if det_track[det_idx].is_some() || matched_tracks.contains(&track_id) {
                continue;
            }
            det_track[det_idx] = Some(track_id);
            matched_tracks.push(track_id);
        }

        // Taken before any track opens, so a track is never aged on its first frame.
        let unmatched: Vec<TrackId> = self
            .tracks
            .keys()
            .copied()
            .filter(|id| !matched_tracks.contains(id))
            .collect();

        let mut update = TrackerUpdate::default();

        for (det_idx, det) in detections.iter().enumerate() {
            let assignment = match det_track[det_idx] {
                Some(track_id) => {
                    if let Some(track) = self.tracks.get_mut(&track_id) {
                        track.status = TrackStatus::Active;
                        track.hits += 1;
                        track.misses = 0;
                        track.last_seen = at;
                        push_bounded(&mut track.history, det.bbox, self.config.history_len);
                    }
                    Assignment {
                        detection: det_idx,
                        track_id,
                        is_new: false,
                    }
                }
                None => Assignment {
                    detection: det_idx,
                    track_id: self.open_track(det, at),
                    is_new: true,
                },
            };
            update.assignments.push(assignment);
        }

        for id in unmatched {
            let expired = match self.tracks.get_mut(&id) {
                Some(track) => {
                    track.misses += 1;
                    track.status = TrackStatus::Lost;
                    track.misses > self.config.max_misses
                }
                None => false,
            };
            if expired {
                if let Some(track) = self.close(id) {
                    update.closed.push(track);
                }
            }
        }

        record_tracks_closed(update.closed.len());
        update
    }

    fn open_track(&mut self, det: &FaceDetection, at: DateTime<Utc>) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;

        let person_type = if det.staff_identity.is_some() {
            PersonType::Staff
        } else {
            PersonType::Guest
        };
        let mut history = VecDeque::with_capacity(self.config.history_len.max(1));
        history.push_back(det.bbox);

        let track = Track {
            id,
            person_type,
            staff_identity: det.staff_identity.clone(),
            status: TrackStatus::New,
            history,
            hits: 1,
            misses: 0,
            first_seen: at,
            last_seen: at,
        };
        debug!(track_id = %id, person_type = %person_type, staff = ?track.staff_identity, "Opened track");
        record_track_opened(person_type.as_str());
        self.tracks.insert(id, track);
        id
    }

    fn close(&mut self, id: TrackId) -> Option<Track> {
        let mut track = self.tracks.remove(&id)?;
        track.status = TrackStatus::Closed;
        debug!(track_id = %id, hits = track.hits, "Closed track");
        Some(track)
    }

    /// Close every live track, oldest first.
    pub fn close_all(&mut self) -> Vec<Track> {
        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        let closed: Vec<Track> = ids.into_iter().filter_map(|id| self.close(id)).collect();
        record_tracks_closed(closed.len());
        closed
    }

    /// Close every live guest track. Staff tracks survive a table change.
    pub fn close_guests(&mut self) -> Vec<Track> {
        let ids: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|t| !t.is_staff())
            .map(|t| t.id)
            .collect();
        let closed: Vec<Track> = ids.into_iter().filter_map(|id| self.close(id)).collect();
        record_tracks_closed(closed.len());
        closed
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Live (not closed) tracks in id order.
    pub fn live_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn live_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for PersonTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

/// A staff-tagged detection never continues a track bound to another identity.
fn identity_conflict(track: &Track, det: &FaceDetection) -> bool {
    matches!(
        (&track.staff_identity, &det.staff_identity),
        (Some(a), Some(b)) if a != b
    )
}

fn push_bounded(history: &mut VecDeque<BoundingBox>, bbox: BoundingBox, cap: usize) {
    history.push_back(bbox);
    while history.len() > cap.max(1) {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use resto_models::Emotion;

    fn det(x: f64, y: f64) -> FaceDetection {
        FaceDetection::guest(BoundingBox::new(x, y, 100.0, 100.0), Emotion::Neutral, 0.9)
    }

    fn staff(x: f64, y: f64, name: &str) -> FaceDetection {
        FaceDetection::staff(BoundingBox::new(x, y, 100.0, 100.0), name, Emotion::Happy, 0.9)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn ids(update: &TrackerUpdate) -> Vec<u64> {
        update.assignments.iter().map(|a| a.track_id.get()).collect()
    }

    #[test]
    fn test_new_detections_get_sequential_ids() {
        let mut tracker = PersonTracker::default();
        let u = tracker.update(&[det(0.0, 0.0), det(300.0, 0.0)], t(0));
        assert_eq!(ids(&u), vec![1, 2]);
        assert!(u.assignments.iter().all(|a| a.is_new));
    }

    #[test]
    fn test_new_track_starts_without_misses() {
        let mut tracker = PersonTracker::default();
        tracker.update(&[det(100.0, 100.0)], t(0));
        let track = tracker.get(TrackId(1)).unwrap();
        assert_eq!(track.status, TrackStatus::New);
        assert_eq!(track.misses, 0);
        assert_eq!(track.hits, 1);

        // A second track opening later leaves the first one's count alone.
        tracker.update(&[det(100.0, 100.0), det(500.0, 100.0)], t(1));
        assert_eq!(tracker.get(TrackId(2)).unwrap().status, TrackStatus::New);
        assert_eq!(tracker.get(TrackId(2)).unwrap().misses, 0);
        assert_eq!(tracker.get(TrackId(1)).unwrap().status, TrackStatus::Active);
    }

    #[test]
    fn test_continuous_person_keeps_one_id() {
        let mut tracker = PersonTracker::default();
        let mut seen = Vec::new();
        for i in 0..20 {
            let u = tracker.update(&[det(i as f64 * 5.0, 0.0)], t(i));
            seen.extend(ids(&u));
        }
        assert!(seen.iter().all(|&id| id == 1));
        assert_eq!(tracker.get(TrackId(1)).unwrap().hits, 20);
        assert_eq!(tracker.get(TrackId(1)).unwrap().status, TrackStatus::Active);
    }

    #[test]
    fn test_absence_beyond_max_misses_closes_and_new_id_follows() {
        let mut tracker = PersonTracker::new(TrackerConfig {
            max_misses: 2,
            ..Default::default()
        });
        tracker.update(&[det(100.0, 100.0)], t(0));

        assert!(tracker.update(&[], t(1)).closed.is_empty());
        assert!(tracker.update(&[], t(2)).closed.is_empty());
        assert_eq!(tracker.get(TrackId(1)).unwrap().status, TrackStatus::Lost);

        let u = tracker.update(&[], t(3));
        assert_eq!(u.closed.len(), 1);
        assert_eq!(u.closed[0].id, TrackId(1));
        assert_eq!(u.closed[0].status, TrackStatus::Closed);
        assert_eq!(u.closed[0].last_seen, t(0));

        let u = tracker.update(&[det(100.0, 100.0)], t(4));
        assert_eq!(ids(&u), vec![2]);
        assert!(u.assignments[0].is_new);
    }

    #[test]
    fn test_short_gap_keeps_id() {
        let mut tracker = PersonTracker::default();
        tracker.update(&[det(0.0, 0.0)], t(0));
        tracker.update(&[], t(1));
        tracker.update(&[], t(2));
        let u = tracker.update(&[det(4.0, 0.0)], t(3));
        assert_eq!(ids(&u), vec![1]);
        assert!(!u.assignments[0].is_new);
    }

    #[test]
    fn test_global_greedy_prefers_best_overlap() {
        let mut tracker = PersonTracker::default();
        // Track 1 at x=0, track 2 at x=50.
        tracker.update(&[det(0.0, 0.0), det(50.0, 0.0)], t(0));

        // Detection 0 overlaps track 2 more than track 1, but detection 1
        // overlaps track 2 even more, so detection 0 falls back to track 1.
        let u = tracker.update(&[det(30.0, 0.0), det(55.0, 0.0)], t(1));
        assert_eq!(ids(&u), vec![1, 2]);
    }

    #[test]
    fn test_equal_overlap_tie_goes_to_lower_detection_index() {
        let mut tracker = PersonTracker::default();
        tracker.update(&[det(100.0, 0.0)], t(0));
        let u = tracker.update(&[det(110.0, 0.0), det(90.0, 0.0)], t(1));
        assert_eq!(ids(&u), vec![1, 2]);
        assert!(u.assignments[1].is_new);
    }

    #[test]
    fn test_conflicting_staff_identity_never_matches() {
        let mut tracker = PersonTracker::default();
        tracker.update(&[staff(0.0, 0.0, "Maria")], t(0));
        let u = tracker.update(&[staff(2.0, 0.0, "Tom")], t(1));
        assert_eq!(ids(&u), vec![2]);
        assert_eq!(tracker.get(TrackId(2)).unwrap().person_type, PersonType::Staff);

        // An untagged detection may continue a staff track.
        let u = tracker.update(&[det(2.0, 0.0)], t(2));
        assert_eq!(ids(&u), vec![2]);
    }

    #[test]
    fn test_close_guests_keeps_staff() {
        let mut tracker = PersonTracker::default();
        tracker.update(&[staff(0.0, 0.0, "Maria"), det(400.0, 0.0)], t(0));
        let closed = tracker.close_guests();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, TrackId(2));
        assert_eq!(tracker.live_count(), 1);

        let all = tracker.close_all();
        assert_eq!(all.len(), 1);
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = PersonTracker::new(TrackerConfig {
            history_len: 3,
            ..Default::default()
        });
        for i in 0..10 {
            tracker.update(&[det(i as f64, 0.0)], t(i));
        }
        let track = tracker.get(TrackId(1)).unwrap();
        assert_eq!(track.history.len(), 3);
        assert_eq!(track.last_bbox().unwrap().x, 9.0);
    }

    #[test]
    fn test_person_id_and_name() {
        let mut tracker = PersonTracker::default();
        tracker.update(&[det(0.0, 0.0), staff(400.0, 0.0, "Maria")], t(0));
        let guest = tracker.get(TrackId(1)).unwrap();
        assert_eq!(guest.person_id(), "guest_1");
        assert_eq!(guest.display_name(), "Guest 1");
        assert_eq!(tracker.get(TrackId(2)).unwrap().display_name(), "Maria");
    }
}
