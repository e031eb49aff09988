//! Enrolled staff gallery and descriptor matching.
//!
//! The gallery is either a JSON file of `[{ "name": ..., "descriptor": [...] }]`
//! or a directory of `<name>.json` files, each holding one descriptor array.
//! A missing gallery is not an error: staff recognition is simply disabled.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};
use crate::frame::{Descriptor, FaceRegion, Frame};
use crate::providers::{FaceEncoder, IdentityMatcher};

/// Default maximum descriptor distance for a staff match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// One enrolled staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffEntry {
    pub name: String,
    pub descriptor: Descriptor,
}

/// Enrolled staff descriptors, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct StaffGallery {
    entries: Vec<StaffEntry>,
}

impl StaffGallery {
    pub fn new(mut entries: Vec<StaffEntry>) -> Self {
        entries.retain(|e| !e.name.trim().is_empty() && !e.descriptor.is_empty());
        for e in &mut entries {
            e.name = display_name(&e.name);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    /// Load a gallery from a JSON file or a directory of descriptor files.
    pub fn load(path: &Path) -> VisionResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Staff gallery not found, staff recognition disabled");
            return Ok(Self::default());
        }

        let gallery = if path.is_dir() {
            Self::load_dir(path)?
        } else {
            let raw = std::fs::read_to_string(path)?;
            let entries: Vec<StaffEntry> = serde_json::from_str(&raw)
                .map_err(|e| VisionError::invalid_gallery(path, e.to_string()))?;
            Self::new(entries)
        };

        info!(path = %path.display(), staff = gallery.len(), "Loaded staff gallery");
        Ok(gallery)
    }

    fn load_dir(dir: &Path) -> VisionResult<Self> {
        let mut entries = Vec::new();
        for item in std::fs::read_dir(dir)? {
            let file = item?.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&file)?;
            match serde_json::from_str::<Descriptor>(&raw) {
                Ok(descriptor) => entries.push(StaffEntry {
                    name: stem.to_string(),
                    descriptor,
                }),
                Err(e) => warn!(file = %file.display(), "Skipping unreadable staff descriptor: {}", e),
            }
        }
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Closest enrolled identity strictly within `threshold`.
    ///
    /// Descriptors of a different dimension are ignored. On equal
    /// distance the alphabetically first name wins.
    pub fn best_match(&self, descriptor: &[f32], threshold: f32) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for entry in &self.entries {
            if entry.descriptor.len() != descriptor.len() {
                continue;
            }
            let d = euclidean(&entry.descriptor, descriptor);
            if d >= threshold {
                continue;
            }
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((entry.name.as_str(), d));
            }
        }
        best
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// `maria_lopez` / ` maria lopez ` -> `Maria Lopez`.
pub fn display_name(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Identity matcher backed by a face encoder and the staff gallery.
pub struct GalleryMatcher {
    encoder: Arc<dyn FaceEncoder>,
    gallery: StaffGallery,
    threshold: f32,
}

impl GalleryMatcher {
    pub fn new(encoder: Arc<dyn FaceEncoder>, gallery: StaffGallery, threshold: f32) -> Self {
        Self {
            encoder,
            gallery,
            threshold,
        }
    }

    pub fn gallery(&self) -> &StaffGallery {
        &self.gallery
    }
}

impl IdentityMatcher for GalleryMatcher {
    fn identify(&self, frame: &Frame, face: &FaceRegion) -> VisionResult<Option<String>> {
        if self.gallery.is_empty() {
            return Ok(None);
        }
        let Some(descriptor) = self.encoder.encode(frame, face)? else {
            return Ok(None);
        };
        let matched = self.gallery.best_match(&descriptor, self.threshold);
        if let Some((name, distance)) = matched {
            debug!(frame = frame.index, face = face.index, staff = name, distance, "Staff match");
        }
        Ok(matched.map(|(name, _)| name.to_string()))
    }

    fn name(&self) -> &'static str {
        "gallery"
    }
}
