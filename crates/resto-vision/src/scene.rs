//! Table change detection from frame histograms.
//!
//! Consecutive frames are compared by the Bhattacharyya distance of
//! their normalized luma histograms. A jump above the threshold means
//! the camera moved to the next table.

use tracing::info;

use crate::frame::Frame;
use crate::metrics::record_scene_change;

/// Default Bhattacharyya distance above which a table change is declared.
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.40;

const BINS: usize = 256;

/// Result of checking one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneCheck {
    pub changed: bool,
    pub table_number: u32,
}

/// Tracks the current table from histogram jumps.
#[derive(Debug, Clone)]
pub struct SceneDetector {
    threshold: f64,
    previous: Option<Vec<f64>>,
    current_table: u32,
}

impl SceneDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
            current_table: 1,
        }
    }

    pub fn current_table(&self) -> u32 {
        self.current_table
    }

    /// Compare a frame with the previous one. Frames without pixels never change the table.
    pub fn check(&mut self, frame: &Frame) -> SceneCheck {
        let Some(hist) = histogram(&frame.luma) else {
            return SceneCheck {
                changed: false,
                table_number: self.current_table,
            };
        };

        let mut changed = false;
        if let Some(prev) = &self.previous {
            let distance = bhattacharyya(prev, &hist);
            if distance > self.threshold {
                self.current_table += 1;
                changed = true;
                record_scene_change();
                info!(
                    frame = frame.index,
                    distance,
                    table = self.current_table,
                    "Scene change detected"
                );
            }
        }
        self.previous = Some(hist);

        SceneCheck {
            changed,
            table_number: self.current_table,
        }
    }
}

impl Default for SceneDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SCENE_THRESHOLD)
    }
}

/// Probability-normalized luma histogram.
fn histogram(luma: &[u8]) -> Option<Vec<f64>> {
    if luma.is_empty() {
        return None;
    }
    let mut bins = vec![0.0f64; BINS];
    for &p in luma {
        bins[p as usize] += 1.0;
    }
    let total = luma.len() as f64;
    for b in &mut bins {
        *b /= total;
    }
    Some(bins)
}

/// Bhattacharyya distance between two normalized histograms, in [0, 1].
fn bhattacharyya(a: &[f64], b: &[f64]) -> f64 {
    let coefficient: f64 = a.iter().zip(b).map(|(x, y)| (x * y).sqrt()).sum();
    (1.0 - coefficient).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, luma: Vec<u8>) -> Frame {
        Frame {
            index,
            luma,
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_frames_do_not_change() {
        let mut d = SceneDetector::default();
        let pixels: Vec<u8> = (0..=255).collect();
        assert!(!d.check(&frame(0, pixels.clone())).changed);
        let c = d.check(&frame(1, pixels));
        assert!(!c.changed);
        assert_eq!(c.table_number, 1);
    }

    #[test]
    fn test_disjoint_histograms_change_table() {
        let mut d = SceneDetector::default();
        d.check(&frame(0, vec![10; 100]));
        let c = d.check(&frame(1, vec![200; 100]));
        assert!(c.changed);
        assert_eq!(c.table_number, 2);
    }

    #[test]
    fn test_empty_frames_are_ignored() {
        let mut d = SceneDetector::default();
        d.check(&frame(0, vec![10; 100]));
        assert!(!d.check(&frame(1, vec![])).changed);
        assert!(!d.check(&frame(2, vec![10; 100])).changed);
    }

    #[test]
    fn test_bhattacharyya_bounds() {
        let a = histogram(&[0, 0, 1, 1]).unwrap();
        let b = histogram(&[254, 255]).unwrap();
        assert!(bhattacharyya(&a, &a) < 1e-6);
        assert!((bhattacharyya(&a, &b) - 1.0).abs() < 1e-9);
    }
}
