//! Replay of pre-annotated footage.
//!
//! A replay file is JSON lines, one frame per line:
//!
//! ```json
//! {"table_number": 2, "faces": [{"bbox": {"x": 10, "y": 20, "w": 80, "h": 80},
//!   "emotion": "happy", "confidence": 0.91, "descriptor": [0.1, 0.2]}]}
//! ```
//!
//! `captured_at` is optional; without it frames are spaced by the
//! configured frame rate from the moment the file is opened.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::info;

use resto_models::Emotion;

use crate::error::{VisionError, VisionResult};
use crate::frame::{Descriptor, EmotionPrediction, FaceAnnotation, FaceRegion, Frame};
use crate::providers::{EmotionClassifier, FaceEncoder, FaceLocalizer, FrameSource};

#[derive(Debug, Deserialize)]
struct ReplayLine {
    captured_at: Option<DateTime<Utc>>,
    table_number: Option<u32>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    faces: Vec<FaceAnnotation>,
}

/// Frame source reading a JSON-lines replay file.
pub struct ReplaySource {
    lines: Lines<BufReader<File>>,
    line_no: u64,
    next_index: u64,
    started_at: DateTime<Utc>,
    frame_interval: Duration,
}

impl ReplaySource {
    pub async fn open(path: &Path, fps: f64) -> VisionResult<Self> {
        let file = File::open(path).await.map_err(|e| {
            VisionError::capture_failed(format!("cannot open {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), fps, "Opened replay source");

        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 1.0 };
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            next_index: 0,
            started_at: Utc::now(),
            frame_interval: Duration::microseconds((1_000_000.0 / fps) as i64),
        })
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> VisionResult<Option<Frame>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| VisionError::capture_failed(format!("read error: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let parsed: ReplayLine = serde_json::from_str(&line).map_err(|e| {
                VisionError::capture_failed(format!("malformed frame at line {}: {}", self.line_no, e))
            })?;

            let index = self.next_index;
            self.next_index += 1;
            let captured_at = parsed
                .captured_at
                .unwrap_or_else(|| self.started_at + self.frame_interval * index as i32);

            return Ok(Some(Frame {
                index,
                captured_at,
                width: parsed.width,
                height: parsed.height,
                table_number: parsed.table_number,
                luma: Vec::new(),
                annotations: parsed.faces,
            }));
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

/// In-memory frame source.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<Frame>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

#[async_trait]
impl FrameSource for VecFrameSource {
    async fn next_frame(&mut self) -> VisionResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Face capabilities answered from a frame's annotations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayVision;

impl ReplayVision {
    fn annotation<'a>(frame: &'a Frame, face: &FaceRegion) -> VisionResult<&'a FaceAnnotation> {
        frame.annotations.get(face.index).ok_or_else(|| {
            VisionError::detection_failed(format!(
                "frame {} has no annotation {}",
                frame.index, face.index
            ))
        })
    }
}

impl FaceLocalizer for ReplayVision {
    fn locate(&self, frame: &Frame) -> VisionResult<Vec<FaceRegion>> {
        Ok(frame
            .annotations
            .iter()
            .enumerate()
            .map(|(index, a)| FaceRegion {
                index,
                bbox: a.bbox,
                score: 1.0,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

impl EmotionClassifier for ReplayVision {
    fn classify(&self, frame: &Frame, face: &FaceRegion) -> VisionResult<EmotionPrediction> {
        let annotation = Self::annotation(frame, face)?;
        let label = annotation
            .emotion
            .as_deref()
            .ok_or_else(|| VisionError::classification_failed("face has no emotion label"))?;
        let emotion: Emotion = label
            .parse()
            .map_err(|e: resto_models::UnknownEmotion| VisionError::classification_failed(e.to_string()))?;
        Ok(EmotionPrediction {
            emotion,
            confidence: annotation.confidence,
        })
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

impl FaceEncoder for ReplayVision {
    fn encode(&self, frame: &Frame, face: &FaceRegion) -> VisionResult<Option<Descriptor>> {
        Ok(Self::annotation(frame, face)?.descriptor.clone())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
