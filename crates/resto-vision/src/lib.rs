//! Vision front end for the RestoInsight engine.
//!
//! This crate provides:
//! - Capability traits for frame capture, face localization, encoding,
//!   identity matching and emotion classification
//! - The enrolled staff gallery and descriptor matching
//! - A parallel per-frame analyzer
//! - Histogram-based table change detection
//! - The IoU person tracker
//! - Replay capabilities over pre-annotated footage

pub mod analyzer;
pub mod error;
pub mod frame;
pub mod gallery;
pub mod metrics;
pub mod providers;
pub mod replay;
pub mod scene;
pub mod tracker;

pub use analyzer::{AnalyzerConfig, FrameAnalysis, FrameAnalyzer};
pub use error::{VisionError, VisionResult};
pub use frame::{Descriptor, EmotionPrediction, FaceAnnotation, FaceDetection, FaceRegion, Frame};
pub use gallery::{GalleryMatcher, StaffEntry, StaffGallery, DEFAULT_MATCH_THRESHOLD};
pub use providers::{EmotionClassifier, FaceEncoder, FaceLocalizer, FrameSource, IdentityMatcher};
pub use replay::{ReplaySource, ReplayVision, VecFrameSource};
pub use scene::{SceneCheck, SceneDetector, DEFAULT_SCENE_THRESHOLD};
pub use tracker::{Assignment, PersonTracker, Track, TrackStatus, TrackerConfig, TrackerUpdate};
