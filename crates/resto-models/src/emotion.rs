//! Emotion labels and person classification.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Emotion label produced by the classifier.
///
/// Variant order is significant: it is the canonical label order used to
/// break ties when picking a dominant emotion for a score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Happy,
    Surprise,
    Neutral,
    Sad,
    Fear,
    Disgust,
    Angry,
}

impl Emotion {
    /// Every label, in canonical order.
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Fear,
        Emotion::Disgust,
        Emotion::Angry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
            Emotion::Angry => "angry",
        }
    }

    /// Happiness contribution of this label on a 0-100 scale.
    pub fn happiness_score(&self) -> f64 {
        match self {
            Emotion::Happy => 100.0,
            Emotion::Surprise => 65.0,
            Emotion::Neutral => 50.0,
            Emotion::Sad => 20.0,
            Emotion::Fear => 15.0,
            Emotion::Disgust => 10.0,
            Emotion::Angry => 0.0,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Emotion::Happy | Emotion::Surprise)
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Emotion::Sad | Emotion::Fear | Emotion::Disgust | Emotion::Angry
        )
    }

    /// Angry or disgusted, the labels that count toward disputes.
    pub fn is_hostile(&self) -> bool {
        matches!(self, Emotion::Angry | Emotion::Disgust)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a label string is not a known emotion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "happy" | "happiness" => Ok(Emotion::Happy),
            "surprise" | "surprised" => Ok(Emotion::Surprise),
            "neutral" => Ok(Emotion::Neutral),
            "sad" | "sadness" => Ok(Emotion::Sad),
            "fear" | "scared" => Ok(Emotion::Fear),
            "disgust" | "disgusted" => Ok(Emotion::Disgust),
            "angry" | "anger" => Ok(Emotion::Angry),
            other => Err(UnknownEmotion(other.to_string())),
        }
    }
}

/// Whether a tracked person is a guest or an enrolled staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersonType {
    #[default]
    Guest,
    Staff,
}

impl PersonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonType::Guest => "guest",
            PersonType::Staff => "staff",
        }
    }
}

impl fmt::Display for PersonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a session's happiness over its recent observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Deteriorating,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Deteriorating => "deteriorating",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
