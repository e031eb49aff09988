//! Prompt construction for alert analysis.

use std::collections::BTreeMap;
use std::fmt::Write;

use resto_models::{Emotion, EmotionSnapshot, PersonType};

use crate::analyzer::InsightRequest;

/// Observations included in the emotion summary.
pub const HISTORY_LIMIT: usize = 10;

/// Build the analysis prompt for one alert.
pub fn build_prompt(request: &InsightRequest) -> String {
    let alert = &request.alert;
    let mut prompt = format!(
        r#"You are an AI assistant for a restaurant management system called RestoInsight.
Analyze this service alert and provide actionable insights.

## ALERT DETAILS
- Type: {}
- Severity: {}
- Table: {}
- Title: {}
- Description: {}
"#,
        alert.alert_type.as_str(),
        alert.severity.as_str().to_uppercase(),
        alert.table_number,
        alert.title,
        alert.description,
    );

    if !request.window.is_empty() {
        let start = request.window.len().saturating_sub(HISTORY_LIMIT);
        let recent = &request.window[start..];
        let _ = write!(
            prompt,
            "\n## EMOTION HISTORY (Last {} detections)\n{}\n",
            recent.len(),
            summarize_emotions(recent)
        );
    }

    if let Some(sentiment) = &request.table_sentiment {
        let _ = write!(
            prompt,
            "\n## TABLE SENTIMENT\n- Guest Happiness: {:.0}%\n- Trend: {}\n- Dominant Emotion: {}\n",
            sentiment.avg_happiness,
            sentiment.trend.as_str(),
            sentiment.dominant_emotion.as_str()
        );
    }

    prompt.push_str(
        r#"
## YOUR TASK
Analyze this situation and respond in EXACTLY this JSON format (no markdown, no extra text):
{
    "root_cause": "Brief explanation of what likely caused this issue (1-2 sentences)",
    "ai_recommendation": "Specific actionable steps to resolve this (2-3 bullet points as a single string)",
    "urgency_score": <number from 1-10, where 10 is most urgent>
}

Consider restaurant service dynamics, customer experience impact, staff workload and time sensitivity.

Respond ONLY with the JSON object, nothing else.
"#,
    );
    prompt
}

/// Emotion distribution plus guest/staff split of a window.
pub fn summarize_emotions(window: &[EmotionSnapshot]) -> String {
    if window.is_empty() {
        return "No emotion data available".to_string();
    }

    let mut counts: BTreeMap<Emotion, usize> = BTreeMap::new();
    for s in window {
        *counts.entry(s.emotion).or_default() += 1;
    }
    let mut ordered: Vec<(Emotion, usize)> = counts.into_iter().collect();
    // Most frequent first; label order breaks ties.
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let total = window.len() as f64;
    let mut lines: Vec<String> = ordered
        .iter()
        .map(|(emotion, count)| {
            format!(
                "- {}: {} detections ({:.0}%)",
                emotion.as_str(),
                count,
                *count as f64 / total * 100.0
            )
        })
        .collect();

    for (person_type, label) in [(PersonType::Guest, "Guest"), (PersonType::Staff, "Staff")] {
        let of_type: Vec<&EmotionSnapshot> =
            window.iter().filter(|s| s.person_type == person_type).collect();
        if !of_type.is_empty() {
            let angry = of_type.iter().filter(|s| s.emotion == Emotion::Angry).count();
            lines.push(format!(
                "- {} emotions: {} total, {} angry",
                label,
                of_type.len(),
                angry
            ));
        }
    }

    lines.join("\n")
}
