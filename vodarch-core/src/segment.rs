use serde::Serialize;

/// Default split target: 30-minute pieces.
pub const DEFAULT_TARGET_SEGMENT_SECONDS: f64 = 1800.0;

/// Delimiter conventionally separating the category token from the rest of
/// a recording title ("<Category> | <rest>").
pub const TITLE_DELIMITER: &str = " | ";

/// Split instruction derived from a recording's total duration. The count is
/// a target passed to the external splitter; the number of files the tool
/// actually emits is authoritative downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPlan {
    pub total_duration_s: f64,
    pub target_segment_s: f64,
    pub segment_count: u32,
    pub segment_duration_s: f64,
}

impl SegmentPlan {
    pub fn for_duration(total_duration_s: f64, target_segment_s: f64) -> Self {
        let segment_count = ((total_duration_s / target_segment_s).round() as u32).max(1);
        Self {
            total_duration_s,
            target_segment_s,
            segment_count,
            segment_duration_s: total_duration_s / segment_count as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingClass {
    /// One growing part-numbered series; uploaded whole, never split.
    Continuous,
    /// Split into time-based pieces, each with its own part number.
    Segmented,
}

/// A recording is continuous iff its category matches a configured name
/// case-insensitively. When the category field is blank the token before the
/// first `" | "` in the title stands in for it; a title without the
/// delimiter is compared whole.
pub fn classify(title: &str, category: &str, continuous_categories: &[String]) -> RecordingClass {
    let token = if category.trim().is_empty() {
        title
            .split_once(TITLE_DELIMITER)
            .map(|(head, _)| head)
            .unwrap_or(title)
            .trim()
    } else {
        category.trim()
    };
    let continuous = continuous_categories
        .iter()
        .any(|name| name.trim().eq_ignore_ascii_case(token));
    if continuous {
        RecordingClass::Continuous
    } else {
        RecordingClass::Segmented
    }
}
