//! Score derivation and coaching summary
//!
//! Turns the final aggregates of a run into 0-100 style scores and a
//! strengths / flaws / improvements narrative. Rules are evaluated in table
//! order; each rule contributes its strength when met, or its shortfall
//! (flaw plus improvement) when not met and the shortfall applies to the
//! session's discipline.

use crate::accumulator::RunningAggregates;
use crate::models::{AnalysisResult, AnalysisSummary, Discipline, FeedbackEvent, SessionMetrics};

/// Fixed accuracy score; not derived from the landmark signal yet
pub const ACCURACY_SCORE_PLACEHOLDER: i64 = 85;

pub const STRONG_GUARD_STABILITY: i64 = 70;
pub const THAI_LONG_GUARD_STABILITY: i64 = 80;
pub const EXPLOSIVE_LEVEL_CHANGE: i64 = 20;
pub const FULL_EXTENSION_ANGLE: i64 = 160;

pub const FILLER_STRENGTH: &str = "Consistent Output";
pub const FILLER_FLAW: &str = "Minor Timing Gaps";
pub const FILLER_IMPROVEMENT: &str = "Maintain intensity";

/// Flaw and improvement reported when a rule is not met
struct Shortfall {
    flaw: &'static str,
    improvement: &'static str,
    applies_to: fn(Discipline) -> bool,
}

struct SummaryRule {
    strength: &'static str,
    met: fn(&SessionMetrics, Discipline) -> bool,
    shortfall: Option<Shortfall>,
}

const SUMMARY_RULES: &[SummaryRule] = &[
    SummaryRule {
        strength: "High Guard Consistency",
        met: |m, _| m.guard_stability > STRONG_GUARD_STABILITY,
        shortfall: Some(Shortfall {
            flaw: "Low Guard Placement",
            improvement: "Increase hand height to ear level",
            applies_to: |d| d != Discipline::Grappling,
        }),
    },
    SummaryRule {
        strength: "Explosive Level Change",
        met: |m, _| m.takedown_speed > EXPLOSIVE_LEVEL_CHANGE,
        shortfall: Some(Shortfall {
            flaw: "Shallow Shot Entry",
            improvement: "Focus on dropping hips before entry",
            applies_to: |d| d == Discipline::Grappling,
        }),
    },
    SummaryRule {
        strength: "Full Strike Extension",
        met: |m, _| m.strike_volume > FULL_EXTENSION_ANGLE,
        shortfall: Some(Shortfall {
            flaw: "Shortened Strikes",
            improvement: "Rotate shoulders for full reach",
            applies_to: |_| true,
        }),
    },
    SummaryRule {
        strength: "Solid Thai Long-Guard",
        met: |m, d| d == Discipline::MuayThai && m.guard_stability > THAI_LONG_GUARD_STABILITY,
        shortfall: None,
    },
];

/// Derive the integer scores from the final aggregates
pub fn compute_metrics(aggregates: &RunningAggregates) -> SessionMetrics {
    let guard_stability = if aggregates.processed_frame_count == 0 {
        0
    } else {
        (aggregates.guard_frame_count as f64 / aggregates.processed_frame_count as f64 * 100.0)
            .round() as i64
    };

    let takedown_speed = aggregates
        .hip_height_range()
        .map(|(lo, hi)| ((hi - lo) * 100.0).round() as i64)
        .unwrap_or(0);

    SessionMetrics {
        guard_stability,
        takedown_speed,
        strike_volume: aggregates.max_extension_angle.round() as i64,
        accuracy_score: ACCURACY_SCORE_PLACEHOLDER,
    }
}

fn or_filler(items: Vec<String>, filler: &str) -> Vec<String> {
    if items.is_empty() {
        vec![filler.to_string()]
    } else {
        items
    }
}

/// Build the strengths / flaws / improvements lists; none is ever empty
pub fn summarize(metrics: &SessionMetrics, discipline: Discipline) -> AnalysisSummary {
    let mut strengths = Vec::new();
    let mut flaws = Vec::new();
    let mut improvements = Vec::new();

    for rule in SUMMARY_RULES {
        if (rule.met)(metrics, discipline) {
            strengths.push(rule.strength.to_string());
        } else if let Some(shortfall) = &rule.shortfall {
            if (shortfall.applies_to)(discipline) {
                flaws.push(shortfall.flaw.to_string());
                improvements.push(shortfall.improvement.to_string());
            }
        }
    }

    AnalysisSummary {
        strengths: or_filler(strengths, FILLER_STRENGTH),
        flaws: or_filler(flaws, FILLER_FLAW),
        improvements: or_filler(improvements, FILLER_IMPROVEMENT),
    }
}

/// Assemble the completed result of a run
pub fn synthesize(
    aggregates: &RunningAggregates,
    feedback: Vec<FeedbackEvent>,
    discipline: Discipline,
    annotated_video_url: String,
) -> AnalysisResult {
    let metrics = compute_metrics(aggregates);
    let summary = summarize(&metrics, discipline);
    AnalysisResult::completed(metrics, feedback, summary, annotated_video_url)
}
