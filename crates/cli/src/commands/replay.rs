//! Offline analysis of a recorded landmark track

use analyzer_lib::{
    annotation::JsonlAnnotationFactory,
    models::{AnalysisResult, Discipline, Session},
    sampler::{LandmarkTrack, OracleConfig, TrackOpener, TrackOracleFactory},
    Analyzer,
};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{
    color_score, color_status, format_video_time, print_error, print_json, print_table,
    OutputFormat,
};

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct FeedbackRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Issue")]
    issue: String,
    #[tabled(rename = "Suggestion")]
    suggestion: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

pub struct ReplayOptions {
    pub track: PathBuf,
    pub session_id: String,
    pub discipline: Discipline,
    pub min_confidence: f64,
    pub annotate_dir: Option<PathBuf>,
}

/// Run the full analysis over a track file without contacting the service
pub async fn replay(options: ReplayOptions, format: OutputFormat) -> Result<()> {
    let track = LandmarkTrack::load(&options.track)
        .with_context(|| format!("Failed to load track {}", options.track.display()))?;

    let oracle_config = OracleConfig {
        min_detection_confidence: options.min_confidence,
    };
    let mut builder = Analyzer::builder(
        Arc::new(TrackOpener),
        Arc::new(TrackOracleFactory::new(Arc::new(oracle_config))),
    );
    if let Some(dir) = &options.annotate_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        builder = builder.annotations(Arc::new(JsonlAnnotationFactory::new(dir)));
    }
    let analyzer = builder.build();

    let session = Session::new(
        options.session_id,
        options.discipline,
        options.track.display().to_string(),
    );
    let result = analyzer.evaluate(&session).await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => print_report(&options.track, &track, &session, &result),
    }

    if !result.is_completed() {
        anyhow::bail!("Analysis of {} failed", options.track.display());
    }
    Ok(())
}

fn print_report(path: &Path, track: &LandmarkTrack, session: &Session, result: &AnalysisResult) {
    println!("{}", "Session Analysis".bold());
    println!("{}", "=".repeat(60));
    println!("Track:      {}", path.display().to_string().cyan());
    println!("Discipline: {}", session.discipline.to_string().cyan());
    println!(
        "Frames:     {} ({} with recorded poses)",
        track.frame_count,
        track.frames.len()
    );

    let status = if result.is_completed() {
        "completed"
    } else {
        "failed"
    };
    println!("Status:     {}", color_status(status));
    println!();

    let Some(metrics) = &result.metrics else {
        print_error("No metrics were produced");
        return;
    };

    let rows = [
        MetricRow {
            name: "Guard stability",
            value: color_score(metrics.guard_stability),
        },
        MetricRow {
            name: "Takedown speed",
            value: metrics.takedown_speed.to_string(),
        },
        MetricRow {
            name: "Strike extension",
            value: format!("{}°", metrics.strike_volume),
        },
        MetricRow {
            name: "Accuracy",
            value: metrics.accuracy_score.to_string(),
        },
    ];
    print_table(&rows, "No metrics");
    println!();

    let feedback: Vec<FeedbackRow> = result
        .feedback()
        .iter()
        .map(|event| FeedbackRow {
            time: format_video_time(event.timestamp),
            issue: event.issue.clone(),
            suggestion: event.suggestion.clone(),
            severity: event
                .severity
                .map(|s| color_status(&s.to_string()))
                .unwrap_or_default(),
        })
        .collect();
    print_table(&feedback, "No coaching feedback");

    if let Some(summary) = &result.analysis_summary {
        println!();
        print_list("Strengths", &summary.strengths);
        print_list("Flaws", &summary.flaws);
        print_list("Improvements", &summary.improvements);
    }

    if let Some(url) = result.annotated_video_url.as_deref().filter(|u| !u.is_empty()) {
        println!();
        println!("Annotations: {}", url.cyan());
    }
}

fn print_list(title: &str, items: &[String]) {
    println!("{}", title.bold());
    for item in items {
        println!("  • {}", item);
    }
}
