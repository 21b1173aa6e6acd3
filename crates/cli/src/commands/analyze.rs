//! Commands that talk to a running analyzer service

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{
    AcceptedResponse, AnalyzeRequest, ApiClient, HealthResponse, ReadinessResponse,
};
use crate::output::{
    color_status, print_info, print_json, print_success, print_table, OutputFormat,
};

/// Submit a session for background analysis
pub async fn submit_analysis(
    client: &ApiClient,
    video_url: String,
    session_id: String,
    session_type: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = AnalyzeRequest {
        video_url,
        session_id,
        session_type,
    };
    let accepted: AcceptedResponse = client.post("analyze", &request).await?;

    match format {
        OutputFormat::Json => print_json(&accepted)?,
        OutputFormat::Table => {
            print_success(&accepted.message);
            println!("Session: {}", accepted.session_id.cyan());
            print_info("Results are delivered to the persistence service when the run finishes");
        }
    }

    Ok(())
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Since")]
    since: String,
}

/// Show liveness, readiness and component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("health").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_with_status("readyz").await?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }));
    }

    println!("{}", "Analyzer Service".bold());
    println!("{}", "=".repeat(40));
    println!("Liveness:  {}", health.status.green());
    if readiness.ready {
        println!("Readiness: {}", color_status("ready"));
    } else {
        println!(
            "Readiness: {} ({})",
            "not ready".red(),
            readiness.reason.as_deref().unwrap_or("unknown")
        );
    }
    if let Some(status) = &readiness.status {
        println!("Overall:   {}", color_status(status));
    }
    println!();

    let rows: Vec<ComponentRow> = readiness
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            message: component.message.clone().unwrap_or_default(),
            since: component.last_changed.clone().unwrap_or_default(),
        })
        .collect();
    print_table(&rows, "No components registered");

    if readiness.active_sessions.is_empty() {
        print_info("No analyses in flight");
    } else {
        print_info(&format!(
            "{} analyses in flight: {}",
            readiness.active_sessions.len(),
            readiness.active_sessions.join(", ")
        ));
    }

    Ok(())
}
