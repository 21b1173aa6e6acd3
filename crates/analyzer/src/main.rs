//! Session Analyzer - martial-arts training video analysis service
//!
//! Accepts analysis requests over HTTP, runs them in the background and
//! delivers results to the session persistence service.

use analyzer_lib::{
    annotation::{AnnotationFactory, JsonlAnnotationFactory, NoopAnnotationFactory},
    delivery::{DisabledMediaStore, HttpMediaStore, HttpPersistenceClient, MediaStore},
    health::{components, HealthRegistry},
    observability::{AnalyzerMetrics, StructuredLogger},
    sampler::{TrackOpener, TrackOracleFactory},
    Analyzer, WorkerPool,
};
use anyhow::{Context, Result};
use session_analyzer::{api, config::AnalyzerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long in-flight runs may take to finish after shutdown is requested
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AnalyzerConfig::load();
    info!(
        service = %config.service_name,
        persistence_url = %config.persistence_url,
        uploads = config.media_upload_url.is_some(),
        "Analyzer configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::PERSISTENCE).await;
    health_registry.register(components::MEDIA_STORE).await;

    let metrics = AnalyzerMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);

    let persistence =
        HttpPersistenceClient::new(&config.persistence_url, config.request_timeout())
            .context("Failed to create persistence client")?;

    let media: Arc<dyn MediaStore> = match &config.media_upload_url {
        Some(url) => Arc::new(
            HttpMediaStore::new(url, config.media_folder.clone(), config.request_timeout())
                .context("Failed to create media store")?,
        ),
        None => Arc::new(DisabledMediaStore),
    };

    let annotations: Arc<dyn AnnotationFactory> = if config.annotate {
        std::fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("Failed to create output dir {}", config.output_dir.display())
        })?;
        Arc::new(JsonlAnnotationFactory::new(&config.output_dir))
    } else {
        Arc::new(NoopAnnotationFactory)
    };

    let analyzer = Analyzer::builder(
        Arc::new(TrackOpener),
        Arc::new(TrackOracleFactory::new(Arc::new(config.oracle()))),
    )
    .annotations(annotations)
    .media_store(media)
    .persistence(Arc::new(persistence))
    .health(health_registry.clone())
    .logger(logger.clone())
    .metrics(metrics.clone())
    .build();

    let (pool, dispatcher) = WorkerPool::start(Arc::new(analyzer), config.worker(), metrics);
    let app_state = Arc::new(api::AppState::new(pool, health_registry.clone()));

    health_registry.set_ready(true).await;
    logger.log_startup(SERVICE_VERSION, config.api_port);

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        served = &mut api_handle => {
            match served {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => warn!(error = %e, "API server failed"),
                Err(e) => warn!(error = %e, "API server task aborted"),
            }
        }
    }

    // Dropping the server releases the last pool handle and lets the dispatcher drain
    health_registry.set_ready(false).await;
    api_handle.abort();
    if tokio::time::timeout(DRAIN_TIMEOUT, dispatcher).await.is_err() {
        warn!("Analysis runs still in flight at shutdown");
    }

    info!("Shutting down");
    Ok(())
}
