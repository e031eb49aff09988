//! RestoInsight engine binary.

use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use resto_engine::{EngineConfig, FirestoreSink, JsonlSink, OutputKind, Pipeline, RecordSink};
use resto_firestore::{FirestoreClient, InsightRepository};
use resto_insight::{GeminiConfig, GeminiInsightClient, InsightAnalyzer};
use resto_vision::{
    FrameAnalyzer, GalleryMatcher, IdentityMatcher, ReplaySource, ReplayVision, StaffGallery,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("resto=info".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting resto-engine");

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse::<u16>().ok()) {
        match PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
        {
            Ok(()) => info!(port, "Prometheus exporter listening"),
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    }

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Engine config: {:?}", config);

    let pipeline = match build_pipeline(config).await {
        Ok(p) => p,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    // Ctrl-C requests a graceful stop; the run still flushes.
    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.stop();
        }
    });

    match pipeline.run().await {
        Ok(report) => info!(
            run_id = %report.run_id,
            frames = report.frames,
            alerts = report.alerts,
            stopped = report.stopped,
            "Engine shutdown complete"
        ),
        Err(e) => {
            error!("Engine error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn build_pipeline(config: EngineConfig) -> anyhow::Result<Pipeline> {
    let replay_path = config
        .replay_path
        .clone()
        .context("RESTO_REPLAY_PATH is not set")?;
    let source = ReplaySource::open(&replay_path, config.replay_fps)
        .await
        .with_context(|| format!("opening replay {}", replay_path.display()))?;

    let vision = Arc::new(ReplayVision);
    let matcher: Option<Arc<dyn IdentityMatcher>> = match &config.staff_gallery {
        Some(path) => match StaffGallery::load(path) {
            Ok(gallery) if !gallery.is_empty() => {
                info!(staff = gallery.len(), "Staff recognition enabled");
                Some(Arc::new(GalleryMatcher::new(
                    vision.clone(),
                    gallery,
                    config.match_threshold,
                )))
            }
            Ok(_) => {
                warn!("Staff gallery is empty, everyone is treated as a guest");
                None
            }
            Err(e) => {
                warn!("Staff gallery unavailable, everyone is treated as a guest: {}", e);
                None
            }
        },
        None => {
            info!("No staff gallery configured");
            None
        }
    };
    let analyzer = FrameAnalyzer::new(vision.clone(), vision, matcher, config.analyzer.clone());

    let sink: Arc<dyn RecordSink> = match &config.output {
        OutputKind::Firestore => {
            let client = FirestoreClient::from_env()
                .await
                .context("creating Firestore client")?;
            Arc::new(FirestoreSink::new(InsightRepository::new(client)))
        }
        OutputKind::Jsonl(path) => Arc::new(
            JsonlSink::open(path)
                .await
                .with_context(|| format!("opening output {}", path.display()))?,
        ),
    };

    let insight: Option<Arc<dyn InsightAnalyzer>> = match GeminiConfig::from_env() {
        Some(gemini) => match GeminiInsightClient::new(gemini) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Gemini client unavailable, alerts publish unenriched: {}", e);
                None
            }
        },
        None => {
            info!("GEMINI_API_KEY not set, alerts publish unenriched");
            None
        }
    };

    Ok(Pipeline::new(config, Box::new(source), analyzer, insight, sink))
}
