//! API server: admin reporting, tracking ingest and the guide endpoints on
//! one HTTP listener, plus the Prometheus exporter on its own port.

use crate::rest::{self, AppState};
use crate::{quiz_flow_rest, tracking_rest};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use testograph_content::{content_router, ContentGenerator, GuideStore};
use testograph_core::config::AppConfig;
use testograph_reporting::QuizFlowReport;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    report: QuizFlowReport,
    guides: Arc<GuideStore>,
    generator: Arc<dyn ContentGenerator>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        report: QuizFlowReport,
        guides: Arc<GuideStore>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            config,
            report,
            guides,
            generator,
        }
    }

    /// The full application router with middleware applied.
    pub fn router(&self) -> Router {
        let state = AppState {
            report: self.report.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            // Admin reporting
            .route("/api/admin/quiz-flow", get(quiz_flow_rest::quiz_flow))
            // Tracking collector
            .route("/api/funnel/track", post(tracking_rest::track))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .with_state(state)
            // Guides
            .merge(content_router(self.guides.clone(), self.generator.clone()))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Install the Prometheus recorder and serve it on the metrics port.
    /// Must be called from within the tokio runtime.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
