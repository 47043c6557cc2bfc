use anyhow::Context;
use audit_rag::analysis::AnalysisService;
use audit_rag::api::{self, UploadSettings};
use audit_rag::components::{Components, DefaultComponentFactory};
use audit_rag::{config, logging};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();

    let components = Arc::new(Components::new(DefaultComponentFactory::new(
        config.processor_settings(),
        config.answerer_settings(),
    )));
    if components.ensure_ready().await {
        tracing::info!("RAG components: initialized");
    } else {
        tracing::warn!(
            "RAG components: not initialized. Get a free API key from \
             https://console.groq.com/keys, set GROQ_API_KEY in .env and retry; \
             the next request will attempt initialization again"
        );
    }

    let service = Arc::new(AnalysisService::new(components));
    let app = api::create_router(
        service,
        UploadSettings {
            max_bytes: config.max_upload_bytes,
            temp_root: config.upload_temp_dir.clone(),
        },
    )
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app).await.context("Server terminated")?;
    Ok(())
}
