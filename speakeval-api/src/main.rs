//! speakeval-api entry point.

use anyhow::{Context, Result};
use clap::Parser;
use speakeval::assessment::default_graph;
use speakeval::observability::init_tracing;
use speakeval::openai::{self, ModelConfig};
use speakeval::pipeline::Executor;
use speakeval_api::{router, AppState, ServerArgs};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_tracing(&args.logging());

    let model_config = ModelConfig::from_env().context("Failed to load model configuration")?;
    info!(
        chat_model = %model_config.chat_model,
        transcription_model = %model_config.transcription_model,
        "Model configuration loaded"
    );
    let (transcriber, model) = openai::connect(model_config).context("Failed to build model clients")?;
    let graph = default_graph(transcriber, model).context("Failed to build assessment graph")?;
    let executor = Executor::from_config(graph, &args.executor());

    let app = router(AppState::new(executor, args.request_timeout()), args.max_upload_bytes());
    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, "Starting IELTS Speaking Feedback API server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
