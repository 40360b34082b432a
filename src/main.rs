use clap::Parser;
use dotenvy::dotenv;
use shopify_upload_bridge::config::AppConfig;
use shopify_upload_bridge::services::orchestrator::UploadOrchestrator;
use shopify_upload_bridge::services::shopify::ShopifyGraphqlClient;
use shopify_upload_bridge::services::staging::UploadStager;
use shopify_upload_bridge::services::storage::HttpObjectStorage;
use shopify_upload_bridge::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopify_upload_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Shopify upload bridge...");

    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    info!(
        "🛍️  Shop: {} (API {}), API key set: {}, API secret set: {}",
        config.shopify.shop,
        config.shopify.api_version,
        config.shopify.api_key.is_some(),
        config.shopify.api_secret.is_some()
    );
    info!(
        "⏱️  Timeouts: platform={:?}, storage idle={:?}, connect={:?}",
        config.platform_timeout, config.storage_idle_timeout, config.connect_timeout
    );

    let platform = ShopifyGraphqlClient::new(
        &config.shopify,
        config.platform_timeout,
        config.connect_timeout,
    )?;
    info!("🔗 GraphQL endpoint: {}", platform.endpoint());
    let storage = HttpObjectStorage::new(config.storage_idle_timeout, config.connect_timeout)?;

    let stager = UploadStager::new(config.upload_dir.clone());
    stager.ensure_dir().await?;
    info!("📂 Staging uploads in {}", stager.upload_dir().display());

    let orchestrator = UploadOrchestrator::new(
        Arc::new(platform),
        Arc::new(storage),
        config.alt_text.clone(),
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        stager: Arc::new(stager),
        config: config.clone(),
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server running on port {}", config.port);
    info!("📖 Swagger UI: http://localhost:{}/swagger-ui", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
