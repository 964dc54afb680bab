use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod api;
mod color;
mod config;
mod convert;
mod error;
mod state;

use config::{Settings, APP_NAME, APP_VERSION};
use state::library::{Collection, DocumentStore, Library};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on Ctrl-C so in-flight requests can drain
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("⚠️  Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("🛑 Shutting down...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::parse();
    init_tracing(settings.log_json);

    tracing::info!("🚀 Starting {}...", APP_NAME);
    tracing::info!("📦 Version: {}", APP_VERSION);

    // Open (or create) the database before accepting connections
    let db_path = settings.database_path();
    let library = Library::open(&db_path)?;
    if let Some(path) = library.path() {
        tracing::info!("💾 Database: {}", path.display());
    }

    let image_count = library.count(Collection::Images)?;
    let history_count = library.count(Collection::Histories)?;
    tracing::info!(
        "🎨 {} images and {} levels in the library",
        image_count,
        history_count
    );

    let addr = settings.bind_addr()?;
    let app = api::router(api::AppState::new(library, settings));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("✅ Database connection closed");
    Ok(())
}
