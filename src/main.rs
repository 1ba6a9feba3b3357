use testpulse::config::ServerConfig;
use testpulse::reports::ReportStore;
use testpulse::service::QueryService;
use testpulse::web::Server;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("testpulse=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    cfg.validate()?;
    tracing::info!("Starting testpulse on port {}...", cfg.http_port);
    tracing::info!("Serving reports from {}", cfg.reports_root.display());

    let store = ReportStore::new(&cfg.reports_root);

    // Warm the cache so the first dashboard load does not pay for every parse
    for category in store.list_categories() {
        match store.refresh(category).await {
            Ok(snapshot) => tracing::info!(
                "Loaded {} {} reports ({} skipped)",
                snapshot.len(),
                category,
                snapshot.skipped().len()
            ),
            Err(e) => tracing::warn!("Initial scan of {} failed: {}", category, e),
        }
    }

    let service = QueryService::new(store, &cfg);

    // Start web server
    let server = Server::new(cfg, service);
    server.start().await?;

    Ok(())
}
