//! Data-source server binary.

use datasource_server::config::Config;
use datasource_server::repository::ListRepository;
use datasource_server::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datasource_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        "Starting data-source server on {}:{}",
        config.host,
        config.port
    );

    let repository = match &config.lists_path {
        Some(path) => ListRepository::load(path, config.default_page_size).await?,
        None => {
            tracing::warn!("LISTS_PATH not set, serving no lists");
            ListRepository::new(config.default_page_size)
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let router = app(AppState::new(repository, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
