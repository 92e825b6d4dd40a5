use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use research_fusion::auth::TokenIssuer;
use research_fusion::config::Config;
use research_fusion::db::Db;
use research_fusion::error::expose_internal_errors;
use research_fusion::routes::{build_router, cors_layer, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    expose_internal_errors(!config.production);

    let db = Db::connect(&config.database_url).await?;
    let tokens = TokenIssuer::new(&config.token_secret, config.token_lifetime);
    let app = build_router(AppState::new(db, tokens))
        .layer(cors_layer(config.cors_origin.as_deref())?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, production = config.production, "listening");

    axum::serve(listener, app).await.context("server error")
}
