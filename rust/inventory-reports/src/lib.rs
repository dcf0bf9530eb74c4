pub mod compose;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod filter;
pub mod listing;
pub mod listview;
pub mod models;
pub mod pagination;
pub mod reports;
pub mod server;
pub mod state;
pub mod telemetry;

use crate::{config::AppConfig, server::Server};

/// Boots the reporting service from `INVENTORY_*` environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
