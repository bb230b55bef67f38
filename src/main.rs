use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::api::server::{AppState, RouteError};
use crate::catalog::{CatalogClient, CatalogErr};
use crate::db::pg::PgStore;
use crate::db::{Store, StoreError};
use crate::util::env::{Config, EnvErr};
use crate::util::telemetry;

mod api;
mod catalog;
mod constants;
mod db;
mod engine;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogErr),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    let telemetry_registry = telemetry::Telemetry::new(&cfg.telemetry)?.register();

    tracing::info!("starting main application");

    let store = PgStore::connect(&cfg.database).await?;
    store.migrate().await?;

    let state = Arc::new(AppState {
        store: Arc::new(store),
        catalog: CatalogClient::new(&cfg.catalog)?,
    });

    let handles = api::server::start_server(&cfg.server, state).await?;
    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}
