use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{HeaderValue, Method, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::catalog::{CatalogClient, CatalogErr};
use crate::constants::API_PREFIX;
use crate::db::{Store, StoreError};
use crate::engine::completion::CompletionError;
use crate::engine::import::ImportError;
use crate::engine::tracking::TrackingError;
use crate::util::env::ServerConfig;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub catalog: CatalogClient,
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let api = Router::new()
        .route("/checkhealth", get(check_health))
        //
        // catalog
        .route("/game-search", post(game_search))
        .route("/add-game-db/{id}", post(add_game_db))
        .route("/games", get(list_games))
        .route("/games/{id}", get(game_by_id))
        .route("/games/{id}/achievements", get(game_achievements))
        //
        // tracking and progress
        .route("/track-game", post(track_game))
        .route("/untrack-game", post(untrack_game))
        .route("/complete-achievement", post(complete_achievement))
        .route("/users/{id}/games", get(user_games))
        .route(
            "/users/{user_id}/games/{game_id}/achievements",
            get(user_game_achievements),
        );

    Router::new()
        .nest(API_PREFIX, api)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();
                let request_id = uuid::Uuid::new_v4();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", %request_id, ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(cors)
        .with_state(state)
}

/// `None` allows any origin
pub fn cors_layer(allow_origins: Option<&[String]>) -> CorsLayer {
    let allow_origin = match allow_origins {
        Some(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_origin(allow_origin)
}

/// Logs the `RouteError` a handler attached to its response
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[instrument(skip(cfg, state), fields(port = cfg.port))]
pub async fn start_server(
    cfg: &ServerConfig,
    state: Arc<AppState>,
) -> Result<Vec<JoinHandle<()>>, RouteError> {
    let app = router(state, cors_layer(cfg.cors_allow_origins.as_deref()));

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cfg.port);
    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .map_err(RouteError::Bind)?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", socket_addr.port()),
        "server ready"
    );

    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            tracing::error!(error = ?e, "server exited with error");
        }
    });

    Ok(vec![server_handle])
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "failed to install shutdown handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Catalog(#[from] CatalogErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to add {kind} '{name}': {source}")]
    Association {
        kind: &'static str,
        name: String,
        source: StoreError,
    },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
}

impl From<ImportError> for RouteError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Validation(msg) => RouteError::Validation(msg),
            e @ ImportError::NotFound(_) => RouteError::NotFound(e.to_string()),
            e @ ImportError::Conflict { .. } => RouteError::Conflict(e.to_string()),
            ImportError::Association { kind, name, source } => {
                RouteError::Association { kind, name, source }
            }
            ImportError::Catalog(e) => RouteError::Catalog(e),
            ImportError::Store(e) => RouteError::Store(e),
        }
    }
}

impl From<CompletionError> for RouteError {
    fn from(err: CompletionError) -> Self {
        match err {
            e @ (CompletionError::NotFound { .. } | CompletionError::NotTracking { .. }) => {
                RouteError::NotFound(e.to_string())
            }
            CompletionError::Store(e) => RouteError::Store(e),
        }
    }
}

impl From<TrackingError> for RouteError {
    fn from(err: TrackingError) -> Self {
        match err {
            e @ (TrackingError::GameNotFound(_) | TrackingError::NotTracking { .. }) => {
                RouteError::NotFound(e.to_string())
            }
            e @ TrackingError::Conflict { .. } => RouteError::Conflict(e.to_string()),
            TrackingError::Store(e) => RouteError::Store(e),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, message, err) = match &self {
            RouteError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            RouteError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            RouteError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),

            RouteError::Catalog(CatalogErr::NotFound) => (
                StatusCode::NOT_FOUND,
                String::from("game not found in catalog"),
                None,
            ),
            RouteError::Catalog(catalog_err) => (
                StatusCode::BAD_GATEWAY,
                format!("catalog unavailable: {catalog_err}"),
                Some(self),
            ),

            RouteError::Association { kind, name, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to store {kind} '{name}'"),
                Some(self),
            ),

            RouteError::Store(_) | RouteError::Task(_) | RouteError::Bind(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("internal storage error"),
                Some(self),
            ),
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}
