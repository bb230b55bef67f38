use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use http::StatusCode;
use tracing::instrument;

use crate::api::payload::*;
use crate::api::server::{AppState, JsonResult, RouteError};
use crate::catalog::models::SearchResult;
use crate::db::prelude::*;
use crate::engine::completion::{self, Completion};
use crate::engine::import::{self, ImportSummary};
use crate::engine::{games, tracking};

type Created<T> = core::result::Result<(StatusCode, Json<T>), RouteError>;

fn bad_request(rejection: impl std::fmt::Display) -> RouteError {
    RouteError::Validation(rejection.to_string())
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, RouteError> {
    let Path(id) = path.map_err(bad_request)?;
    if id <= 0 {
        return Err(RouteError::Validation(format!("invalid id '{id}'")));
    }
    Ok(id)
}

#[instrument(skip(state))]
pub async fn check_health(State(state): State<Arc<AppState>>) -> JsonResult<HealthResponse> {
    state.store.health_check().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}

#[instrument(skip(state))]
pub async fn game_search(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> JsonResult<Vec<SearchResult>> {
    let Query(params) = params.map_err(bad_request)?;
    let query = params
        .val
        .as_deref()
        .map(str::trim)
        .filter(|val| !val.is_empty())
        .ok_or_else(|| RouteError::Validation("missing query parameter 'val'".to_string()))?;

    Ok(Json(state.catalog.search_games(query).await?))
}

/// Imports a catalog game and starts tracking it for `?user=`.
///
/// The import runs on its own task and completes even if the client goes away.
#[instrument(skip(state))]
pub async fn add_game_db(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<AddGameParams>, QueryRejection>,
) -> Created<ImportSummary> {
    let external_id = path_id(id)?;
    let Query(params) = params.map_err(bad_request)?;
    let user_id = params.user_id()?;

    let summary = tokio::spawn(async move {
        import::import_game(&*state.store, &state.catalog, external_id, user_id).await
    })
    .await??;

    Ok((StatusCode::CREATED, Json(summary)))
}

#[instrument(skip(state))]
pub async fn list_games(State(state): State<Arc<AppState>>) -> JsonResult<Vec<Game>> {
    Ok(Json(games::list_games(&*state.store).await?))
}

#[instrument(skip(state))]
pub async fn game_by_id(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> JsonResult<GameDetails> {
    let game_id = GameId(path_id(id)?);
    match games::game_details(&*state.store, game_id).await? {
        Some(details) => Ok(Json(details)),
        None => Err(RouteError::NotFound(format!("game {game_id} does not exist"))),
    }
}

#[instrument(skip(state))]
pub async fn game_achievements(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> JsonResult<Vec<Achievement>> {
    let game_id = GameId(path_id(id)?);
    match games::game_achievements(&*state.store, game_id).await? {
        Some(achievements) => Ok(Json(achievements)),
        None => Err(RouteError::NotFound(format!("game {game_id} does not exist"))),
    }
}

#[instrument(skip(state, body))]
pub async fn track_game(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TrackPayload>, JsonRejection>,
) -> Created<TrackedGameSummary> {
    let Json(payload) = body.map_err(bad_request)?;
    let (user_id, game_id) = payload.validate()?;

    let summary = tracking::track_game(&*state.store, user_id, game_id).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[instrument(skip(state, body))]
pub async fn untrack_game(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TrackPayload>, JsonRejection>,
) -> JsonResult<UntrackResponse> {
    let Json(payload) = body.map_err(bad_request)?;
    let (user_id, game_id) = payload.validate()?;

    let progress_removed = tracking::untrack_game(&*state.store, user_id, game_id).await?;
    Ok(Json(UntrackResponse {
        user_id,
        game_id,
        progress_removed,
    }))
}

#[instrument(skip(state, body))]
pub async fn complete_achievement(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CompletePayload>, JsonRejection>,
) -> JsonResult<Completion> {
    let Json(payload) = body.map_err(bad_request)?;
    let (user_id, achievement_id) = payload.validate()?;

    Ok(Json(
        completion::complete_achievement(&*state.store, user_id, achievement_id).await?,
    ))
}

#[instrument(skip(state))]
pub async fn user_games(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> JsonResult<Vec<TrackedGameSummary>> {
    let user_id = UserId(path_id(id)?);
    Ok(Json(tracking::tracked_games(&*state.store, user_id).await?))
}

#[instrument(skip(state))]
pub async fn user_game_achievements(
    State(state): State<Arc<AppState>>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> JsonResult<Vec<UserAchievement>> {
    let Path((user_id, game_id)) = ids.map_err(bad_request)?;
    Ok(Json(
        tracking::progress(&*state.store, UserId(user_id), GameId(game_id)).await?,
    ))
}

#[cfg(test)]
mod test {
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::server::{cors_layer, router};
    use crate::catalog::CatalogClient;
    use crate::db::memory::MemoryStore;
    use crate::engine::fixture::seed_game;
    use crate::util::env::CatalogConfig;

    fn app(store: &MemoryStore, catalog_uri: &str) -> Router {
        let state = Arc::new(AppState {
            store: Arc::new(store.clone()),
            catalog: CatalogClient::new(&CatalogConfig::for_tests(catalog_uri)).unwrap(),
        });
        router(state, cors_layer(None))
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let res = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_checkhealth() {
        let store = MemoryStore::new();
        let app = app(&store, "http://127.0.0.1:1");

        let (status, body) = send(app, "GET", "/api/v1/checkhealth", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_track_complete_untrack_flow() {
        let store = MemoryStore::new();
        let (game, ids) = seed_game(&store, 100, 2).await;
        let app = app(&store, "http://127.0.0.1:1");
        let pair = json!({ "userID": 5, "gameID": game.id.0 });

        let (status, body) =
            send(app.clone(), "POST", "/api/v1/track-game", Some(pair.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["achievementsTotal"], 2);

        let (status, body) =
            send(app.clone(), "POST", "/api/v1/track-game", Some(pair.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already tracks"));

        for (n, id) in ids.iter().enumerate() {
            let (status, body) = send(
                app.clone(),
                "POST",
                "/api/v1/complete-achievement",
                Some(json!({ "userID": 5, "achievementID": id.0 })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["gameCompleted"], n == ids.len() - 1);
        }

        let (status, body) = send(app.clone(), "GET", "/api/v1/users/5/games", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["achievementsCompleted"], 2);
        assert!(body[0]["completedAt"].is_string());

        let (status, body) = send(app.clone(), "POST", "/api/v1/untrack-game", Some(pair)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progressRemoved"], 2);

        let uri = format!("/api/v1/users/5/games/{}/achievements", game.id);
        let (status, _) = send(app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_errors_are_json() {
        let store = MemoryStore::new();
        let app = app(&store, "http://127.0.0.1:1");

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/v1/complete-achievement",
            Some(json!({ "userID": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "missing field 'achievementID'" }));

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/track-game")
            .header("content-type", "application/json")
            .body(Body::from("{ nope"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(app.clone(), "POST", "/api/v1/game-search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "missing query parameter 'val'" }));

        let (status, _) = send(app, "GET", "/api/v1/games/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_completion_of_untracked_achievement_is_not_found() {
        let store = MemoryStore::new();
        let app = app(&store, "http://127.0.0.1:1");

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/complete-achievement",
            Some(json!({ "userID": 5, "achievementID": 77 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_add_game_db_imports_and_tracks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games/4200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 4200,
                "name": "Portal 2",
                "slug": "portal-2",
                "description_raw": "Think with portals",
                "released": "2011-04-18",
                "genres": [{ "name": "Puzzle" }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games/4200/achievements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": 1, "name": "Wake Up Call", "percent": "80.1" },
                    { "id": 2, "name": "You Monster", "percent": 55 },
                ],
                "next": null,
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let app = app(&store, &server.uri());

        let (status, _) = send(app.clone(), "POST", "/api/v1/add-game-db/4200", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(app.clone(), "POST", "/api/v1/add-game-db/4200?user=9", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["achievementsImported"], 2);
        assert_eq!(body["game"]["externalID"], 4200);

        let game_id = body["game"]["id"].as_i64().unwrap();
        let uri = format!("/api/v1/games/{game_id}");
        let (status, body) = send(app.clone(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["genres"], json!(["Puzzle"]));
        assert_eq!(body["releaseDate"], "2011-04-18");

        let uri = format!("/api/v1/users/9/games/{game_id}/achievements");
        let (status, body) = send(app.clone(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _) = send(app, "POST", "/api/v1/add-game-db/4200?user=9", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_add_game_db_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games/1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/games/2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let app = app(&store, &server.uri());

        let (status, _) = send(app.clone(), "POST", "/api/v1/add-game-db/1?user=9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app, "POST", "/api/v1/add-game-db/2?user=9", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_game_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .and(query_param("search", "celeste"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": 58, "name": "Celeste", "background_image": "https://media.example/c.jpg" }],
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let (status, body) = send(
            app(&store, &server.uri()),
            "POST",
            "/api/v1/game-search?val=celeste",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{ "id": 58, "name": "Celeste", "coverURL": "https://media.example/c.jpg" }])
        );
    }

    #[tokio::test]
    async fn test_unknown_game_routes() {
        let store = MemoryStore::new();
        let app = app(&store, "http://127.0.0.1:1");

        let (status, _) = send(app.clone(), "GET", "/api/v1/games/12", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            send(app.clone(), "GET", "/api/v1/games/12/achievements", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(app, "GET", "/api/v1/games", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
