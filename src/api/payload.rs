//! Request bodies and query strings. Every field is optional at the serde level so that missing
//! values are reported as validation errors with the field name instead of a generic rejection.

use serde::{Deserialize, Serialize};

use crate::api::server::RouteError;
use crate::db::prelude::{AchievementId, GameId, UserId};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub val: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddGameParams {
    pub user: Option<String>,
}

impl AddGameParams {
    /// `Ok(None)` when the parameter is absent or blank
    pub fn user_id(&self) -> Result<Option<UserId>, RouteError> {
        match self.user.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(|id| Some(UserId(id)))
                .map_err(|_| RouteError::Validation(format!("invalid user id '{raw}'"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    #[serde(rename = "userID")]
    pub user_id: Option<i64>,
    #[serde(rename = "gameID")]
    pub game_id: Option<i64>,
}

impl TrackPayload {
    pub fn validate(&self) -> Result<(UserId, GameId), RouteError> {
        Ok((
            required_id(self.user_id, "userID")?.into(),
            required_id(self.game_id, "gameID")?.into(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletePayload {
    #[serde(rename = "userID")]
    pub user_id: Option<i64>,
    #[serde(rename = "achievementID")]
    pub achievement_id: Option<i64>,
}

impl CompletePayload {
    pub fn validate(&self) -> Result<(UserId, AchievementId), RouteError> {
        Ok((
            required_id(self.user_id, "userID")?.into(),
            required_id(self.achievement_id, "achievementID")?.into(),
        ))
    }
}

fn required_id(value: Option<i64>, field: &str) -> Result<i64, RouteError> {
    match value {
        Some(id) if id > 0 => Ok(id),
        Some(id) => Err(RouteError::Validation(format!("invalid {field} '{id}'"))),
        None => Err(RouteError::Validation(format!("missing field '{field}'"))),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UntrackResponse {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    pub progress_removed: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
