use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::achievement::AchievementId;
use super::game::GameId;
use crate::impl_entity_id;

/// Users are owned by the account service; this crate only stores references to them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl_entity_id!(UserId);

/// One row per `(user, game)` pair the user tracks.
///
/// `completed_at` is set once, the first time every achievement of the game is completed for the
/// user. `updated_at` moves on every achievement completion touching the game.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserGame {
    pub id: i64,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    pub tracked_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

/// Progress row: one per `(user, achievement)`. `game_id` points at the game, not at the
/// `user_games` row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub id: i64,
    pub completed: bool,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    #[serde(rename = "achievementID")]
    pub achievement_id: AchievementId,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedGameSummary {
    #[serde(flatten)]
    pub tracking: UserGame,
    pub achievements_total: i64,
    pub achievements_completed: i64,
}
