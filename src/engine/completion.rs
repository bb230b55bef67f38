use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::*;
use crate::db::repositories::{Retryable, retry_serializable};

pub type CompletionResult<T> = core::result::Result<T, CompletionError>;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("user {user_id} has no progress row for achievement {achievement_id}")]
    NotFound {
        user_id: UserId,
        achievement_id: AchievementId,
    },

    #[error("user {user_id} is not tracking game {game_id}")]
    NotTracking { user_id: UserId, game_id: GameId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retryable for CompletionError {
    fn is_retryable(&self) -> bool {
        matches!(self, CompletionError::Store(e) if e.is_retryable())
    }
}

/// Outcome of completing one achievement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub progress: UserAchievement,
    pub tracking: UserGame,
    pub achievements_total: i64,
    pub achievements_completed: i64,
    /// Whether this call is the one that completed the game
    pub game_completed: bool,
}

/// A game counts as complete once it has achievements and all of them are done
pub fn should_mark_complete(catalog_size: i64, progress_size: i64) -> bool {
    catalog_size > 0 && progress_size == catalog_size
}

/// Marks the user's achievement completed and cascades into the game's completion state.
///
/// Runs as one serializable unit of work, re-run on serialization conflicts. Any failure leaves
/// both the progress row and the tracking row as they were.
#[instrument(skip(store))]
pub async fn complete_achievement(
    store: &dyn Store,
    user_id: UserId,
    achievement_id: AchievementId,
) -> CompletionResult<Completion> {
    let completion = retry_serializable(move |attempt| async move {
        tracing::trace!(attempt, "completion unit of work");
        Tx::with_tx(store, Isolation::Serializable, |mut tx| async move {
            let res = complete_in_tx(&mut tx, user_id, achievement_id, super::now()).await;
            (tx, res)
        })
        .await
    })
    .await?;

    if completion.game_completed {
        tracing::info!(game_id = %completion.tracking.game_id, "game completed");
    }
    Ok(completion)
}

async fn complete_in_tx(
    tx: &mut Tx,
    user_id: UserId,
    achievement_id: AchievementId,
    now: NaiveDateTime,
) -> CompletionResult<Completion> {
    let progress = tx
        .mark_completed(user_id, achievement_id, now)
        .await?
        .ok_or(CompletionError::NotFound {
            user_id,
            achievement_id,
        })?;
    let game_id = progress.game_id;

    if !tx.touch_user_game(user_id, game_id, now).await? {
        return Err(CompletionError::NotTracking { user_id, game_id });
    }

    let achievements_total = tx.count_achievements(game_id).await?;
    let achievements_completed = tx.count_completed(user_id, game_id).await?;

    let game_completed = should_mark_complete(achievements_total, achievements_completed)
        && tx.complete_user_game(user_id, game_id, now).await?;

    let tracking = tx
        .user_game(user_id, game_id)
        .await?
        .ok_or(CompletionError::NotTracking { user_id, game_id })?;

    Ok(Completion {
        progress,
        tracking,
        achievements_total,
        achievements_completed,
        game_completed,
    })
}
