use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::*;
use crate::db::repositories::{Retryable, constraint, retry_serializable};

pub type TrackingResult<T> = core::result::Result<T, TrackingError>;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("game {0} does not exist")]
    GameNotFound(GameId),

    #[error("user {user_id} is not tracking game {game_id}")]
    NotTracking { user_id: UserId, game_id: GameId },

    #[error("user {user_id} already tracks game {game_id}")]
    Conflict { user_id: UserId, game_id: GameId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retryable for TrackingError {
    fn is_retryable(&self) -> bool {
        matches!(self, TrackingError::Store(e) if e.is_retryable())
    }
}

/// Creates the tracking row plus one progress row per achievement the game currently has.
///
/// Must run under serializable isolation so an achievement inserted concurrently cannot be missed.
pub(crate) async fn track_in_tx(
    tx: &mut Tx,
    user_id: UserId,
    game_id: GameId,
    now: NaiveDateTime,
) -> TrackingResult<UserGame> {
    let tracking = match tx.insert_user_game(user_id, game_id, now).await {
        Ok(row) => row,
        Err(e) if e.is_unique_violation(constraint::USER_GAMES_USER_GAME) => {
            return Err(TrackingError::Conflict { user_id, game_id });
        }
        Err(e) => return Err(e.into()),
    };

    let achievements = tx.achievements_for_game(game_id).await?;
    for achievement in &achievements {
        tx.insert_progress(user_id, game_id, achievement.id, now)
            .await?;
    }

    tracing::debug!(progress_rows = achievements.len(), "tracking row created");
    Ok(tracking)
}

/// Starts tracking a game that has already been imported
#[instrument(skip(store))]
pub async fn track_game(
    store: &dyn Store,
    user_id: UserId,
    game_id: GameId,
) -> TrackingResult<TrackedGameSummary> {
    retry_serializable(move |_| async move {
        Tx::with_tx(store, Isolation::Serializable, |mut tx| async move {
            let res: TrackingResult<_> = async {
                if tx.game_by_id(game_id).await?.is_none() {
                    return Err(TrackingError::GameNotFound(game_id));
                }

                let tracking = track_in_tx(&mut tx, user_id, game_id, super::now()).await?;
                let total = tx.count_achievements(game_id).await?;

                Ok(TrackedGameSummary {
                    tracking,
                    achievements_total: total,
                    achievements_completed: 0,
                })
            }
            .await;
            (tx, res)
        })
        .await
    })
    .await
}

/// Removes the tracking row and every progress row of the pair, together.
///
/// Returns the number of progress rows removed.
#[instrument(skip(store))]
pub async fn untrack_game(store: &dyn Store, user_id: UserId, game_id: GameId) -> TrackingResult<u64> {
    retry_serializable(move |_| async move {
        Tx::with_tx(store, Isolation::Serializable, |mut tx| async move {
            let res: TrackingResult<_> = async {
                let removed = tx.delete_progress(user_id, game_id).await?;
                if !tx.delete_user_game(user_id, game_id).await? {
                    return Err(TrackingError::NotTracking { user_id, game_id });
                }
                Ok(removed)
            }
            .await;
            (tx, res)
        })
        .await
    })
    .await
}

/// Every game the user tracks with progress counts, most recently tracked first
#[instrument(skip(store))]
pub async fn tracked_games(store: &dyn Store, user_id: UserId) -> TrackingResult<Vec<TrackedGameSummary>> {
    Tx::with_tx(store, Isolation::RepeatableRead, |mut tx| async move {
        let res: TrackingResult<_> = async {
            let mut summaries = Vec::new();
            for tracking in tx.user_games(user_id).await? {
                let achievements_total = tx.count_achievements(tracking.game_id).await?;
                let achievements_completed =
                    tx.count_completed(user_id, tracking.game_id).await?;
                summaries.push(TrackedGameSummary {
                    tracking,
                    achievements_total,
                    achievements_completed,
                });
            }
            Ok(summaries)
        }
        .await;
        (tx, res)
    })
    .await
}

#[instrument(skip(store))]
pub async fn progress(
    store: &dyn Store,
    user_id: UserId,
    game_id: GameId,
) -> TrackingResult<Vec<UserAchievement>> {
    Tx::with_tx(store, Isolation::RepeatableRead, |mut tx| async move {
        let res: TrackingResult<_> = async {
            if tx.user_game(user_id, game_id).await?.is_none() {
                return Err(TrackingError::NotTracking { user_id, game_id });
            }
            Ok(tx.progress_for(user_id, game_id).await?)
        }
        .await;
        (tx, res)
    })
    .await
}
