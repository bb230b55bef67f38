use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::instrument;

use super::sql_fragment::USER_ACHIEVEMENT_FIELDS;
use crate::db::StoreResult;
use crate::db::models::achievement::AchievementId;
use crate::db::models::game::GameId;
use crate::db::models::tracking::{UserAchievement, UserId};
use crate::db::pg::PgTx;

/// Per-user progress rows
#[async_trait]
pub trait UserAchievementRepository: Send {
    /// Creates an uncompleted progress row; no-op (false) if the row already exists
    async fn insert_progress(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        achievement_id: AchievementId,
        now: NaiveDateTime,
    ) -> StoreResult<bool>;

    /// Flags the row completed. `completed_at` keeps its first value on repeated calls.
    async fn mark_completed(
        &mut self,
        user_id: UserId,
        achievement_id: AchievementId,
        now: NaiveDateTime,
    ) -> StoreResult<Option<UserAchievement>>;

    async fn count_completed(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<i64>;
    async fn progress_for(
        &mut self,
        user_id: UserId,
        game_id: GameId,
    ) -> StoreResult<Vec<UserAchievement>>;
    /// Returns the number of rows removed
    async fn delete_progress(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<u64>;
}

#[async_trait]
impl UserAchievementRepository for PgTx {
    #[instrument(skip(self))]
    async fn insert_progress(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        achievement_id: AchievementId,
        now: NaiveDateTime,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO user_achievements (
                completed,
                user_id,
                game_id,
                achievement_id,
                completed_at,
                created_at
            )
            VALUES (FALSE, $1, $2, $3, NULL, $4)
            ON CONFLICT (user_id, achievement_id)
            DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(game_id)
        .bind(achievement_id)
        .bind(now)
        .execute(self.conn())
        .await?;

        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn mark_completed(
        &mut self,
        user_id: UserId,
        achievement_id: AchievementId,
        now: NaiveDateTime,
    ) -> StoreResult<Option<UserAchievement>> {
        Ok(sqlx::query_as::<_, UserAchievement>(&format!(
            r#"
            UPDATE user_achievements
            SET completed = TRUE,
                completed_at = COALESCE(completed_at, $3)
            WHERE user_id = $1 AND achievement_id = $2
            RETURNING {USER_ACHIEVEMENT_FIELDS}
            "#
        ))
        .bind(user_id)
        .bind(achievement_id)
        .bind(now)
        .fetch_optional(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn count_completed(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM user_achievements
            WHERE user_id = $1 AND game_id = $2 AND completed = TRUE
            "#,
        )
        .bind(user_id)
        .bind(game_id)
        .fetch_one(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn progress_for(
        &mut self,
        user_id: UserId,
        game_id: GameId,
    ) -> StoreResult<Vec<UserAchievement>> {
        Ok(sqlx::query_as::<_, UserAchievement>(&format!(
            r#"
            SELECT {USER_ACHIEVEMENT_FIELDS}
            FROM user_achievements
            WHERE user_id = $1 AND game_id = $2
            ORDER BY achievement_id ASC
            "#
        ))
        .bind(user_id)
        .bind(game_id)
        .fetch_all(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn delete_progress(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM user_achievements WHERE user_id = $1 AND game_id = $2")
            .bind(user_id)
            .bind(game_id)
            .execute(self.conn())
            .await?;

        Ok(res.rows_affected())
    }
}
