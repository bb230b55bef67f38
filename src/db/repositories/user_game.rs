use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::instrument;

use super::sql_fragment::USER_GAME_FIELDS;
use crate::db::StoreResult;
use crate::db::models::game::GameId;
use crate::db::models::tracking::{UserGame, UserId};
use crate::db::pg::PgTx;

/// Tracking rows, one per `(user, game)`
#[async_trait]
pub trait UserGameRepository: Send {
    /// Fails with a unique violation on `(user_id, game_id)` if the pair is already tracked
    async fn insert_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<UserGame>;
    async fn user_game(&mut self, user_id: UserId, game_id: GameId)
    -> StoreResult<Option<UserGame>>;
    async fn user_games(&mut self, user_id: UserId) -> StoreResult<Vec<UserGame>>;
    /// Every user currently tracking the game
    async fn trackers_of(&mut self, game_id: GameId) -> StoreResult<Vec<UserId>>;

    /// Moves `updated_at`; false when the pair is not tracked
    async fn touch_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<bool>;
    /// Sets `completed_at` if it is still unset. Returns whether this call set it.
    async fn complete_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<bool>;
    async fn delete_user_game(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<bool>;
}

#[async_trait]
impl UserGameRepository for PgTx {
    #[instrument(skip(self))]
    async fn insert_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<UserGame> {
        Ok(sqlx::query_as::<_, UserGame>(&format!(
            r#"
            INSERT INTO user_games (user_id, game_id, tracked_at, completed_at, updated_at)
            VALUES ($1, $2, $3, NULL, $3)
            RETURNING {USER_GAME_FIELDS}
            "#
        ))
        .bind(user_id)
        .bind(game_id)
        .bind(now)
        .fetch_one(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
    ) -> StoreResult<Option<UserGame>> {
        Ok(sqlx::query_as::<_, UserGame>(&format!(
            "SELECT {USER_GAME_FIELDS} FROM user_games WHERE user_id = $1 AND game_id = $2"
        ))
        .bind(user_id)
        .bind(game_id)
        .fetch_optional(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn user_games(&mut self, user_id: UserId) -> StoreResult<Vec<UserGame>> {
        Ok(sqlx::query_as::<_, UserGame>(&format!(
            "SELECT {USER_GAME_FIELDS} FROM user_games WHERE user_id = $1 ORDER BY tracked_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn trackers_of(&mut self, game_id: GameId) -> StoreResult<Vec<UserId>> {
        Ok(sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM user_games WHERE game_id = $1 ORDER BY user_id",
        )
        .bind(game_id)
        .fetch_all(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn touch_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE user_games SET updated_at = $3 WHERE user_id = $1 AND game_id = $2",
        )
        .bind(user_id)
        .bind(game_id)
        .bind(now)
        .execute(self.conn())
        .await?;

        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn complete_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE user_games
            SET completed_at = $3, updated_at = $3
            WHERE user_id = $1 AND game_id = $2 AND completed_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(game_id)
        .bind(now)
        .execute(self.conn())
        .await?;

        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_user_game(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM user_games WHERE user_id = $1 AND game_id = $2")
            .bind(user_id)
            .bind(game_id)
            .execute(self.conn())
            .await?;

        Ok(res.rows_affected() > 0)
    }
}
