use async_trait::async_trait;
use tracing::instrument;

use super::sql_fragment::ACHIEVEMENT_FIELDS;
use crate::db::StoreResult;
use crate::db::models::achievement::{Achievement, NewAchievement};
use crate::db::models::game::GameId;
use crate::db::pg::PgTx;

/// Achievement catalog, scoped per game
#[async_trait]
pub trait AchievementRepository: Send {
    /// Inserts the achievement unless `(game_id, external_id)` already exists. Returns the stored
    /// row and whether it was created by this call.
    async fn upsert_achievement(
        &mut self,
        achievement: &NewAchievement,
    ) -> StoreResult<(Achievement, bool)>;
    async fn achievements_for_game(&mut self, game_id: GameId) -> StoreResult<Vec<Achievement>>;
    async fn count_achievements(&mut self, game_id: GameId) -> StoreResult<i64>;
}

#[async_trait]
impl AchievementRepository for PgTx {
    #[instrument(skip(self, achievement), fields(game_id = %achievement.game_id, external_id = achievement.external_id))]
    async fn upsert_achievement(
        &mut self,
        achievement: &NewAchievement,
    ) -> StoreResult<(Achievement, bool)> {
        let inserted = sqlx::query_as::<_, Achievement>(&format!(
            r#"
            INSERT INTO achievements (
                game_id,
                external_id,
                name,
                description,
                image_url,
                percent
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (game_id, external_id)
            DO NOTHING
            RETURNING {ACHIEVEMENT_FIELDS}
            "#
        ))
        .bind(achievement.game_id)
        .bind(achievement.external_id)
        .bind(&achievement.name)
        .bind(&achievement.description)
        .bind(&achievement.image_url)
        .bind(achievement.percent)
        .fetch_optional(self.conn())
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        let existing = sqlx::query_as::<_, Achievement>(&format!(
            "SELECT {ACHIEVEMENT_FIELDS} FROM achievements WHERE game_id = $1 AND external_id = $2"
        ))
        .bind(achievement.game_id)
        .bind(achievement.external_id)
        .fetch_one(self.conn())
        .await?;

        tracing::debug!(id = %existing.id, "achievement already present for game");
        Ok((existing, false))
    }

    #[instrument(skip(self))]
    async fn achievements_for_game(&mut self, game_id: GameId) -> StoreResult<Vec<Achievement>> {
        Ok(sqlx::query_as::<_, Achievement>(&format!(
            "SELECT {ACHIEVEMENT_FIELDS} FROM achievements WHERE game_id = $1 ORDER BY id ASC"
        ))
        .bind(game_id)
        .fetch_all(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn count_achievements(&mut self, game_id: GameId) -> StoreResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM achievements WHERE game_id = $1")
                .bind(game_id)
                .fetch_one(self.conn())
                .await?,
        )
    }
}
