use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::instrument;

use super::sql_fragment::GAME_FIELDS;
use crate::db::StoreResult;
use crate::db::models::game::{Game, GameId, NewGame};
use crate::db::pg::PgTx;

/// Games and their platform/genre tags
#[async_trait]
pub trait GameRepository: Send {
    /// Fails with a unique violation on `games.external_id` if the game was already imported
    async fn insert_game(&mut self, game: &NewGame, created_at: NaiveDateTime)
    -> StoreResult<Game>;
    async fn game_by_id(&mut self, id: GameId) -> StoreResult<Option<Game>>;
    async fn game_by_external_id(&mut self, external_id: i64) -> StoreResult<Option<Game>>;
    async fn all_games(&mut self) -> StoreResult<Vec<Game>>;

    /// Associates a platform by name, creating the platform row if needed. Idempotent.
    async fn add_platform(&mut self, game_id: GameId, name: &str) -> StoreResult<()>;
    /// Idempotent
    async fn add_genre(&mut self, game_id: GameId, name: &str) -> StoreResult<()>;
    async fn platforms_for(&mut self, game_id: GameId) -> StoreResult<Vec<String>>;
    async fn genres_for(&mut self, game_id: GameId) -> StoreResult<Vec<String>>;
}

#[async_trait]
impl GameRepository for PgTx {
    #[instrument(skip(self, game), fields(external_id = game.external_id))]
    async fn insert_game(
        &mut self,
        game: &NewGame,
        created_at: NaiveDateTime,
    ) -> StoreResult<Game> {
        let inserted = sqlx::query_as::<_, Game>(&format!(
            r#"
            INSERT INTO games (
                external_id,
                name,
                slug,
                description,
                release_date,
                cover_url,
                rating,
                metacritic,
                website,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {GAME_FIELDS}
            "#
        ))
        .bind(game.external_id)
        .bind(&game.name)
        .bind(&game.slug)
        .bind(&game.description)
        .bind(game.release_date)
        .bind(&game.cover_url)
        .bind(game.rating)
        .bind(game.metacritic)
        .bind(&game.website)
        .bind(created_at)
        .fetch_one(self.conn())
        .await?;

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn game_by_id(&mut self, id: GameId) -> StoreResult<Option<Game>> {
        Ok(
            sqlx::query_as::<_, Game>(&format!("SELECT {GAME_FIELDS} FROM games WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.conn())
                .await?,
        )
    }

    #[instrument(skip(self))]
    async fn game_by_external_id(&mut self, external_id: i64) -> StoreResult<Option<Game>> {
        Ok(sqlx::query_as::<_, Game>(&format!(
            "SELECT {GAME_FIELDS} FROM games WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn all_games(&mut self) -> StoreResult<Vec<Game>> {
        Ok(sqlx::query_as::<_, Game>(&format!(
            "SELECT {GAME_FIELDS} FROM games ORDER BY name ASC, id ASC"
        ))
        .fetch_all(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn add_platform(&mut self, game_id: GameId, name: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            WITH platform AS (
                INSERT INTO platforms (name)
                VALUES ($2)
                ON CONFLICT (name)
                DO UPDATE SET name = EXCLUDED.name
                RETURNING id
            )
            INSERT INTO game_platforms (game_id, platform_id)
            SELECT $1, id FROM platform
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(game_id)
        .bind(name)
        .execute(self.conn())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_genre(&mut self, game_id: GameId, name: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO game_genres (game_id, genre)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(game_id)
        .bind(name)
        .execute(self.conn())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn platforms_for(&mut self, game_id: GameId) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM game_platforms gp
            JOIN platforms p ON p.id = gp.platform_id
            WHERE gp.game_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(game_id)
        .fetch_all(self.conn())
        .await?)
    }

    #[instrument(skip(self))]
    async fn genres_for(&mut self, game_id: GameId) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT genre FROM game_genres WHERE game_id = $1 ORDER BY genre",
        )
        .bind(game_id)
        .fetch_all(self.conn())
        .await?)
    }
}
