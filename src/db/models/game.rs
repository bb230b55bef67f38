use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::impl_entity_id;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct GameId(pub i64);

impl_entity_id!(GameId);

/// Base games table model
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    #[serde(rename = "externalID")]
    pub external_id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub release_date: Option<NaiveDate>,
    pub cover_url: Option<String>,
    pub rating: f64,
    pub metacritic: Option<i32>,
    pub website: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A game as produced by the catalog normalizer, before it has a local id
#[derive(Debug, Clone, PartialEq)]
pub struct NewGame {
    pub external_id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub release_date: Option<NaiveDate>,
    pub cover_url: Option<String>,
    pub rating: f64,
    pub metacritic: Option<i32>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameDetails {
    #[serde(flatten)]
    pub game: Game,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
}

impl NewGame {
    pub fn into_game(self, id: GameId, created_at: NaiveDateTime) -> Game {
        Game {
            id,
            external_id: self.external_id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            release_date: self.release_date,
            cover_url: self.cover_url,
            rating: self.rating,
            metacritic: self.metacritic,
            website: self.website,
            created_at,
        }
    }
}
