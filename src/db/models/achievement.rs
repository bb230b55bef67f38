use serde::{Deserialize, Serialize};

use super::game::GameId;
use crate::impl_entity_id;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct AchievementId(pub i64);

impl_entity_id!(AchievementId);

/// Base achievements table model. `percent` is the population-wide unlock rate reported by the
/// catalog.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: AchievementId,
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    #[serde(rename = "externalID")]
    pub external_id: i64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAchievement {
    pub game_id: GameId,
    pub external_id: i64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub percent: f64,
}

impl NewAchievement {
    pub fn into_achievement(self, id: AchievementId) -> Achievement {
        Achievement {
            id,
            game_id: self.game_id,
            external_id: self.external_id,
            name: self.name,
            description: self.description,
            image_url: self.image_url,
            percent: self.percent,
        }
    }
}
