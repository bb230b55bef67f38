//! Mapping from catalog responses to local entities.

use chrono::NaiveDate;
use serde_json::Value;

use super::models::{CatalogAchievement, CatalogGame, CatalogSearchHit, SearchResult};
use crate::db::models::achievement::NewAchievement;
use crate::db::models::game::{GameId, NewGame};

/// A game plus the tags that are stored in their own tables
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGame {
    pub game: NewGame,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
}

pub fn game(src: CatalogGame) -> NormalizedGame {
    let description = src
        .description_raw
        .filter(|d| !d.trim().is_empty())
        .or(src.description)
        .unwrap_or_default();

    let platforms = tag_names(
        src.platforms
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.platform.name),
    );
    let genres = tag_names(src.genres.unwrap_or_default().into_iter().map(|g| g.name));

    NormalizedGame {
        game: NewGame {
            external_id: src.id,
            name: src.name,
            slug: src.slug,
            description,
            release_date: src.released.as_deref().and_then(release_date),
            cover_url: non_empty(src.background_image),
            rating: src.rating.unwrap_or(0.0),
            metacritic: src.metacritic,
            website: non_empty(src.website),
        },
        platforms,
        genres,
    }
}

pub fn achievement(game_id: GameId, src: CatalogAchievement) -> NewAchievement {
    NewAchievement {
        game_id,
        external_id: src.id,
        name: src.name,
        description: src.description.unwrap_or_default(),
        image_url: non_empty(src.image),
        percent: percent(src.percent.as_ref()),
    }
}

pub fn search_result(src: CatalogSearchHit) -> SearchResult {
    SearchResult {
        id: src.id,
        name: src.name,
        cover_url: non_empty(src.background_image),
    }
}

fn release_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Unlock rate clamped to `0..=100`
fn percent(raw: Option<&Value>) -> f64 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(p) if p.is_finite() => p.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Trims, drops empties and duplicates, keeps first-seen order
fn tag_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
