//! Response shapes of the external catalog API. Only the fields the service stores are kept.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogGame {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    /// HTML
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub description_raw: Option<String>,
    #[serde(default)]
    pub released: Option<String>,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub metacritic: Option<i32>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub platforms: Option<Vec<PlatformEntry>>,
    #[serde(default)]
    pub genres: Option<Vec<NamedEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformEntry {
    pub platform: NamedEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogAchievement {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Sent as a numeric string by the catalog, occasionally as a number
    #[serde(default)]
    pub percent: Option<Value>,
}

/// A page of any paginated listing
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSearchHit {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub background_image: Option<String>,
}

/// Search result entry returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: i64,
    pub name: String,
    #[serde(rename = "coverURL")]
    pub cover_url: Option<String>,
}
