use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use leaky_bucket::RateLimiter;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::{Origin, Url};

use super::models::{
    CatalogAchievement, CatalogGame, CatalogSearchHit, Paginated, SearchResult,
};
use super::normalize;
use crate::constants::{API_KEY_PARAM, SEARCH_PAGE_SIZE};
use crate::util::env::CatalogConfig;
use crate::util::jitter;

pub type CatalogResult<T> = core::result::Result<T, CatalogErr>;

#[derive(Debug, Error)]
pub enum CatalogErr {
    #[error("catalog entry not found")]
    NotFound,

    #[error("catalog responded with status {status}")]
    Upstream { status: u16 },

    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed catalog response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid catalog url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("catalog listing exceeded {max} pages")]
    PageLimit { max: usize },

    #[error("refusing to send the api key to foreign origin {origin}")]
    ForeignOrigin { origin: String },
}

impl CatalogErr {
    /// Transport failures, 5xx and 429 may succeed if the request is sent again
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogErr::Transport(_) => true,
            CatalogErr::Upstream { status } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct AchievementPage {
    pub items: Vec<CatalogAchievement>,
    pub next: Option<Url>,
}

/// Client for the external game catalog (RAWG-compatible API).
///
/// Cheap to clone; clones share the connection pool and rate limiter.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    origin: Origin,
    api_key: String,
    max_retries: u32,
    max_pages: usize,
    limiter: Arc<RateLimiter>,
}

impl CatalogClient {
    pub fn new(cfg: &CatalogConfig) -> CatalogResult<Self> {
        let http = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        // validate once so later url building can only fail on bad ids/paths
        let origin = Url::parse(&cfg.base_url)?.origin();

        let rps = cfg.requests_per_second.max(1);
        let limiter = RateLimiter::builder()
            .initial(rps)
            .max(rps)
            .refill(rps)
            .interval(Duration::from_secs(1))
            .build();

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            origin,
            api_key: cfg.api_key.clone(),
            max_retries: cfg.max_retries,
            max_pages: cfg.max_pages,
            limiter: Arc::new(limiter),
        })
    }

    fn endpoint(&self, path: &str) -> CatalogResult<Url> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    pub fn achievements_url(&self, external_id: i64) -> CatalogResult<Url> {
        self.endpoint(&format!("games/{external_id}/achievements"))
    }

    /// Sets the API key on `url`, replacing any key it already carries
    fn with_key(&self, mut url: Url) -> Url {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != API_KEY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(API_KEY_PARAM, &self.api_key);
        url
    }

    #[instrument(skip(self))]
    pub async fn fetch_game(&self, external_id: i64) -> CatalogResult<CatalogGame> {
        let url = self.endpoint(&format!("games/{external_id}"))?;
        self.get_json(url).await
    }

    /// Fetches one page of a game's achievement listing. `next` is `None` on the last page.
    #[instrument(skip(self, url), fields(path = url.path()))]
    pub async fn fetch_achievements_page(&self, url: Url) -> CatalogResult<AchievementPage> {
        let page: Paginated<CatalogAchievement> = self.get_json(url).await?;
        let next = match page.next.as_deref().map(str::trim) {
            Some(next) if !next.is_empty() => Some(Url::parse(next)?),
            _ => None,
        };

        tracing::debug!(items = page.results.len(), has_next = next.is_some(), "fetched page");
        Ok(AchievementPage {
            items: page.results,
            next,
        })
    }

    /// Walks a game's achievement listing page by page
    pub fn achievement_pages(&self, external_id: i64) -> CatalogResult<AchievementPager<'_>> {
        Ok(AchievementPager {
            client: self,
            next: Some(self.achievements_url(external_id)?),
            seen: HashSet::new(),
            fetched: 0,
        })
    }

    #[instrument(skip(self))]
    pub async fn search_games(&self, query: &str) -> CatalogResult<Vec<SearchResult>> {
        let mut url = self.endpoint("games")?;
        url.query_pairs_mut()
            .append_pair("search", query)
            .append_pair("page_size", &SEARCH_PAGE_SIZE.to_string());

        let page: Paginated<CatalogSearchHit> = self.get_json(url).await?;
        Ok(page
            .results
            .into_iter()
            .map(normalize::search_result)
            .collect())
    }

    /// GET with the API key applied, retrying transient failures with backoff. Only urls on the
    /// configured catalog origin are requested.
    async fn get_json<T>(&self, url: Url) -> CatalogResult<T>
    where
        T: DeserializeOwned,
    {
        if url.origin() != self.origin {
            let origin = url.origin().ascii_serialization();
            tracing::error!(%origin, "catalog url leaves the catalog origin");
            return Err(CatalogErr::ForeignOrigin { origin });
        }

        let url = self.with_key(url);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.get_once(&url).await {
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let delay = jitter::backoff(attempt);
                    tracing::warn!(
                        attempt,
                        path = url.path(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient catalog failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                res => return res,
            }
        }
    }

    async fn get_once<T>(&self, url: &Url) -> CatalogResult<T>
    where
        T: DeserializeOwned,
    {
        self.limiter.acquire_one().await;

        let res = self.http.get(url.clone()).send().await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogErr::NotFound);
        }
        if !status.is_success() {
            tracing::error!(code = %status, path = url.path(), "non-2xx catalog response");
            return Err(CatalogErr::Upstream {
                status: status.as_u16(),
            });
        }

        let body = res.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Pages through an achievement listing.
///
/// Stops after the page without a `next` link, or when `next` points back at a page that was
/// already fetched. Fails with [`CatalogErr::PageLimit`] instead of fetching more than the
/// configured number of pages.
pub struct AchievementPager<'a> {
    client: &'a CatalogClient,
    next: Option<Url>,
    seen: HashSet<Url>,
    fetched: usize,
}

impl AchievementPager<'_> {
    pub async fn next_page(&mut self) -> CatalogResult<Option<Vec<CatalogAchievement>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        if self.fetched >= self.client.max_pages {
            return Err(CatalogErr::PageLimit {
                max: self.client.max_pages,
            });
        }

        self.seen.insert(self.client.with_key(url.clone()));
        let page = self.client.fetch_achievements_page(url).await?;
        self.fetched += 1;

        self.next = page.next.filter(|next| {
            let repeated = self.seen.contains(&self.client.with_key(next.clone()));
            if repeated {
                tracing::warn!(path = next.path(), "catalog pagination loops, stopping");
            }
            !repeated
        });

        Ok(Some(page.items))
    }

    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }
}
