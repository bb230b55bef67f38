//! Onboards a catalog game for a user.
//!
//! The external fetches cannot share a local transaction, so the pipeline commits in phases:
//! the game with its tags, then the tracking row, then one unit per achievement (achievement row
//! plus a progress row for every tracker). An interrupted import leaves a prefix of the catalog
//! imported. Importing the game again reuses the stored game row and fills in the achievements
//! that are still missing. This holds for the user whose import was interrupted too: the listing is
//! paged before their duplicate tracking request is reported as a conflict.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use super::tracking::{self, TrackingError};
use crate::catalog::normalize::{self, NormalizedGame};
use crate::catalog::{CatalogClient, CatalogErr};
use crate::db::prelude::*;
use crate::db::repositories::{Retryable, constraint, retry_serializable};

pub type ImportResult<T> = core::result::Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0}")]
    Validation(String),

    #[error("game {0} not found in catalog")]
    NotFound(i64),

    #[error("user {user_id} already tracks game {game_id}")]
    Conflict { user_id: UserId, game_id: GameId },

    #[error("failed to add {kind} '{name}': {source}")]
    Association {
        kind: &'static str,
        name: String,
        source: StoreError,
    },

    #[error(transparent)]
    Catalog(CatalogErr),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    fn from_catalog(external_id: i64, err: CatalogErr) -> Self {
        match err {
            CatalogErr::NotFound => ImportError::NotFound(external_id),
            other => ImportError::Catalog(other),
        }
    }
}

impl From<TrackingError> for ImportError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::Conflict { user_id, game_id } => {
                ImportError::Conflict { user_id, game_id }
            }
            TrackingError::Store(e) => ImportError::Store(e),
            // track_in_tx reports only conflicts and store failures
            other => ImportError::Validation(other.to_string()),
        }
    }
}

impl Retryable for ImportError {
    fn is_retryable(&self) -> bool {
        matches!(self, ImportError::Store(e) if e.is_retryable())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub game: Game,
    pub tracking: UserGame,
    /// Achievement rows created by this import
    pub achievements_imported: usize,
    /// Achievements listed by the catalog
    pub achievements_total: usize,
    /// The game row already existed and was reused
    pub reused: bool,
}

/// Imports `external_id` from the catalog and starts tracking it for `user_id`.
#[instrument(skip(store, catalog))]
pub async fn import_game(
    store: &dyn Store,
    catalog: &CatalogClient,
    external_id: i64,
    user_id: Option<UserId>,
) -> ImportResult<ImportSummary> {
    let user_id = match user_id {
        Some(id) if id.0 > 0 => id,
        Some(id) => return Err(ImportError::Validation(format!("invalid user id {id}"))),
        None => return Err(ImportError::Validation("missing user id".to_string())),
    };
    if external_id <= 0 {
        return Err(ImportError::Validation(format!(
            "invalid catalog game id {external_id}"
        )));
    }

    let detail = catalog
        .fetch_game(external_id)
        .await
        .map_err(|e| ImportError::from_catalog(external_id, e))?;
    let normalized = normalize::game(detail);

    let (game, reused) = persist_game(store, &normalized).await?;
    tracing::debug!(game_id = %game.id, reused, "game stored");

    let game_id = game.id;
    let tracked = retry_serializable(move |_| async move {
        Tx::with_tx(store, Isolation::Serializable, |mut tx| async move {
            let res = tracking::track_in_tx(&mut tx, user_id, game_id, super::now())
                .await
                .map_err(ImportError::from);
            (tx, res)
        })
        .await
    })
    .await;

    let tracking = match tracked {
        Ok(tracking) => tracking,
        Err(conflict @ ImportError::Conflict { .. }) => {
            // the user's earlier import may have stopped mid-listing
            tracing::info!(%game_id, %user_id, "already tracked, completing achievement listing");
            import_achievements(store, catalog, external_id, game_id).await?;
            return Err(conflict);
        }
        Err(e) => return Err(e),
    };

    let (achievements_imported, achievements_total) =
        import_achievements(store, catalog, external_id, game_id).await?;

    Ok(ImportSummary {
        game,
        tracking,
        achievements_imported,
        achievements_total,
        reused,
    })
}

/// Pages through the catalog listing, storing every achievement not yet stored for the game.
/// Returns the number of new achievement rows and the number listed.
async fn import_achievements(
    store: &dyn Store,
    catalog: &CatalogClient,
    external_id: i64,
    game_id: GameId,
) -> ImportResult<(usize, usize)> {
    let mut pager = catalog
        .achievement_pages(external_id)
        .map_err(ImportError::Catalog)?;
    let mut achievements_imported = 0;
    let mut achievements_total = 0;

    while let Some(items) = pager
        .next_page()
        .await
        .map_err(|e| ImportError::from_catalog(external_id, e))?
    {
        for item in items {
            let achievement = &normalize::achievement(game_id, item);
            let now = super::now();
            let created =
                retry_serializable(move |_| import_achievement(store, achievement, now)).await?;

            achievements_total += 1;
            if created {
                achievements_imported += 1;
            }
        }
    }

    tracing::info!(
        %game_id,
        pages = pager.pages_fetched(),
        achievements_imported,
        achievements_total,
        "achievement listing imported"
    );

    Ok((achievements_imported, achievements_total))
}

/// Stores the game with its platforms and genres in one unit, or returns the stored row if the
/// game was imported before. The boolean is true for a reused row.
async fn persist_game(store: &dyn Store, normalized: &NormalizedGame) -> ImportResult<(Game, bool)> {
    // a concurrent import can win the insert race once; the second pass then finds its row
    let mut attempts = 0;
    loop {
        attempts += 1;
        let res = Tx::with_tx(store, Isolation::ReadCommitted, |mut tx| async move {
            let res = insert_or_reuse(&mut tx, normalized).await;
            (tx, res)
        })
        .await;

        match res {
            Err(ImportError::Store(e))
                if attempts < 2 && e.is_unique_violation(constraint::GAMES_EXTERNAL_ID) =>
            {
                tracing::debug!("game inserted concurrently, reusing it");
            }
            other => return other,
        }
    }
}

async fn insert_or_reuse(tx: &mut Tx, normalized: &NormalizedGame) -> ImportResult<(Game, bool)> {
    if let Some(existing) = tx.game_by_external_id(normalized.game.external_id).await? {
        return Ok((existing, true));
    }

    let game = tx.insert_game(&normalized.game, super::now()).await?;
    for name in &normalized.platforms {
        tx.add_platform(game.id, name)
            .await
            .map_err(|source| ImportError::Association {
                kind: "platform",
                name: name.clone(),
                source,
            })?;
    }
    for name in &normalized.genres {
        tx.add_genre(game.id, name)
            .await
            .map_err(|source| ImportError::Association {
                kind: "genre",
                name: name.clone(),
                source,
            })?;
    }

    Ok((game, false))
}

/// One achievement plus a progress row for every user tracking its game, committed together.
/// Returns whether the achievement row was new.
async fn import_achievement(
    store: &dyn Store,
    achievement: &NewAchievement,
    now: NaiveDateTime,
) -> ImportResult<bool> {
    Tx::with_tx(store, Isolation::Serializable, |mut tx| async move {
        let res: ImportResult<_> = async {
            let (row, created) = tx.upsert_achievement(achievement).await?;
            for user_id in tx.trackers_of(row.game_id).await? {
                tx.insert_progress(user_id, row.game_id, row.id, now).await?;
            }
            Ok(created)
        }
        .await;
        (tx, res)
    })
    .await
}
