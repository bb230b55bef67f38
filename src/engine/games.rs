use tracing::instrument;

use crate::db::prelude::*;

#[instrument(skip(store))]
pub async fn list_games(store: &dyn Store) -> StoreResult<Vec<Game>> {
    Tx::with_tx(store, Isolation::ReadCommitted, |mut tx| async move {
        let res = tx.all_games().await;
        (tx, res)
    })
    .await
}

/// `None` if no such game was imported
#[instrument(skip(store))]
pub async fn game_details(store: &dyn Store, game_id: GameId) -> StoreResult<Option<GameDetails>> {
    Tx::with_tx(store, Isolation::RepeatableRead, |mut tx| async move {
        let res: StoreResult<_> = async {
            let Some(game) = tx.game_by_id(game_id).await? else {
                return Ok(None);
            };

            Ok(Some(GameDetails {
                platforms: tx.platforms_for(game.id).await?,
                genres: tx.genres_for(game.id).await?,
                game,
            }))
        }
        .await;
        (tx, res)
    })
    .await
}

/// The game's achievement catalog; `None` if no such game was imported
#[instrument(skip(store))]
pub async fn game_achievements(
    store: &dyn Store,
    game_id: GameId,
) -> StoreResult<Option<Vec<Achievement>>> {
    Tx::with_tx(store, Isolation::RepeatableRead, |mut tx| async move {
        let res: StoreResult<_> = async {
            if tx.game_by_id(game_id).await?.is_none() {
                return Ok(None);
            }
            Ok(Some(tx.achievements_for_game(game_id).await?))
        }
        .await;
        (tx, res)
    })
    .await
}
