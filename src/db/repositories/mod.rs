use core::fmt;
use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use tracing::instrument;

use crate::constants::SERIALIZABLE_TX_ATTEMPTS;
use crate::db::{Store, StoreError, StoreResult};

pub mod achievement;
pub mod game;
pub mod user_achievement;
pub mod user_game;

use achievement::AchievementRepository;
use game::GameRepository;
use user_achievement::UserAchievementRepository;
use user_game::UserGameRepository;

/// Constraint names, shared by the schema and the in-memory store
pub mod constraint {
    pub const GAMES_EXTERNAL_ID: &str = "games_external_id_key";
    pub const ACHIEVEMENTS_GAME_EXTERNAL_ID: &str = "achievements_game_id_external_id_key";
    pub const USER_GAMES_USER_GAME: &str = "user_games_user_id_game_id_key";
    pub const USER_ACHIEVEMENTS_USER_ACHIEVEMENT: &str =
        "user_achievements_user_id_achievement_id_key";
}

pub mod sql_fragment {
    pub const GAME_FIELDS: &str = r#"
        id,
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
    "#;

    pub const ACHIEVEMENT_FIELDS: &str = r#"
        id,
        game_id,
        external_id,
        name,
        description,
        image_url,
        percent
    "#;

    pub const USER_GAME_FIELDS: &str = r#"
        id,
        user_id,
        game_id,
        tracked_at,
        completed_at,
        updated_at
    "#;

    pub const USER_ACHIEVEMENT_FIELDS: &str = r#"
        id,
        completed,
        user_id,
        game_id,
        achievement_id,
        completed_at,
        created_at
    "#;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Isolation::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            Isolation::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            Isolation::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Every entity repository over a single open transaction.
///
/// Implementations must discard all writes when dropped without [`UnitOfWork::commit`].
#[async_trait]
pub trait UnitOfWork:
    GameRepository
    + AchievementRepository
    + UserGameRepository
    + UserAchievementRepository
    + Send
{
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

pub struct Tx {
    inner: Box<dyn UnitOfWork>,
}

impl Tx {
    pub fn new(inner: Box<dyn UnitOfWork>) -> Self {
        Self { inner }
    }

    /// Scoped transaction handler
    ///
    /// # Usage
    ///
    /// `f` receives the open transaction and hands it back alongside its result. `Ok` commits,
    /// `Err` rolls back. If the future is dropped or panics part way the transaction is dropped
    /// too, which also rolls it back.
    #[instrument(skip(store, f))]
    pub async fn with_tx<F, Fut, T, E>(store: &dyn Store, isolation: Isolation, f: F) -> Result<T, E>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = (Tx, Result<T, E>)>,
        E: From<StoreError> + fmt::Debug,
    {
        let tx = store.begin(isolation).await?;
        let (tx, result) = f(tx).await;

        match result {
            Ok(val) => {
                tx.commit().await?;
                Ok(val)
            }
            Err(e) => {
                tracing::trace!(error = ?e, "transacted unit of work failure");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = ?rollback_err, "rollback failed, connection discarded");
                }
                Err(e)
            }
        }
    }

    pub async fn commit(self) -> StoreResult<()> {
        self.inner.commit().await
    }

    pub async fn rollback(self) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

impl Deref for Tx {
    type Target = dyn UnitOfWork;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DerefMut for Tx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.inner
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tx")
    }
}

/// Errors that may carry a serialization conflict from the store
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        self.is_serialization_failure()
    }
}

/// Re-runs a serializable unit of work that lost a serialization conflict, a bounded number of
/// times. `op` is given the 1-based attempt number.
pub async fn retry_serializable<F, Fut, T, E>(mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Debug,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Err(e) if e.is_retryable() && attempt < SERIALIZABLE_TX_ATTEMPTS => {
                tracing::warn!(attempt, error = ?e, "serialization conflict, retrying unit of work");
                attempt += 1;
            }
            other => return other,
        }
    }
}
