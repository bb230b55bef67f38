use async_trait::async_trait;
use thiserror::Error;

use crate::db::repositories::{Isolation, Tx};

#[cfg(test)]
pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;

pub mod prelude {
    pub use crate::db::models::achievement::{Achievement, AchievementId, NewAchievement};
    pub use crate::db::models::game::{Game, GameDetails, GameId, NewGame};
    pub use crate::db::models::tracking::{
        TrackedGameSummary, UserAchievement, UserGame, UserId,
    };

    pub use crate::db::repositories::achievement::AchievementRepository;
    pub use crate::db::repositories::game::GameRepository;
    pub use crate::db::repositories::user_achievement::UserAchievementRepository;
    pub use crate::db::repositories::user_game::UserGameRepository;
    pub use crate::db::repositories::{Isolation, Tx, UnitOfWork};
    pub use crate::db::{Store, StoreError, StoreResult};
}

/// Durable storage, handing out one scoped unit of work per call to [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self, isolation: Isolation) -> StoreResult<Tx>;

    /// Applies the schema; safe to run on every start-up
    async fn migrate(&self) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint '{constraint}' violated")]
    UniqueViolation { constraint: String },

    #[error("could not serialize access due to a concurrent update")]
    SerializationFailure,

    #[error("sqlx error: {0}")]
    Sqlx(sqlx::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }

    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, StoreError::SerializationFailure)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return StoreError::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or_default().to_string(),
                    };
                }
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => return StoreError::SerializationFailure,
                _ => (),
            }
        }

        StoreError::Sqlx(err)
    }
}
