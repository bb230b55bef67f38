//! In-memory [`Store`] used by tests.
//!
//! A unit of work holds the store lock for its whole lifetime and edits a staged copy of the
//! state, so transactions are fully serialized. Uniqueness is enforced with the same constraint
//! names the Postgres schema uses, and faults can be injected at named points.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::models::achievement::{Achievement, AchievementId, NewAchievement};
use crate::db::models::game::{Game, GameId, NewGame};
use crate::db::models::tracking::{UserAchievement, UserGame, UserId};
use crate::db::repositories::achievement::AchievementRepository;
use crate::db::repositories::constraint;
use crate::db::repositories::game::GameRepository;
use crate::db::repositories::user_achievement::UserAchievementRepository;
use crate::db::repositories::user_game::UserGameRepository;
use crate::db::repositories::{Isolation, Tx, UnitOfWork};
use crate::db::{Store, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub games: Vec<Game>,
    pub platforms: Vec<(GameId, String)>,
    pub genres: Vec<(GameId, String)>,
    pub achievements: Vec<Achievement>,
    pub user_games: Vec<UserGame>,
    pub user_achievements: Vec<UserAchievement>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    Commit,
    InsertGame,
    AddPlatform,
    AddGenre,
    InsertUserGame,
    UpsertAchievement,
    InsertProgress,
    MarkCompleted,
    CompleteUserGame,
    DeleteProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Behaves like a lost serialization conflict
    Conflict,
    /// Behaves like a dropped connection
    Broken,
}

impl Fault {
    fn into_error(self) -> StoreError {
        match self {
            Fault::Conflict => StoreError::SerializationFailure,
            Fault::Broken => StoreError::Sqlx(sqlx::Error::Protocol("injected fault".into())),
        }
    }
}

#[derive(Debug)]
struct Armed {
    point: FailPoint,
    skip: usize,
    fault: Fault,
}

type Faults = Arc<StdMutex<Vec<Armed>>>;

fn trip(faults: &Faults, point: FailPoint) -> StoreResult<()> {
    let mut faults = faults.lock().unwrap();
    let Some(idx) = faults.iter().position(|armed| armed.point == point) else {
        return Ok(());
    };

    if faults[idx].skip > 0 {
        faults[idx].skip -= 1;
        return Ok(());
    }
    Err(faults.remove(idx).fault.into_error())
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Faults,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next time `point` is reached it fails with `fault`. Queued faults fire in order.
    pub fn fail_next(&self, point: FailPoint, fault: Fault) {
        self.fail_nth(point, 0, fault);
    }

    /// Lets `point` pass `skip` times, then fails it once
    pub fn fail_nth(&self, point: FailPoint, skip: usize, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .push(Armed { point, skip, fault });
    }

    /// Committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self, _isolation: Isolation) -> StoreResult<Tx> {
        trip(&self.faults, FailPoint::Begin)?;
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(Tx::new(Box::new(MemoryTx {
            guard,
            staged,
            faults: self.faults.clone(),
        })))
    }

    async fn migrate(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    faults: Faults,
}

impl MemoryTx {
    fn trip(&self, point: FailPoint) -> StoreResult<()> {
        trip(&self.faults, point)
    }
}

fn unique(name: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: name.to_string(),
    }
}

#[async_trait]
impl UnitOfWork for MemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.trip(FailPoint::Commit)?;
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl GameRepository for MemoryTx {
    async fn insert_game(
        &mut self,
        game: &NewGame,
        created_at: NaiveDateTime,
    ) -> StoreResult<Game> {
        self.trip(FailPoint::InsertGame)?;
        if self
            .staged
            .games
            .iter()
            .any(|g| g.external_id == game.external_id)
        {
            return Err(unique(constraint::GAMES_EXTERNAL_ID));
        }

        let id = GameId(self.staged.next_id());
        let row = game.clone().into_game(id, created_at);
        self.staged.games.push(row.clone());
        Ok(row)
    }

    async fn game_by_id(&mut self, id: GameId) -> StoreResult<Option<Game>> {
        Ok(self.staged.games.iter().find(|g| g.id == id).cloned())
    }

    async fn game_by_external_id(&mut self, external_id: i64) -> StoreResult<Option<Game>> {
        Ok(self
            .staged
            .games
            .iter()
            .find(|g| g.external_id == external_id)
            .cloned())
    }

    async fn all_games(&mut self) -> StoreResult<Vec<Game>> {
        let mut games = self.staged.games.clone();
        games.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(games)
    }

    async fn add_platform(&mut self, game_id: GameId, name: &str) -> StoreResult<()> {
        self.trip(FailPoint::AddPlatform)?;
        let entry = (game_id, name.to_string());
        if !self.staged.platforms.contains(&entry) {
            self.staged.platforms.push(entry);
        }
        Ok(())
    }

    async fn add_genre(&mut self, game_id: GameId, name: &str) -> StoreResult<()> {
        self.trip(FailPoint::AddGenre)?;
        let entry = (game_id, name.to_string());
        if !self.staged.genres.contains(&entry) {
            self.staged.genres.push(entry);
        }
        Ok(())
    }

    async fn platforms_for(&mut self, game_id: GameId) -> StoreResult<Vec<String>> {
        Ok(tags_for(&self.staged.platforms, game_id))
    }

    async fn genres_for(&mut self, game_id: GameId) -> StoreResult<Vec<String>> {
        Ok(tags_for(&self.staged.genres, game_id))
    }
}

fn tags_for(tags: &[(GameId, String)], game_id: GameId) -> Vec<String> {
    let mut names: Vec<String> = tags
        .iter()
        .filter(|(id, _)| *id == game_id)
        .map(|(_, name)| name.clone())
        .collect();
    names.sort();
    names
}

#[async_trait]
impl AchievementRepository for MemoryTx {
    async fn upsert_achievement(
        &mut self,
        achievement: &NewAchievement,
    ) -> StoreResult<(Achievement, bool)> {
        self.trip(FailPoint::UpsertAchievement)?;
        if let Some(existing) = self.staged.achievements.iter().find(|a| {
            a.game_id == achievement.game_id && a.external_id == achievement.external_id
        }) {
            return Ok((existing.clone(), false));
        }

        let id = AchievementId(self.staged.next_id());
        let row = achievement.clone().into_achievement(id);
        self.staged.achievements.push(row.clone());
        Ok((row, true))
    }

    async fn achievements_for_game(&mut self, game_id: GameId) -> StoreResult<Vec<Achievement>> {
        Ok(self
            .staged
            .achievements
            .iter()
            .filter(|a| a.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn count_achievements(&mut self, game_id: GameId) -> StoreResult<i64> {
        Ok(self
            .staged
            .achievements
            .iter()
            .filter(|a| a.game_id == game_id)
            .count() as i64)
    }
}

#[async_trait]
impl UserGameRepository for MemoryTx {
    async fn insert_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<UserGame> {
        self.trip(FailPoint::InsertUserGame)?;
        if self
            .staged
            .user_games
            .iter()
            .any(|ug| ug.user_id == user_id && ug.game_id == game_id)
        {
            return Err(unique(constraint::USER_GAMES_USER_GAME));
        }

        let row = UserGame {
            id: self.staged.next_id(),
            user_id,
            game_id,
            tracked_at: now,
            completed_at: None,
            updated_at: now,
        };
        self.staged.user_games.push(row.clone());
        Ok(row)
    }

    async fn user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
    ) -> StoreResult<Option<UserGame>> {
        Ok(self
            .staged
            .user_games
            .iter()
            .find(|ug| ug.user_id == user_id && ug.game_id == game_id)
            .cloned())
    }

    async fn user_games(&mut self, user_id: UserId) -> StoreResult<Vec<UserGame>> {
        let mut rows: Vec<UserGame> = self
            .staged
            .user_games
            .iter()
            .filter(|ug| ug.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.tracked_at.cmp(&a.tracked_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn trackers_of(&mut self, game_id: GameId) -> StoreResult<Vec<UserId>> {
        let mut users: Vec<UserId> = self
            .staged
            .user_games
            .iter()
            .filter(|ug| ug.game_id == game_id)
            .map(|ug| ug.user_id)
            .collect();
        users.sort();
        Ok(users)
    }

    async fn touch_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<bool> {
        match self
            .staged
            .user_games
            .iter_mut()
            .find(|ug| ug.user_id == user_id && ug.game_id == game_id)
        {
            Some(row) => {
                row.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn complete_user_game(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        now: NaiveDateTime,
    ) -> StoreResult<bool> {
        self.trip(FailPoint::CompleteUserGame)?;
        match self.staged.user_games.iter_mut().find(|ug| {
            ug.user_id == user_id && ug.game_id == game_id && ug.completed_at.is_none()
        }) {
            Some(row) => {
                row.completed_at = Some(now);
                row.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user_game(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<bool> {
        let before = self.staged.user_games.len();
        self.staged
            .user_games
            .retain(|ug| !(ug.user_id == user_id && ug.game_id == game_id));
        Ok(self.staged.user_games.len() < before)
    }
}

#[async_trait]
impl UserAchievementRepository for MemoryTx {
    async fn insert_progress(
        &mut self,
        user_id: UserId,
        game_id: GameId,
        achievement_id: AchievementId,
        now: NaiveDateTime,
    ) -> StoreResult<bool> {
        self.trip(FailPoint::InsertProgress)?;
        if self
            .staged
            .user_achievements
            .iter()
            .any(|ua| ua.user_id == user_id && ua.achievement_id == achievement_id)
        {
            return Ok(false);
        }

        let row = UserAchievement {
            id: self.staged.next_id(),
            completed: false,
            user_id,
            game_id,
            achievement_id,
            completed_at: None,
            created_at: now,
        };
        self.staged.user_achievements.push(row);
        Ok(true)
    }

    async fn mark_completed(
        &mut self,
        user_id: UserId,
        achievement_id: AchievementId,
        now: NaiveDateTime,
    ) -> StoreResult<Option<UserAchievement>> {
        self.trip(FailPoint::MarkCompleted)?;
        Ok(self
            .staged
            .user_achievements
            .iter_mut()
            .find(|ua| ua.user_id == user_id && ua.achievement_id == achievement_id)
            .map(|row| {
                row.completed = true;
                row.completed_at.get_or_insert(now);
                row.clone()
            }))
    }

    async fn count_completed(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<i64> {
        Ok(self
            .staged
            .user_achievements
            .iter()
            .filter(|ua| ua.user_id == user_id && ua.game_id == game_id && ua.completed)
            .count() as i64)
    }

    async fn progress_for(
        &mut self,
        user_id: UserId,
        game_id: GameId,
    ) -> StoreResult<Vec<UserAchievement>> {
        let mut rows: Vec<UserAchievement> = self
            .staged
            .user_achievements
            .iter()
            .filter(|ua| ua.user_id == user_id && ua.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|ua| ua.achievement_id);
        Ok(rows)
    }

    async fn delete_progress(&mut self, user_id: UserId, game_id: GameId) -> StoreResult<u64> {
        self.trip(FailPoint::DeleteProgress)?;
        let before = self.staged.user_achievements.len();
        self.staged
            .user_achievements
            .retain(|ua| !(ua.user_id == user_id && ua.game_id == game_id));
        Ok((before - self.staged.user_achievements.len()) as u64)
    }
}
