use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use futures::Stream;
use log::{debug, error, warn};
use serde::Serialize;
use tokio::{
    runtime::Handle,
    sync::{Mutex, OwnedMutexGuard},
};

use crate::{
    StoreError, StoreResult,
    channel::StoreChannel,
    classify::{BackendError, classify_write_error, persistence_error},
    player::{Player, PlayerId, get_millis},
};

pub type ArcPlayerBackend = Arc<Box<dyn PlayerBackend + Send + Sync + 'static>>;

/// Row-level access to wherever player records live.
#[async_trait::async_trait]
pub trait PlayerBackend {
    async fn create_schema(&self) -> Result<(), BackendError>;
    async fn insert(&self, player: &Player) -> Result<(), BackendError>;
    async fn get(&self, id: &str) -> Result<Option<Player>, BackendError>;
    async fn update(&self, player: &Player) -> Result<u64, BackendError>;
    async fn set_update_at(&self, id: &str, update_at: i64) -> Result<u64, BackendError>;
    async fn set_password(&self, id: &str, password: &str) -> Result<u64, BackendError>;
    async fn select_all(&self) -> Result<Vec<Player>, BackendError>;
    /// Players ordered by id, strictly after `after` when given.
    async fn select_page(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Player>, BackendError>;
    async fn select_by_email(&self, email: &str) -> Result<Option<Player>, BackendError>;
    async fn select_by_username(&self, username: &str) -> Result<Option<Player>, BackendError>;
    async fn count(&self) -> Result<i64, BackendError>;
    async fn delete(&self, id: &str) -> Result<u64, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerUpdate {
    pub new: Player,
    pub old: Player,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<PlayerId>,
    pub limit: u32,
}

#[derive(Clone)]
pub struct PlayerStore {
    backend: ArcPlayerBackend,
    runtime: Option<Handle>,
    write_locks: Arc<DashMap<PlayerId, Arc<Mutex<()>>>>,
}

struct WriteGuard {
    id: PlayerId,
    locks: Arc<DashMap<PlayerId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still holds the lock once nobody waits on it.
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl PlayerStore {
    /// Operations run on the runtime this is called from, if any. A store
    /// built outside a runtime falls back to whichever runtime is current
    /// when an operation is issued.
    pub fn new(backend: ArcPlayerBackend) -> Self {
        Self {
            backend,
            runtime: Handle::try_current().ok(),
            write_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_runtime(backend: ArcPlayerBackend, runtime: Handle) -> Self {
        Self {
            backend,
            runtime: Some(runtime),
            write_locks: Arc::new(DashMap::new()),
        }
    }

    fn spawn<T, F>(&self, operation: &'static str, work: F) -> StoreChannel<T>
    where
        T: Send + 'static,
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        StoreChannel::spawn(self.runtime.as_ref(), operation, work)
    }

    async fn lock_player(
        locks: Arc<DashMap<PlayerId, Arc<Mutex<()>>>>,
        id: &str,
    ) -> WriteGuard {
        let lock = locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        WriteGuard {
            id: id.to_string(),
            locks,
            guard: Some(guard),
        }
    }

    pub fn create_indexes_if_not_exists(&self) -> StoreChannel<()> {
        const OP: &str = "PlayerStore::create_indexes_if_not_exists";
        let backend = self.backend.clone();
        self.spawn(OP, async move {
            debug!("Creating player schema and indexes");
            backend
                .create_schema()
                .await
                .map_err(|e| report(persistence_error(OP, "table=Players", e)))
        })
    }

    pub fn save(&self, mut player: Player) -> StoreChannel<Player> {
        const OP: &str = "PlayerStore::save";
        let backend = self.backend.clone();
        self.spawn(OP, async move {
            player.pre_save();
            player.is_valid().map_err(StoreError::Validation)?;

            debug!("Saving player {}", player.id);
            backend
                .insert(&player)
                .await
                .map_err(|e| report(classify_write_error(OP, &player.id, e)))?;
            Ok(player)
        })
    }

    /// Overwrites the stored record with `player`, keeping the stored
    /// `create_at` and `password`. The stored `delete_at` is kept as well
    /// unless `trusted` is set.
    pub fn update(&self, mut player: Player, trusted: bool) -> StoreChannel<PlayerUpdate> {
        const OP: &str = "PlayerStore::update";
        let backend = self.backend.clone();
        let locks = self.write_locks.clone();
        self.spawn(OP, async move {
            player.pre_update();
            player.is_valid().map_err(StoreError::Validation)?;

            debug!("Updating player {} (trusted: {})", player.id, trusted);
            let _guard = Self::lock_player(locks, &player.id).await;
            let old = backend
                .get(&player.id)
                .await
                .map_err(|e| report(persistence_error(OP, format!("player_id={}", player.id), e)))?;
            let Some(old) = old else {
                return StoreError::not_found(format!("player_id={}", player.id));
            };

            player.create_at = old.create_at;
            player.password = old.password.clone();
            if !trusted {
                player.delete_at = old.delete_at;
            }

            let rows = backend
                .update(&player)
                .await
                .map_err(|e| report(classify_write_error(OP, &player.id, e)))?;
            if rows != 1 {
                return Err(report(StoreError::Consistency {
                    player_id: player.id.clone(),
                    rows,
                }));
            }
            Ok(PlayerUpdate { new: player, old })
        })
    }

    /// Does not detect a missing id.
    pub fn update_update_at(&self, id: &str) -> StoreChannel<PlayerId> {
        const OP: &str = "PlayerStore::update_update_at";
        let backend = self.backend.clone();
        let locks = self.write_locks.clone();
        let id = id.to_string();
        self.spawn(OP, async move {
            debug!("Touching player {}", id);
            let _guard = Self::lock_player(locks, &id).await;
            backend
                .set_update_at(&id, get_millis())
                .await
                .map_err(|e| report(persistence_error(OP, format!("player_id={}", id), e)))?;
            Ok(id)
        })
    }

    /// Does not detect a missing id.
    pub fn update_password(&self, id: &str, new_password: &str) -> StoreChannel<PlayerId> {
        const OP: &str = "PlayerStore::update_password";
        let backend = self.backend.clone();
        let locks = self.write_locks.clone();
        let id = id.to_string();
        let new_password = new_password.to_string();
        self.spawn(OP, async move {
            debug!("Setting password of player {}", id);
            let _guard = Self::lock_player(locks, &id).await;
            backend
                .set_password(&id, &new_password)
                .await
                .map_err(|e| report(persistence_error(OP, format!("player_id={}", id), e)))?;
            Ok(id)
        })
    }

    pub fn get(&self, id: &str) -> StoreChannel<Player> {
        const OP: &str = "PlayerStore::get";
        let backend = self.backend.clone();
        let id = id.to_string();
        self.spawn(OP, async move {
            debug!("Fetching player {}", id);
            match backend.get(&id).await {
                Ok(Some(player)) => Ok(player),
                Ok(None) => StoreError::not_found(format!("player_id={}", id)),
                Err(e) => Err(report(persistence_error(OP, format!("player_id={}", id), e))),
            }
        })
    }

    /// Every stored record in one go. Prefer [`PlayerStore::pages`] for large tables.
    pub fn get_all(&self) -> StoreChannel<Vec<Player>> {
        const OP: &str = "PlayerStore::get_all";
        let backend = self.backend.clone();
        self.spawn(OP, async move {
            debug!("Fetching all players");
            backend
                .select_all()
                .await
                .map_err(|e| report(persistence_error(OP, "", e)))
        })
    }

    pub fn get_page(&self, request: PageRequest) -> StoreChannel<Vec<Player>> {
        const OP: &str = "PlayerStore::get_page";
        let backend = self.backend.clone();
        self.spawn(OP, async move {
            let correlation = format!("after={}", request.after.as_deref().unwrap_or(""));
            debug!("Fetching page of {} players {}", request.limit, correlation);
            backend
                .select_page(request.after.as_deref(), request.limit)
                .await
                .map_err(|e| report(persistence_error(OP, correlation, e)))
        })
    }

    pub fn pages(&self, page_size: u32) -> PlayerPages {
        PlayerPages {
            store: self.clone(),
            page_size: page_size.max(1),
            after: None,
            done: false,
        }
    }

    pub fn get_by_email(&self, email: &str) -> StoreChannel<Player> {
        const OP: &str = "PlayerStore::get_by_email";
        let backend = self.backend.clone();
        let email = email.trim().to_lowercase();
        self.spawn(OP, async move {
            debug!("Looking up player by email {}", email);
            match backend.select_by_email(&email).await {
                Ok(Some(player)) => Ok(player),
                Ok(None) => StoreError::not_found(format!("email={}", email)),
                Err(e) => Err(report(persistence_error(OP, format!("email={}", email), e))),
            }
        })
    }

    pub fn get_by_username(&self, username: &str) -> StoreChannel<Player> {
        const OP: &str = "PlayerStore::get_by_username";
        let backend = self.backend.clone();
        let username = username.trim().to_lowercase();
        self.spawn(OP, async move {
            debug!("Looking up player by username {}", username);
            match backend.select_by_username(&username).await {
                Ok(Some(player)) => Ok(player),
                Ok(None) => StoreError::not_found(format!("username={}", username)),
                Err(e) => Err(report(persistence_error(
                    OP,
                    format!("username={}", username),
                    e,
                ))),
            }
        })
    }

    /// Includes soft-deleted players.
    pub fn get_total_players_count(&self) -> StoreChannel<i64> {
        const OP: &str = "PlayerStore::get_total_players_count";
        let backend = self.backend.clone();
        self.spawn(OP, async move {
            debug!("Counting players");
            backend
                .count()
                .await
                .map_err(|e| report(persistence_error(OP, "", e)))
        })
    }

    pub fn permanent_delete(&self, id: &str) -> StoreChannel<()> {
        const OP: &str = "PlayerStore::permanent_delete";
        let backend = self.backend.clone();
        let locks = self.write_locks.clone();
        let id = id.to_string();
        self.spawn(OP, async move {
            let _guard = Self::lock_player(locks, &id).await;
            let rows = backend
                .delete(&id)
                .await
                .map_err(|e| report(persistence_error(OP, format!("player_id={}", id), e)))?;
            debug!("Permanently deleted player {} ({} rows)", id, rows);
            Ok(())
        })
    }
}

fn report(err: StoreError) -> StoreError {
    match &err {
        StoreError::EmailExists { player_id } | StoreError::UsernameExists { player_id } => {
            warn!("Rejected write for player {}: {}", player_id, err)
        }
        StoreError::Persistence { detail, .. } => error!("{}: {}", err, detail),
        StoreError::Consistency { .. } => error!("{}", err),
        _ => {}
    }
    err
}

/// Walks the whole table page by page, in id order. Restartable.
pub struct PlayerPages {
    store: PlayerStore,
    page_size: u32,
    after: Option<PlayerId>,
    done: bool,
}

impl PlayerPages {
    /// `None` once every page has been handed out.
    pub async fn next_page(&mut self) -> Option<StoreResult<Vec<Player>>> {
        if self.done {
            return None;
        }
        let request = PageRequest {
            after: self.after.clone(),
            limit: self.page_size,
        };
        match self.store.get_page(request).await {
            Ok(page) => {
                if (page.len() as u32) < self.page_size {
                    self.done = true;
                }
                match page.last() {
                    Some(last) => self.after = Some(last.id.clone()),
                    None => {
                        self.done = true;
                        return None;
                    }
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    pub fn restart(&mut self) {
        self.after = None;
        self.done = false;
    }

    pub fn into_stream(self) -> impl Stream<Item = StoreResult<Vec<Player>>> {
        futures::stream::unfold(self, |mut pages| async move {
            pages.next_page().await.map(|page| (page, pages))
        })
    }
}
