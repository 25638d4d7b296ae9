use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    classify::BackendError,
    player::Player,
    store::PlayerBackend,
};

/// In-memory backend that reports constraint violations the way SQLite does.
#[derive(Clone, Default)]
pub struct MockPlayerBackend {
    rows: Arc<Mutex<BTreeMap<String, Player>>>,
    failure: Arc<Mutex<Option<String>>>,
    forced_update_rows: Arc<Mutex<Option<u64>>>,
    get_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    writes_in_flight: Arc<AtomicUsize>,
    max_writes_in_flight: Arc<AtomicUsize>,
}

#[allow(unused)]
impl MockPlayerBackend {
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn force_update_rows(&self, rows: Option<u64>) {
        *self.forced_update_rows.lock().unwrap() = rows;
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_writes_in_flight.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), BackendError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(BackendError::Other(message.clone())),
            None => Ok(()),
        }
    }

    fn check_unique(
        rows: &BTreeMap<String, Player>,
        player: &Player,
    ) -> Result<(), BackendError> {
        for other in rows.values().filter(|other| other.id != player.id) {
            let column = if other.email == player.email {
                "Email"
            } else if other.playername == player.playername {
                "Playername"
            } else {
                continue;
            };
            return Err(BackendError::UniqueViolation {
                constraint: None,
                message: format!("UNIQUE constraint failed: Players.{}", column),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PlayerBackend for MockPlayerBackend {
    async fn create_schema(&self) -> Result<(), BackendError> {
        self.check_failure()
    }

    async fn insert(&self, player: &Player) -> Result<(), BackendError> {
        self.check_failure()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&player.id) {
            return Err(BackendError::UniqueViolation {
                constraint: None,
                message: "UNIQUE constraint failed: Players.Id".to_string(),
            });
        }
        Self::check_unique(&rows, player)?;
        rows.insert(player.id.clone(), player.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Player>, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn update(&self, player: &Player) -> Result<u64, BackendError> {
        self.check_failure()?;
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        let in_flight = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writes_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(rows) = *self.forced_update_rows.lock().unwrap() {
            return Ok(rows);
        }
        let mut rows = self.rows.lock().unwrap();
        Self::check_unique(&rows, player)?;
        match rows.get_mut(&player.id) {
            Some(row) => {
                *row = player.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_update_at(&self, id: &str, update_at: i64) -> Result<u64, BackendError> {
        self.check_failure()?;
        match self.rows.lock().unwrap().get_mut(id) {
            Some(row) => {
                row.update_at = update_at;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_password(&self, id: &str, password: &str) -> Result<u64, BackendError> {
        self.check_failure()?;
        match self.rows.lock().unwrap().get_mut(id) {
            Some(row) => {
                row.password = password.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn select_all(&self) -> Result<Vec<Player>, BackendError> {
        self.check_failure()?;
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn select_page(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Player>, BackendError> {
        self.check_failure()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|p| after.is_none_or(|after| p.id.as_str() > after))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn select_by_email(&self, email: &str) -> Result<Option<Player>, BackendError> {
        self.check_failure()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn select_by_username(&self, username: &str) -> Result<Option<Player>, BackendError> {
        self.check_failure()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|p| p.playername == username)
            .cloned())
    }

    async fn count(&self) -> Result<i64, BackendError> {
        self.check_failure()?;
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn delete(&self, id: &str) -> Result<u64, BackendError> {
        self.check_failure()?;
        Ok(self.rows.lock().unwrap().remove(id).map_or(0, |_| 1))
    }
}
