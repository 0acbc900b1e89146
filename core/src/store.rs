//! Asynchronous meal store.
//!
//! Wraps the synchronous [`Database`] behind `Arc<Mutex<_>>` and runs every
//! call on the Tokio blocking pool, so each operation is a single task that
//! resolves or fails once. The database is opened lazily on first use and the
//! handle is shared by every later call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::db::Database;
use crate::error::{JournalError, Result};
use crate::models::{Meal, StoredMeal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

pub struct MealStore {
    location: StoreLocation,
    handle: OnceCell<Arc<Mutex<Database>>>,
}

impl MealStore {
    /// Store backed by a database file. Nothing is opened until the first
    /// operation.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_location(StoreLocation::File(path.into()))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_location(StoreLocation::InMemory)
    }

    fn with_location(location: StoreLocation) -> Self {
        Self {
            location,
            handle: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            StoreLocation::File(path) => Some(path),
            StoreLocation::InMemory => None,
        }
    }

    /// Open the database now instead of on first use. Safe to call repeatedly.
    pub async fn init(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<&Arc<Mutex<Database>>> {
        self.handle
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let db = tokio::task::spawn_blocking(move || match location {
                    StoreLocation::File(path) => Database::open(&path),
                    StoreLocation::InMemory => Database::open_in_memory(),
                })
                .await??;
                debug!(location = ?self.location, "opened meal database");
                Ok::<_, JournalError>(Arc::new(Mutex::new(db)))
            })
            .await
    }

    async fn with_db<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self.handle().await?);
        tokio::task::spawn_blocking(move || {
            let db = db.lock().map_err(|e| {
                JournalError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&db)
        })
        .await?
    }

    /// Persist a new meal and return the id the store assigned.
    ///
    /// The meal must not carry an id yet; strip it with [`Meal::without_id`].
    pub async fn create(&self, meal: &Meal) -> Result<i64> {
        if let Some(id) = meal.id {
            return Err(JournalError::InvalidArgument(format!(
                "meal already has id {id}; the store assigns ids on create"
            )));
        }
        meal.validate()?;
        let stored = StoredMeal::from(meal);
        let id = self.with_db(move |db| db.insert_meal(&stored)).await?;
        debug!(id, "created meal");
        Ok(id)
    }

    /// Replace every field of an existing meal.
    pub async fn update(&self, meal: &Meal) -> Result<()> {
        let id = meal
            .id
            .ok_or_else(|| JournalError::InvalidArgument("update requires a meal id".into()))?;
        meal.validate()?;
        let stored = StoredMeal::from(meal);
        self.with_db(move |db| db.replace_meal(id, &stored)).await?;
        debug!(id, "updated meal");
        Ok(())
    }

    /// Remove a meal. Deleting an id that is not stored succeeds.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let removed = self.with_db(move |db| db.delete_meal(id)).await?;
        debug!(id, removed, "deleted meal");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Meal>> {
        self.with_db(move |db| db.get_meal(id))
            .await?
            .map(StoredMeal::into_meal)
            .transpose()
    }

    /// Every stored meal, in no particular order.
    pub async fn list_all(&self) -> Result<Vec<Meal>> {
        let rows = self.with_db(|db| db.get_all_meals()).await?;
        debug!(count = rows.len(), "listed meals");
        rows.into_iter().map(StoredMeal::into_meal).collect()
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
        self.with_db(move |db| db.execute_batch(sql)).await
    }
}
