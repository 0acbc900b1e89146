use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{JournalError, Result};
use crate::models::StoredMeal;

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            JournalError::Storage(format!("Failed to open database {}: {e}", path.display()))
        })?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            return Err(JournalError::Storage(format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }

        if version < 1 {
            // AUTOINCREMENT keeps ids from being reused after a delete.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    description TEXT NOT NULL,
                    place TEXT NOT NULL,
                    emotion TEXT NOT NULL,
                    timestamp INTEGER NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredMeal> {
        Ok(StoredMeal {
            id: Some(row.get(0)?),
            description: row.get(1)?,
            place: row.get(2)?,
            emotion: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    /// Insert a new row and return the id SQLite assigned to it.
    pub fn insert_meal(&self, meal: &StoredMeal) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO meals (description, place, emotion, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![meal.description, meal.place, meal.emotion, meal.timestamp],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replace every field of an existing row. Missing ids are an error and
    /// nothing is inserted.
    pub fn replace_meal(&self, id: i64, meal: &StoredMeal) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE meals SET description = ?1, place = ?2, emotion = ?3, timestamp = ?4
             WHERE id = ?5",
            params![meal.description, meal.place, meal.emotion, meal.timestamp, id],
        )?;
        if changed == 0 {
            return Err(JournalError::Storage(format!("Meal {id} does not exist")));
        }
        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn get_meal(&self, id: i64) -> Result<Option<StoredMeal>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, description, place, emotion, timestamp FROM meals WHERE id = ?1",
                params![id],
                Self::meal_from_row,
            )
            .optional()?)
    }

    pub fn get_all_meals(&self) -> Result<Vec<StoredMeal>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, description, place, emotion, timestamp FROM meals ORDER BY id")?;
        let rows = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_meals(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM meals", [], |row| row.get(0))?)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn.execute_batch(sql)?)
    }
}
