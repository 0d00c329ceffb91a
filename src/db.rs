//! Database module
//!
//! Provides persistence for student records.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
///
/// Every operation holds the connection lock for a single statement and
/// releases it on return, whether the statement succeeded or not.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;

        // Older databases lack the timestamp columns - ignore "duplicate column"
        for statement in MIGRATION_ADD_TIMESTAMPS {
            let _ = conn.execute(statement, []);
        }

        Ok(())
    }

    // ==================== Student Operations ====================

    /// Insert or overwrite the record for `record.user_id`.
    ///
    /// A single statement: either the whole new row is visible afterwards or
    /// the previous row is left untouched. `created_at` survives overwrites.
    pub fn upsert_student(&self, record: &StudentRecord) -> DbResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO students (user_id, name, age, grade, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                name = excluded.name,
                age = excluded.age,
                grade = excluded.grade,
                updated_at = excluded.updated_at",
            params![record.user_id, record.name, record.age, record.grade, now],
        )?;
        Ok(())
    }

    /// Get the record for a user, if one has been saved
    pub fn get_student(&self, user_id: UserId) -> DbResult<Option<StoredStudent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, name, age, grade, created_at, updated_at
             FROM students WHERE user_id = ?1",
        )?;

        let stored = stmt
            .query_row(params![user_id], |row| {
                Ok(StoredStudent {
                    record: StudentRecord {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                        age: row.get(2)?,
                        grade: row.get(3)?,
                    },
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                    updated_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            })
            .optional()?;
        Ok(stored)
    }

    /// Delete the record for a user. Returns whether a row existed.
    pub fn delete_student(&self, user_id: UserId) -> DbResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM students WHERE user_id = ?1", params![user_id])?;
        Ok(removed > 0)
    }

    /// Number of stored records
    #[cfg(test)]
    pub fn count_students(&self) -> DbResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
