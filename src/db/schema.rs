//! Database schema and types

use chrono::{DateTime, Utc};

/// Stable identity of a chat user (the transport's numeric user id)
pub type UserId = i64;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER UNIQUE NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    grade TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_students_user_id ON students(user_id);
";

/// Adds the timestamp columns to tables created before they existed.
/// Each statement fails harmlessly once the column is present.
pub const MIGRATION_ADD_TIMESTAMPS: [&str; 2] = [
    "ALTER TABLE students ADD COLUMN created_at TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE students ADD COLUMN updated_at TEXT NOT NULL DEFAULT ''",
];

/// The persisted profile of one student, one per user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub user_id: UserId,
    pub name: String,
    pub age: u8,
    pub grade: String,
}

impl StudentRecord {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        age: u8,
        grade: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            name: name.into(),
            age,
            grade: grade.into(),
        }
    }
}

/// A student record together with its bookkeeping timestamps
#[derive(Debug, Clone)]
pub struct StoredStudent {
    pub record: StudentRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
