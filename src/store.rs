//! Task and account storage on a single redb file.
//!
//! Records are postcard-encoded. Every list or count goes through an index
//! table keyed by owner, so no operation scans other users' rows.
//! Each public method is one transaction.
//!
//! No authorization here: callers decide who may touch what.

use crate::models::{now_millis, StatusCounts, Task, TaskPatch, TaskStatus, User};
use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const TASKS: TableDefinition<u128, &[u8]> = TableDefinition::new("tasks");
/// (user, created_at, seq) → task id
const TASKS_BY_USER_CREATED: TableDefinition<(u128, i64, u64), u128> =
    TableDefinition::new("tasks_by_user_created");
/// (user, status, created_at, seq) → task id
const TASKS_BY_USER_STATUS: TableDefinition<(u128, u8, i64, u64), u128> =
    TableDefinition::new("tasks_by_user_status");
const USERS: TableDefinition<u128, &[u8]> = TableDefinition::new("users");
const USERS_BY_EMAIL: TableDefinition<&str, u128> = TableDefinition::new("users_by_email");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SEQ: &str = "next_seq";

/// What actually sits in the tasks table. `seq` breaks ties between tasks
/// created in the same millisecond so creation order stays strict.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRecord {
    seq: u64,
    task: Task,
}

impl TaskRecord {
    fn created_key(&self) -> (u128, i64, u64) {
        (self.task.user_id.as_u128(), self.task.created_at, self.seq)
    }

    fn status_key(&self) -> (u128, u8, i64, u64) {
        (
            self.task.user_id.as_u128(),
            self.task.status as u8,
            self.task.created_at,
            self.seq,
        )
    }
}

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the store at the given path.
    /// Creates tables if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(TASKS)?;
            let _ = txn.open_table(TASKS_BY_USER_CREATED)?;
            let _ = txn.open_table(TASKS_BY_USER_STATUS)?;
            let _ = txn.open_table(USERS)?;
            let _ = txn.open_table(USERS_BY_EMAIL)?;
            let _ = txn.open_table(META)?;
        }
        txn.commit()?;

        Ok(Store { db: Arc::new(db) })
    }

    // ── Tasks: writes ──────────────────────────────────────────

    /// Insert a new active task for `user_id`.
    pub fn create_task(
        &self,
        user_id: Uuid,
        title: String,
        description: Option<String>,
    ) -> Result<Task, StoreError> {
        let now = now_millis();
        let txn = self.db.begin_write()?;
        let record;
        {
            let mut meta = txn.open_table(META)?;
            let seq = meta.get(NEXT_SEQ)?.map(|v| v.value()).unwrap_or(0);
            meta.insert(NEXT_SEQ, seq + 1)?;

            record = TaskRecord {
                seq,
                task: Task {
                    id: Uuid::new_v4(),
                    user_id,
                    title,
                    description,
                    status: TaskStatus::Active,
                    created_at: now,
                    updated_at: now,
                },
            };

            let mut tasks = txn.open_table(TASKS)?;
            let mut by_created = txn.open_table(TASKS_BY_USER_CREATED)?;
            let mut by_status = txn.open_table(TASKS_BY_USER_STATUS)?;
            put_record(&mut tasks, &record)?;
            by_created.insert(record.created_key(), record.task.id.as_u128())?;
            by_status.insert(record.status_key(), record.task.id.as_u128())?;
        }
        txn.commit()?;

        tracing::debug!(task_id = %record.task.id, user_id = %user_id, seq = record.seq, "task inserted");
        Ok(record.task)
    }

    /// Patch the supplied fields and bump `updated_at`.
    pub fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        self.rewrite_task(id, |task| {
            if let Some(title) = patch.title {
                task.title = title;
            }
            if let Some(description) = patch.description {
                task.description = description;
            }
            if let Some(status) = patch.status {
                task.status = status;
            }
        })
    }

    /// Flip active ↔ completed.
    pub fn toggle_task_status(&self, id: Uuid) -> Result<Task, StoreError> {
        self.rewrite_task(id, |task| task.status = task.status.toggled())
    }

    /// Remove the task and its index rows. Returns false if it wasn't there.
    pub fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let deleted;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let record = match tasks.remove(id.as_u128())? {
                Some(bytes) => Some(decode::<TaskRecord>(bytes.value())?),
                None => None,
            };
            deleted = record.is_some();

            if let Some(record) = record {
                let mut by_created = txn.open_table(TASKS_BY_USER_CREATED)?;
                let mut by_status = txn.open_table(TASKS_BY_USER_STATUS)?;
                by_created.remove(record.created_key())?;
                by_status.remove(record.status_key())?;
            }
        }
        txn.commit()?;
        Ok(deleted)
    }

    /// Load, mutate, re-index and store one task in a single transaction.
    fn rewrite_task(&self, id: Uuid, mutate: impl FnOnce(&mut Task)) -> Result<Task, StoreError> {
        let txn = self.db.begin_write()?;
        let record;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut current = match tasks.get(id.as_u128())? {
                Some(bytes) => decode::<TaskRecord>(bytes.value())?,
                None => return Err(StoreError::TaskNotFound),
            };

            let old_status_key = current.status_key();
            mutate(&mut current.task);
            current.task.updated_at = now_millis().max(current.task.updated_at);

            let new_status_key = current.status_key();
            if new_status_key != old_status_key {
                let mut by_status = txn.open_table(TASKS_BY_USER_STATUS)?;
                by_status.remove(old_status_key)?;
                by_status.insert(new_status_key, id.as_u128())?;
            }

            put_record(&mut tasks, &current)?;
            record = current;
        }
        txn.commit()?;
        Ok(record.task)
    }

    // ── Tasks: reads ───────────────────────────────────────────

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;
        match tasks.get(id.as_u128())? {
            Some(bytes) => Ok(Some(decode::<TaskRecord>(bytes.value())?.task)),
            None => Ok(None),
        }
    }

    /// All of a user's tasks, newest first.
    pub fn list_tasks_by_user(&self, user_id: Uuid) -> Result<Vec<Task>, StoreError> {
        self.list_by_created(user_id, None)
    }

    /// Newest first, at most `limit` tasks.
    pub fn list_recent_tasks_by_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.list_by_created(user_id, Some(limit))
    }

    /// A user's tasks in one status, newest first.
    pub fn list_tasks_by_user_and_status(
        &self,
        user_id: Uuid,
        status: TaskStatus,
    ) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(TASKS_BY_USER_STATUS)?;
        let tasks = txn.open_table(TASKS)?;

        let (lo, hi) = status_range(user_id, status);
        let mut out = Vec::new();
        for entry in index.range(lo..=hi)?.rev() {
            let (_, task_id) = entry?;
            out.push(load_task(&tasks, task_id.value())?);
        }
        Ok(out)
    }

    pub fn count_tasks_by_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(TASKS_BY_USER_CREATED)?;
        let (lo, hi) = created_range(user_id);
        let mut n = 0;
        for entry in index.range(lo..=hi)? {
            entry?;
            n += 1;
        }
        Ok(n)
    }

    pub fn count_tasks_by_user_and_status(&self, user_id: Uuid, status: TaskStatus) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(TASKS_BY_USER_STATUS)?;
        let (lo, hi) = status_range(user_id, status);
        let mut n = 0;
        for entry in index.range(lo..=hi)? {
            entry?;
            n += 1;
        }
        Ok(n)
    }

    /// Active and completed counts read from one snapshot, so they always
    /// add up to the user's total.
    pub fn count_tasks_by_status(&self, user_id: Uuid) -> Result<StatusCounts, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(TASKS_BY_USER_STATUS)?;
        let count = |status| -> Result<u64, StoreError> {
            let (lo, hi) = status_range(user_id, status);
            let mut n = 0;
            for entry in index.range(lo..=hi)? {
                entry?;
                n += 1;
            }
            Ok(n)
        };
        Ok(StatusCounts {
            active: count(TaskStatus::Active)?,
            completed: count(TaskStatus::Completed)?,
        })
    }

    fn list_by_created(&self, user_id: Uuid, limit: Option<usize>) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(TASKS_BY_USER_CREATED)?;
        let tasks = txn.open_table(TASKS)?;

        let (lo, hi) = created_range(user_id);
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for entry in index.range(lo..=hi)?.rev().take(limit) {
            let (_, task_id) = entry?;
            out.push(load_task(&tasks, task_id.value())?);
        }
        Ok(out)
    }

    // ── Users ──────────────────────────────────────────────────

    /// Insert a new account. The email must not be registered yet.
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut by_email = txn.open_table(USERS_BY_EMAIL)?;
            if by_email.get(user.email.as_str())?.is_some() {
                return Err(StoreError::EmailTaken);
            }
            let mut users = txn.open_table(USERS)?;
            let bytes = encode(user)?;
            users.insert(user.id.as_u128(), bytes.as_slice())?;
            by_email.insert(user.email.as_str(), user.id.as_u128())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?;
        match users.get(id.as_u128())? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let by_email = txn.open_table(USERS_BY_EMAIL)?;
        let id = match by_email.get(email)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };
        let users = txn.open_table(USERS)?;
        match users.get(id)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────

fn created_range(user_id: Uuid) -> ((u128, i64, u64), (u128, i64, u64)) {
    let u = user_id.as_u128();
    ((u, i64::MIN, 0), (u, i64::MAX, u64::MAX))
}

fn status_range(user_id: Uuid, status: TaskStatus) -> ((u128, u8, i64, u64), (u128, u8, i64, u64)) {
    let u = user_id.as_u128();
    let s = status as u8;
    ((u, s, i64::MIN, 0), (u, s, i64::MAX, u64::MAX))
}

fn put_record(tasks: &mut Table<'_, u128, &'static [u8]>, record: &TaskRecord) -> Result<(), StoreError> {
    let bytes = encode(record)?;
    tasks.insert(record.task.id.as_u128(), bytes.as_slice())?;
    Ok(())
}

/// Resolve an index hit. A dangling index row means the file is inconsistent.
fn load_task(tasks: &impl ReadableTable<u128, &'static [u8]>, id: u128) -> Result<Task, StoreError> {
    match tasks.get(id)? {
        Some(bytes) => Ok(decode::<TaskRecord>(bytes.value())?.task),
        None => Err(StoreError::Decode(format!("index points at missing task {}", Uuid::from_u128(id)))),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(value).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb: {0}")]
    Redb(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("task not found")]
    TaskNotFound,
    #[error("email already registered")]
    EmailTaken,
}

// redb 2.x has many error types. Blanket them all into StoreError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for StoreError {
            fn from(e: $t) -> Self { StoreError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

// ── Tests ──────────────────────────────────────────────────────
