//! Task repository: the durable queue table.
//!
//! Timestamps are RFC 3339 strings with a fixed microsecond width, so
//! lexicographic comparison in SQL matches chronological order.

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: String,
    pub queue: String,
    pub job_id: String,
    pub enqueued_at: String,
    pub next_run_at: String,
    pub locked_at: Option<String>,
    pub locked_by: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            queue: row.get("queue")?,
            job_id: row.get("job_id")?,
            enqueued_at: row.get("enqueued_at")?,
            next_run_at: row.get("next_run_at")?,
            locked_at: row.get("locked_at")?,
            locked_by: row.get("locked_by")?,
        })
    }
}

/// A task handed to a worker by [`claim_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask {
    pub task: TaskRow,
    /// The task carried an expired lock from an earlier claim.
    pub reclaimed: bool,
}

pub fn insert(db: &Database, task: &TaskRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tasks (id, queue, job_id, enqueued_at, next_run_at, locked_at, locked_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.queue,
                task.job_id,
                task.enqueued_at,
                task.next_run_at,
                task.locked_at,
                task.locked_by,
            ],
        )?;
        Ok(())
    })
}

/// Atomically locks the oldest due task of `queue`.
///
/// Returns `None` when nothing is due, or when another task of the same
/// queue holds a lock newer than `stale_before`. The check and the lock
/// happen in one `BEGIN IMMEDIATE` transaction, so at most one task per
/// queue is ever running across every connection to the database.
pub fn claim_next(
    db: &Database,
    queue: &str,
    owner: &str,
    now: &str,
    stale_before: &str,
) -> Result<Option<ClaimedTask>, DatabaseError> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let live_locks: u64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE queue = ?1 AND locked_at IS NOT NULL AND locked_at > ?2",
            params![queue, stale_before],
            |r| r.get(0),
        )?;
        if live_locks > 0 {
            tx.commit()?;
            return Ok(None);
        }

        let candidate = tx
            .query_row(
                "SELECT * FROM tasks
                 WHERE queue = ?1 AND next_run_at <= ?2
                 ORDER BY enqueued_at ASC, rowid ASC
                 LIMIT 1",
                params![queue, now],
                TaskRow::from_row,
            )
            .optional()?;

        let Some(mut task) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE tasks SET locked_at = ?2, locked_by = ?3 WHERE id = ?1",
            params![task.id, now, owner],
        )?;
        tx.commit()?;

        let reclaimed = task.locked_at.is_some();
        task.locked_at = Some(now.to_string());
        task.locked_by = Some(owner.to_string());
        Ok(Some(ClaimedTask { task, reclaimed }))
    })
}

/// Refreshes the lock on a running task. Returns `false` when `owner` no
/// longer holds it.
pub fn touch_lock(
    db: &Database,
    id: &str,
    owner: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE tasks SET locked_at = ?3 WHERE id = ?1 AND locked_by = ?2",
            params![id, owner, now],
        )?;
        Ok(affected > 0)
    })
}

/// Removes a task acknowledged by `owner`. A task whose lock was taken
/// over by another worker is left alone and `false` is returned.
pub fn delete(db: &Database, id: &str, owner: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND locked_by = ?2",
            params![id, owner],
        )?;
        Ok(affected > 0)
    })
}

/// Drops the lock held by `owner`, making its tasks claimable again.
pub fn release_owned(db: &Database, queue: &str, owner: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE tasks SET locked_at = NULL, locked_by = NULL
             WHERE queue = ?1 AND locked_by = ?2",
            params![queue, owner],
        )?;
        Ok(affected)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM tasks WHERE id = ?1",
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn count(db: &Database, queue: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE queue = ?1",
            params![queue],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
