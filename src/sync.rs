//! Durable-write strategies.
//!
//! The cache mutates memory first and then hands a [`PendingOperation`] to a
//! [`SyncPolicy`]. [`InstantSync`] writes through immediately; [`QueuedSync`]
//! appends to a FIFO queue drained by [`SyncPolicy::flush`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::store::Store;
use crate::types::{Ban, Identity, Level, UserChanges, UserFields, UserLogEntry, clean_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Instant,
    Batched,
}

/// Outcome of a cache mutation with respect to durable storage.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing changed, so nothing was written.
    Unchanged,
    /// Written to the store as part of the call.
    Synced,
    /// Queued for the next flush.
    Queued,
    /// Memory was updated but the durable write failed.
    Failed(String),
}

impl SyncStatus {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed(_))
    }
}

/// A mutation awaiting (or undergoing) a durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    InsertUser(Box<Identity>),
    UpdateUser {
        id: i64,
        fields: UserFields,
        changes: Box<UserChanges>,
        modified_at: Option<DateTime<Utc>>,
    },
    DeleteUser(i64),
    AddHardwareId { user_id: i64, hardware_id: String },
    AddIpAddress { user_id: i64, ip_address: String },
    AddAlias { user_id: i64, alias: String },
    ReassignLevel { from: i32, to: i32 },
    LogChange(UserLogEntry),
    UpsertLevel(Level),
    DeleteLevel(i32),
    InsertBan(Box<Ban>),
    RemoveBan(i64),
}

impl PendingOperation {
    pub fn apply(&self, store: &dyn Store) -> Result<()> {
        match self {
            PendingOperation::InsertUser(user) => store.insert_user(user),
            PendingOperation::UpdateUser {
                id,
                fields,
                changes,
                modified_at,
            } => store.update_user(*id, *fields, changes, *modified_at),
            PendingOperation::DeleteUser(id) => store.delete_user(*id).map(|_| ()),
            PendingOperation::AddHardwareId {
                user_id,
                hardware_id,
            } => store.add_hardware_id(*user_id, hardware_id),
            PendingOperation::AddIpAddress {
                user_id,
                ip_address,
            } => store.add_ip_address(*user_id, ip_address),
            PendingOperation::AddAlias { user_id, alias } => {
                store.add_alias(*user_id, alias, &clean_name(alias))
            }
            PendingOperation::ReassignLevel { from, to } => {
                store.set_level_if_has_level(*from, *to).map(|_| ())
            }
            PendingOperation::LogChange(entry) => store.insert_user_log(entry),
            PendingOperation::UpsertLevel(level) => store.upsert_level(level),
            PendingOperation::DeleteLevel(level) => store.delete_level(*level).map(|_| ()),
            PendingOperation::InsertBan(ban) => store.insert_ban(ban),
            PendingOperation::RemoveBan(id) => store.delete_ban(*id).map(|_| ()),
        }
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOperation::InsertUser(user) => write!(f, "insert user {}", user.id),
            PendingOperation::UpdateUser { id, .. } => write!(f, "update user {id}"),
            PendingOperation::DeleteUser(id) => write!(f, "delete user {id}"),
            PendingOperation::AddHardwareId { user_id, .. } => {
                write!(f, "add hardware id to user {user_id}")
            }
            PendingOperation::AddIpAddress { user_id, .. } => {
                write!(f, "add ip address to user {user_id}")
            }
            PendingOperation::AddAlias { user_id, .. } => write!(f, "add alias to user {user_id}"),
            PendingOperation::ReassignLevel { from, to } => {
                write!(f, "move users from level {from} to {to}")
            }
            PendingOperation::LogChange(entry) => write!(f, "log change for user {}", entry.user_id),
            PendingOperation::UpsertLevel(level) => write!(f, "save level {}", level.level),
            PendingOperation::DeleteLevel(level) => write!(f, "delete level {level}"),
            PendingOperation::InsertBan(ban) => write!(f, "insert ban {}", ban.id),
            PendingOperation::RemoveBan(id) => write!(f, "remove ban {id}"),
        }
    }
}

/// Summary of one queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub failed: usize,
}

/// Strategy deciding when a pending operation reaches the store.
pub trait SyncPolicy: Send {
    fn mode(&self) -> SyncMode;

    /// Hands an operation to the policy. The in-memory change has already
    /// been made by the caller.
    fn submit(&mut self, op: PendingOperation) -> SyncStatus;

    /// Drains queued operations in FIFO order. Failed operations are logged
    /// and dropped.
    fn flush(&mut self) -> FlushReport;

    fn pending(&self) -> usize;

    fn store(&self) -> &Arc<dyn Store>;
}

pub struct InstantSync {
    store: Arc<dyn Store>,
}

impl InstantSync {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl SyncPolicy for InstantSync {
    fn mode(&self) -> SyncMode {
        SyncMode::Instant
    }

    fn submit(&mut self, op: PendingOperation) -> SyncStatus {
        match op.apply(self.store.as_ref()) {
            Ok(()) => SyncStatus::Synced,
            Err(e) => {
                error!(operation = %op, error = %e, "durable write failed; memory and store now differ");
                SyncStatus::Failed(e.to_string())
            }
        }
    }

    fn flush(&mut self) -> FlushReport {
        FlushReport::default()
    }

    fn pending(&self) -> usize {
        0
    }

    fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

pub struct QueuedSync {
    store: Arc<dyn Store>,
    queue: VecDeque<PendingOperation>,
}

impl QueuedSync {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            queue: VecDeque::new(),
        }
    }

    /// Operations waiting for the next flush, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &PendingOperation> {
        self.queue.iter()
    }
}

impl SyncPolicy for QueuedSync {
    fn mode(&self) -> SyncMode {
        SyncMode::Batched
    }

    fn submit(&mut self, op: PendingOperation) -> SyncStatus {
        debug!(operation = %op, "queued");
        self.queue.push_back(op);
        SyncStatus::Queued
    }

    fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        // An operation leaves the queue only once the store has answered, so an
        // interrupted flush replays it; every store write tolerates replay.
        while let Some(op) = self.queue.front() {
            match op.apply(self.store.as_ref()) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!(operation = %op, error = %e, "dropping queued operation");
                    report.failed += 1;
                }
            }
            self.queue.pop_front();
        }

        if report.applied + report.failed > 0 {
            info!(
                applied = report.applied,
                failed = report.failed,
                "flushed queued database operations"
            );
        }
        report
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

/// Builds the policy selected by configuration.
pub fn policy_for(mode: SyncMode, store: Arc<dyn Store>) -> Box<dyn SyncPolicy> {
    match mode {
        SyncMode::Instant => Box::new(InstantSync::new(store)),
        SyncMode::Batched => Box::new(QueuedSync::new(store)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn memory_store() -> Arc<dyn Store> {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        Arc::new(store)
    }

    fn insert(id: i64, guid: &str) -> PendingOperation {
        PendingOperation::InsertUser(Box::new(Identity::new(id, guid, "name", Utc::now())))
    }

    #[test]
    fn test_instant_writes_through() {
        let store = memory_store();
        let mut sync = InstantSync::new(store.clone());
        assert_eq!(sync.submit(insert(1, "A")), SyncStatus::Synced);
        assert!(store.get_user_by_guid("A").unwrap().is_some());
        assert_eq!(sync.pending(), 0);
    }

    #[test]
    fn test_instant_reports_store_failure() {
        let store = memory_store();
        let mut sync = InstantSync::new(store);
        let _ = sync.submit(insert(1, "A"));
        let status = sync.submit(insert(2, "A"));
        assert!(status.is_failed());
    }

    #[test]
    fn test_queued_defers_until_flush() {
        let store = memory_store();
        let mut sync = QueuedSync::new(store.clone());
        assert_eq!(sync.submit(insert(1, "A")), SyncStatus::Queued);
        assert_eq!(
            sync.submit(PendingOperation::AddHardwareId {
                user_id: 1,
                hardware_id: "hw".to_string(),
            }),
            SyncStatus::Queued
        );
        assert_eq!(sync.pending(), 2);
        assert!(store.get_user_by_guid("A").unwrap().is_none());

        let report = sync.flush();
        assert_eq!(report, FlushReport { applied: 2, failed: 0 });
        assert_eq!(sync.pending(), 0);
        let user = store.get_user_by_guid("A").unwrap().unwrap();
        assert!(user.hardware_ids.contains("hw"));
    }

    #[test]
    fn test_queued_drops_failures_and_continues() {
        let store = memory_store();
        let mut sync = QueuedSync::new(store.clone());
        let _ = sync.submit(insert(1, "A"));
        let _ = sync.submit(insert(2, "A"));
        let _ = sync.submit(insert(3, "B"));

        let report = sync.flush();
        assert_eq!(report, FlushReport { applied: 2, failed: 1 });
        assert_eq!(sync.pending(), 0);
        assert_eq!(store.load_users().unwrap().len(), 2);
        assert_eq!(sync.flush(), FlushReport::default());
    }

    #[test]
    fn test_replayed_queue_is_harmless() {
        let store = memory_store();
        let mut sync = QueuedSync::new(store.clone());
        let ops = [
            insert(1, "A"),
            PendingOperation::AddAlias {
                user_id: 1,
                alias: "^2Al".to_string(),
            },
        ];
        for op in ops.iter().chain(ops.iter()) {
            let _ = sync.submit(op.clone());
        }
        let report = sync.flush();
        assert_eq!(report.failed, 0);
        let user = store.get_user_by_guid("A").unwrap().unwrap();
        assert_eq!(user.aliases.len(), 1);
    }
}
