mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the durable backing for identities, levels and bans.
///
/// Every write is idempotent with respect to replay: re-applying an insert
/// that already landed is a no-op, which lets a queued flush be retried after
/// an interruption.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn load_users(&self) -> Result<Vec<Identity>>;
    fn get_user_by_guid(&self, guid: &str) -> Result<Option<Identity>>;
    /// Smallest id never handed out, including ids of deleted users.
    fn next_user_id(&self) -> Result<i64>;
    fn insert_user(&self, user: &Identity) -> Result<()>;
    fn update_user(
        &self,
        id: i64,
        fields: UserFields,
        changes: &UserChanges,
        modified_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    fn delete_user(&self, id: i64) -> Result<bool>;
    fn set_level_if_has_level(&self, level: i32, new_level: i32) -> Result<usize>;
    fn add_hardware_id(&self, user_id: i64, hardware_id: &str) -> Result<()>;
    fn add_ip_address(&self, user_id: i64, ip_address: &str) -> Result<()>;
    fn add_alias(&self, user_id: i64, alias: &str, clean_alias: &str) -> Result<()>;

    // Audit log
    fn insert_user_log(&self, entry: &UserLogEntry) -> Result<()>;
    fn list_user_log(&self, user_id: i64) -> Result<Vec<UserLogEntry>>;

    // Level operations
    fn load_levels(&self) -> Result<Vec<Level>>;
    fn upsert_level(&self, level: &Level) -> Result<()>;
    fn delete_level(&self, level: i32) -> Result<bool>;

    // Ban operations
    fn load_bans(&self) -> Result<Vec<Ban>>;
    fn next_ban_id(&self) -> Result<i64>;
    fn insert_ban(&self, ban: &Ban) -> Result<()>;
    fn delete_ban(&self, id: i64) -> Result<bool>;

    fn close(&self) -> Result<()>;
}
