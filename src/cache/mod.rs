//! The in-memory authority over identities, levels and bans.
//!
//! Every read is answered from memory. Every write changes memory first and
//! then goes through the configured [`SyncPolicy`], so permission checks never
//! wait on the database.

mod bans;
mod levels;
mod users;

pub use bans::BanRegistry;
pub use levels::{DEFAULT_LEVEL, LevelRegistry, default_levels};
pub use users::UserIndex;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::sync::{FlushReport, PendingOperation, SyncMode, SyncPolicy, SyncStatus};
use crate::types::*;

const MAX_GUID_LEN: usize = 64;

/// Rejects GUIDs that are empty, too long or contain anything other than
/// ASCII letters and digits.
pub fn validate_guid(guid: &str) -> Result<()> {
    if guid.is_empty() || guid.len() > MAX_GUID_LEN {
        return Err(Error::Validation(format!(
            "guid must be 1 to {MAX_GUID_LEN} characters"
        )));
    }
    if !guid.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(
            "guid may only contain letters and digits".to_string(),
        ));
    }
    Ok(())
}

/// Result of [`AdminCache::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub identity: Identity,
    /// True when the GUID was unknown and a new identity was created.
    pub provisioned: bool,
    pub sync: SyncStatus,
}

/// Partial edit of a level; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct LevelChanges {
    pub name: Option<String>,
    pub permissions: Option<Permission>,
    pub greeting: Option<String>,
}

impl LevelChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.permissions.is_none() && self.greeting.is_none()
    }
}

pub struct AdminCache {
    users: UserIndex,
    levels: LevelRegistry,
    bans: BanRegistry,
    sync: Box<dyn SyncPolicy>,
    sync_failures: u64,
}

impl AdminCache {
    /// Loads every identity, level and ban from the policy's store.
    pub fn load(sync: Box<dyn SyncPolicy>) -> Result<Self> {
        let store = Arc::clone(sync.store());
        let users = UserIndex::load(store.load_users()?, store.next_user_id()?)?;
        let levels = LevelRegistry::from_levels(store.load_levels()?);
        let bans = BanRegistry::from_bans(store.load_bans()?, store.next_ban_id()?);

        info!(
            users = users.len(),
            levels = levels.iter().count(),
            bans = bans.len(),
            mode = ?sync.mode(),
            "admin cache loaded"
        );

        Ok(Self {
            users,
            levels,
            bans,
            sync,
            sync_failures: 0,
        })
    }

    /// Flushes pending writes, then replaces memory with what the store holds.
    pub fn reload(&mut self) -> Result<FlushReport> {
        let report = self.flush();
        let store = Arc::clone(self.sync.store());

        let next_user = store.next_user_id()?.max(self.users.next_id());
        let next_ban = store.next_ban_id()?.max(self.bans.next_id());
        self.users = UserIndex::load(store.load_users()?, next_user)?;
        self.levels = LevelRegistry::from_levels(store.load_levels()?);
        self.bans = BanRegistry::from_bans(store.load_bans()?, next_ban);

        info!(users = self.users.len(), bans = self.bans.len(), "admin cache reloaded");
        Ok(report)
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode()
    }

    pub fn pending(&self) -> usize {
        self.sync.pending()
    }

    pub fn flush(&mut self) -> FlushReport {
        let report = self.sync.flush();
        self.sync_failures += report.failed as u64;
        report
    }

    /// Durable writes that failed since startup.
    pub fn sync_failures(&self) -> u64 {
        self.sync_failures
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.sync.store()
    }

    fn persist(&mut self, op: PendingOperation) -> SyncStatus {
        let status = self.sync.submit(op);
        if status.is_failed() {
            self.sync_failures += 1;
        }
        status
    }

    // Identities

    /// Returns the identity for `guid`, provisioning a level 0 identity when
    /// the GUID has never been seen.
    pub fn resolve(&mut self, guid: &str, name: &str, now: DateTime<Utc>) -> Result<Resolution> {
        validate_guid(guid)?;

        if let Some(identity) = self.users.by_guid(guid) {
            return Ok(Resolution {
                identity: identity.clone(),
                provisioned: false,
                sync: SyncStatus::Unchanged,
            });
        }

        // With writes still queued the store is older than memory.
        if self.sync.pending() == 0 {
            match self.sync.store().get_user_by_guid(guid) {
                Ok(Some(identity)) => {
                    debug!(user_id = identity.id, guid, "identity loaded from store");
                    self.users.insert(identity.clone())?;
                    return Ok(Resolution {
                        identity,
                        provisioned: false,
                        sync: SyncStatus::Unchanged,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(guid, error = %e, "store lookup failed, provisioning from memory"),
            }
        }

        let id = self.users.allocate_id();
        let identity = Identity::new(id, guid, &sanitize_text(name), now);
        self.users.insert(identity.clone())?;
        info!(user_id = id, guid, "provisioned new identity");

        let sync = self.persist(PendingOperation::InsertUser(Box::new(identity.clone())));
        Ok(Resolution {
            identity,
            provisioned: true,
            sync,
        })
    }

    pub fn by_id(&self, id: i64) -> Result<&Identity> {
        self.users.get(id).ok_or(Error::NotFound)
    }

    pub fn by_guid(&self, guid: &str) -> Result<&Identity> {
        self.users.by_guid(guid).ok_or(Error::NotFound)
    }

    pub fn users(&self) -> impl Iterator<Item = &Identity> {
        self.users.iter()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn find_users(&self, name: &str) -> Vec<&Identity> {
        self.users.find_by_name(name)
    }

    pub fn record_hardware_id(&mut self, id: i64, hardware_id: &str) -> Result<SyncStatus> {
        let user = self.users.get_mut(id).ok_or(Error::NotFound)?;
        if hardware_id.is_empty() || !user.hardware_ids.insert(hardware_id.to_string()) {
            return Ok(SyncStatus::Unchanged);
        }
        Ok(self.persist(PendingOperation::AddHardwareId {
            user_id: id,
            hardware_id: hardware_id.to_string(),
        }))
    }

    pub fn record_ip(&mut self, id: i64, ip: &str) -> Result<SyncStatus> {
        let user = self.users.get_mut(id).ok_or(Error::NotFound)?;
        if ip.is_empty() || !user.ip_addresses.insert(ip.to_string()) {
            return Ok(SyncStatus::Unchanged);
        }
        Ok(self.persist(PendingOperation::AddIpAddress {
            user_id: id,
            ip_address: ip.to_string(),
        }))
    }

    pub fn record_alias(&mut self, id: i64, name: &str) -> Result<SyncStatus> {
        let alias = sanitize_text(name);
        let user = self.users.get_mut(id).ok_or(Error::NotFound)?;
        if alias.is_empty() || !user.aliases.insert(alias.clone()) {
            return Ok(SyncStatus::Unchanged);
        }
        Ok(self.persist(PendingOperation::AddAlias { user_id: id, alias }))
    }

    /// Fails closed when `level` is not defined.
    pub fn set_level(&mut self, id: i64, level: i32, now: DateTime<Utc>) -> Result<SyncStatus> {
        let changes = UserChanges {
            level,
            ..UserChanges::default()
        };
        self.update_fields(id, UserFields::LEVEL, changes, now)
    }

    /// Applies the masked fields of `changes`, stamping edits with `now`. An
    /// empty mask changes nothing and is not an error.
    pub fn update_fields(
        &mut self,
        id: i64,
        fields: UserFields,
        mut changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<SyncStatus> {
        if fields.is_empty() {
            return Ok(SyncStatus::Unchanged);
        }
        if fields.contains(UserFields::LEVEL) && !self.levels.contains(changes.level) {
            return Err(Error::LevelNotFound(changes.level));
        }

        changes.name = sanitize_text(&changes.name);
        changes.title = sanitize_text(&changes.title);
        changes.commands = sanitize_text(&changes.commands);
        changes.greeting = sanitize_text(&changes.greeting);

        let user = self.users.get_mut(id).ok_or(Error::NotFound)?;
        user.apply(fields, &changes);

        // Last-seen touches are bookkeeping, not edits.
        let modified_at = (fields != UserFields::LAST_SEEN).then_some(now);
        if modified_at.is_some() {
            user.modified_at = modified_at;
        }

        Ok(self.persist(PendingOperation::UpdateUser {
            id,
            fields,
            changes: Box::new(changes),
            modified_at,
        }))
    }

    pub fn touch_last_seen(&mut self, id: i64, now: DateTime<Utc>) -> Result<SyncStatus> {
        let changes = UserChanges {
            last_seen: now,
            ..UserChanges::default()
        };
        self.update_fields(id, UserFields::LAST_SEEN, changes, now)
    }

    /// Removes an identity. Its id is never handed out again.
    pub fn delete_user(&mut self, id: i64) -> Result<SyncStatus> {
        let removed = self.users.remove(id).ok_or(Error::NotFound)?;
        info!(user_id = id, guid = %removed.guid, "identity deleted");
        Ok(self.persist(PendingOperation::DeleteUser(id)))
    }

    /// Appends an audit entry describing an admin edit.
    pub fn log_change<T: Serialize>(
        &mut self,
        user_id: i64,
        changed_by: Option<i64>,
        changes: &T,
        now: DateTime<Utc>,
    ) -> Result<SyncStatus> {
        let entry = UserLogEntry {
            user_id,
            changes: serde_json::to_string(changes)?,
            changed_by,
            timestamp: now,
        };
        Ok(self.persist(PendingOperation::LogChange(entry)))
    }

    /// Audit entries that have reached the store.
    pub fn user_log(&self, user_id: i64) -> Result<Vec<UserLogEntry>> {
        self.sync.store().list_user_log(user_id)
    }

    /// The identity's level flags with its personal overrides applied.
    pub fn permissions_for(&self, identity: &Identity) -> Permission {
        self.levels
            .permissions(identity.level)
            .apply_overrides(&identity.commands)
    }

    // Levels

    pub fn level(&self, level: i32) -> Result<&Level> {
        self.levels.get(level).ok_or(Error::LevelNotFound(level))
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    pub fn add_level(&mut self, mut level: Level) -> Result<SyncStatus> {
        if self.levels.contains(level.level) {
            return Err(Error::Validation(format!(
                "level {} already exists",
                level.level
            )));
        }
        level.name = sanitize_text(&level.name);
        level.greeting = sanitize_text(&level.greeting);

        info!(level = level.level, name = %level.name, "level added");
        self.levels.upsert(level.clone());
        Ok(self.persist(PendingOperation::UpsertLevel(level)))
    }

    pub fn edit_level(&mut self, level: i32, changes: LevelChanges) -> Result<SyncStatus> {
        let current = self.levels.get(level).ok_or(Error::LevelNotFound(level))?;
        if changes.is_empty() {
            return Ok(SyncStatus::Unchanged);
        }

        let mut updated = current.clone();
        if let Some(name) = changes.name {
            updated.name = sanitize_text(&name);
        }
        if let Some(permissions) = changes.permissions {
            updated.permissions = permissions;
        }
        if let Some(greeting) = changes.greeting {
            updated.greeting = sanitize_text(&greeting);
        }

        info!(level, "level edited");
        self.levels.upsert(updated.clone());
        Ok(self.persist(PendingOperation::UpsertLevel(updated)))
    }

    /// Deletes a level and moves its holders to the default level. Returns
    /// the ids of the identities that moved.
    pub fn delete_level(&mut self, level: i32) -> Result<(Vec<i64>, SyncStatus)> {
        if level == DEFAULT_LEVEL {
            return Err(Error::Validation(
                "the default level cannot be deleted".to_string(),
            ));
        }
        self.levels.remove(level).ok_or(Error::LevelNotFound(level))?;
        let moved = self.users.reassign_level(level, DEFAULT_LEVEL);
        info!(level, moved = moved.len(), "level deleted");

        let reassigned = self.persist(PendingOperation::ReassignLevel {
            from: level,
            to: DEFAULT_LEVEL,
        });
        let deleted = self.persist(PendingOperation::DeleteLevel(level));
        let status = if reassigned.is_failed() {
            reassigned
        } else {
            deleted
        };
        Ok((moved, status))
    }

    // Bans

    /// Records a ban. At least one of GUID, hardware id or IP must be given.
    pub fn ban(&mut self, request: BanRequest, now: DateTime<Utc>) -> Result<(Ban, SyncStatus)> {
        let known = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !known(&request.guid) && !known(&request.hardware_id) && !known(&request.ip) {
            return Err(Error::Validation(
                "a ban needs a guid, hardware id or ip".to_string(),
            ));
        }

        let ban = self.bans.add(request, now);
        info!(ban_id = ban.id, name = %ban.name, by = %ban.banned_by, "ban issued");
        let status = self.persist(PendingOperation::InsertBan(Box::new(ban.clone())));
        Ok((ban, status))
    }

    pub fn unban(&mut self, id: i64) -> Result<SyncStatus> {
        let ban = self.bans.remove(id).ok_or(Error::BanNotFound(id))?;
        info!(ban_id = id, name = %ban.name, "ban lifted");
        Ok(self.persist(PendingOperation::RemoveBan(id)))
    }

    pub fn is_banned(&self, guid: &str, hardware_id: &str, now: DateTime<Utc>) -> bool {
        self.active_ban(guid, hardware_id, now).is_some()
    }

    pub fn is_ip_banned(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.active_ip_ban(ip, now).is_some()
    }

    /// The ban currently enforced against a GUID or hardware id.
    pub fn active_ban(&self, guid: &str, hardware_id: &str, now: DateTime<Utc>) -> Option<&Ban> {
        self.bans.active_ban(guid, hardware_id, now)
    }

    pub fn active_ip_ban(&self, ip: &str, now: DateTime<Utc>) -> Option<&Ban> {
        self.bans.active_ip_ban(ip, now)
    }

    pub fn bans(&self) -> impl Iterator<Item = &Ban> {
        self.bans.iter()
    }
}
