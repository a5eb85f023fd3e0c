use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Permission;

/// A durable player record, keyed by GUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub guid: String,
    pub level: i32,
    pub name: String,
    pub title: String,
    /// Personal permission overrides, applied on top of the level's flags.
    pub commands: String,
    pub greeting: String,
    pub hardware_ids: BTreeSet<String>,
    pub ip_addresses: BTreeSet<String>,
    pub aliases: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl Identity {
    /// A freshly provisioned identity at the default level.
    #[must_use]
    pub fn new(id: i64, guid: &str, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            guid: guid.to_string(),
            level: 0,
            name: name.to_string(),
            title: String::new(),
            commands: String::new(),
            greeting: String::new(),
            hardware_ids: BTreeSet::new(),
            ip_addresses: BTreeSet::new(),
            aliases: BTreeSet::new(),
            created_at: now,
            modified_at: None,
            last_seen: now,
        }
    }

    /// Copies the fields selected by `fields` from `changes`.
    pub fn apply(&mut self, fields: UserFields, changes: &UserChanges) {
        if fields.contains(UserFields::LEVEL) {
            self.level = changes.level;
        }
        if fields.contains(UserFields::LAST_SEEN) {
            self.last_seen = changes.last_seen;
        }
        if fields.contains(UserFields::NAME) {
            self.name.clone_from(&changes.name);
        }
        if fields.contains(UserFields::TITLE) {
            self.title.clone_from(&changes.title);
        }
        if fields.contains(UserFields::COMMANDS) {
            self.commands.clone_from(&changes.commands);
        }
        if fields.contains(UserFields::GREETING) {
            self.greeting.clone_from(&changes.greeting);
        }
    }
}

/// Mask of mutable identity columns touched by a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserFields(u32);

impl UserFields {
    pub const NONE: UserFields = UserFields(0);
    pub const LEVEL: UserFields = UserFields(1 << 0);
    pub const LAST_SEEN: UserFields = UserFields(1 << 1);
    pub const NAME: UserFields = UserFields(1 << 2);
    pub const TITLE: UserFields = UserFields(1 << 3);
    pub const COMMANDS: UserFields = UserFields(1 << 4);
    pub const GREETING: UserFields = UserFields(1 << 5);

    #[must_use]
    pub const fn contains(self, other: UserFields) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: UserFields) -> UserFields {
        UserFields(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Column names of the selected fields, in schema order.
    #[must_use]
    pub fn columns(self) -> Vec<&'static str> {
        [
            (Self::LEVEL, "level"),
            (Self::LAST_SEEN, "last_seen"),
            (Self::NAME, "name"),
            (Self::TITLE, "title"),
            (Self::COMMANDS, "commands"),
            (Self::GREETING, "greeting"),
        ]
        .into_iter()
        .filter(|(field, _)| self.contains(*field))
        .map(|(_, column)| column)
        .collect()
    }
}

/// New values for a partial identity update; only masked fields are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserChanges {
    pub level: i32,
    pub last_seen: DateTime<Utc>,
    pub name: String,
    pub title: String,
    pub commands: String,
    pub greeting: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub level: i32,
    pub name: String,
    pub permissions: Permission,
    pub greeting: String,
}

impl Level {
    #[must_use]
    pub fn new(level: i32, name: &str, permissions: Permission) -> Self {
        Self {
            level,
            name: name.to_string(),
            permissions,
            greeting: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub banned_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banned_by_id: Option<i64>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// `None` means the ban never expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Ban {
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }

    /// Exact match on any identifier known to both sides.
    #[must_use]
    pub fn matches(&self, guid: &str, hardware_id: &str) -> bool {
        let hit = |field: &Option<String>, value: &str| {
            !value.is_empty() && field.as_deref() == Some(value)
        };
        hit(&self.guid, guid) || hit(&self.hardware_id, hardware_id)
    }

    #[must_use]
    pub fn matches_ip(&self, ip: &str) -> bool {
        !ip.is_empty() && self.ip.as_deref() == Some(ip)
    }
}

/// Who is asking for a ban and why.
#[derive(Debug, Clone)]
pub struct BanRequest {
    pub name: String,
    pub guid: Option<String>,
    pub hardware_id: Option<String>,
    pub ip: Option<String>,
    pub banned_by: String,
    pub banned_by_id: Option<i64>,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLogEntry {
    pub user_id: i64,
    pub changes: String,
    /// `None` when the change came from the server console.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<i64>,
    pub timestamp: DateTime<Utc>,
}
