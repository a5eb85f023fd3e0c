use chrono::{DateTime, Utc};

use crate::types::{Ban, BanRequest};

/// Every ban ever issued and not yet lifted, in id order.
///
/// Expired bans stay in the list; expiry only matters at check time.
#[derive(Debug)]
pub struct BanRegistry {
    bans: Vec<Ban>,
    next_id: i64,
}

impl BanRegistry {
    pub fn from_bans(mut bans: Vec<Ban>, next_id: i64) -> Self {
        bans.sort_by_key(|b| b.id);
        let next_id = bans
            .last()
            .map_or(next_id, |b| next_id.max(b.id + 1))
            .max(1);
        Self { bans, next_id }
    }

    pub fn add(&mut self, request: BanRequest, now: DateTime<Utc>) -> Ban {
        let ban = Ban {
            id: self.next_id,
            name: request.name,
            guid: request.guid.filter(|s| !s.is_empty()),
            hardware_id: request.hardware_id.filter(|s| !s.is_empty()),
            ip: request.ip.filter(|s| !s.is_empty()),
            banned_by: request.banned_by,
            banned_by_id: request.banned_by_id,
            reason: request.reason,
            created_at: now,
            expires_at: request.expires_at,
        };
        self.next_id += 1;
        self.bans.push(ban.clone());
        ban
    }

    pub fn remove(&mut self, id: i64) -> Option<Ban> {
        let pos = self.bans.iter().position(|b| b.id == id)?;
        Some(self.bans.remove(pos))
    }

    pub fn get(&self, id: i64) -> Option<&Ban> {
        self.bans.iter().find(|b| b.id == id)
    }

    /// The most recent active ban matching the GUID or hardware id.
    pub fn active_ban(&self, guid: &str, hardware_id: &str, now: DateTime<Utc>) -> Option<&Ban> {
        self.latest(now, |b| b.matches(guid, hardware_id))
    }

    /// The most recent active ban on an IP address.
    pub fn active_ip_ban(&self, ip: &str, now: DateTime<Utc>) -> Option<&Ban> {
        self.latest(now, |b| b.matches_ip(ip))
    }

    fn latest(&self, now: DateTime<Utc>, pred: impl Fn(&Ban) -> bool) -> Option<&Ban> {
        self.bans
            .iter()
            .filter(|b| b.is_active(now) && pred(b))
            .max_by_key(|b| (b.created_at, b.id))
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ban> {
        self.bans.iter()
    }

    pub fn len(&self) -> usize {
        self.bans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bans.is_empty()
    }
}
