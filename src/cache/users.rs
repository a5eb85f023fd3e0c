use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::types::{Identity, clean_name};

/// Identities indexed by numeric id and by GUID.
///
/// Records live in `by_id`; `by_guid` maps each GUID to its id. Both maps are
/// only ever changed together through this type.
#[derive(Debug, Default)]
pub struct UserIndex {
    by_id: BTreeMap<i64, Identity>,
    by_guid: HashMap<String, i64>,
    next_id: i64,
}

impl UserIndex {
    pub fn new(next_id: i64) -> Self {
        Self {
            next_id: next_id.max(1),
            ..Self::default()
        }
    }

    /// Builds an index from stored identities. `next_id` is the store's own
    /// idea of the next free id; the larger of it and every loaded id wins.
    pub fn load(users: Vec<Identity>, next_id: i64) -> Result<Self> {
        let mut index = Self::new(next_id);
        for user in users {
            index.insert(user)?;
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    /// Hands out an id that has never been used, even by a deleted identity.
    pub fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: i64) -> Option<&Identity> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Identity> {
        self.by_id.get_mut(&id)
    }

    pub fn by_guid(&self, guid: &str) -> Option<&Identity> {
        self.by_guid.get(guid).and_then(|id| self.by_id.get(id))
    }

    pub fn insert(&mut self, identity: Identity) -> Result<()> {
        if self.by_id.contains_key(&identity.id) {
            return Err(Error::Validation(format!(
                "identity {} is already cached",
                identity.id
            )));
        }
        if self.by_guid.contains_key(&identity.guid) {
            return Err(Error::Validation(format!(
                "guid {} is already cached",
                identity.guid
            )));
        }

        self.next_id = self.next_id.max(identity.id + 1);
        self.by_guid.insert(identity.guid.clone(), identity.id);
        self.by_id.insert(identity.id, identity);
        Ok(())
    }

    pub fn remove(&mut self, id: i64) -> Option<Identity> {
        let identity = self.by_id.remove(&id)?;
        self.by_guid.remove(&identity.guid);
        Some(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.by_id.values()
    }

    /// Moves every identity at `from` to `to`, returning the ids that moved.
    pub fn reassign_level(&mut self, from: i32, to: i32) -> Vec<i64> {
        let mut moved = Vec::new();
        for identity in self.by_id.values_mut().filter(|u| u.level == from) {
            identity.level = to;
            moved.push(identity.id);
        }
        moved
    }

    /// Identities whose current name or any alias contains `query`, ignoring
    /// color codes and case.
    pub fn find_by_name(&self, query: &str) -> Vec<&Identity> {
        let needle = clean_name(query);
        if needle.is_empty() {
            return Vec::new();
        }
        self.by_id
            .values()
            .filter(|u| {
                clean_name(&u.name).contains(&needle)
                    || u.aliases.iter().any(|a| clean_name(a).contains(&needle))
            })
            .collect()
    }
}
