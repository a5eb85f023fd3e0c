//! Per-slot state for connected clients.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::Permission;

/// Who issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    /// The server console. Holds every permission and outranks everyone.
    Console,
    Client(usize),
}

impl Caller {
    pub fn slot(self) -> Option<usize> {
        match self {
            Caller::Console => None,
            Caller::Client(slot) => Some(slot),
        }
    }
}

/// Identity material the engine hands over for a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub guid: String,
    pub hardware_id: String,
    pub ip: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Resolving,
    Active,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub slot: usize,
    pub state: SlotState,
    pub client: ClientInfo,
    /// Set once the identity has been resolved.
    pub user_id: Option<i64>,
    pub level: i32,
    /// Copied at resolution time; later level edits do not reach it.
    pub permissions: Permission,
    pub muted: bool,
    pub greeted: bool,
    pub last_eight_ball: Option<DateTime<Utc>>,
}

impl Session {
    fn new(slot: usize, client: ClientInfo) -> Self {
        Self {
            slot,
            state: SlotState::Resolving,
            client,
            user_id: None,
            level: 0,
            permissions: Permission::NONE,
            muted: false,
            greeted: false,
            last_eight_ball: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SlotState::Active
    }

    #[must_use]
    pub fn has_permission(&self, flag: Permission) -> bool {
        self.is_active() && self.permissions.has(flag)
    }
}

pub struct SessionTable {
    slots: Vec<Option<Session>>,
}

impl SessionTable {
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: vec![None; max_clients],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Option<Session>> {
        let capacity = self.slots.len();
        self.slots.get_mut(slot).ok_or_else(|| {
            Error::Validation(format!("slot {slot} is out of range (0-{})", capacity.saturating_sub(1)))
        })
    }

    /// Starts resolving a freshly connected client, replacing whatever the
    /// slot held before.
    pub fn begin(&mut self, slot: usize, client: ClientInfo) -> Result<&mut Session> {
        let entry = self.slot_mut(slot)?;
        Ok(entry.insert(Session::new(slot, client)))
    }

    /// Puts an existing session back into resolution, keeping its
    /// ephemeral state.
    pub fn begin_reauth(&mut self, slot: usize) -> Result<&mut Session> {
        let session = self.slot_mut(slot)?.as_mut().ok_or(Error::NotFound)?;
        session.state = SlotState::Resolving;
        Ok(session)
    }

    /// Completes resolution. Returns true the first time this connection
    /// becomes active.
    pub fn activate(
        &mut self,
        slot: usize,
        user_id: i64,
        level: i32,
        permissions: Permission,
    ) -> Result<bool> {
        let session = self.slot_mut(slot)?.as_mut().ok_or(Error::NotFound)?;
        if session.state != SlotState::Resolving {
            return Err(Error::Validation(format!("slot {slot} is not resolving")));
        }
        session.state = SlotState::Active;
        session.user_id = Some(user_id);
        session.level = level;
        session.permissions = permissions;
        let first = !session.greeted;
        session.greeted = true;
        Ok(first)
    }

    /// Empties a slot. Ephemeral state goes with it.
    pub fn clear(&mut self, slot: usize) -> Option<Session> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.get(slot).map_or(SlotState::Empty, |s| s.state)
    }

    pub fn get(&self, slot: usize) -> Option<&Session> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Session> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// The active session in `slot`, if any.
    pub fn active(&self, slot: usize) -> Option<&Session> {
        self.get(slot).filter(|s| s.is_active())
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten().filter(|s| s.is_active())
    }

    pub fn active_slots(&self) -> Vec<usize> {
        self.iter_active().map(|s| s.slot).collect()
    }

    /// Slots whose session is bound to `user_id`.
    pub fn slots_for_user(&self, user_id: i64) -> Vec<usize> {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.user_id == Some(user_id))
            .map(|s| s.slot)
            .collect()
    }
}
