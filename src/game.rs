//! The boundary to the game engine hosting the admin system.

use chrono::{DateTime, Utc};

use crate::session::Caller;
use crate::types::clean_name;

/// A connected player as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub slot: usize,
    pub name: String,
}

/// What the admin system needs from the engine. Implementations own message
/// transport and client handles; nothing here retains references into them.
pub trait GameServer {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn players(&self) -> Vec<Player>;

    /// Players matching a slot number or a case-insensitive piece of their
    /// name. An exact name match hides partial ones.
    fn find_players(&self, query: &str) -> Vec<Player> {
        let players = self.players();
        if let Ok(slot) = query.parse::<usize>() {
            if let Some(player) = players.iter().find(|p| p.slot == slot) {
                return vec![player.clone()];
            }
        }

        let needle = clean_name(query);
        if needle.is_empty() {
            return Vec::new();
        }
        let exact: Vec<Player> = players
            .iter()
            .filter(|p| clean_name(&p.name) == needle)
            .cloned()
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        players
            .into_iter()
            .filter(|p| clean_name(&p.name).contains(&needle))
            .collect()
    }

    /// Sends a line to one caller: chat for a client, output for the console.
    fn print(&mut self, to: Caller, text: &str);

    fn broadcast(&mut self, text: &str);

    fn drop_client(&mut self, slot: usize, reason: &str, timeout_secs: u64);

    /// Clears a player's saved positions. Returns false when the engine has
    /// no such player.
    fn reset_saves(&mut self, slot: usize) -> bool;
}
