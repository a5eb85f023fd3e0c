//! Command registry, authorization and dispatch.
//!
//! Commands live in a name-ordered map. A typed token selects every command
//! whose name starts with it; an exact name wins outright, and only commands
//! the caller may use take part in prefix matching.

mod args;
mod bans;
mod levels;
mod players;
mod users;

pub use args::{Switches, format_duration, parse_duration, tokenize};
pub(crate) use bans::describe_expiry;

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::{info, warn};

use crate::admin;
use crate::cache::AdminCache;
use crate::config::AdminSettings;
use crate::game::GameServer;
use crate::session::{Caller, SessionTable};
use crate::types::Permission;

/// Runs a command. Returns false when the command failed; the handler has
/// already told the caller why.
pub type Handler = fn(&mut Context<'_>, &[String]) -> bool;

pub struct Command {
    pub permission: Permission,
    pub handler: Handler,
    pub usage: &'static str,
    pub description: &'static str,
}

/// Outcome of [`CommandRegistry::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Plain chat: the line did not start with the command prefix.
    NotACommand,
    Unknown(String),
    PermissionDenied(String),
    Ambiguous(Vec<String>),
    Executed { command: String, success: bool },
}

/// Result of matching a token against the registry.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a str),
    Denied(&'a str),
    Ambiguous(Vec<&'a str>),
    NoMatch,
}

/// Everything a handler may touch while it runs.
pub struct Context<'a> {
    pub caller: Caller,
    pub cache: &'a mut AdminCache,
    pub sessions: &'a mut SessionTable,
    pub game: &'a mut dyn GameServer,
    pub commands: &'a CommandRegistry,
    pub settings: &'a AdminSettings,
    /// Name of the running command, used to prefix replies.
    pub command: String,
}

impl Context<'_> {
    pub fn reply(&mut self, text: impl AsRef<str>) {
        let line = format!("^3{}: ^7{}", self.command, text.as_ref());
        self.game.print(self.caller, &line);
    }

    pub fn announce(&mut self, text: impl AsRef<str>) {
        let line = format!("^3{}: ^7{}", self.command, text.as_ref());
        self.game.broadcast(&line);
    }

    /// Prints the usage line of the running command and returns false.
    pub fn usage(&mut self) -> bool {
        let usage = self
            .commands
            .get(&self.command)
            .map_or("", |c| c.usage);
        self.reply(format!("usage: {usage}"));
        false
    }

    pub fn caller_level(&self) -> i32 {
        match self.caller {
            Caller::Console => i32::MAX,
            Caller::Client(slot) => self.sessions.active(slot).map_or(0, |s| s.level),
        }
    }

    pub fn caller_permissions(&self) -> Permission {
        match self.caller {
            Caller::Console => Permission::ALL,
            Caller::Client(slot) => self
                .sessions
                .active(slot)
                .map_or(Permission::NONE, |s| s.permissions),
        }
    }

    /// Whether the caller holds every flag in `granted`. Nobody hands out
    /// flags they don't have themselves.
    pub fn may_grant(&self, granted: Permission) -> bool {
        self.caller_permissions().has(granted)
    }

    /// Identity id of the caller; `None` for the console.
    pub fn caller_id(&self) -> Option<i64> {
        self.caller
            .slot()
            .and_then(|slot| self.sessions.active(slot))
            .and_then(|s| s.user_id)
    }

    pub fn caller_name(&self) -> String {
        match self.caller {
            Caller::Console => "console".to_string(),
            Caller::Client(slot) => self
                .sessions
                .get(slot)
                .map_or_else(|| format!("client {slot}"), |s| s.client.name.clone()),
        }
    }

    /// Whether the caller may act on someone at `target_level`. With
    /// `allow_equal` a peer counts as a valid target.
    pub fn outranks(&self, target_level: i32, allow_equal: bool) -> bool {
        if self.caller == Caller::Console {
            return true;
        }
        let own = self.caller_level();
        if allow_equal {
            target_level <= own
        } else {
            target_level < own
        }
    }

    /// Resolves a player query to the slot of an active session, telling the
    /// caller what went wrong otherwise.
    pub fn find_target(&mut self, query: &str) -> Option<usize> {
        let found = self.game.find_players(query);
        match found.as_slice() {
            [] => {
                self.reply(format!("no connected player matches '{query}'"));
                None
            }
            [player] => {
                if self.sessions.active(player.slot).is_none() {
                    self.reply(format!("{} ^7is still connecting", player.name));
                    return None;
                }
                Some(player.slot)
            }
            many => {
                let names: Vec<String> = many
                    .iter()
                    .map(|p| format!("{} ^7({})", p.name, p.slot))
                    .collect();
                self.reply(format!(
                    "'{query}' matches several players: {}",
                    names.join(", ")
                ));
                None
            }
        }
    }

    /// Re-resolves every active session of `user_id` so it picks up the
    /// identity's current level and overrides.
    pub fn refresh_user(&mut self, user_id: i64) {
        for slot in self.sessions.slots_for_user(user_id) {
            if let Err(e) = admin::reauthenticate(self.cache, self.sessions, self.game, slot) {
                warn!(slot, user_id, error = %e, "could not refresh session");
            }
        }
    }
}

pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// The full admin command set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        players::register(&mut registry);
        users::register(&mut registry);
        levels::register(&mut registry);
        bans::register(&mut registry);
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        permission: Permission,
        handler: Handler,
        usage: &'static str,
        description: &'static str,
    ) {
        self.commands.insert(
            name.to_lowercase(),
            Command {
                permission,
                handler,
                usage,
                description,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Command)> {
        self.commands.iter().map(|(name, cmd)| (name.as_str(), cmd))
    }

    /// Names the caller holding `permissions` may run.
    pub fn allowed(&self, permissions: Permission) -> Vec<&str> {
        self.iter()
            .filter(|(_, cmd)| permissions.has(cmd.permission))
            .map(|(name, _)| name)
            .collect()
    }

    /// Matches a lower-cased token against the registered names.
    pub fn lookup(&self, token: &str, permissions: Permission) -> Lookup<'_> {
        if token.is_empty() {
            return Lookup::NoMatch;
        }

        let mut matches = Vec::new();
        let range = self
            .commands
            .range::<str, _>((Bound::Included(token), Bound::Unbounded));
        for (name, cmd) in range {
            if !name.starts_with(token) {
                break;
            }
            let permitted = permissions.has(cmd.permission);
            if name == token {
                return if permitted {
                    Lookup::Found(name)
                } else {
                    Lookup::Denied(name)
                };
            }
            if permitted {
                matches.push(name.as_str());
            }
        }

        match matches.len() {
            0 => Lookup::NoMatch,
            1 => Lookup::Found(matches[0]),
            _ => Lookup::Ambiguous(matches),
        }
    }

    /// Parses, authorizes and runs one input line.
    pub fn dispatch(&self, ctx: &mut Context<'_>, line: &str) -> Dispatch {
        let line = line.trim();
        let body = match line.strip_prefix(ctx.settings.command_prefix) {
            Some(rest) => rest,
            None if ctx.caller == Caller::Console => line,
            None => return Dispatch::NotACommand,
        };

        let mut argv = tokenize(body);
        if argv.is_empty() || argv[0].is_empty() {
            return Dispatch::NotACommand;
        }
        let token = argv.remove(0).to_lowercase();

        match self.lookup(&token, ctx.caller_permissions()) {
            Lookup::Found(name) => {
                let Some(cmd) = self.commands.get(name) else {
                    return Dispatch::Unknown(token);
                };
                ctx.command = name.to_string();
                let success = (cmd.handler)(ctx, &argv);
                info!(
                    command = name,
                    caller = %ctx.caller_name(),
                    args = ?argv,
                    success,
                    "admin command"
                );
                Dispatch::Executed {
                    command: name.to_string(),
                    success,
                }
            }
            Lookup::Denied(name) => {
                warn!(command = name, caller = %ctx.caller_name(), "permission denied");
                ctx.game.print(
                    ctx.caller,
                    &format!("^3{name}: ^7you don't have permission to use this command"),
                );
                Dispatch::PermissionDenied(name.to_string())
            }
            Lookup::Ambiguous(names) => {
                ctx.game.print(
                    ctx.caller,
                    &format!(
                        "^3{token}: ^7multiple matching commands found: {}",
                        names.join(", ")
                    ),
                );
                Dispatch::Ambiguous(names.into_iter().map(str::to_string).collect())
            }
            Lookup::NoMatch => {
                ctx.game
                    .print(ctx.caller, &format!("^3{token}: ^7unknown command"));
                Dispatch::Unknown(token)
            }
        }
    }
}
