//! The admin system as the engine sees it: connect, disconnect, input.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cache::{AdminCache, default_levels, validate_guid};
use crate::commands::{CommandRegistry, Context, Dispatch, describe_expiry};
use crate::config::{AdminSettings, WardenConfig};
use crate::error::{Error, Result};
use crate::game::GameServer;
use crate::session::{Caller, ClientInfo, Session, SessionTable};
use crate::store::{SqliteStore, Store};
use crate::sync::{FlushReport, SyncMode, policy_for};

/// Outcome of authenticating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted { user_id: i64, provisioned: bool },
    /// The client was dropped; the reason was sent to it.
    Rejected(String),
}

/// Opens the configured database, creating it and seeding the default levels
/// when needed.
pub fn open_store(config: &WardenConfig) -> Result<Arc<dyn Store>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let store = SqliteStore::with_busy_timeout(config.db_path(), config.busy_timeout())?;
    store.initialize()?;
    let seeded = seed_levels(&store)?;
    if seeded > 0 {
        info!(levels = seeded, "seeded default admin levels");
    }
    Ok(Arc::new(store))
}

/// Writes the default levels into a store that has none.
pub fn seed_levels(store: &dyn Store) -> Result<usize> {
    if !store.load_levels()?.is_empty() {
        return Ok(0);
    }
    let levels = default_levels();
    for level in &levels {
        store.upsert_level(level)?;
    }
    Ok(levels.len())
}

pub struct Admin {
    cache: AdminCache,
    sessions: SessionTable,
    commands: CommandRegistry,
    settings: AdminSettings,
}

impl Admin {
    pub fn new(cache: AdminCache, settings: AdminSettings) -> Self {
        Self {
            cache,
            sessions: SessionTable::new(settings.max_clients),
            commands: CommandRegistry::with_defaults(),
            settings,
        }
    }

    pub fn with_store(
        store: Arc<dyn Store>,
        mode: SyncMode,
        settings: AdminSettings,
    ) -> Result<Self> {
        let cache = AdminCache::load(policy_for(mode, store))?;
        Ok(Self::new(cache, settings))
    }

    pub fn open(config: &WardenConfig) -> Result<Self> {
        let store = open_store(config)?;
        Self::with_store(store, config.database.sync, config.admin.clone())
    }

    /// A client's identity material arrived: check bans, resolve its
    /// identity and activate the slot.
    pub fn client_connect(
        &mut self,
        slot: usize,
        client: ClientInfo,
        game: &mut dyn GameServer,
    ) -> Result<Admission> {
        info!(slot, guid = %client.guid, name = %client.name, "client connecting");
        self.sessions.begin(slot, client)?;
        admit(&mut self.cache, &mut self.sessions, game, slot)
    }

    /// Empties the slot and stamps the identity's last-seen time.
    pub fn client_disconnect(&mut self, slot: usize, game: &dyn GameServer) -> Option<Session> {
        let session = self.sessions.clear(slot)?;
        if let Some(user_id) = session.user_id {
            if let Err(e) = self.cache.touch_last_seen(user_id, game.now()) {
                warn!(slot, user_id, error = %e, "could not update last seen");
            }
        }
        info!(slot, name = %session.client.name, "client disconnected");
        Some(session)
    }

    /// Refreshes an active session's permission snapshot.
    pub fn reauthenticate(&mut self, slot: usize, game: &mut dyn GameServer) -> Result<Admission> {
        reauthenticate(&mut self.cache, &mut self.sessions, game, slot)
    }

    /// Handles one line of chat or console input.
    pub fn handle_input(
        &mut self,
        caller: Caller,
        line: &str,
        game: &mut dyn GameServer,
    ) -> Dispatch {
        let mut ctx = Context {
            caller,
            cache: &mut self.cache,
            sessions: &mut self.sessions,
            game,
            commands: &self.commands,
            settings: &self.settings,
            command: String::new(),
        };
        self.commands.dispatch(&mut ctx, line)
    }

    pub fn is_muted(&self, slot: usize) -> bool {
        self.sessions.get(slot).is_some_and(|s| s.muted)
    }

    pub fn flush(&mut self) -> FlushReport {
        self.cache.flush()
    }

    pub fn cache(&self) -> &AdminCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AdminCache {
        &mut self.cache
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn settings(&self) -> &AdminSettings {
        &self.settings
    }
}

/// Re-enters resolution for an active slot.
pub(crate) fn reauthenticate(
    cache: &mut AdminCache,
    sessions: &mut SessionTable,
    game: &mut dyn GameServer,
    slot: usize,
) -> Result<Admission> {
    sessions.begin_reauth(slot)?;
    admit(cache, sessions, game, slot)
}

fn rejection(cache: &AdminCache, client: &ClientInfo, now: DateTime<Utc>) -> Option<String> {
    if let Err(e) = validate_guid(&client.guid) {
        return Some(format!("Invalid GUID: {e}"));
    }
    let ban = cache
        .active_ip_ban(&client.ip, now)
        .or_else(|| cache.active_ban(&client.guid, &client.hardware_id, now))?;
    Some(format!(
        "You are banned from this server. Reason: {}. Expires: {}",
        ban.reason,
        describe_expiry(ban, now)
    ))
}

/// Takes a resolving slot to active, or drops the client.
fn admit(
    cache: &mut AdminCache,
    sessions: &mut SessionTable,
    game: &mut dyn GameServer,
    slot: usize,
) -> Result<Admission> {
    let client = sessions.get(slot).ok_or(Error::NotFound)?.client.clone();
    let now = game.now();

    if let Some(reason) = rejection(cache, &client, now) {
        warn!(slot, guid = %client.guid, reason = %reason, "client rejected");
        sessions.clear(slot);
        game.drop_client(slot, &reason, 0);
        return Ok(Admission::Rejected(reason));
    }

    let resolution = match cache.resolve(&client.guid, &client.name, now) {
        Ok(resolution) => resolution,
        Err(e) => {
            sessions.clear(slot);
            return Err(e);
        }
    };
    let user_id = resolution.identity.id;

    // Soft failures are already logged and counted by the cache.
    let _ = cache.record_hardware_id(user_id, &client.hardware_id)?;
    let _ = cache.record_ip(user_id, &client.ip)?;
    let _ = cache.record_alias(user_id, &client.name)?;
    let _ = cache.touch_last_seen(user_id, now)?;

    let identity = cache.by_id(user_id)?;
    let level = identity.level;
    let permissions = cache.permissions_for(identity);
    let greeting = if identity.greeting.is_empty() {
        cache.level(level).map(|l| l.greeting.clone()).unwrap_or_default()
    } else {
        identity.greeting.clone()
    };

    let first = sessions.activate(slot, user_id, level, permissions)?;
    info!(
        slot,
        user_id,
        level,
        provisioned = resolution.provisioned,
        "client authenticated"
    );
    if first && !greeting.is_empty() {
        game.broadcast(&greeting.replace("[n]", &client.name));
    }

    Ok(Admission::Admitted {
        user_id,
        provisioned: resolution.provisioned,
    })
}
