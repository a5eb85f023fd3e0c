//! End-to-end tests of the admin system against a scripted game server.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use warden::admin::{Admin, Admission, seed_levels};
use warden::cache::LevelChanges;
use warden::commands::Dispatch;
use warden::config::AdminSettings;
use warden::game::{GameServer, Player};
use warden::session::{Caller, ClientInfo, SlotState};
use warden::store::{SqliteStore, Store};
use warden::sync::{SyncMode, SyncStatus};
use warden::types::{Level, Permission, UserChanges, UserFields};

#[derive(Default)]
struct FakeGame {
    players: BTreeMap<usize, String>,
    now: Option<DateTime<Utc>>,
    printed: Vec<(Caller, String)>,
    broadcasts: Vec<String>,
    dropped: Vec<(usize, String, u64)>,
}

impl FakeGame {
    fn new() -> Self {
        Self {
            now: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ..Self::default()
        }
    }

    fn advance(&mut self, by: Duration) {
        self.now = Some(self.now() + by);
    }

    fn printed_to(&self, caller: Caller) -> Vec<&str> {
        self.printed
            .iter()
            .filter(|(to, _)| *to == caller)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

impl GameServer for FakeGame {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn players(&self) -> Vec<Player> {
        self.players
            .iter()
            .map(|(&slot, name)| Player {
                slot,
                name: name.clone(),
            })
            .collect()
    }

    fn print(&mut self, to: Caller, text: &str) {
        self.printed.push((to, text.to_string()));
    }

    fn broadcast(&mut self, text: &str) {
        self.broadcasts.push(text.to_string());
    }

    fn drop_client(&mut self, slot: usize, reason: &str, timeout_secs: u64) {
        self.dropped.push((slot, reason.to_string(), timeout_secs));
    }

    fn reset_saves(&mut self, slot: usize) -> bool {
        self.players.contains_key(&slot)
    }
}

fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    store.initialize().unwrap();
    seed_levels(&store).unwrap();
    Arc::new(store)
}

fn admin_with(store: Arc<SqliteStore>, mode: SyncMode) -> Admin {
    Admin::with_store(store, mode, AdminSettings::default()).unwrap()
}

fn admin() -> Admin {
    admin_with(seeded_store(), SyncMode::Instant)
}

fn client(guid: &str, slot: usize, name: &str) -> ClientInfo {
    ClientInfo {
        guid: guid.to_string(),
        hardware_id: format!("HW{guid}"),
        ip: format!("10.0.0.{slot}"),
        name: name.to_string(),
    }
}

fn try_connect(
    admin: &mut Admin,
    game: &mut FakeGame,
    slot: usize,
    guid: &str,
    name: &str,
) -> Admission {
    game.players.insert(slot, name.to_string());
    admin
        .client_connect(slot, client(guid, slot, name), game)
        .unwrap()
}

fn connect(admin: &mut Admin, game: &mut FakeGame, slot: usize, guid: &str, name: &str) -> i64 {
    match try_connect(admin, game, slot, guid, name) {
        Admission::Admitted { user_id, .. } => user_id,
        Admission::Rejected(reason) => panic!("{name} was rejected: {reason}"),
    }
}

fn disconnect(admin: &mut Admin, game: &mut FakeGame, slot: usize) {
    game.players.remove(&slot);
    admin.client_disconnect(slot, &*game);
}

fn promote(admin: &mut Admin, game: &mut FakeGame, slot: usize, user_id: i64, level: i32) {
    let _ = admin.cache_mut().set_level(user_id, level, game.now()).unwrap();
    admin.reauthenticate(slot, game).unwrap();
}

/// alice is a level 2 moderator on slot 0, bob a visitor on slot 1.
fn moderator_and_visitor() -> (Admin, FakeGame, i64, i64) {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let alice = connect(&mut admin, &mut game, 0, "AAAA", "alice");
    let bob = connect(&mut admin, &mut game, 1, "BBBB", "bob");
    promote(&mut admin, &mut game, 0, alice, 2);
    (admin, game, alice, bob)
}

fn executed(command: &str, success: bool) -> Dispatch {
    Dispatch::Executed {
        command: command.to_string(),
        success,
    }
}

#[test]
fn test_unknown_guid_is_provisioned_at_level_zero() {
    let mut admin = admin();
    let mut game = FakeGame::new();

    let first = try_connect(&mut admin, &mut game, 0, "AAAA", "alice");
    assert_eq!(
        first,
        Admission::Admitted {
            user_id: 1,
            provisioned: true
        }
    );
    let second = connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert_eq!(second, 2);

    let session = admin.sessions().active(0).unwrap();
    assert_eq!(session.level, 0);
    assert!(session.has_permission(Permission::EIGHT_BALL));
    assert!(!session.has_permission(Permission::KICK));

    disconnect(&mut admin, &mut game, 0);
    let again = try_connect(&mut admin, &mut game, 0, "AAAA", "alice");
    assert_eq!(
        again,
        Admission::Admitted {
            user_id: 1,
            provisioned: false
        }
    );
}

#[test]
fn test_connection_records_identity_material() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let id = connect(&mut admin, &mut game, 3, "AAAA", "^1alice");

    let user = admin.cache().by_id(id).unwrap();
    assert!(user.hardware_ids.contains("HWAAAA"));
    assert!(user.ip_addresses.contains("10.0.0.3"));
    assert!(user.aliases.contains("^1alice"));

    let stored = admin.cache().store().get_user_by_guid("AAAA").unwrap().unwrap();
    assert_eq!(stored.aliases, user.aliases);
}

#[test]
fn test_repeated_records_are_unchanged() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let id = connect(&mut admin, &mut game, 0, "AAAA", "alice");
    let cache = admin.cache_mut();

    assert_eq!(cache.record_alias(id, "alice").unwrap(), SyncStatus::Unchanged);
    assert_eq!(cache.record_ip(id, "10.0.0.0").unwrap(), SyncStatus::Unchanged);
    assert_eq!(cache.record_ip(id, "10.9.9.9").unwrap(), SyncStatus::Synced);
    assert_eq!(
        cache
            .update_fields(id, UserFields::NONE, UserChanges::default(), Utc::now())
            .unwrap(),
        SyncStatus::Unchanged
    );
}

#[test]
fn test_invalid_guid_is_rejected() {
    let mut admin = admin();
    let mut game = FakeGame::new();

    let outcome = try_connect(&mut admin, &mut game, 0, "not a guid!", "mallory");
    assert!(matches!(outcome, Admission::Rejected(reason) if reason.contains("Invalid GUID")));
    assert_eq!(admin.sessions().state(0), SlotState::Empty);
    assert_eq!(game.dropped.len(), 1);
    assert_eq!(admin.cache().user_count(), 0);
}

#[test]
fn test_permission_snapshot_survives_until_reauthentication() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let bob = connect(&mut admin, &mut game, 1, "BBBB", "bob");

    let _ = admin.cache_mut().set_level(bob, 2, game.now()).unwrap();
    let session = admin.sessions().active(1).unwrap();
    assert_eq!(session.level, 0);
    assert!(!session.has_permission(Permission::KICK));

    admin.reauthenticate(1, &mut game).unwrap();
    let session = admin.sessions().active(1).unwrap();
    assert_eq!(session.level, 2);
    assert!(session.has_permission(Permission::KICK));
}

#[test]
fn test_exact_command_name_runs() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    let outcome = admin.handle_input(Caller::Client(0), "!kick bob", &mut game);
    assert_eq!(outcome, executed("kick", true));
    assert_eq!(game.dropped, vec![(1, "kicked by admin".to_string(), 120)]);
}

#[test]
fn test_unique_prefix_runs_the_command() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    let outcome = admin.handle_input(Caller::Client(0), "!k bob 30 spamming chat", &mut game);
    assert_eq!(outcome, executed("kick", true));
    assert_eq!(game.dropped, vec![(1, "spamming chat".to_string(), 30)]);
}

#[test]
fn test_ambiguous_prefix_lists_candidates() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    let outcome = admin.handle_input(Caller::Client(0), "!un bob", &mut game);
    assert_eq!(
        outcome,
        Dispatch::Ambiguous(vec!["unban".to_string(), "unmute".to_string()])
    );
    let printed = game.printed_to(Caller::Client(0));
    assert!(printed.iter().any(|line| line.contains("unban, unmute")));
}

#[test]
fn test_command_without_permission_is_denied() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    let outcome = admin.handle_input(Caller::Client(1), "!kick alice", &mut game);
    assert_eq!(outcome, Dispatch::PermissionDenied("kick".to_string()));
    assert!(game.dropped.is_empty());

    // Unpermitted commands do not take part in prefix matching either.
    let outcome = admin.handle_input(Caller::Client(1), "!ki alice", &mut game);
    assert_eq!(outcome, Dispatch::Unknown("ki".to_string()));
}

#[test]
fn test_plain_chat_is_not_a_command() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    assert_eq!(
        admin.handle_input(Caller::Client(1), "kick alice", &mut game),
        Dispatch::NotACommand
    );
    assert_eq!(
        admin.handle_input(Caller::Client(1), "!", &mut game),
        Dispatch::NotACommand
    );
    assert_eq!(
        admin.handle_input(Caller::Console, "listplayers", &mut game),
        executed("listplayers", true)
    );
}

#[test]
fn test_cannot_kick_an_equal_level() {
    let (mut admin, mut game, _, bob) = moderator_and_visitor();
    promote(&mut admin, &mut game, 1, bob, 2);

    let outcome = admin.handle_input(Caller::Client(0), "!kick bob", &mut game);
    assert_eq!(outcome, executed("kick", false));
    assert!(game.dropped.is_empty());

    let outcome = admin.handle_input(Caller::Client(0), "!kick alice", &mut game);
    assert_eq!(outcome, executed("kick", false));
}

#[test]
fn test_console_outranks_everyone() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    let outcome = admin.handle_input(Caller::Console, "kick alice", &mut game);
    assert_eq!(outcome, executed("kick", true));
    assert_eq!(game.dropped[0].0, 0);
}

#[test]
fn test_setlevel_respects_rank() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let alice = connect(&mut admin, &mut game, 0, "AAAA", "alice");
    let bob = connect(&mut admin, &mut game, 1, "BBBB", "bob");
    let carol = connect(&mut admin, &mut game, 2, "CCCC", "carol");

    let changes = LevelChanges {
        permissions: Some(Permission::parse("a8flkmLbs").unwrap()),
        ..LevelChanges::default()
    };
    let _ = admin.cache_mut().edit_level(2, changes).unwrap();
    promote(&mut admin, &mut game, 0, alice, 2);
    promote(&mut admin, &mut game, 1, bob, 2);
    promote(&mut admin, &mut game, 2, carol, 1);

    let outcome = admin.handle_input(Caller::Client(0), "!setlevel bob 0", &mut game);
    assert_eq!(outcome, executed("setlevel", false));
    assert_eq!(admin.cache().by_id(bob).unwrap().level, 2);

    let outcome = admin.handle_input(Caller::Client(0), "!setlevel carol 3", &mut game);
    assert_eq!(outcome, executed("setlevel", false));

    let outcome = admin.handle_input(Caller::Client(0), "!setlevel carol 2", &mut game);
    assert_eq!(outcome, executed("setlevel", true));
    assert_eq!(admin.cache().by_id(carol).unwrap().level, 2);
    assert_eq!(admin.sessions().active(2).unwrap().level, 2);
    assert!(game.broadcasts.iter().any(|b| b.contains("level 2")));

    let log = admin.cache().user_log(carol).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].changed_by, Some(alice));
}

#[test]
fn test_edituser_level_respects_rank() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let alice = connect(&mut admin, &mut game, 0, "AAAA", "alice");
    let bob = connect(&mut admin, &mut game, 1, "BBBB", "bob");

    let changes = LevelChanges {
        permissions: Some(Permission::parse("a8flkmLbA").unwrap()),
        ..LevelChanges::default()
    };
    let _ = admin.cache_mut().edit_level(2, changes).unwrap();
    promote(&mut admin, &mut game, 0, alice, 2);
    promote(&mut admin, &mut game, 1, bob, 2);

    let line = format!("!edituser -id {bob} -level 0");
    assert_eq!(
        admin.handle_input(Caller::Client(0), &line, &mut game),
        executed("edituser", false)
    );
    assert_eq!(admin.cache().by_id(bob).unwrap().level, 2);
    assert_eq!(admin.sessions().active(1).unwrap().level, 2);

    // Peers may still edit each other's personal text.
    let line = format!("!edituser -id {bob} -title peer");
    assert_eq!(
        admin.handle_input(Caller::Client(0), &line, &mut game),
        executed("edituser", true)
    );
    assert_eq!(admin.cache().by_id(bob).unwrap().title, "peer");
}

#[test]
fn test_flags_cannot_be_granted_beyond_your_own() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let alice = connect(&mut admin, &mut game, 0, "AAAA", "alice");

    let without_ban = Permission::parse("a8flkmLA").unwrap();
    let changes = LevelChanges {
        permissions: Some(without_ban),
        ..LevelChanges::default()
    };
    let _ = admin.cache_mut().edit_level(2, changes).unwrap();
    promote(&mut admin, &mut game, 0, alice, 2);

    let line = format!("!edituser -id {alice} -cmds +*");
    assert_eq!(
        admin.handle_input(Caller::Client(0), &line, &mut game),
        executed("edituser", false)
    );
    assert_eq!(admin.cache().by_id(alice).unwrap().commands, "");
    assert!(!admin.sessions().active(0).unwrap().has_permission(Permission::BAN));

    assert_eq!(
        admin.handle_input(Caller::Client(0), "!editlevel 2 -cmds *", &mut game),
        executed("editlevel", false)
    );
    assert_eq!(admin.cache().level(2).unwrap().permissions, without_ban);

    assert_eq!(
        admin.handle_input(Caller::Client(0), "!editlevel 1 -cmds a8flb", &mut game),
        executed("editlevel", false)
    );

    // Flags the caller holds, or only revokes, are fine.
    assert_eq!(
        admin.handle_input(Caller::Client(0), "!editlevel 1 -cmds a8flk", &mut game),
        executed("editlevel", true)
    );
    let line = format!("!edituser -id {alice} -cmds +k-8");
    assert_eq!(
        admin.handle_input(Caller::Client(0), &line, &mut game),
        executed("edituser", true)
    );
    assert!(!admin.sessions().active(0).unwrap().has_permission(Permission::EIGHT_BALL));

    assert_eq!(
        admin.handle_input(Caller::Console, "editlevel 2 -cmds *", &mut game),
        executed("editlevel", true)
    );
    assert_eq!(admin.cache().level(2).unwrap().permissions, Permission::ALL);
}

#[test]
fn test_mute_and_unmute() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    assert_eq!(
        admin.handle_input(Caller::Client(0), "!mute bob", &mut game),
        executed("mute", true)
    );
    assert!(admin.is_muted(1));
    assert_eq!(
        admin.handle_input(Caller::Client(0), "!mute bob", &mut game),
        executed("mute", false)
    );
    assert_eq!(
        admin.handle_input(Caller::Client(0), "!unmute bob", &mut game),
        executed("unmute", true)
    );
    assert!(!admin.is_muted(1));
}

#[test]
fn test_ban_rejects_until_expiry() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    let outcome = admin.handle_input(Caller::Console, "ban bob 1h griefing the map", &mut game);
    assert_eq!(outcome, executed("ban", true));
    assert_eq!(game.dropped.len(), 1);
    assert!(game.dropped[0].1.contains("griefing the map"));
    disconnect(&mut admin, &mut game, 1);

    let outcome = try_connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert!(matches!(&outcome, Admission::Rejected(r) if r.contains("griefing the map")));
    assert_eq!(admin.sessions().state(1), SlotState::Empty);

    // Same address, different GUID: the IP ban still applies.
    let outcome = try_connect(&mut admin, &mut game, 1, "DDDD", "bobby");
    assert!(matches!(outcome, Admission::Rejected(_)));

    game.advance(Duration::hours(2));
    connect(&mut admin, &mut game, 1, "BBBB", "bob");
}

#[test]
fn test_unban_lifts_a_permanent_ban() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    assert_eq!(
        admin.handle_input(Caller::Client(0), "!ban bob", &mut game),
        executed("ban", true)
    );
    disconnect(&mut admin, &mut game, 1);
    let ban_id = admin.cache().bans().next().unwrap().id;
    assert!(admin.cache().bans().next().unwrap().expires_at.is_none());

    game.advance(Duration::weeks(52));
    assert!(matches!(
        try_connect(&mut admin, &mut game, 1, "BBBB", "bob"),
        Admission::Rejected(_)
    ));

    let line = format!("!unban {ban_id}");
    assert_eq!(
        admin.handle_input(Caller::Client(0), &line, &mut game),
        executed("unban", true)
    );
    connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert!(admin.cache().store().load_bans().unwrap().is_empty());
}

#[test]
fn test_edituser_overrides_reach_the_session() {
    let (mut admin, mut game, _, bob) = moderator_and_visitor();

    let line = format!("edituser -id {bob} -cmds +k -title \"the kicker\"");
    assert_eq!(
        admin.handle_input(Caller::Console, &line, &mut game),
        executed("edituser", true)
    );
    let user = admin.cache().by_id(bob).unwrap();
    assert_eq!(user.commands, "+k");
    assert_eq!(user.title, "the kicker");
    assert_eq!(user.modified_at, Some(game.now()));
    assert!(admin.sessions().active(1).unwrap().has_permission(Permission::KICK));
    assert_eq!(admin.cache().user_log(bob).unwrap().len(), 1);
}

#[test]
fn test_deleting_a_level_moves_its_users_to_zero() {
    let (mut admin, mut game, alice, bob) = moderator_and_visitor();
    promote(&mut admin, &mut game, 1, bob, 1);

    assert_eq!(
        admin.handle_input(Caller::Console, "deletelevel 1", &mut game),
        executed("deletelevel", true)
    );
    assert!(admin.cache().level(1).is_err());
    assert_eq!(admin.cache().by_id(bob).unwrap().level, 0);
    assert_eq!(admin.sessions().active(1).unwrap().level, 0);
    assert_eq!(admin.cache().by_id(alice).unwrap().level, 2);

    assert_eq!(
        admin.handle_input(Caller::Console, "deletelevel 0", &mut game),
        executed("deletelevel", false)
    );
}

#[test]
fn test_readconfig_picks_up_store_changes() {
    let store = seeded_store();
    let mut admin = admin_with(Arc::clone(&store), SyncMode::Instant);
    let mut game = FakeGame::new();
    connect(&mut admin, &mut game, 1, "BBBB", "bob");

    let level = Level::new(0, "Visitor", Permission::parse("a8fk").unwrap());
    store.upsert_level(&level).unwrap();
    assert!(!admin.sessions().active(1).unwrap().has_permission(Permission::KICK));

    assert_eq!(
        admin.handle_input(Caller::Console, "readconfig", &mut game),
        executed("readconfig", true)
    );
    assert!(admin.sessions().active(1).unwrap().has_permission(Permission::KICK));
}

#[test]
fn test_greeting_is_shown_once_per_connection() {
    let mut admin = admin();
    let mut game = FakeGame::new();
    let bob = connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert!(game.broadcasts.is_empty());
    disconnect(&mut admin, &mut game, 1);

    let changes = LevelChanges {
        greeting: Some("^2welcome back [n]".to_string()),
        ..LevelChanges::default()
    };
    let _ = admin.cache_mut().edit_level(1, changes).unwrap();
    let _ = admin.cache_mut().set_level(bob, 1, game.now()).unwrap();

    connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert_eq!(game.broadcasts, vec!["^2welcome back bob".to_string()]);

    admin.reauthenticate(1, &mut game).unwrap();
    assert_eq!(game.broadcasts.len(), 1);
}

#[test]
fn test_eight_ball_is_rate_limited() {
    let (mut admin, mut game, _, _) = moderator_and_visitor();

    assert_eq!(
        admin.handle_input(Caller::Client(1), "!8ball will it rain?", &mut game),
        executed("8ball", true)
    );
    assert_eq!(
        admin.handle_input(Caller::Client(1), "!8ball really?", &mut game),
        executed("8ball", false)
    );
    assert!(
        game.printed_to(Caller::Client(1))
            .iter()
            .any(|line| line.contains("please wait"))
    );

    game.advance(Duration::seconds(5));
    assert_eq!(
        admin.handle_input(Caller::Client(1), "!8ball now?", &mut game),
        executed("8ball", true)
    );
}

#[test]
fn test_disconnect_stamps_last_seen() {
    let (mut admin, mut game, _, bob) = moderator_and_visitor();
    game.advance(Duration::minutes(30));
    let left_at = game.now();

    disconnect(&mut admin, &mut game, 1);
    assert_eq!(admin.sessions().state(1), SlotState::Empty);
    assert_eq!(admin.cache().by_id(bob).unwrap().last_seen, left_at);
}

#[test]
fn test_batched_writes_wait_for_flush() {
    let store = seeded_store();
    let mut admin = admin_with(Arc::clone(&store), SyncMode::Batched);
    let mut game = FakeGame::new();

    connect(&mut admin, &mut game, 0, "AAAA", "alice");
    assert!(admin.cache().pending() > 0);
    assert!(store.load_users().unwrap().is_empty());

    let report = admin.flush();
    assert_eq!(report.failed, 0);
    assert_eq!(admin.cache().pending(), 0);
    let users = store.load_users().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].guid, "AAAA");
}

#[test]
fn test_zero_page_size_still_lists() {
    let settings = AdminSettings {
        page_size: 0,
        ..AdminSettings::default()
    };
    let mut admin = Admin::with_store(seeded_store(), SyncMode::Instant, settings).unwrap();
    let mut game = FakeGame::new();
    connect(&mut admin, &mut game, 0, "AAAA", "alice");
    connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert_eq!(
        admin.handle_input(Caller::Console, "ban bob 1h", &mut game),
        executed("ban", true)
    );

    assert_eq!(
        admin.handle_input(Caller::Console, "listusers 2", &mut game),
        executed("listusers", true)
    );
    assert!(
        game.printed_to(Caller::Console)
            .iter()
            .any(|line| line.contains("page 2/2"))
    );
    assert_eq!(
        admin.handle_input(Caller::Console, "listbans", &mut game),
        executed("listbans", true)
    );
    assert_eq!(
        admin.handle_input(Caller::Console, "finduser bob", &mut game),
        executed("finduser", true)
    );
}

#[test]
fn test_deleteuser_refuses_connected_users() {
    let (mut admin, mut game, _, bob) = moderator_and_visitor();

    let line = format!("deleteuser {bob}");
    assert_eq!(
        admin.handle_input(Caller::Console, &line, &mut game),
        executed("deleteuser", false)
    );

    disconnect(&mut admin, &mut game, 1);
    assert_eq!(
        admin.handle_input(Caller::Console, &line, &mut game),
        executed("deleteuser", true)
    );
    assert!(admin.cache().by_id(bob).is_err());

    // A returning GUID gets a fresh id.
    let again = connect(&mut admin, &mut game, 1, "BBBB", "bob");
    assert!(again > bob);
}
