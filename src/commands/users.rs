//! Identity administration.

use serde_json::{Map, Value, json};
use tracing::warn;

use super::{CommandRegistry, Context, Switches};
use crate::error::Error;
use crate::sync::SyncStatus;
use crate::types::{Identity, Permission, UserChanges, UserFields};

pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(
        "setlevel",
        Permission::SET_LEVEL,
        set_level,
        "setlevel <player> <level> | setlevel -id <id> <level>",
        "Change the admin level of a user.",
    );
    registry.register(
        "edituser",
        Permission::EDIT,
        edit_user,
        "edituser -id <id> | -guid <guid> [-cmds <flags>] [-title <text>] [-greeting <text>] [-level <level>]",
        "Edit a user's personal fields.",
    );
    registry.register(
        "deleteuser",
        Permission::EDIT,
        delete_user,
        "deleteuser <id>",
        "Delete a user that is not connected.",
    );
    registry.register(
        "finduser",
        Permission::EDIT,
        find_user,
        "finduser <name>",
        "Search users by any name they have used.",
    );
    registry.register(
        "listusers",
        Permission::EDIT,
        list_users,
        "listusers [page]",
        "List known users.",
    );
    registry.register(
        "userinfo",
        Permission::EDIT,
        user_info,
        "userinfo <id>",
        "Show everything known about a user.",
    );
}

/// Tells the caller when a change only reached memory.
fn warn_if_unsaved(ctx: &mut Context<'_>, status: &SyncStatus) {
    if status.is_failed() {
        ctx.reply("^1warning: ^7the change could not be saved to the database");
    }
}

fn lookup_id(ctx: &mut Context<'_>, text: &str) -> Option<Identity> {
    let Ok(id) = text.parse::<i64>() else {
        ctx.reply(format!("'{text}' is not a user id"));
        return None;
    };
    match ctx.cache.by_id(id) {
        Ok(identity) => Some(identity.clone()),
        Err(_) => {
            ctx.reply(format!("no user with id {id}"));
            None
        }
    }
}

fn set_level(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let (target, level_text) = match args {
        [flag, id, level] if flag.eq_ignore_ascii_case("-id") => {
            let Some(identity) = lookup_id(ctx, id) else {
                return false;
            };
            (identity, level)
        }
        [query, level] => {
            let Some(slot) = ctx.find_target(query) else {
                return false;
            };
            let user_id = ctx.sessions.active(slot).and_then(|s| s.user_id);
            let Some(identity) = user_id.and_then(|id| ctx.cache.by_id(id).ok()).cloned() else {
                ctx.reply("that player has no identity yet");
                return false;
            };
            (identity, level)
        }
        _ => return ctx.usage(),
    };

    let Ok(level) = level_text.parse::<i32>() else {
        ctx.reply(format!("'{level_text}' is not a level"));
        return false;
    };
    if ctx.cache.level(level).is_err() {
        ctx.reply(format!("level {level} does not exist"));
        return false;
    }
    if !ctx.outranks(target.level, false) {
        ctx.reply("you can't change the level of an admin at or above your level");
        warn!(caller = %ctx.caller_name(), target = target.id, "setlevel blocked by level");
        return false;
    }
    if level > ctx.caller_level() {
        ctx.reply("you can't set a level higher than your own");
        return false;
    }

    let now = ctx.game.now();
    let status = match ctx.cache.set_level(target.id, level, now) {
        Ok(status) => status,
        Err(e) => {
            ctx.reply(e.to_string());
            return false;
        }
    };
    let by = ctx.caller_id();
    if let Err(e) = ctx.cache.log_change(target.id, by, &json!({ "level": level }), now) {
        warn!(user_id = target.id, error = %e, "could not record level change");
    }
    ctx.refresh_user(target.id);

    let label = ctx.cache.level(level).map(|l| l.name.clone()).unwrap_or_default();
    ctx.announce(format!(
        "{} ^7is now a level {level} user ({label})",
        target.name
    ));
    warn_if_unsaved(ctx, &status);
    true
}

fn edit_user(ctx: &mut Context<'_>, args: &[String]) -> bool {
    const SWITCHES: [&str; 6] = ["id", "guid", "cmds", "title", "greeting", "level"];
    let switches = match Switches::parse(args, &SWITCHES) {
        Ok(switches) if switches.positional.is_empty() => switches,
        Ok(_) => return ctx.usage(),
        Err(e) => {
            ctx.reply(e);
            return false;
        }
    };

    let target = match (switches.get("id"), switches.get("guid")) {
        (Some(id), None) => lookup_id(ctx, id),
        (None, Some(guid)) => match ctx.cache.by_guid(guid) {
            Ok(identity) => Some(identity.clone()),
            Err(_) => {
                ctx.reply(format!("no user with guid {guid}"));
                None
            }
        },
        _ => return ctx.usage(),
    };
    let Some(target) = target else {
        return false;
    };
    if !ctx.outranks(target.level, true) {
        ctx.reply("you can't edit an admin above your level");
        return false;
    }

    let mut fields = UserFields::NONE;
    let mut changes = UserChanges::default();
    let mut logged = Map::new();

    if let Some(cmds) = switches.get("cmds") {
        if !ctx.may_grant(Permission::granted_by(cmds)) {
            ctx.reply("you can't grant flags you don't have");
            warn!(caller = %ctx.caller_name(), target = target.id, "edituser flags blocked");
            return false;
        }
        fields = fields.union(UserFields::COMMANDS);
        changes.commands = cmds.to_string();
        logged.insert("commands".to_string(), Value::from(cmds));
    }
    if let Some(title) = switches.get("title") {
        fields = fields.union(UserFields::TITLE);
        changes.title = title.to_string();
        logged.insert("title".to_string(), Value::from(title));
    }
    if let Some(greeting) = switches.get("greeting") {
        fields = fields.union(UserFields::GREETING);
        changes.greeting = greeting.to_string();
        logged.insert("greeting".to_string(), Value::from(greeting));
    }
    if let Some(text) = switches.get("level") {
        let Ok(level) = text.parse::<i32>() else {
            ctx.reply(format!("'{text}' is not a level"));
            return false;
        };
        if !ctx.outranks(target.level, false) {
            ctx.reply("you can't change the level of an admin at or above your level");
            warn!(caller = %ctx.caller_name(), target = target.id, "edituser level blocked");
            return false;
        }
        if level > ctx.caller_level() {
            ctx.reply("you can't set a level higher than your own");
            return false;
        }
        fields = fields.union(UserFields::LEVEL);
        changes.level = level;
        logged.insert("level".to_string(), Value::from(level));
    }

    if fields.is_empty() {
        ctx.reply("nothing to change");
        return true;
    }

    let now = ctx.game.now();
    let status = match ctx.cache.update_fields(target.id, fields, changes, now) {
        Ok(status) => status,
        Err(Error::LevelNotFound(level)) => {
            ctx.reply(format!("level {level} does not exist"));
            return false;
        }
        Err(e) => {
            ctx.reply(e.to_string());
            return false;
        }
    };

    let by = ctx.caller_id();
    if let Err(e) = ctx.cache.log_change(target.id, by, &Value::Object(logged), now) {
        warn!(user_id = target.id, error = %e, "could not record user edit");
    }
    if fields.contains(UserFields::LEVEL) || fields.contains(UserFields::COMMANDS) {
        ctx.refresh_user(target.id);
    }

    ctx.reply(format!("updated user {} ({})", target.id, target.name));
    warn_if_unsaved(ctx, &status);
    true
}

fn delete_user(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [id] = args else {
        return ctx.usage();
    };
    let Some(target) = lookup_id(ctx, id) else {
        return false;
    };
    if !ctx.outranks(target.level, false) {
        ctx.reply("you can't delete an admin at or above your level");
        return false;
    }
    if !ctx.sessions.slots_for_user(target.id).is_empty() {
        ctx.reply(format!("{} ^7is connected", target.name));
        return false;
    }

    match ctx.cache.delete_user(target.id) {
        Ok(status) => {
            ctx.reply(format!("deleted user {} ({})", target.id, target.name));
            warn_if_unsaved(ctx, &status);
            true
        }
        Err(e) => {
            ctx.reply(e.to_string());
            false
        }
    }
}

fn find_user(ctx: &mut Context<'_>, args: &[String]) -> bool {
    if args.is_empty() {
        return ctx.usage();
    }
    let query = args.join(" ");
    let limit = ctx.settings.page_len();
    let found: Vec<String> = ctx
        .cache
        .find_users(&query)
        .iter()
        .map(|u| {
            let aliases: Vec<&str> = u.aliases.iter().map(String::as_str).collect();
            format!("{:>5} {:>3} {}^7 ({})", u.id, u.level, u.name, aliases.join("^7, "))
        })
        .collect();

    if found.is_empty() {
        ctx.reply(format!("no users match '{query}'"));
        return false;
    }
    ctx.reply(format!("{} users match '{query}' (id level name)", found.len()));
    for line in found.iter().take(limit) {
        ctx.game.print(ctx.caller, line);
    }
    if found.len() > limit {
        ctx.game
            .print(ctx.caller, &format!("... and {} more", found.len() - limit));
    }
    true
}

fn list_users(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let page = match args.first().map(|p| p.parse::<usize>()) {
        None => 1,
        Some(Ok(page)) if page >= 1 => page,
        Some(_) => return ctx.usage(),
    };
    let size = ctx.settings.page_len();
    let total = ctx.cache.user_count();
    let pages = total.div_ceil(size).max(1);
    if page > pages {
        ctx.reply(format!("there are only {pages} pages"));
        return false;
    }

    let lines: Vec<String> = ctx
        .cache
        .users()
        .skip((page - 1) * size)
        .take(size)
        .map(|u| {
            format!(
                "{:>5} {:>3} {} {}",
                u.id,
                u.level,
                u.last_seen.format("%Y-%m-%d"),
                u.name
            )
        })
        .collect();

    ctx.reply(format!("page {page}/{pages}, {total} users (id level last-seen name)"));
    for line in lines {
        ctx.game.print(ctx.caller, &line);
    }
    true
}

fn user_info(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [id] = args else {
        return ctx.usage();
    };
    let Some(user) = lookup_id(ctx, id) else {
        return false;
    };
    let label = ctx
        .cache
        .level(user.level)
        .map(|l| l.name.clone())
        .unwrap_or_else(|_| "undefined".to_string());
    let edits = match ctx.cache.user_log(user.id) {
        Ok(log) => log.len().to_string(),
        Err(_) => "unknown".to_string(),
    };
    let aliases: Vec<&str> = user.aliases.iter().map(String::as_str).collect();

    let lines = [
        format!("user {}: {}", user.id, user.name),
        format!("guid: {}", user.guid),
        format!("level: {} ({label})", user.level),
        format!("title: {}", user.title),
        format!("greeting: {}", user.greeting),
        format!("commands: {}", user.commands),
        format!("aliases: {}", aliases.join("^7, ")),
        format!(
            "known hardware ids: {}, known ips: {}",
            user.hardware_ids.len(),
            user.ip_addresses.len()
        ),
        format!("created: {}", user.created_at.format("%Y-%m-%d %H:%M")),
        format!("last seen: {}", user.last_seen.format("%Y-%m-%d %H:%M")),
        format!("recorded edits: {edits}"),
    ];
    for line in lines {
        ctx.reply(line);
    }
    true
}
