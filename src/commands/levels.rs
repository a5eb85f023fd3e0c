use serde_json::json;
use tracing::warn;

use super::{CommandRegistry, Context, Switches};
use crate::cache::LevelChanges;
use crate::sync::SyncStatus;
use crate::types::{FLAGS, Level, Permission};

const LEVEL_SWITCHES: [&str; 3] = ["cmds", "greeting", "name"];

pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(
        "addlevel",
        Permission::EDIT,
        add_level,
        "addlevel <level> [-cmds <flags>] [-greeting <text>] [-name <name>]",
        "Create an admin level.",
    );
    registry.register(
        "editlevel",
        Permission::EDIT,
        edit_level,
        "editlevel <level> [-cmds <flags>] [-greeting <text>] [-name <name>]",
        "Change an admin level.",
    );
    registry.register(
        "deletelevel",
        Permission::EDIT,
        delete_level,
        "deletelevel <level>",
        "Delete an admin level and move its users to level 0.",
    );
    registry.register(
        "levelinfo",
        Permission::EDIT,
        level_info,
        "levelinfo [level]",
        "Show one or all admin levels.",
    );
    registry.register(
        "listflags",
        Permission::EDIT,
        list_flags,
        "listflags",
        "List permission flags.",
    );
}

/// Parses `<level> [switches]` and checks the caller ranks at or above it.
fn parse_level_args(ctx: &mut Context<'_>, args: &[String]) -> Option<(i32, Switches)> {
    let switches = match Switches::parse(args, &LEVEL_SWITCHES) {
        Ok(switches) => switches,
        Err(e) => {
            ctx.reply(e);
            return None;
        }
    };
    let [level] = switches.positional.as_slice() else {
        ctx.usage();
        return None;
    };
    let Ok(level) = level.parse::<i32>() else {
        ctx.reply(format!("'{level}' is not a level"));
        return None;
    };
    if level > ctx.caller_level() {
        ctx.reply("you can't manage a level above your own");
        return None;
    }
    Some((level, switches))
}

/// Parses `-cmds`, refusing flags the caller doesn't hold.
fn parse_flags(ctx: &mut Context<'_>, switches: &Switches) -> Result<Option<Permission>, ()> {
    match switches.get("cmds").map(Permission::parse).transpose() {
        Ok(Some(perms)) if !ctx.may_grant(perms) => {
            ctx.reply("you can't grant flags you don't have");
            warn!(caller = %ctx.caller_name(), flags = %perms, "level flags blocked");
            Err(())
        }
        Ok(perms) => Ok(perms),
        Err(e) => {
            ctx.reply(e.to_string());
            Err(())
        }
    }
}

fn finish(ctx: &mut Context<'_>, status: &SyncStatus, message: String) -> bool {
    ctx.reply(message);
    if status.is_failed() {
        ctx.reply("^1warning: ^7the change could not be saved to the database");
    }
    true
}

fn add_level(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let Some((level, switches)) = parse_level_args(ctx, args) else {
        return false;
    };
    let Ok(permissions) = parse_flags(ctx, &switches) else {
        return false;
    };

    let mut new_level = Level::new(
        level,
        switches.get("name").unwrap_or_default(),
        permissions.unwrap_or(Permission::NONE),
    );
    new_level.greeting = switches.get("greeting").unwrap_or_default().to_string();

    match ctx.cache.add_level(new_level) {
        Ok(status) => finish(ctx, &status, format!("level {level} created")),
        Err(e) => {
            ctx.reply(e.to_string());
            false
        }
    }
}

fn edit_level(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let Some((level, switches)) = parse_level_args(ctx, args) else {
        return false;
    };
    let Ok(permissions) = parse_flags(ctx, &switches) else {
        return false;
    };
    if switches.is_empty() {
        ctx.reply("nothing to change");
        return true;
    }

    let changes = LevelChanges {
        name: switches.get("name").map(str::to_string),
        permissions,
        greeting: switches.get("greeting").map(str::to_string),
    };
    match ctx.cache.edit_level(level, changes) {
        Ok(status) => finish(ctx, &status, format!("level {level} updated")),
        Err(e) => {
            ctx.reply(e.to_string());
            false
        }
    }
}

fn delete_level(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let Some((level, switches)) = parse_level_args(ctx, args) else {
        return false;
    };
    if !switches.is_empty() {
        return ctx.usage();
    }

    let (moved, status) = match ctx.cache.delete_level(level) {
        Ok(result) => result,
        Err(e) => {
            ctx.reply(e.to_string());
            return false;
        }
    };

    let now = ctx.game.now();
    let by = ctx.caller_id();
    let change = json!({ "level": 0, "deleted_level": level });
    for user_id in &moved {
        if let Err(e) = ctx.cache.log_change(*user_id, by, &change, now) {
            warn!(user_id, error = %e, "could not record level reassignment");
        }
        ctx.refresh_user(*user_id);
    }

    finish(
        ctx,
        &status,
        format!("level {level} deleted, {} users moved to level 0", moved.len()),
    )
}

fn level_info(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let describe = |l: &Level| {
        format!(
            "{:>3} {}^7 [{}] {}",
            l.level,
            l.name,
            l.permissions.to_flag_string(),
            l.greeting
        )
    };

    let lines: Vec<String> = match args {
        [] => ctx.cache.levels().map(describe).collect(),
        [level] => {
            let Ok(level) = level.parse::<i32>() else {
                return ctx.usage();
            };
            match ctx.cache.level(level) {
                Ok(l) => vec![describe(l)],
                Err(e) => {
                    ctx.reply(e.to_string());
                    return false;
                }
            }
        }
        _ => return ctx.usage(),
    };

    ctx.reply("level name [flags] greeting");
    for line in lines {
        ctx.game.print(ctx.caller, &line);
    }
    true
}

fn list_flags(ctx: &mut Context<'_>, _args: &[String]) -> bool {
    ctx.reply("* grants every flag");
    for flag in FLAGS {
        let line = format!("{} {}", flag.letter, flag.name);
        ctx.game.print(ctx.caller, &line);
    }
    true
}
