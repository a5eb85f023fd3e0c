//! Commands acting on connected players, plus the general-purpose ones.

use rand::seq::SliceRandom;
use tracing::{info, warn};

use super::{CommandRegistry, Context, parse_duration};
use crate::admin;
use crate::session::Caller;
use crate::types::Permission;

const DEFAULT_KICK_TIMEOUT_SECS: u64 = 120;

const EIGHT_BALL_ANSWERS: [&str; 20] = [
    "It is certain",
    "It is decidedly so",
    "Without a doubt",
    "Yes - definitely",
    "You may rely on it",
    "As I see it, yes",
    "Most likely",
    "Outlook good",
    "Yes",
    "Signs point to yes",
    "Reply hazy, try again",
    "Ask again later",
    "Better not tell you now",
    "Cannot predict now",
    "Concentrate and ask again",
    "Don't count on it",
    "My reply is no",
    "My sources say no",
    "Outlook not so good",
    "Very doubtful",
];

pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(
        "8ball",
        Permission::EIGHT_BALL,
        eight_ball,
        "8ball <question>",
        "Ask the magic 8 ball a question.",
    );
    registry.register(
        "admintest",
        Permission::BASIC,
        admin_test,
        "admintest",
        "Show your admin level to everyone.",
    );
    registry.register(
        "finger",
        Permission::FINGER,
        finger,
        "finger <player>",
        "Show the admin level of a player.",
    );
    registry.register(
        "help",
        Permission::BASIC,
        help,
        "help [command]",
        "Describe a command.",
    );
    registry.register(
        "kick",
        Permission::KICK,
        kick,
        "kick <player> [timeout] [reason]",
        "Remove a player from the server.",
    );
    registry.register(
        "listcmds",
        Permission::BASIC,
        list_commands,
        "listcmds",
        "List the commands you can use.",
    );
    registry.register(
        "listplayers",
        Permission::LIST_PLAYERS,
        list_players,
        "listplayers",
        "List connected players with their levels.",
    );
    registry.register(
        "mute",
        Permission::MUTE,
        mute,
        "mute <player>",
        "Stop a player from chatting.",
    );
    registry.register(
        "unmute",
        Permission::MUTE,
        unmute,
        "unmute <player>",
        "Let a muted player chat again.",
    );
    registry.register(
        "readconfig",
        Permission::READ_CONFIG,
        read_config,
        "readconfig",
        "Reload levels, users and bans from the database.",
    );
    registry.register(
        "rmsaves",
        Permission::SAVE_SYSTEM,
        remove_saves,
        "rmsaves <player>",
        "Clear a player's saved positions.",
    );
}

fn eight_ball(ctx: &mut Context<'_>, args: &[String]) -> bool {
    if args.is_empty() {
        return ctx.usage();
    }

    let now = ctx.game.now();
    if let Caller::Client(slot) = ctx.caller {
        let delay = ctx.settings.eight_ball_delay();
        let Some(session) = ctx.sessions.get_mut(slot) else {
            return false;
        };
        if let Some(last) = session.last_eight_ball {
            let wait = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()) - (now - last);
            if wait > chrono::Duration::zero() {
                let secs = (wait.num_milliseconds() + 999) / 1000;
                ctx.reply(format!("please wait {secs} more seconds"));
                return false;
            }
        }
        session.last_eight_ball = Some(now);
    }

    let answer = EIGHT_BALL_ANSWERS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Ask again later");
    ctx.announce(answer);
    true
}

/// A personal title when the identity has one, else the level's name.
fn title_for(ctx: &Context<'_>, user_id: Option<i64>, level: i32) -> String {
    user_id
        .and_then(|id| ctx.cache.by_id(id).ok())
        .map(|u| u.title.clone())
        .filter(|title| !title.is_empty())
        .or_else(|| ctx.cache.level(level).ok().map(|l| l.name.clone()))
        .unwrap_or_default()
}

fn admin_test(ctx: &mut Context<'_>, _args: &[String]) -> bool {
    let Caller::Client(_) = ctx.caller else {
        ctx.reply("you are the console");
        return true;
    };
    let level = ctx.caller_level();
    let label = title_for(ctx, ctx.caller_id(), level);
    let name = ctx.caller_name();
    ctx.announce(format!("{name} ^7is a level {level} user ({label})"));
    true
}

fn finger(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [query] = args else {
        return ctx.usage();
    };
    let Some(slot) = ctx.find_target(query) else {
        return false;
    };
    let Some(session) = ctx.sessions.active(slot) else {
        return false;
    };
    let (name, level, user_id) = (session.client.name.clone(), session.level, session.user_id);
    let label = title_for(ctx, user_id, level);
    ctx.reply(format!("{name} ^7is a level {level} user ({label})"));
    true
}

fn help(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let Some(name) = args.first() else {
        ctx.reply("use listcmds to see your commands, help <command> for details");
        return true;
    };
    let name = name.to_lowercase();
    let permissions = ctx.caller_permissions();
    match ctx.commands.get(&name) {
        Some(cmd) if permissions.has(cmd.permission) => {
            let text = format!("{} (usage: {})", cmd.description, cmd.usage);
            ctx.reply(text);
            true
        }
        _ => {
            ctx.reply(format!("no command named {name} is available to you"));
            false
        }
    }
}

fn list_commands(ctx: &mut Context<'_>, _args: &[String]) -> bool {
    let names = ctx.commands.allowed(ctx.caller_permissions()).join(" ");
    ctx.reply(format!("available commands: {names}"));
    true
}

fn list_players(ctx: &mut Context<'_>, _args: &[String]) -> bool {
    let lines: Vec<String> = ctx
        .sessions
        .iter_active()
        .map(|s| {
            let mute = if s.muted { " ^1(muted)" } else { "" };
            format!("{:>2} {:>3} {}^7{mute}", s.slot, s.level, s.client.name)
        })
        .collect();

    if lines.is_empty() {
        ctx.reply("no players connected");
        return true;
    }
    ctx.reply(format!("{} connected players (slot level name)", lines.len()));
    for line in lines {
        ctx.game.print(ctx.caller, &line);
    }
    true
}

/// Finds a target and checks the caller may act on it: never on
/// themselves, and only on someone ranked strictly below them.
fn lower_ranked_target(ctx: &mut Context<'_>, query: &str, verb: &str) -> Option<usize> {
    let slot = ctx.find_target(query)?;
    if ctx.caller == Caller::Client(slot) {
        ctx.reply(format!("you can't {verb} yourself"));
        return None;
    }
    let level = ctx.sessions.active(slot)?.level;
    if !ctx.outranks(level, false) {
        ctx.reply(format!("you can't {verb} a fellow admin"));
        warn!(caller = %ctx.caller_name(), target = slot, verb, "blocked by level");
        return None;
    }
    Some(slot)
}

fn kick(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let Some(query) = args.first() else {
        return ctx.usage();
    };
    let timeout = match args.get(1) {
        Some(text) => match parse_duration(text) {
            Some(secs) => secs.unsigned_abs(),
            None => {
                ctx.reply(format!("invalid timeout '{text}'"));
                return false;
            }
        },
        None => DEFAULT_KICK_TIMEOUT_SECS,
    };
    let reason = if args.len() > 2 {
        args[2..].join(" ")
    } else {
        "kicked by admin".to_string()
    };

    let Some(slot) = lower_ranked_target(ctx, query, "kick") else {
        return false;
    };
    info!(slot, timeout, reason = %reason, by = %ctx.caller_name(), "kicking player");
    ctx.game.drop_client(slot, &reason, timeout);
    true
}

fn mute(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [query] = args else {
        return ctx.usage();
    };
    let Some(slot) = lower_ranked_target(ctx, query, "mute") else {
        return false;
    };
    let Some(session) = ctx.sessions.get_mut(slot) else {
        return false;
    };
    if session.muted {
        let name = session.client.name.clone();
        ctx.reply(format!("{name} ^7is already muted"));
        return false;
    }
    session.muted = true;
    let name = session.client.name.clone();
    ctx.announce(format!("{name} ^7has been muted"));
    true
}

fn unmute(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [query] = args else {
        return ctx.usage();
    };
    let Some(slot) = ctx.find_target(query) else {
        return false;
    };
    let Some(session) = ctx.sessions.get_mut(slot) else {
        return false;
    };
    let name = session.client.name.clone();
    if !session.muted {
        ctx.reply(format!("{name} ^7is not muted"));
        return false;
    }
    session.muted = false;
    ctx.announce(format!("{name} ^7has been unmuted"));
    true
}

fn read_config(ctx: &mut Context<'_>, _args: &[String]) -> bool {
    let report = match ctx.cache.reload() {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "reload failed");
            ctx.reply(format!("reload failed: {e}"));
            return false;
        }
    };

    for slot in ctx.sessions.active_slots() {
        if let Err(e) = admin::reauthenticate(ctx.cache, ctx.sessions, ctx.game, slot) {
            warn!(slot, error = %e, "could not refresh session after reload");
        }
    }

    ctx.reply(format!(
        "reloaded {} users, {} levels and {} bans ({} queued writes flushed)",
        ctx.cache.user_count(),
        ctx.cache.levels().count(),
        ctx.cache.bans().count(),
        report.applied
    ));
    true
}

fn remove_saves(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [query] = args else {
        return ctx.usage();
    };
    let Some(slot) = ctx.find_target(query) else {
        return false;
    };
    let Some(session) = ctx.sessions.active(slot) else {
        return false;
    };
    let (name, level) = (session.client.name.clone(), session.level);
    if !ctx.outranks(level, true) {
        ctx.reply("you can't remove the saves of a higher level admin");
        return false;
    }
    if !ctx.game.reset_saves(slot) {
        ctx.reply(format!("{name} ^7has no saves"));
        return false;
    }
    ctx.reply(format!("removed the saves of {name}"));
    true
}
