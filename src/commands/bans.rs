use chrono::Duration;
use tracing::info;

use super::{CommandRegistry, Context, format_duration, parse_duration};
use crate::types::{Ban, BanRequest, Permission};

pub(super) fn register(registry: &mut CommandRegistry) {
    registry.register(
        "ban",
        Permission::BAN,
        ban,
        "ban <player> [duration] [reason] | ban -id <id> [duration] [reason]",
        "Ban a player. A duration of 0 or none is permanent.",
    );
    registry.register(
        "unban",
        Permission::BAN,
        unban,
        "unban <ban id>",
        "Lift a ban.",
    );
    registry.register(
        "listbans",
        Permission::LIST_BANS,
        list_bans,
        "listbans [page]",
        "List bans, newest first.",
    );
}

/// Describes when a ban runs out, relative to `now`.
pub(crate) fn describe_expiry(ban: &Ban, now: chrono::DateTime<chrono::Utc>) -> String {
    match ban.expires_at {
        None => "never".to_string(),
        Some(at) if at <= now => "expired".to_string(),
        Some(at) => format!("in {}", format_duration((at - now).num_seconds())),
    }
}

/// Someone to ban: a connected player or a stored identity.
struct BanTarget {
    name: String,
    level: i32,
    slot: Option<usize>,
    guid: String,
    hardware_id: Option<String>,
    ip: Option<String>,
}

fn ban(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let (target, rest) = match args {
        [flag, id, rest @ ..] if flag.eq_ignore_ascii_case("-id") => {
            let Ok(id) = id.parse::<i64>() else {
                ctx.reply(format!("'{id}' is not a user id"));
                return false;
            };
            let Ok(identity) = ctx.cache.by_id(id) else {
                ctx.reply(format!("no user with id {id}"));
                return false;
            };
            let target = BanTarget {
                name: identity.name.clone(),
                level: identity.level,
                slot: ctx.sessions.slots_for_user(id).first().copied(),
                guid: identity.guid.clone(),
                hardware_id: None,
                ip: None,
            };
            (target, rest)
        }
        [query, rest @ ..] => {
            let Some(slot) = ctx.find_target(query) else {
                return false;
            };
            let Some(session) = ctx.sessions.active(slot) else {
                return false;
            };
            let target = BanTarget {
                name: session.client.name.clone(),
                level: session.level,
                slot: Some(slot),
                guid: session.client.guid.clone(),
                hardware_id: Some(session.client.hardware_id.clone()),
                ip: Some(session.client.ip.clone()),
            };
            (target, rest)
        }
        [] => return ctx.usage(),
    };

    if target.slot.is_some() && target.slot == ctx.caller.slot() {
        ctx.reply("you can't ban yourself");
        return false;
    }
    if !ctx.outranks(target.level, false) {
        ctx.reply("you can't ban an admin at or above your level");
        return false;
    }

    let seconds = match rest.first() {
        Some(text) => match parse_duration(text) {
            Some(secs) => secs,
            None => {
                ctx.reply(format!("invalid duration '{text}'"));
                return false;
            }
        },
        None => 0,
    };
    let reason = if rest.len() > 1 {
        rest[1..].join(" ")
    } else {
        "banned by admin".to_string()
    };

    let now = ctx.game.now();
    let expires_at = if seconds > 0 {
        let Some(at) = Duration::try_seconds(seconds).and_then(|d| now.checked_add_signed(d))
        else {
            ctx.reply("that duration is too long, leave it out for a permanent ban");
            return false;
        };
        Some(at)
    } else {
        None
    };
    let request = BanRequest {
        name: target.name.clone(),
        guid: Some(target.guid),
        hardware_id: target.hardware_id,
        ip: target.ip,
        banned_by: ctx.caller_name(),
        banned_by_id: ctx.caller_id(),
        reason: reason.clone(),
        expires_at,
    };

    let (ban, status) = match ctx.cache.ban(request, now) {
        Ok(result) => result,
        Err(e) => {
            ctx.reply(e.to_string());
            return false;
        }
    };
    let expiry = describe_expiry(&ban, now);
    info!(ban_id = ban.id, target = %target.name, expires = %expiry, "player banned");

    if let Some(slot) = target.slot {
        ctx.game
            .drop_client(slot, &format!("You are banned from this server: {reason}"), 0);
    }
    ctx.announce(format!(
        "{} ^7has been banned (ban {}, expires {expiry})",
        target.name, ban.id
    ));
    if status.is_failed() {
        ctx.reply("^1warning: ^7the ban could not be saved to the database");
    }
    true
}

fn unban(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let [id] = args else {
        return ctx.usage();
    };
    let Ok(id) = id.parse::<i64>() else {
        ctx.reply(format!("'{id}' is not a ban id"));
        return false;
    };
    match ctx.cache.unban(id) {
        Ok(status) => {
            ctx.reply(format!("ban {id} removed"));
            if status.is_failed() {
                ctx.reply("^1warning: ^7the change could not be saved to the database");
            }
            true
        }
        Err(e) => {
            ctx.reply(e.to_string());
            false
        }
    }
}

fn list_bans(ctx: &mut Context<'_>, args: &[String]) -> bool {
    let page = match args.first().map(|p| p.parse::<usize>()) {
        None => 1,
        Some(Ok(page)) if page >= 1 => page,
        Some(_) => return ctx.usage(),
    };
    let size = ctx.settings.page_len();
    let now = ctx.game.now();

    let mut bans: Vec<&Ban> = ctx.cache.bans().collect();
    bans.reverse();
    let total = bans.len();
    if total == 0 {
        ctx.reply("there are no bans");
        return true;
    }
    let pages = total.div_ceil(size);
    if page > pages {
        ctx.reply(format!("there are only {pages} pages"));
        return false;
    }

    let lines: Vec<String> = bans
        .iter()
        .skip((page - 1) * size)
        .take(size)
        .map(|b| {
            format!(
                "{:>4} {}^7 by {}^7, expires {}: {}",
                b.id,
                b.name,
                b.banned_by,
                describe_expiry(b, now),
                b.reason
            )
        })
        .collect();

    ctx.reply(format!("page {page}/{pages}, {total} bans"));
    for line in lines {
        ctx.game.print(ctx.caller, &line);
    }
    true
}
