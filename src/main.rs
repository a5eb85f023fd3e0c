use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use warden::admin::{Admin, Admission};
use warden::cache::validate_guid;
use warden::commands::{Dispatch, tokenize};
use warden::config::WardenConfig;
use warden::game::{GameServer, Player};
use warden::session::{Caller, ClientInfo};
use warden::sync::SyncMode;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Admin authority for game servers", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "warden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, seed the default levels and provision an owner
    Init {
        /// Data directory for the database; written to the config file
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// GUID of the player who gets the highest level
        #[arg(long)]
        owner_guid: Option<String>,

        /// Name stored for the owner until they connect
        #[arg(long, default_value = "owner")]
        owner_name: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Run an interactive admin console reading from stdin
    Console,
}

fn run_init(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    owner_guid: Option<String>,
    owner_name: &str,
    non_interactive: bool,
) -> anyhow::Result<()> {
    let mut config = WardenConfig::load(config_path)?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    config.save(config_path)?;

    let mut admin = Admin::open(&config)?;
    println!("Database ready at {}", config.db_path().display());
    println!("Config written to {}", config_path.display());

    let owner_guid = match owner_guid {
        Some(guid) => Some(guid),
        None if non_interactive => None,
        None => prompt_owner_guid()?,
    };
    if let Some(guid) = owner_guid {
        provision_owner(&mut admin, &guid, owner_name)?;
    }

    let report = admin.flush();
    if report.failed > 0 {
        bail!("{} writes could not be saved", report.failed);
    }
    Ok(())
}

fn prompt_owner_guid() -> anyhow::Result<Option<String>> {
    let create = inquire::Confirm::new("Would you like to provision an owner identity?")
        .with_default(false)
        .prompt()?;
    if !create {
        return Ok(None);
    }

    let guid = inquire::Text::new("Owner GUID:")
        .with_validator(|input: &str| match validate_guid(input.trim()) {
            Ok(()) => Ok(inquire::validator::Validation::Valid),
            Err(e) => Ok(inquire::validator::Validation::Invalid(e.to_string().into())),
        })
        .prompt()?;
    Ok(Some(guid.trim().to_string()))
}

fn provision_owner(admin: &mut Admin, guid: &str, name: &str) -> anyhow::Result<()> {
    let Some(level) = admin.cache().levels().last().map(|l| l.level) else {
        bail!("no admin levels are defined");
    };
    let now = Utc::now();
    let cache = admin.cache_mut();
    let resolution = cache
        .resolve(guid, name, now)
        .with_context(|| format!("cannot provision owner {guid}"))?;
    let id = resolution.identity.id;
    let _ = cache.set_level(id, level, now)?;
    let _ = cache.log_change(id, None, &serde_json::json!({ "level": level }), now)?;

    println!();
    println!("========================================");
    println!("Owner {guid} is user {id} at level {level}.");
    println!("========================================");
    println!();
    Ok(())
}

/// Engine stand-in for the console: players exist once `#connect`ed and
/// every message goes to stdout.
struct ConsoleGame {
    players: BTreeMap<usize, String>,
    dropped: Vec<usize>,
}

impl ConsoleGame {
    fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            dropped: Vec::new(),
        }
    }
}

impl GameServer for ConsoleGame {
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
        match to {
            Caller::Console => println!("{text}"),
            Caller::Client(slot) => println!("[{slot}] {text}"),
        }
    }

    fn broadcast(&mut self, text: &str) {
        println!("[all] {text}");
    }

    fn drop_client(&mut self, slot: usize, reason: &str, timeout_secs: u64) {
        println!("[drop {slot}] {reason} (timeout {timeout_secs}s)");
        self.dropped.push(slot);
    }

    fn reset_saves(&mut self, slot: usize) -> bool {
        self.players.contains_key(&slot)
    }
}

/// Disconnects whatever the last command dropped.
fn reap(admin: &mut Admin, game: &mut ConsoleGame) {
    for slot in std::mem::take(&mut game.dropped) {
        game.players.remove(&slot);
        admin.client_disconnect(slot, &*game);
    }
}

/// Runs one console line. Returns false when the console should stop.
fn handle_line(admin: &mut Admin, game: &mut ConsoleGame, line: &str) -> bool {
    let line = line.trim();
    let Some(directive) = line.strip_prefix('#') else {
        if !line.is_empty() {
            admin.handle_input(Caller::Console, line, game);
        }
        reap(admin, game);
        return true;
    };

    let args = tokenize(directive);
    match args.first().map(String::as_str) {
        Some("quit") => return false,
        Some("flush") => {
            let report = admin.flush();
            println!("flushed {} writes, {} failed", report.applied, report.failed);
        }
        Some("connect") => match args.as_slice() {
            [_, slot, guid, hardware_id, ip, name @ ..] if !name.is_empty() => {
                let Ok(slot) = slot.parse::<usize>() else {
                    println!("'{slot}' is not a slot");
                    return true;
                };
                let client = ClientInfo {
                    guid: guid.clone(),
                    hardware_id: hardware_id.clone(),
                    ip: ip.clone(),
                    name: name.join(" "),
                };
                game.players.insert(slot, client.name.clone());
                match admin.client_connect(slot, client, game) {
                    Ok(Admission::Admitted { user_id, .. }) => {
                        println!("slot {slot} authenticated as user {user_id}");
                    }
                    Ok(Admission::Rejected(_)) => {}
                    Err(e) => {
                        println!("slot {slot} could not connect: {e}");
                        game.players.remove(&slot);
                    }
                }
            }
            _ => println!("usage: #connect <slot> <guid> <hwid> <ip> <name>"),
        },
        Some("disconnect") => match args.get(1).map(|s| s.parse::<usize>()) {
            Some(Ok(slot)) => {
                game.players.remove(&slot);
                admin.client_disconnect(slot, &*game);
            }
            _ => println!("usage: #disconnect <slot>"),
        },
        Some("say") => match args.as_slice() {
            [_, slot, text @ ..] if !text.is_empty() => {
                let Ok(slot) = slot.parse::<usize>() else {
                    println!("'{slot}' is not a slot");
                    return true;
                };
                let text = text.join(" ");
                if admin.is_muted(slot) {
                    game.print(Caller::Client(slot), "you are muted");
                } else if admin.handle_input(Caller::Client(slot), &text, game)
                    == Dispatch::NotACommand
                {
                    let name = game.players.get(&slot).cloned().unwrap_or_default();
                    game.broadcast(&format!("{name}^7: {text}"));
                }
            }
            _ => println!("usage: #say <slot> <text>"),
        },
        _ => println!("directives: #connect #disconnect #say #flush #quit"),
    }
    reap(admin, game);
    true
}

async fn run_console(config_path: &Path) -> anyhow::Result<()> {
    let config = WardenConfig::load(config_path)?;
    let mut admin = Admin::open(&config)?;
    let mut game = ConsoleGame::new();
    info!(
        users = admin.cache().user_count(),
        sync = ?config.database.sync,
        "admin console ready"
    );

    let batched = admin.cache().mode() == SyncMode::Batched;
    let mut flush = tokio::time::interval(config.flush_interval().max(Duration::from_secs(1)));
    flush.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut admin, &mut game, &line) {
                    break;
                }
            }
            _ = flush.tick(), if batched => {
                let report = admin.flush();
                if report.applied > 0 || report.failed > 0 {
                    info!(applied = report.applied, failed = report.failed, "periodic flush");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    let report = admin.flush();
    if report.failed > 0 {
        warn!(failed = report.failed, "some writes were lost on shutdown");
    }
    info!(sync_failures = admin.cache().sync_failures(), "admin console stopped");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warden=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            data_dir,
            owner_guid,
            owner_name,
            non_interactive,
        } => run_init(
            &cli.config,
            data_dir,
            owner_guid,
            &owner_name,
            non_interactive,
        )?,
        Commands::Console => run_console(&cli.config).await?,
    }

    Ok(())
}
