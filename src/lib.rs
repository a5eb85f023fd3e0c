//! # Warden
//!
//! An admin authority for dedicated game servers: persistent player
//! identities, admin levels carrying permission flags, bans, and a chat
//! command interpreter that checks every command against the caller's
//! permissions. Usable both as a standalone console binary and as a library
//! embedded in a server host.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! warden = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use warden::admin::Admin;
//! use warden::config::WardenConfig;
//! use warden::session::{Caller, ClientInfo};
//!
//! let config = WardenConfig::load("warden.toml".as_ref())?;
//! let mut admin = Admin::open(&config)?;
//!
//! // `game` implements warden::game::GameServer for your engine.
//! admin.client_connect(0, ClientInfo { guid, hardware_id, ip, name }, &mut game)?;
//! admin.handle_input(Caller::Client(0), "!listplayers", &mut game);
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `warden` console binary. Disable with
//!   `default-features = false`.

pub mod admin;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod game;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

pub use admin::{Admin, Admission};
pub use error::{Error, Result};
