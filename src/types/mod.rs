mod models;
mod permission;
mod text;

pub use models::*;
pub use permission::{FLAGS, FlagInfo, Permission};
pub use text::{clean_name, sanitize_text};
