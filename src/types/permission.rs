use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Permission represents a bitmask of capability flags.
///
/// Every flag is addressed in text by a single character (see [`FLAGS`]);
/// level definitions and personal overrides are stored as flag strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u64);

impl Permission {
    pub const BASIC: Permission = Permission(1 << 0); // a
    pub const EIGHT_BALL: Permission = Permission(1 << 1); // 8
    pub const EDIT: Permission = Permission(1 << 2); // A
    pub const BAN: Permission = Permission(1 << 3); // b
    pub const FINGER: Permission = Permission(1 << 4); // f
    pub const KICK: Permission = Permission(1 << 5); // k
    pub const LIST_PLAYERS: Permission = Permission(1 << 6); // l
    pub const LIST_BANS: Permission = Permission(1 << 7); // L
    pub const MUTE: Permission = Permission(1 << 8); // m
    pub const READ_CONFIG: Permission = Permission(1 << 9); // G
    pub const SET_LEVEL: Permission = Permission(1 << 10); // s
    pub const SAVE_SYSTEM: Permission = Permission(1 << 11); // T

    /// Every defined flag.
    pub const ALL: Permission = Permission((1 << 12) - 1);

    pub const NONE: Permission = Permission(0);

    pub const fn new(bits: u64) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if this permission bitmask contains the required permission.
    #[must_use]
    pub const fn has(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }

    /// Combines two permission bitmasks.
    #[must_use]
    pub const fn union(self, other: Permission) -> Permission {
        Permission(self.0 | other.0)
    }

    /// Removes permissions from this bitmask.
    #[must_use]
    pub const fn difference(self, other: Permission) -> Permission {
        Permission(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Looks up the flag bound to a character.
    pub fn from_flag(c: char) -> Option<Permission> {
        FLAGS
            .iter()
            .find(|flag| flag.letter == c)
            .map(|flag| flag.permission)
    }

    /// Parses a level flag string such as `"a8fk"` or `"*"`.
    ///
    /// Whitespace is ignored. Unknown characters are rejected so a typo never
    /// silently drops a capability.
    pub fn parse(s: &str) -> Result<Permission> {
        let mut result = Permission::NONE;
        for c in s.chars().filter(|c| !c.is_whitespace()) {
            if c == '*' {
                result = Permission::ALL;
                continue;
            }
            let flag = Self::from_flag(c)
                .ok_or_else(|| Error::Validation(format!("unknown permission flag '{c}'")))?;
            result = result.union(flag);
        }
        Ok(result)
    }

    /// Flags an override string can add to any base: those whose last
    /// mention is in grant mode.
    #[must_use]
    pub fn granted_by(overrides: &str) -> Permission {
        Permission::NONE.apply_overrides(overrides)
    }

    /// Applies a personal override string on top of this bitmask.
    ///
    /// `+` switches to grant mode (the initial mode), `-` to revoke mode and
    /// `*` grants or revokes every flag. Characters that name no flag are
    /// skipped: personal strings are free text edited by admins.
    #[must_use]
    pub fn apply_overrides(self, overrides: &str) -> Permission {
        let mut result = self;
        let mut granting = true;
        for c in overrides.chars() {
            let target = match c {
                '+' => {
                    granting = true;
                    continue;
                }
                '-' => {
                    granting = false;
                    continue;
                }
                '*' => Permission::ALL,
                _ => match Self::from_flag(c) {
                    Some(flag) => flag,
                    None => continue,
                },
            };
            result = if granting {
                result.union(target)
            } else {
                result.difference(target)
            };
        }
        result
    }

    /// Returns the flag string for this bitmask, in table order.
    #[must_use]
    pub fn to_flag_string(self) -> String {
        FLAGS
            .iter()
            .filter(|flag| self.has(flag.permission))
            .map(|flag| flag.letter)
            .collect()
    }

    /// Returns the names of the flags in this bitmask.
    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        FLAGS
            .iter()
            .filter(|flag| self.has(flag.permission))
            .map(|flag| flag.name)
            .collect()
    }
}

/// A named capability bit.
#[derive(Debug, Clone, Copy)]
pub struct FlagInfo {
    pub letter: char,
    pub permission: Permission,
    pub name: &'static str,
}

/// The single source of truth for flag letters and names.
pub const FLAGS: &[FlagInfo] = &[
    FlagInfo { letter: 'a', permission: Permission::BASIC, name: "basic" },
    FlagInfo { letter: '8', permission: Permission::EIGHT_BALL, name: "8ball" },
    FlagInfo { letter: 'A', permission: Permission::EDIT, name: "edit" },
    FlagInfo { letter: 'b', permission: Permission::BAN, name: "ban" },
    FlagInfo { letter: 'f', permission: Permission::FINGER, name: "finger" },
    FlagInfo { letter: 'k', permission: Permission::KICK, name: "kick" },
    FlagInfo { letter: 'l', permission: Permission::LIST_PLAYERS, name: "listplayers" },
    FlagInfo { letter: 'L', permission: Permission::LIST_BANS, name: "listbans" },
    FlagInfo { letter: 'm', permission: Permission::MUTE, name: "mute" },
    FlagInfo { letter: 'G', permission: Permission::READ_CONFIG, name: "readconfig" },
    FlagInfo { letter: 's', permission: Permission::SET_LEVEL, name: "setlevel" },
    FlagInfo { letter: 'T', permission: Permission::SAVE_SYSTEM, name: "savesystem" },
];

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_flag_string())
    }
}

impl From<i64> for Permission {
    fn from(bits: i64) -> Self {
        Self::new(bits as u64)
    }
}

impl From<Permission> for i64 {
    fn from(p: Permission) -> Self {
        p.0 as i64
    }
}
