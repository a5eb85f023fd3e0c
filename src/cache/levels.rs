use std::collections::BTreeMap;

use crate::types::{Level, Permission};

/// The level every unknown identity starts at.
pub const DEFAULT_LEVEL: i32 = 0;

/// Levels seeded into an empty database.
pub fn default_levels() -> Vec<Level> {
    let seed = |level, name, flags: &str| {
        Level::new(level, name, Permission::parse(flags).unwrap_or(Permission::NONE))
    };
    vec![
        seed(0, "Visitor", "a8f"),
        seed(1, "Friend", "a8fl"),
        seed(2, "Moderator", "a8flkmLb"),
        seed(3, "Administrator", "*"),
    ]
}

#[derive(Debug)]
pub struct LevelRegistry {
    levels: BTreeMap<i32, Level>,
}

impl LevelRegistry {
    /// Level 0 always exists; when the store has none, a flagless placeholder
    /// stands in for it.
    pub fn from_levels(levels: Vec<Level>) -> Self {
        let mut map: BTreeMap<i32, Level> = levels.into_iter().map(|l| (l.level, l)).collect();
        map.entry(DEFAULT_LEVEL)
            .or_insert_with(|| Level::new(DEFAULT_LEVEL, "Visitor", Permission::NONE));
        Self { levels: map }
    }

    pub fn get(&self, level: i32) -> Option<&Level> {
        self.levels.get(&level)
    }

    pub fn contains(&self, level: i32) -> bool {
        self.levels.contains_key(&level)
    }

    /// Permissions for `level`; an undefined level grants nothing.
    pub fn permissions(&self, level: i32) -> Permission {
        self.levels
            .get(&level)
            .map_or(Permission::NONE, |l| l.permissions)
    }

    pub fn upsert(&mut self, level: Level) {
        self.levels.insert(level.level, level);
    }

    pub fn remove(&mut self, level: i32) -> Option<Level> {
        self.levels.remove(&level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    pub fn highest(&self) -> Option<&Level> {
        self.levels.values().next_back()
    }
}
