use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str =
    "id, guid, level, created_at, modified_at, last_seen, name, title, commands, greeting";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a store and sets how long a write waits on a locked database.
    pub fn with_busy_timeout<P: AsRef<Path>>(db_path: P, timeout: Duration) -> Result<Self> {
        let store = Self::new(db_path)?;
        store.conn().busy_timeout(timeout)?;
        Ok(store)
    }

    /// A throwaway store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    fn next_id(&self, table: &str) -> Result<i64> {
        let conn = self.conn();
        let sequence: Option<i64> = conn
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        let max_id: Option<i64> = conn.query_row(
            &format!("SELECT MAX(id) FROM {table}"),
            [],
            |row| row.get(0),
        )?;
        Ok(sequence.unwrap_or(0).max(max_id.unwrap_or(0)) + 1)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        guid: row.get(1)?,
        level: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        modified_at: row.get::<_, Option<String>>(4)?.map(|s| parse_datetime(&s)),
        last_seen: parse_datetime(&row.get::<_, String>(5)?),
        name: row.get(6)?,
        title: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        commands: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        greeting: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        hardware_ids: Default::default(),
        ip_addresses: Default::default(),
        aliases: Default::default(),
    })
}

fn ban_from_row(row: &Row<'_>) -> rusqlite::Result<Ban> {
    Ok(Ban {
        id: row.get(0)?,
        name: row.get(1)?,
        guid: row.get(2)?,
        hardware_id: row.get(3)?,
        ip: row.get(4)?,
        banned_by: row.get(5)?,
        banned_by_id: row.get(6)?,
        reason: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        expires_at: row.get::<_, Option<String>>(9)?.map(|s| parse_datetime(&s)),
    })
}

/// Fills the identifier sets of `users` from a `(user_id, value)` table.
fn attach_values(
    conn: &Connection,
    sql: &str,
    users: &mut [Identity],
    index: &HashMap<i64, usize>,
    pick: fn(&mut Identity) -> &mut std::collections::BTreeSet<String>,
) -> Result<()> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (user_id, value) = row?;
        if let Some(&i) = index.get(&user_id) {
            pick(&mut users[i]).insert(value);
        }
    }
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn load_users(&self) -> Result<Vec<Identity>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let mut users = stmt
            .query_map([], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let index: HashMap<i64, usize> = users.iter().enumerate().map(|(i, u)| (u.id, i)).collect();

        attach_values(
            &conn,
            "SELECT user_id, hardware_id FROM hardware_ids",
            &mut users,
            &index,
            |u| &mut u.hardware_ids,
        )?;
        attach_values(
            &conn,
            "SELECT user_id, ip_address FROM ip_addresses",
            &mut users,
            &index,
            |u| &mut u.ip_addresses,
        )?;
        attach_values(
            &conn,
            "SELECT user_id, alias FROM aliases",
            &mut users,
            &index,
            |u| &mut u.aliases,
        )?;

        Ok(users)
    }

    fn get_user_by_guid(&self, guid: &str) -> Result<Option<Identity>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE guid = ?1"),
                params![guid],
                user_from_row,
            )
            .optional()?;

        let Some(mut user) = user else {
            return Ok(None);
        };

        let tables = [
            ("SELECT hardware_id FROM hardware_ids WHERE user_id = ?1", 0),
            ("SELECT ip_address FROM ip_addresses WHERE user_id = ?1", 1),
            ("SELECT alias FROM aliases WHERE user_id = ?1", 2),
        ];
        for (sql, slot) in tables {
            let mut stmt = conn.prepare(sql)?;
            let values = stmt
                .query_map(params![user.id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let target = match slot {
                0 => &mut user.hardware_ids,
                1 => &mut user.ip_addresses,
                _ => &mut user.aliases,
            };
            target.extend(values);
        }

        Ok(Some(user))
    }

    fn next_user_id(&self) -> Result<i64> {
        self.next_id("users")
    }

    fn insert_user(&self, user: &Identity) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO users (id, guid, level, created_at, modified_at, last_seen, name, title, commands, greeting)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO NOTHING",
            params![
                user.id,
                user.guid,
                user.level,
                format_datetime(&user.created_at),
                user.modified_at.as_ref().map(format_datetime),
                format_datetime(&user.last_seen),
                user.name,
                user.title,
                user.commands,
                user.greeting,
            ],
        )?;

        for hardware_id in &user.hardware_ids {
            tx.execute(
                "INSERT OR IGNORE INTO hardware_ids (user_id, hardware_id) VALUES (?1, ?2)",
                params![user.id, hardware_id],
            )?;
        }
        for ip_address in &user.ip_addresses {
            tx.execute(
                "INSERT OR IGNORE INTO ip_addresses (user_id, ip_address) VALUES (?1, ?2)",
                params![user.id, ip_address],
            )?;
        }
        for alias in &user.aliases {
            tx.execute(
                "INSERT OR IGNORE INTO aliases (user_id, alias, clean_alias) VALUES (?1, ?2, ?3)",
                params![user.id, alias, clean_name(alias)],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn update_user(
        &self,
        id: i64,
        fields: UserFields,
        changes: &UserChanges,
        modified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::new();
        let mut values = Vec::new();

        if let Some(modified_at) = modified_at {
            values.push(Value::Text(format_datetime(&modified_at)));
            assignments.push(format!("modified_at = ?{}", values.len()));
        }

        for column in fields.columns() {
            let value = match column {
                "level" => Value::Integer(i64::from(changes.level)),
                "last_seen" => Value::Text(format_datetime(&changes.last_seen)),
                "name" => Value::Text(changes.name.clone()),
                "title" => Value::Text(changes.title.clone()),
                "commands" => Value::Text(changes.commands.clone()),
                _ => Value::Text(changes.greeting.clone()),
            };
            values.push(value);
            assignments.push(format!("{column} = ?{}", values.len()));
        }

        values.push(Value::Integer(id));
        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );

        let rows = self.conn().execute(&sql, params_from_iter(values.iter()))?;
        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn set_level_if_has_level(&self, level: i32, new_level: i32) -> Result<usize> {
        let rows = self.conn().execute(
            "UPDATE users SET level = ?1 WHERE level = ?2",
            params![new_level, level],
        )?;
        Ok(rows)
    }

    fn add_hardware_id(&self, user_id: i64, hardware_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO hardware_ids (user_id, hardware_id) VALUES (?1, ?2)",
            params![user_id, hardware_id],
        )?;
        Ok(())
    }

    fn add_ip_address(&self, user_id: i64, ip_address: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO ip_addresses (user_id, ip_address) VALUES (?1, ?2)",
            params![user_id, ip_address],
        )?;
        Ok(())
    }

    fn add_alias(&self, user_id: i64, alias: &str, clean_alias: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO aliases (user_id, alias, clean_alias) VALUES (?1, ?2, ?3)",
            params![user_id, alias, clean_alias],
        )?;
        Ok(())
    }

    // Audit log

    fn insert_user_log(&self, entry: &UserLogEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users_log (user_id, changes, changed_by, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.user_id,
                entry.changes,
                entry.changed_by,
                format_datetime(&entry.timestamp),
            ],
        )?;
        Ok(())
    }

    fn list_user_log(&self, user_id: i64) -> Result<Vec<UserLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, changes, changed_by, timestamp
             FROM users_log WHERE user_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(UserLogEntry {
                user_id: row.get(0)?,
                changes: row.get(1)?,
                changed_by: row.get(2)?,
                timestamp: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Level operations

    fn load_levels(&self) -> Result<Vec<Level>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT level, name, permissions, greeting FROM levels ORDER BY level")?;

        let rows = stmt.query_map([], |row| {
            Ok(Level {
                level: row.get(0)?,
                name: row.get(1)?,
                permissions: Permission::from(row.get::<_, i64>(2)?),
                greeting: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn upsert_level(&self, level: &Level) -> Result<()> {
        self.conn().execute(
            "INSERT INTO levels (level, name, permissions, greeting) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(level) DO UPDATE SET
                name = excluded.name,
                permissions = excluded.permissions,
                greeting = excluded.greeting",
            params![
                level.level,
                level.name,
                i64::from(level.permissions),
                level.greeting,
            ],
        )?;
        Ok(())
    }

    fn delete_level(&self, level: i32) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM levels WHERE level = ?1", params![level])?;
        Ok(rows > 0)
    }

    // Ban operations

    fn load_bans(&self) -> Result<Vec<Ban>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, guid, hardware_id, ip, banned_by, banned_by_id, reason, created_at, expires_at
             FROM bans ORDER BY id",
        )?;

        let rows = stmt.query_map([], ban_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn next_ban_id(&self) -> Result<i64> {
        self.next_id("bans")
    }

    fn insert_ban(&self, ban: &Ban) -> Result<()> {
        self.conn().execute(
            "INSERT INTO bans (id, name, guid, hardware_id, ip, banned_by, banned_by_id, reason, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO NOTHING",
            params![
                ban.id,
                ban.name,
                ban.guid,
                ban.hardware_id,
                ban.ip,
                ban.banned_by,
                ban.banned_by_id,
                ban.reason,
                format_datetime(&ban.created_at),
                ban.expires_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(())
    }

    fn delete_ban(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM bans WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn test_user(id: i64, guid: &str) -> Identity {
        let mut user = Identity::new(id, guid, "^1Player", Utc::now());
        user.hardware_ids.insert("hw-1".to_string());
        user.ip_addresses.insert("10.0.0.1".to_string());
        user.aliases.insert("^1Player".to_string());
        user
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = test_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "hardware_ids",
            "ip_addresses",
            "aliases",
            "users_log",
            "levels",
            "bans",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_user_insert_and_lookup() {
        let (_temp, store) = test_store();
        store.insert_user(&test_user(1, "GUID-1")).unwrap();

        let fetched = store.get_user_by_guid("GUID-1").unwrap().unwrap();
        assert_eq!(fetched.id, 1);
        assert_eq!(fetched.level, 0);
        assert!(fetched.hardware_ids.contains("hw-1"));
        assert!(fetched.ip_addresses.contains("10.0.0.1"));
        assert!(fetched.aliases.contains("^1Player"));

        assert!(store.get_user_by_guid("missing").unwrap().is_none());

        let all = store.load_users().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].hardware_ids.len(), 1);
    }

    #[test]
    fn test_insert_user_replay_is_noop() {
        let (_temp, store) = test_store();
        let user = test_user(7, "GUID-7");
        store.insert_user(&user).unwrap();
        store.insert_user(&user).unwrap();
        assert_eq!(store.load_users().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_guid_is_rejected() {
        let (_temp, store) = test_store();
        store.insert_user(&test_user(1, "GUID")).unwrap();
        let result = store.insert_user(&test_user(2, "GUID"));
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[test]
    fn test_user_ids_are_never_reused() {
        let (_temp, store) = test_store();
        assert_eq!(store.next_user_id().unwrap(), 1);
        store.insert_user(&test_user(5, "GUID-5")).unwrap();
        assert_eq!(store.next_user_id().unwrap(), 6);
        assert!(store.delete_user(5).unwrap());
        assert_eq!(store.next_user_id().unwrap(), 6);
    }

    #[test]
    fn test_partial_update() {
        let (_temp, store) = test_store();
        store.insert_user(&test_user(1, "GUID")).unwrap();

        let changes = UserChanges {
            level: 4,
            title: "Boss".to_string(),
            greeting: "ignored".to_string(),
            ..UserChanges::default()
        };
        store
            .update_user(1, UserFields::LEVEL.union(UserFields::TITLE), &changes, Some(Utc::now()))
            .unwrap();

        let fetched = store.get_user_by_guid("GUID").unwrap().unwrap();
        assert_eq!(fetched.level, 4);
        assert_eq!(fetched.title, "Boss");
        assert_eq!(fetched.greeting, "");
        assert!(fetched.modified_at.is_some());

        let missing = store.update_user(99, UserFields::TITLE, &changes, None);
        assert!(matches!(missing, Err(Error::NotFound)));
    }

    #[test]
    fn test_identifier_inserts_are_idempotent() {
        let (_temp, store) = test_store();
        store.insert_user(&test_user(1, "GUID")).unwrap();
        store.add_hardware_id(1, "hw-2").unwrap();
        store.add_hardware_id(1, "hw-2").unwrap();
        store.add_ip_address(1, "10.0.0.1").unwrap();
        store.add_alias(1, "Other", "other").unwrap();
        store.add_alias(1, "Other", "other").unwrap();

        let fetched = store.get_user_by_guid("GUID").unwrap().unwrap();
        assert_eq!(fetched.hardware_ids.len(), 2);
        assert_eq!(fetched.ip_addresses.len(), 1);
        assert_eq!(fetched.aliases.len(), 2);
    }

    #[test]
    fn test_delete_user_cascades() {
        let (_temp, store) = test_store();
        store.insert_user(&test_user(1, "GUID")).unwrap();
        store
            .insert_user_log(&UserLogEntry {
                user_id: 1,
                changes: "{}".to_string(),
                changed_by: None,
                timestamp: Utc::now(),
            })
            .unwrap();

        assert!(store.delete_user(1).unwrap());
        assert!(!store.delete_user(1).unwrap());

        let conn = store.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM hardware_ids", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_level_crud_and_reassignment() {
        let (_temp, store) = test_store();
        store
            .upsert_level(&Level::new(2, "Moderator", Permission::parse("akm").unwrap()))
            .unwrap();
        store
            .upsert_level(&Level::new(2, "Mod", Permission::parse("ak").unwrap()))
            .unwrap();

        let levels = store.load_levels().unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].name, "Mod");
        assert_eq!(levels[0].permissions.to_flag_string(), "ak");

        let mut user = test_user(1, "GUID");
        user.level = 2;
        store.insert_user(&user).unwrap();
        assert_eq!(store.set_level_if_has_level(2, 0).unwrap(), 1);
        assert_eq!(store.get_user_by_guid("GUID").unwrap().unwrap().level, 0);

        assert!(store.delete_level(2).unwrap());
        assert!(store.load_levels().unwrap().is_empty());
    }

    #[test]
    fn test_ban_crud() {
        let (_temp, store) = test_store();
        let ban = Ban {
            id: store.next_ban_id().unwrap(),
            name: "cheater".to_string(),
            guid: Some("GUID".to_string()),
            hardware_id: None,
            ip: Some("10.0.0.1".to_string()),
            banned_by: "console".to_string(),
            banned_by_id: None,
            reason: "aimbot".to_string(),
            created_at: Utc::now(),
            expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
        };
        store.insert_ban(&ban).unwrap();
        store.insert_ban(&ban).unwrap();

        let bans = store.load_bans().unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].reason, "aimbot");
        assert!(bans[0].expires_at.is_some());
        assert_eq!(store.next_ban_id().unwrap(), ban.id + 1);

        assert!(store.delete_ban(ban.id).unwrap());
        assert!(store.load_bans().unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store.insert_user(&test_user(1, "GUID")).unwrap();
        assert!(store.get_user_by_guid("GUID").unwrap().is_some());
    }
}
