use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Persisted usage counter for one provider.
///
/// `limit` is fixed when the record is first materialized; `used` only grows,
/// except through an explicit reset. `used == limit` means "exhausted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub used: u32,
    pub limit: u32,
    pub last_reset: String,
}

/// Local durable state: API credentials, activation flags and usage counters.
///
/// This is the storage port of the broker. It opens a SQLite database on disk
/// for the real service, or in memory for tests; the broker is the sole
/// writer either way.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the state database at the given path.
    pub fn new(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .context(format!("Failed to open state database at {}", database_path))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a throwaway in-memory database. Used by tests as a drop-in
    /// replacement for the on-disk store.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_credentials (
                provider_id TEXT PRIMARY KEY,
                api_key TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create api_credentials table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_active (
                provider_id TEXT PRIMARY KEY,
                is_active INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create api_active table")?;

        // "limit" is a SQL keyword, hence usage_limit
        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_usage (
                provider_id TEXT PRIMARY KEY,
                used INTEGER NOT NULL,
                usage_limit INTEGER NOT NULL,
                last_reset TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create api_usage table")?;

        Ok(())
    }

    /// Store (or replace) the API key for a provider.
    pub fn set_api_key(&self, provider_id: &str, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_credentials (provider_id, api_key) VALUES (?1, ?2)
             ON CONFLICT(provider_id) DO UPDATE SET api_key = excluded.api_key",
            params![provider_id, key],
        )
        .context("Failed to save API key")?;
        Ok(())
    }

    /// Read the stored API key for a provider, if any.
    pub fn get_api_key(&self, provider_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let key = conn
            .query_row(
                "SELECT api_key FROM api_credentials WHERE provider_id = ?1",
                params![provider_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    /// Delete the stored API key for a provider.
    pub fn remove_api_key(&self, provider_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM api_credentials WHERE provider_id = ?1",
            params![provider_id],
        )
        .context("Failed to remove API key")?;
        Ok(())
    }

    /// Set the activation flag for a provider.
    pub fn set_active(&self, provider_id: &str, is_active: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_active (provider_id, is_active) VALUES (?1, ?2)
             ON CONFLICT(provider_id) DO UPDATE SET is_active = excluded.is_active",
            params![provider_id, is_active as i64],
        )
        .context("Failed to save activation flag")?;
        Ok(())
    }

    /// Read the activation flag for a provider, if one was ever stored.
    pub fn get_active(&self, provider_id: &str) -> Result<Option<bool>> {
        let conn = self.conn.lock().unwrap();
        let active = conn
            .query_row(
                "SELECT is_active FROM api_active WHERE provider_id = ?1",
                params![provider_id],
                |row| row.get::<_, i64>(0).map(|v| v != 0),
            )
            .optional()?;
        Ok(active)
    }

    /// Seed activation defaults on first run. Only writes when the table is
    /// empty; a restart never overwrites stored flags.
    pub fn seed_active_defaults(&self, defaults: &[(&str, bool)]) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM api_active", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(false);
        }
        for (provider_id, is_active) in defaults {
            conn.execute(
                "INSERT INTO api_active (provider_id, is_active) VALUES (?1, ?2)",
                params![provider_id, *is_active as i64],
            )
            .context("Failed to seed activation defaults")?;
        }
        Ok(true)
    }

    /// Read the usage record for a provider, if one exists.
    pub fn get_usage(&self, provider_id: &str) -> Result<Option<UsageRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT used, usage_limit, last_reset FROM api_usage WHERE provider_id = ?1",
                params![provider_id],
                |row| {
                    Ok(UsageRecord {
                        used: row.get::<_, i64>(0)? as u32,
                        limit: row.get::<_, i64>(1)? as u32,
                        last_reset: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Store (or replace) the usage record for a provider.
    pub fn put_usage(&self, provider_id: &str, record: &UsageRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_usage (provider_id, used, usage_limit, last_reset)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(provider_id) DO UPDATE SET
                 used = excluded.used,
                 usage_limit = excluded.usage_limit,
                 last_reset = excluded.last_reset",
            params![
                provider_id,
                record.used as i64,
                record.limit as i64,
                record.last_reset
            ],
        )
        .context("Failed to save usage record")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_db() -> Database {
        Database::in_memory().expect("in-memory database")
    }

    // ==================== Credential Tests ====================

    #[test]
    fn test_api_key_roundtrip() {
        let db = test_db();

        assert!(db.get_api_key("openai").unwrap().is_none());

        db.set_api_key("openai", "sk-test-123").unwrap();
        assert_eq!(
            db.get_api_key("openai").unwrap(),
            Some("sk-test-123".to_string())
        );
    }

    #[test]
    fn test_api_key_overwrite() {
        let db = test_db();

        db.set_api_key("google", "first").unwrap();
        db.set_api_key("google", "second").unwrap();

        assert_eq!(
            db.get_api_key("google").unwrap(),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_api_key_remove() {
        let db = test_db();

        db.set_api_key("mymemory", "key").unwrap();
        db.remove_api_key("mymemory").unwrap();

        assert!(db.get_api_key("mymemory").unwrap().is_none());
    }

    #[test]
    fn test_api_keys_are_per_provider() {
        let db = test_db();

        db.set_api_key("openai", "key-a").unwrap();
        db.set_api_key("google", "key-b").unwrap();

        assert_eq!(db.get_api_key("openai").unwrap(), Some("key-a".to_string()));
        assert_eq!(db.get_api_key("google").unwrap(), Some("key-b".to_string()));
    }

    // ==================== Activation Flag Tests ====================

    #[test]
    fn test_active_flag_roundtrip() {
        let db = test_db();

        assert!(db.get_active("openai").unwrap().is_none());

        db.set_active("openai", true).unwrap();
        assert_eq!(db.get_active("openai").unwrap(), Some(true));

        db.set_active("openai", false).unwrap();
        assert_eq!(db.get_active("openai").unwrap(), Some(false));
    }

    #[test]
    fn test_seed_active_defaults_first_run_only() {
        let db = test_db();

        let seeded = db
            .seed_active_defaults(&[("openai", true), ("google", false)])
            .unwrap();
        assert!(seeded);
        assert_eq!(db.get_active("openai").unwrap(), Some(true));
        assert_eq!(db.get_active("google").unwrap(), Some(false));

        // A second seed must not clobber user choices
        db.set_active("google", true).unwrap();
        let seeded_again = db.seed_active_defaults(&[("google", false)]).unwrap();
        assert!(!seeded_again);
        assert_eq!(db.get_active("google").unwrap(), Some(true));
    }

    // ==================== Usage Record Tests ====================

    #[test]
    fn test_usage_record_roundtrip() {
        let db = test_db();

        assert!(db.get_usage("libretranslate").unwrap().is_none());

        let record = UsageRecord {
            used: 3,
            limit: 100,
            last_reset: Utc::now().to_rfc3339(),
        };
        db.put_usage("libretranslate", &record).unwrap();

        assert_eq!(db.get_usage("libretranslate").unwrap(), Some(record));
    }

    #[test]
    fn test_usage_record_upsert() {
        let db = test_db();
        let now = Utc::now().to_rfc3339();

        db.put_usage(
            "mymemory",
            &UsageRecord {
                used: 1,
                limit: 1000,
                last_reset: now.clone(),
            },
        )
        .unwrap();
        db.put_usage(
            "mymemory",
            &UsageRecord {
                used: 2,
                limit: 1000,
                last_reset: now,
            },
        )
        .unwrap();

        assert_eq!(db.get_usage("mymemory").unwrap().unwrap().used, 2);
    }

    #[test]
    fn test_usage_record_serde_shape() {
        let record = UsageRecord {
            used: 5,
            limit: 100,
            last_reset: "2025-01-01T00:00:00+00:00".to_string(),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"used\":5"));
        assert!(json.contains("\"limit\":100"));
        // Wire shape keeps the product's camelCase key
        assert!(json.contains("\"lastReset\""));
    }

    #[test]
    fn test_on_disk_database_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new(path).unwrap();
            db.set_api_key("openai", "persisted").unwrap();
        }

        let reopened = Database::new(path).unwrap();
        assert_eq!(
            reopened.get_api_key("openai").unwrap(),
            Some("persisted".to_string())
        );
    }
}
