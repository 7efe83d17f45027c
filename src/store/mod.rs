// Telemetry store on SQLite. Path-addressed JSON tree with merge-update semantics:
// update(path, {k: v, ..}) replaces each listed child `path/k` and leaves siblings untouched.

mod tree;

use crate::models::{RawSettings, SettingEntry};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub const CURRENT_PATH: &str = "current";
pub const TIMESERIES_PATH: &str = "timeseries";
pub const SETTINGS_PATH: &str = "settings";

pub struct TelemetryStore {
    pool: SqlitePool,
}

impl TelemetryStore {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_nodes (
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Merges `value` into the tree at `path`. An object merges child by child; anything else
    /// replaces the node at `path`.
    #[instrument(skip(self, value), fields(repo = "store", operation = "update"))]
    pub async fn update(&self, path: &str, value: &Value) -> anyhow::Result<()> {
        let path = tree::normalize(path);
        let children: Vec<(String, &Value)> = match value {
            Value::Object(map) if !map.is_empty() => map
                .iter()
                .map(|(k, v)| (tree::join(&path, k), v))
                .collect(),
            _ => {
                anyhow::ensure!(!path.is_empty(), "cannot replace the store root");
                vec![(path.clone(), value)]
            }
        };
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as i64;

        let mut tx = self.pool.begin().await?;
        for (child, v) in children {
            for ancestor in tree::ancestors(&child) {
                sqlx::query("DELETE FROM store_nodes WHERE path = $1")
                    .bind(&ancestor)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query(
                "DELETE FROM store_nodes WHERE path = $1 OR substr(path, 1, length($2)) = $2",
            )
            .bind(&child)
            .bind(format!("{}/", child))
            .execute(&mut *tx)
            .await?;

            let mut rows = Vec::new();
            tree::flatten(&child, v, &mut rows);
            for (leaf, json) in rows {
                sqlx::query("INSERT INTO store_nodes (path, value, updated_at) VALUES ($1, $2, $3)")
                    .bind(&leaf)
                    .bind(&json)
                    .bind(now_ms)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// JSON subtree at `path` (the whole tree for ""), or None when nothing is stored there.
    #[instrument(skip(self), fields(repo = "store", operation = "get"))]
    pub async fn get(&self, path: &str) -> anyhow::Result<Option<Value>> {
        let path = tree::normalize(path);
        let rows = if path.is_empty() {
            sqlx::query("SELECT path, value FROM store_nodes ORDER BY path ASC")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(
                "SELECT path, value FROM store_nodes WHERE path = $1 OR substr(path, 1, length($2)) = $2 ORDER BY path ASC",
            )
            .bind(&path)
            .bind(format!("{}/", path))
            .fetch_all(&self.pool)
            .await?
        };

        let mut leaves = Vec::with_capacity(rows.len());
        for row in rows {
            let leaf: String = row.try_get("path")?;
            let json: String = row.try_get("value")?;
            leaves.push((leaf, serde_json::from_str::<Value>(&json)?));
        }
        Ok(tree::assemble(&path, leaves))
    }

    /// Settings stored under `settings`. Entries that are not `{name, value}` objects are
    /// taken as bare values named after their key.
    pub async fn fetch_settings(&self) -> anyhow::Result<RawSettings> {
        let mut out = RawSettings::new();
        let Some(Value::Object(map)) = self.get(SETTINGS_PATH).await? else {
            return Ok(out);
        };
        for (key, v) in map {
            out.insert(key.clone(), setting_entry(&key, v));
        }
        Ok(out)
    }

    /// Writes settings given as `{key: value}` or `{key: {name, value}}`.
    pub async fn update_settings(&self, values: &serde_json::Map<String, Value>) -> anyhow::Result<()> {
        let mut entries = serde_json::Map::new();
        for (key, v) in values {
            let entry = setting_entry(key, v.clone());
            entries.insert(key.clone(), serde_json::to_value(entry)?);
        }
        self.update(SETTINGS_PATH, &Value::Object(entries)).await
    }
}

fn setting_entry(key: &str, v: Value) -> SettingEntry {
    match v {
        Value::Object(ref m) if m.contains_key("value") => {
            let name = m
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(key)
                .to_string();
            SettingEntry {
                name,
                value: m.get("value").cloned().unwrap_or(Value::Null),
            }
        }
        other => SettingEntry {
            name: key.to_string(),
            value: other,
        },
    }
}
