//! SQLite cache storage.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::http::headers::{from_pairs, to_pairs};
use crate::http::{Request, Response, ResponseType};

use super::traits::{ensure_storable, CacheStore, CacheSummary, StoredEntry};

/// SQLite-based cache storage implementation.
///
/// Every call runs on the blocking pool against one shared connection.
#[derive(Clone)]
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
  /// Open or create the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-cache").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Run a closure against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn
        .lock()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))?;
      f(&mut conn)
    })
    .await?
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named cache, id order is creation order
CREATE TABLE IF NOT EXISTS cache_storage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cache_entries (
    cache_id INTEGER NOT NULL,
    request_key TEXT NOT NULL,
    request_url TEXT NOT NULL,
    request_headers TEXT NOT NULL,
    response_status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    response_headers TEXT NOT NULL,
    response_body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_id, request_key),
    FOREIGN KEY (cache_id) REFERENCES cache_storage(id) ON DELETE CASCADE
);
"#;

fn cache_id(conn: &Connection, cache_name: &str) -> Result<Option<i64>, StoreError> {
  Ok(
    conn
      .query_row(
        "SELECT id FROM cache_storage WHERE cache_name = ?1",
        params![cache_name],
        |row| row.get(0),
      )
      .optional()?,
  )
}

fn open_cache(conn: &Connection, cache_name: &str) -> Result<i64, StoreError> {
  conn.execute(
    "INSERT OR IGNORE INTO cache_storage (cache_name) VALUES (?1)",
    params![cache_name],
  )?;
  cache_id(conn, cache_name)?
    .ok_or_else(|| StoreError::Unavailable(format!("cache {} vanished after open", cache_name)))
}

fn encode_headers(headers: &reqwest::header::HeaderMap) -> Result<String, StoreError> {
  serde_json::to_string(&to_pairs(headers))
    .map_err(|e| StoreError::Malformed(format!("headers: {}", e)))
}

fn decode_headers(s: &str) -> Result<reqwest::header::HeaderMap, StoreError> {
  let pairs: Vec<(String, String)> =
    serde_json::from_str(s).map_err(|e| StoreError::Malformed(format!("headers: {}", e)))?;
  Ok(from_pairs(pairs))
}

/// Raw columns of an entry row
struct EntryRow {
  request_url: String,
  request_headers: String,
  response_status: u16,
  response_type: String,
  response_headers: String,
  response_body: Vec<u8>,
  cached_at: String,
}

impl EntryRow {
  fn into_entry(self, request: &Request) -> Result<StoredEntry, StoreError> {
    let url = url::Url::parse(&self.request_url)
      .map_err(|e| StoreError::Malformed(format!("url {}: {}", self.request_url, e)))?;
    let status = StatusCode::from_u16(self.response_status)
      .map_err(|e| StoreError::Malformed(format!("status: {}", e)))?;
    let response_type = ResponseType::parse(&self.response_type)
      .ok_or_else(|| StoreError::Malformed(format!("response type {}", self.response_type)))?;

    Ok(StoredEntry {
      request: Request {
        method: request.method.clone(),
        url,
        headers: decode_headers(&self.request_headers)?,
      },
      response: Response {
        status,
        headers: decode_headers(&self.response_headers)?,
        body: Bytes::from(self.response_body),
        response_type,
      },
      cached_at: parse_datetime(&self.cached_at)?,
    })
  }
}

#[async_trait]
impl CacheStore for SqliteStorage {
  async fn open(&self, cache_name: &str) -> Result<(), StoreError> {
    let cache_name = cache_name.to_string();
    self
      .with_conn(move |conn| open_cache(conn, &cache_name).map(|_| ()))
      .await
  }

  async fn has(&self, cache_name: &str) -> Result<bool, StoreError> {
    let cache_name = cache_name.to_string();
    self
      .with_conn(move |conn| Ok(cache_id(conn, &cache_name)?.is_some()))
      .await
  }

  async fn keys(&self) -> Result<Vec<String>, StoreError> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT cache_name FROM cache_storage ORDER BY id")?;
        let names = stmt
          .query_map([], |row| row.get(0))?
          .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
      })
      .await
  }

  async fn delete(&self, cache_name: &str) -> Result<bool, StoreError> {
    let cache_name = cache_name.to_string();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM cache_entries WHERE cache_id IN
             (SELECT id FROM cache_storage WHERE cache_name = ?1)",
          params![cache_name],
        )?;
        let deleted = tx.execute(
          "DELETE FROM cache_storage WHERE cache_name = ?1",
          params![cache_name],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
      })
      .await
  }

  async fn put(
    &self,
    cache_name: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), StoreError> {
    ensure_storable(request, response)?;

    let cache_name = cache_name.to_string();
    let request_key = request.key().digest();
    let request_url = request.url.to_string();
    let request_headers = encode_headers(&request.headers)?;
    let response_status = response.status.as_u16();
    let response_type = response.response_type.as_str();
    let response_headers = encode_headers(&response.headers)?;
    let body = response.body.clone();

    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let cache_id = open_cache(&tx, &cache_name)?;
        tx.execute(
          "INSERT OR REPLACE INTO cache_entries
             (cache_id, request_key, request_url, request_headers, response_status,
              response_type, response_headers, response_body, cached_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))",
          params![
            cache_id,
            request_key,
            request_url,
            request_headers,
            response_status,
            response_type,
            response_headers,
            body.as_ref(),
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await
  }

  async fn match_in(
    &self,
    cache_name: &str,
    request: &Request,
  ) -> Result<Option<Response>, StoreError> {
    let cache_name = cache_name.to_string();
    let request_key = request.key().digest();

    let row = self
      .with_conn(move |conn| {
        let row = conn
          .query_row(
            "SELECT e.request_url, e.request_headers, e.response_status, e.response_type,
                    e.response_headers, e.response_body, e.cached_at
             FROM cache_entries e
             INNER JOIN cache_storage s ON s.id = e.cache_id
             WHERE s.cache_name = ?1 AND e.request_key = ?2",
            params![cache_name, request_key],
            |row| {
              Ok(EntryRow {
                request_url: row.get(0)?,
                request_headers: row.get(1)?,
                response_status: row.get(2)?,
                response_type: row.get(3)?,
                response_headers: row.get(4)?,
                response_body: row.get(5)?,
                cached_at: row.get(6)?,
              })
            },
          )
          .optional()?;
        Ok(row)
      })
      .await?;

    match row {
      Some(row) => {
        let entry = row.into_entry(request)?;
        Ok(entry.matches(request).then_some(entry.response))
      }
      None => Ok(None),
    }
  }

  async fn summary(&self, cache_name: &str) -> Result<CacheSummary, StoreError> {
    let cache_name = cache_name.to_string();
    let (entries, body_bytes, last) = self
      .with_conn(move |conn| {
        let row = conn.query_row(
          "SELECT COUNT(e.request_key), COALESCE(SUM(LENGTH(e.response_body)), 0), MAX(e.cached_at)
           FROM cache_entries e
           INNER JOIN cache_storage s ON s.id = e.cache_id
           WHERE s.cache_name = ?1",
          params![cache_name],
          |row| {
            Ok((
              row.get::<_, i64>(0)?,
              row.get::<_, i64>(1)?,
              row.get::<_, Option<String>>(2)?,
            ))
          },
        )?;
        Ok(row)
      })
      .await?;

    Ok(CacheSummary {
      entries: entries as usize,
      body_bytes: body_bytes as u64,
      last_cached_at: last.as_deref().map(parse_datetime).transpose()?,
    })
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Malformed(format!("datetime '{}': {}", s, e)))
}
