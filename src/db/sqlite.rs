// SqliteKvStore — rusqlite backend implementing the KvStore trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.
//
// The free functions in queries.rs take `now` explicitly so their tests can
// drive expiry without sleeping; this wrapper always passes the wall clock.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::queries::{self, now_millis};
use super::traits::KvStore;

pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Count the number of user-created tables in the database.
    pub async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }
}

fn expires_at(ttl: Option<Duration>, now: i64) -> Option<i64> {
    ttl.map(|d| now.saturating_add(i64::try_from(d.as_millis()).unwrap_or(i64::MAX)))
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().await;
        queries::get(&conn, key, now_millis())
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        no_overwrite: bool,
    ) -> Result<bool> {
        let now = now_millis();
        let conn = self.conn.lock().await;
        queries::set(&conn, key, &value, expires_at(ttl, now), no_overwrite, now)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::delete(&conn, key, now_millis())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        queries::keys_with_prefix(&conn, prefix, now_millis())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        queries::purge_expired(&conn, now_millis())
    }
}
