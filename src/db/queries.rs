// Database queries — key/value operations against the kv_store table.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.
// Expiry is lazy: reads filter out expired rows, `purge_expired` reclaims them.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Current time in unix millis, the unit stored in `expires_at`.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Get a live value by key.
pub fn get(conn: &Connection, key: &str, now: i64) -> Result<Option<Vec<u8>>> {
    let mut stmt = conn.prepare(
        "SELECT value FROM kv_store
         WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
    )?;
    let result = stmt
        .query_row(params![key, now], |row| row.get(0))
        .optional()?;
    Ok(result)
}

/// Upsert a value. Returns false (and writes nothing) when `no_overwrite`
/// is set and a live value already exists.
pub fn set(
    conn: &Connection,
    key: &str,
    value: &[u8],
    expires_at: Option<i64>,
    no_overwrite: bool,
    now: i64,
) -> Result<bool> {
    if no_overwrite && get(conn, key, now)?.is_some() {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO kv_store (key, value, expires_at, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
            value = ?2,
            expires_at = ?3,
            updated_at = datetime('now')",
        params![key, value, expires_at],
    )?;
    Ok(true)
}

/// Delete a key. Returns whether a live value existed.
pub fn delete(conn: &Connection, key: &str, now: i64) -> Result<bool> {
    let existed = get(conn, key, now)?.is_some();
    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
    Ok(existed)
}

/// All live keys starting with `prefix`, in key order.
pub fn keys_with_prefix(conn: &Connection, prefix: &str, now: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT key FROM kv_store
         WHERE substr(key, 1, length(?1)) = ?1
           AND (expires_at IS NULL OR expires_at > ?2)
         ORDER BY key",
    )?;
    let keys = stmt
        .query_map(params![prefix, now], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

/// Remove every expired row. Returns how many were removed.
pub fn purge_expired(conn: &Connection, now: i64) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        params![now],
    )?;
    Ok(removed)
}
