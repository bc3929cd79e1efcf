//! Encrypted connection storage using SQLite.
//!
//! Persists one row per (creator_id, platform). Access and refresh tokens
//! are sealed with AES-256-GCM before they touch disk. Every row carries a
//! version counter; refresh writes go through compare-and-swap on that
//! counter so a failed exchange can never overwrite a token written by a
//! concurrently succeeding one.

use super::{encryption, Connection, ConnectionOrigin, ConnectionStatus, Platform};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// A connection together with the row version it was read at.
///
/// The version is the CAS token for [`ConnectionStore::update_tokens`] and
/// [`ConnectionStore::mark_requires_reconnect`].
#[derive(Clone, Debug)]
pub struct VersionedConnection {
    pub connection: Connection,
    pub version: i64,
}

/// Encrypted connection storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE connections (
///     id INTEGER PRIMARY KEY,
///     creator_id TEXT NOT NULL,
///     platform TEXT NOT NULL,
///     access_token TEXT NOT NULL,   -- sealed
///     refresh_token TEXT,           -- sealed (optional)
///     expires_at TEXT NOT NULL,     -- ISO 8601
///     scopes TEXT NOT NULL,         -- space-separated
///     status TEXT NOT NULL,
///     origin TEXT NOT NULL,
///     version INTEGER NOT NULL,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(creator_id, platform)
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - All mutations are single statements, so SQLite's ACID guarantees
///   prevent partial rows from ever becoming visible
pub struct ConnectionStore {
    conn: Mutex<SqliteConnection>,
    encryption_key: Vec<u8>,
}

impl ConnectionStore {
    /// Creates or opens a connection store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = SqliteConnection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY,
                creator_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT NOT NULL,
                scopes TEXT NOT NULL,
                status TEXT NOT NULL,
                origin TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(creator_id, platform)
            )
            "#,
            [],
        )
        .context("Failed to create connections table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_creator_platform ON connections(creator_id, platform)",
            [],
        )
        .context("Failed to create index")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS aggregator_profiles (
                creator_id TEXT PRIMARY KEY,
                profile_key TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create aggregator_profiles table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Writes a connection, replacing any existing row for the same
    /// (creator_id, platform).
    ///
    /// This is the callback-handler path: unconditional upsert. Replaying
    /// an authorization can only re-write the same row, never add a second
    /// one. The version counter is bumped so in-flight CAS writers lose.
    pub fn upsert(&self, connection: &Connection) -> Result<()> {
        let access_sealed = encryption::seal(&connection.access_token, &self.encryption_key)
            .context("Failed to seal access token")?;

        let refresh_sealed = connection
            .refresh_token
            .as_deref()
            .map(|token| encryption::seal(token, &self.encryption_key))
            .transpose()
            .context("Failed to seal refresh token")?;

        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO connections (
                    creator_id, platform,
                    access_token, refresh_token,
                    expires_at, scopes, status, origin,
                    version, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)
                ON CONFLICT(creator_id, platform) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    scopes = excluded.scopes,
                    status = excluded.status,
                    origin = excluded.origin,
                    version = version + 1,
                    updated_at = excluded.updated_at
                "#,
                params![
                    connection.creator_id,
                    connection.platform.as_str(),
                    access_sealed,
                    refresh_sealed,
                    connection.expires_at.to_rfc3339(),
                    connection.scopes.join(" "),
                    connection.status.as_str(),
                    connection.origin.as_str(),
                    now,
                ],
            )
            .context("Failed to store connection")?;

        Ok(())
    }

    /// Retrieves a connection with its current row version.
    pub fn get(&self, creator_id: &str, platform: Platform) -> Result<Option<VersionedConnection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT access_token, refresh_token, expires_at,
                       scopes, status, origin, version
                FROM connections
                WHERE creator_id = ?1 AND platform = ?2
                "#,
            )
            .context("Failed to prepare query")?;

        let row = stmt
            .query_row(params![creator_id, platform.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .optional()
            .context("Failed to execute query")?;

        let Some((access_sealed, refresh_sealed, expires_at, scopes, status, origin, version)) =
            row
        else {
            return Ok(None);
        };

        let access_token = encryption::open(&access_sealed, &self.encryption_key)
            .context("Failed to open access token")?;

        let refresh_token = refresh_sealed
            .map(|sealed| encryption::open(&sealed, &self.encryption_key))
            .transpose()
            .context("Failed to open refresh token")?;

        Ok(Some(VersionedConnection {
            connection: Connection {
                creator_id: creator_id.to_string(),
                platform,
                access_token,
                refresh_token,
                expires_at: parse_timestamp(&expires_at)?,
                scopes: split_scopes(&scopes),
                status: ConnectionStatus::parse(&status)
                    .ok_or_else(|| anyhow!("Unknown connection status in store: {}", status))?,
                origin: ConnectionOrigin::parse(&origin)
                    .ok_or_else(|| anyhow!("Unknown connection origin in store: {}", origin))?,
            },
            version,
        }))
    }

    /// Lists all connections stored for a creator.
    pub fn list_by_creator(&self, creator_id: &str) -> Result<Vec<Connection>> {
        let platforms: Vec<Platform> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT platform FROM connections WHERE creator_id = ?1 ORDER BY platform",
                )
                .context("Failed to prepare query")?;

            let names = stmt
                .query_map(params![creator_id], |row| row.get::<_, String>(0))
                .context("Failed to execute query")?
                .collect::<Result<Vec<String>, _>>()
                .context("Failed to read results")?;

            names
                .iter()
                .filter_map(|name| Platform::parse(name))
                .collect()
        };

        let mut connections = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if let Some(versioned) = self.get(creator_id, platform)? {
                connections.push(versioned.connection);
            }
        }

        Ok(connections)
    }

    /// Lists all (creator_id, platform) pairs across all creators.
    pub fn list_all(&self) -> Result<Vec<(String, Platform)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT creator_id, platform FROM connections ORDER BY creator_id, platform")
            .context("Failed to prepare query")?;

        let pairs = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("Failed to execute query")?
            .collect::<Result<Vec<(String, String)>, _>>()
            .context("Failed to read results")?;

        Ok(pairs
            .into_iter()
            .filter_map(|(creator, name)| Platform::parse(&name).map(|p| (creator, p)))
            .collect())
    }

    /// Deletes a connection. Returns false if none existed.
    pub fn delete(&self, creator_id: &str, platform: Platform) -> Result<bool> {
        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM connections WHERE creator_id = ?1 AND platform = ?2",
                params![creator_id, platform.as_str()],
            )
            .context("Failed to delete connection")?;

        Ok(rows_affected > 0)
    }

    /// Applies a successful token refresh via compare-and-swap.
    ///
    /// The write only lands if the row version still equals
    /// `expected_version`; returns false when another writer got there
    /// first, in which case the caller must treat the stored row as
    /// authoritative. A `None` rotated refresh token keeps the stored one.
    pub fn update_tokens(
        &self,
        creator_id: &str,
        platform: Platform,
        access_token: &str,
        rotated_refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        expected_version: i64,
    ) -> Result<bool> {
        let access_sealed = encryption::seal(access_token, &self.encryption_key)
            .context("Failed to seal access token")?;

        let refresh_sealed = rotated_refresh_token
            .map(|token| encryption::seal(token, &self.encryption_key))
            .transpose()
            .context("Failed to seal refresh token")?;

        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE connections SET
                    access_token = ?1,
                    refresh_token = COALESCE(?2, refresh_token),
                    expires_at = ?3,
                    status = 'connected',
                    version = version + 1,
                    updated_at = ?4
                WHERE creator_id = ?5 AND platform = ?6 AND version = ?7
                "#,
                params![
                    access_sealed,
                    refresh_sealed,
                    expires_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                    creator_id,
                    platform.as_str(),
                    expected_version,
                ],
            )
            .context("Failed to update tokens")?;

        Ok(rows_affected > 0)
    }

    /// Flags a connection as needing re-authorization, via compare-and-swap.
    ///
    /// Returns false when the row version moved since the caller read it,
    /// meaning a concurrent refresh succeeded and its tokens must stand.
    pub fn mark_requires_reconnect(
        &self,
        creator_id: &str,
        platform: Platform,
        expected_version: i64,
    ) -> Result<bool> {
        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE connections SET
                    status = 'requires_reconnect',
                    version = version + 1,
                    updated_at = ?1
                WHERE creator_id = ?2 AND platform = ?3 AND version = ?4
                "#,
                params![
                    Utc::now().to_rfc3339(),
                    creator_id,
                    platform.as_str(),
                    expected_version,
                ],
            )
            .context("Failed to flag connection")?;

        Ok(rows_affected > 0)
    }

    /// Stores or replaces a creator's aggregator profile key (sealed).
    pub fn set_profile(&self, creator_id: &str, profile_key: &str) -> Result<()> {
        let sealed = encryption::seal(profile_key, &self.encryption_key)
            .context("Failed to seal profile key")?;

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO aggregator_profiles (creator_id, profile_key, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(creator_id) DO UPDATE SET
                    profile_key = excluded.profile_key,
                    updated_at = excluded.updated_at
                "#,
                params![creator_id, sealed, Utc::now().to_rfc3339()],
            )
            .context("Failed to store profile key")?;

        Ok(())
    }

    /// Retrieves a creator's aggregator profile key.
    pub fn get_profile(&self, creator_id: &str) -> Result<Option<String>> {
        let sealed: Option<String> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT profile_key FROM aggregator_profiles WHERE creator_id = ?1",
                params![creator_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query profile key")?
        };

        sealed
            .map(|blob| encryption::open(&blob, &self.encryption_key))
            .transpose()
            .context("Failed to open profile key")
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .context("Failed to parse stored timestamp")
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
