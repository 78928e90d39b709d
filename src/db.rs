use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::entities::{MemberRecord, PersistedRank};
use crate::error::{RankError, Result};
use crate::history::{ChainLink, RankHistoryEntry, RecentEntries};
use crate::store::PersistenceStore;
use crate::transition::RankState;

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (no-op for in-memory databases)
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Members Table (live rank)
    // stripe_pattern / degree are NULL when omitted from the logical record
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            member_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            belt TEXT NOT NULL,
            stripe_count INTEGER NOT NULL DEFAULT 0 CHECK (stripe_count BETWEEN 0 AND 4),
            stripe_pattern TEXT,
            degree INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Rank History Table (append-only audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rank_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            member_id TEXT NOT NULL REFERENCES members(member_id),
            sequence INTEGER NOT NULL,
            previous TEXT NOT NULL,
            next TEXT NOT NULL,
            actor TEXT NOT NULL,
            note TEXT,
            created_at TEXT NOT NULL,
            previous_digest TEXT,
            digest TEXT NOT NULL,
            UNIQUE (member_id, sequence)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_history_member ON rank_history(member_id, sequence)",
        [],
    )?;

    Ok(())
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

/// Insert a member record
pub fn insert_member(conn: &Connection, record: &MemberRecord) -> Result<()> {
    let pattern_json = record
        .rank
        .stripe_pattern
        .map(|p| serde_json::to_string(&p))
        .transpose()?;

    let result = conn.execute(
        "INSERT INTO members (
            member_id, display_name, belt, stripe_count, stripe_pattern, degree, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.member_id,
            record.display_name,
            record.rank.belt.as_str(),
            record.rank.stripe_count,
            pattern_json,
            record.rank.degree,
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(RankError::MemberExists(record.member_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Get one member record
pub fn get_member(conn: &Connection, member_id: &str) -> Result<MemberRecord> {
    let record = conn
        .query_row(
            "SELECT member_id, display_name, belt, stripe_count, stripe_pattern, degree, created_at, updated_at
             FROM members
             WHERE member_id = ?1",
            [member_id],
            |row| {
                let belt: String = row.get(2)?;
                let stripe_count: i64 = row.get(3)?;
                let pattern_json: Option<String> = row.get(4)?;
                let degree: Option<i64> = row.get(5)?;
                let created_at: String = row.get(6)?;
                let updated_at: String = row.get(7)?;

                // Stored patterns are external input: re-canonicalize them
                let raw_pattern: Option<Vec<serde_json::Value>> = match pattern_json {
                    Some(json) => Some(parse_json(&json)?),
                    None => None,
                };

                Ok(MemberRecord {
                    member_id: row.get(0)?,
                    display_name: row.get(1)?,
                    rank: PersistedRank::from_raw(
                        &belt,
                        stripe_count,
                        raw_pattern.as_deref(),
                        degree,
                    ),
                    created_at: parse_time(&created_at)?,
                    updated_at: parse_time(&updated_at)?,
                })
            },
        )
        .optional()?;

    record.ok_or_else(|| RankError::MemberNotFound(member_id.to_string()))
}

/// Get all member records, ordered by id
pub fn get_all_members(conn: &Connection) -> Result<Vec<MemberRecord>> {
    let mut stmt = conn.prepare("SELECT member_id FROM members ORDER BY member_id")?;

    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    ids.iter().map(|id| get_member(conn, id)).collect()
}

pub fn count_members(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))?;

    Ok(count)
}

/// Write the live rank and append the ledger entry in ONE transaction.
///
/// The entry must follow the stored ledger tail and its `previous` snapshot
/// must equal the stored rank, both read inside the same transaction.
/// Any failure drops the transaction before commit, which rolls back both.
pub fn apply_promotion(
    conn: &mut Connection,
    member_id: &str,
    next_state: &RankState,
    entry: &RankHistoryEntry,
) -> Result<()> {
    let persisted = PersistedRank::from_state(next_state);
    let pattern_json = persisted
        .stripe_pattern
        .map(|p| serde_json::to_string(&p))
        .transpose()?;
    let previous_json = serde_json::to_string(&entry.previous)?;
    let next_json = serde_json::to_string(&entry.next)?;

    let tx = conn.transaction()?;

    let live = get_member(&tx, member_id)?.rank_state();
    entry.check_previous(&live)?;
    entry.check_follows(get_last_link(&tx, member_id)?.as_ref())?;

    let updated = tx.execute(
        "UPDATE members
         SET belt = ?1,
             stripe_count = ?2,
             stripe_pattern = ?3,
             degree = ?4,
             updated_at = ?5
         WHERE member_id = ?6",
        params![
            persisted.belt.as_str(),
            persisted.stripe_count,
            pattern_json,
            persisted.degree,
            Utc::now().to_rfc3339(),
            member_id,
        ],
    )?;

    if updated == 0 {
        return Err(RankError::MemberNotFound(member_id.to_string()));
    }

    tx.execute(
        "INSERT INTO rank_history (
            entry_id, member_id, sequence, previous, next, actor, note, created_at, previous_digest, digest
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id,
            member_id,
            entry.sequence,
            previous_json,
            next_json,
            entry.actor,
            entry.note,
            entry.created_at.to_rfc3339(),
            entry.previous_digest,
            entry.digest,
        ],
    )?;

    tx.commit()?;

    debug!(member_id, sequence = entry.sequence, "promotion committed");
    Ok(())
}

const HISTORY_COLUMNS: &str =
    "entry_id, member_id, sequence, previous, next, actor, note, created_at, previous_digest, digest";

fn history_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RankHistoryEntry> {
    let previous: String = row.get(3)?;
    let next: String = row.get(4)?;
    let created_at: String = row.get(7)?;

    Ok(RankHistoryEntry {
        id: row.get(0)?,
        member_id: row.get(1)?,
        sequence: row.get(2)?,
        previous: parse_json(&previous)?,
        next: parse_json(&next)?,
        actor: row.get(5)?,
        note: row.get(6)?,
        created_at: parse_time(&created_at)?,
        previous_digest: row.get(8)?,
        digest: row.get(9)?,
    })
}

/// Get the newest `limit` history entries for a member
pub fn get_recent_history(
    conn: &Connection,
    member_id: &str,
    limit: usize,
) -> Result<Vec<RankHistoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM rank_history
         WHERE member_id = ?1
         ORDER BY sequence DESC
         LIMIT ?2",
        HISTORY_COLUMNS
    ))?;

    let entries = stmt
        .query_map(params![member_id, limit as i64], history_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(entries)
}

/// Get every history entry for a member, oldest first
pub fn get_full_history(conn: &Connection, member_id: &str) -> Result<Vec<RankHistoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM rank_history
         WHERE member_id = ?1
         ORDER BY sequence ASC",
        HISTORY_COLUMNS
    ))?;

    let entries = stmt
        .query_map([member_id], history_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(entries)
}

/// Latest (sequence, digest) for a member
pub fn get_last_link(conn: &Connection, member_id: &str) -> Result<Option<ChainLink>> {
    let link = conn
        .query_row(
            "SELECT sequence, digest FROM rank_history
             WHERE member_id = ?1
             ORDER BY sequence DESC
             LIMIT 1",
            [member_id],
            |row| {
                Ok(ChainLink {
                    sequence: row.get(0)?,
                    digest: row.get(1)?,
                })
            },
        )
        .optional()?;

    Ok(link)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// `PersistenceStore` backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!(path = %path.display(), "opened rank ledger database");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RankError::PersistenceFailure("database connection lock poisoned".to_string()))
    }

    /// Run a closure against the raw connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    pub fn all_members(&self) -> Result<Vec<MemberRecord>> {
        get_all_members(&*self.lock()?)
    }
}

impl PersistenceStore for SqliteStore {
    fn insert_member(&self, record: &MemberRecord) -> Result<()> {
        insert_member(&*self.lock()?, record)
    }

    fn read_member(&self, member_id: &str) -> Result<MemberRecord> {
        get_member(&*self.lock()?, member_id)
    }

    fn last_link(&self, member_id: &str) -> Result<Option<ChainLink>> {
        get_last_link(&*self.lock()?, member_id)
    }

    fn read_promotion_base(&self, member_id: &str) -> Result<(RankState, Option<ChainLink>)> {
        let conn = self.lock()?;
        let state = get_member(&conn, member_id)?.rank_state();
        Ok((state, get_last_link(&conn, member_id)?))
    }

    fn apply_promotion_atomic(
        &self,
        member_id: &str,
        next_state: &RankState,
        entry: &RankHistoryEntry,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        apply_promotion(&mut conn, member_id, next_state, entry)
    }

    fn list_history(&self, member_id: &str, limit: usize) -> Result<RecentEntries> {
        let entries = get_recent_history(&*self.lock()?, member_id, limit)?;
        Ok(RecentEntries::new(entries))
    }

    fn full_history(&self, member_id: &str) -> Result<Vec<RankHistoryEntry>> {
        get_full_history(&*self.lock()?, member_id)
    }
}
