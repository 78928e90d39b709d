// 📜 Rank History Ledger - append-only audit trail of promotions
//
// Every promotion produces exactly one RankHistoryEntry holding FULL
// before/after snapshots (never a delta), so the ledger can be replayed
// or audited without looking at the live member record.
//
// There is no update or delete. A correction is a new promotion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RankError, Result};
use crate::store::PersistenceStore;
use crate::transition::{RankState, RankStateSnapshot};

// ============================================================================
// HISTORY ENTRY
// ============================================================================

/// Immutable record of one applied promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankHistoryEntry {
    /// Entry identity (UUID)
    pub id: String,

    pub member_id: String,

    /// Per-member position in the ledger, starting at 1
    pub sequence: i64,

    pub previous: RankStateSnapshot,
    pub next: RankStateSnapshot,

    /// Who applied the promotion
    pub actor: String,

    pub note: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Digest of the entry before this one (None for the first entry)
    pub previous_digest: Option<String>,

    /// SHA-256 over this entry's content and `previous_digest`
    pub digest: String,
}

/// Tail of a member's ledger: where the next entry attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub sequence: i64,
    pub digest: String,
}

impl RankHistoryEntry {
    pub fn new(
        member_id: &str,
        previous: RankStateSnapshot,
        next: RankStateSnapshot,
        actor: &str,
        note: Option<String>,
        head: Option<&ChainLink>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut entry = RankHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            member_id: member_id.to_string(),
            sequence: head.map_or(1, |h| h.sequence + 1),
            previous,
            next,
            actor: actor.to_string(),
            note,
            created_at,
            previous_digest: head.map(|h| h.digest.clone()),
            digest: String::new(),
        };
        entry.digest = entry.compute_digest();
        entry
    }

    /// Hash of everything except `digest` itself
    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.member_id,
            self.sequence,
            snapshot_json(&self.previous),
            snapshot_json(&self.next),
            self.actor,
            self.note.as_deref().unwrap_or(""),
            self.created_at.to_rfc3339(),
            self.previous_digest.as_deref().unwrap_or(""),
        ));
        format!("{:x}", hasher.finalize())
    }

    pub fn verify_digest(&self) -> bool {
        self.digest == self.compute_digest()
    }

    /// Check that this entry attaches right after `head`
    pub fn check_follows(&self, head: Option<&ChainLink>) -> Result<()> {
        let expected = head.map_or(1, |h| h.sequence + 1);
        if self.sequence != expected {
            return Err(RankError::PersistenceFailure(format!(
                "history sequence {} for member {} does not follow {}",
                self.sequence,
                self.member_id,
                expected - 1
            )));
        }
        if self.previous_digest.as_deref() != head.map(|h| h.digest.as_str()) {
            return Err(RankError::PersistenceFailure(format!(
                "history entry {} for member {} does not link to the ledger tail",
                self.sequence, self.member_id
            )));
        }
        Ok(())
    }

    /// Check that `previous` is the rank the entry is applied over
    pub fn check_previous(&self, live: &RankState) -> Result<()> {
        if &self.previous != live {
            return Err(RankError::PersistenceFailure(format!(
                "promotion for member {} was proposed from a stale rank",
                self.member_id
            )));
        }
        Ok(())
    }

    /// Link the next entry should attach to
    pub fn link(&self) -> ChainLink {
        ChainLink {
            sequence: self.sequence,
            digest: self.digest.clone(),
        }
    }
}

fn snapshot_json(state: &RankState) -> String {
    serde_json::to_string(state).unwrap_or_default()
}

// ============================================================================
// RECENT ENTRIES
// ============================================================================

/// Newest-first entries from one `list_recent` call.
///
/// Finite and single-pass: once consumed it cannot be restarted, ask the
/// ledger again for a fresh read.
#[derive(Debug)]
pub struct RecentEntries {
    inner: std::vec::IntoIter<RankHistoryEntry>,
}

impl RecentEntries {
    pub(crate) fn new(entries: Vec<RankHistoryEntry>) -> Self {
        RecentEntries {
            inner: entries.into_iter(),
        }
    }
}

impl Iterator for RecentEntries {
    type Item = RankHistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RecentEntries {}

// ============================================================================
// IN-MEMORY LOG
// ============================================================================

/// Append-only vector of one member's entries (oldest first)
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    entries: Vec<RankHistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `entry` can be appended right after the tail
    pub fn check_append(&self, entry: &RankHistoryEntry) -> Result<()> {
        let head = self.entries.last().map(|e| e.link());
        entry.check_follows(head.as_ref())
    }

    pub fn append(&mut self, entry: RankHistoryEntry) -> Result<()> {
        self.check_append(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn last(&self) -> Option<&RankHistoryEntry> {
        self.entries.last()
    }

    /// Newest first, at most `limit`
    pub fn recent(&self, limit: usize) -> Vec<RankHistoryEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn entries(&self) -> &[RankHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// CHAIN VERIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChainIssue {
    /// Stored digest does not match content
    DigestMismatch { sequence: i64 },

    /// `previous_digest` does not point at the entry before
    BrokenLink { sequence: i64 },

    /// Sequence not exactly one after the previous entry
    SequenceGap { expected: i64, found: i64 },

    /// `previous` snapshot differs from the prior entry's `next`
    StateDiscontinuity { sequence: i64 },
}

/// Result of verifying a member's ledger
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub member_id: String,
    pub entries_checked: usize,
    pub issues: Vec<ChainIssue>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.issues.is_empty()
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// Read side of the history ledger over a store.
///
/// Appends only happen through `PersistenceStore::apply_promotion_atomic`,
/// together with the member update they describe.
pub struct RankHistoryLedger<'a, S: PersistenceStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: PersistenceStore + ?Sized> RankHistoryLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        RankHistoryLedger { store }
    }

    /// Newest-first entries, bounded by `limit`
    pub fn list_recent(&self, member_id: &str, limit: usize) -> Result<RecentEntries> {
        self.store.list_history(member_id, limit)
    }

    /// Check digests, sequence and snapshot continuity for a member
    pub fn verify(&self, member_id: &str) -> Result<ChainReport> {
        let entries = self.store.full_history(member_id)?;
        Ok(Self::verify_chain(member_id, &entries))
    }

    /// Verify entries given oldest first
    pub fn verify_chain(member_id: &str, entries: &[RankHistoryEntry]) -> ChainReport {
        let mut issues = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if !entry.verify_digest() {
                issues.push(ChainIssue::DigestMismatch {
                    sequence: entry.sequence,
                });
            }

            let prior = if i > 0 { entries.get(i - 1) } else { None };
            let expected_sequence = prior.map_or(1, |p| p.sequence + 1);
            if entry.sequence != expected_sequence {
                issues.push(ChainIssue::SequenceGap {
                    expected: expected_sequence,
                    found: entry.sequence,
                });
            }

            if entry.previous_digest.as_deref() != prior.map(|p| p.digest.as_str()) {
                issues.push(ChainIssue::BrokenLink {
                    sequence: entry.sequence,
                });
            }

            if let Some(p) = prior {
                if p.next != entry.previous {
                    issues.push(ChainIssue::StateDiscontinuity {
                        sequence: entry.sequence,
                    });
                }
            }
        }

        ChainReport {
            member_id: member_id.to_string(),
            entries_checked: entries.len(),
            issues,
        }
    }

    /// Rank in force at `at`, reconstructed from the ledger alone
    pub fn state_as_of(&self, member_id: &str, at: DateTime<Utc>) -> Result<Option<RankState>> {
        let entries = self.store.full_history(member_id)?;
        Ok(Self::state_at(&entries, at))
    }

    /// Entries oldest first. Before the first promotion the rank is that
    /// entry's `previous`; with no entries nothing can be said.
    pub fn state_at(entries: &[RankHistoryEntry], at: DateTime<Utc>) -> Option<RankState> {
        match entries.iter().rev().find(|e| e.created_at <= at) {
            Some(entry) => Some(entry.next.clone()),
            None => entries.first().map(|e| e.previous.clone()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
