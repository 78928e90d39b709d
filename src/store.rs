// 🗃️ Persistence contract
//
// The core never talks to a database directly. It reads rank state and
// history through this trait and hands each promotion back as ONE call:
// the member update and the ledger append are applied together or not at
// all.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::entities::{MemberRecord, PersistedRank};
use crate::error::{RankError, Result};
use crate::history::{ChainLink, HistoryLog, RankHistoryEntry, RecentEntries};
use crate::transition::RankState;

pub trait PersistenceStore {
    /// Create a member record; fails if the id is taken
    fn insert_member(&self, record: &MemberRecord) -> Result<()>;

    fn read_member(&self, member_id: &str) -> Result<MemberRecord>;

    /// Live rank of a member
    fn read_rank_state(&self, member_id: &str) -> Result<RankState> {
        Ok(self.read_member(member_id)?.rank_state())
    }

    /// Latest ledger link for a member, if any promotion was recorded
    fn last_link(&self, member_id: &str) -> Result<Option<ChainLink>>;

    /// Live rank and ledger tail read together, as the base of a promotion.
    ///
    /// Stores should read both under one lock so no promotion lands between
    /// them.
    fn read_promotion_base(&self, member_id: &str) -> Result<(RankState, Option<ChainLink>)> {
        Ok((self.read_rank_state(member_id)?, self.last_link(member_id)?))
    }

    /// Write `next_state` on the member record and append `entry`, atomically.
    ///
    /// Fails with `PersistenceFailure` unless `entry` follows the ledger tail
    /// and its `previous` snapshot is the live rank.
    fn apply_promotion_atomic(
        &self,
        member_id: &str,
        next_state: &RankState,
        entry: &RankHistoryEntry,
    ) -> Result<()>;

    /// Newest first, at most `limit`
    fn list_history(&self, member_id: &str, limit: usize) -> Result<RecentEntries>;

    /// Every entry for a member, oldest first
    fn full_history(&self, member_id: &str) -> Result<Vec<RankHistoryEntry>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    members: HashMap<String, MemberRecord>,
    history: HashMap<String, HistoryLog>,
}

/// Store kept in process memory.
///
/// Both halves of a promotion are applied while holding a single write
/// lock, so readers never observe one without the other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> RankError {
        RankError::PersistenceFailure("in-memory store lock poisoned".to_string())
    }
}

impl PersistenceStore for InMemoryStore {
    fn insert_member(&self, record: &MemberRecord) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if state.members.contains_key(&record.member_id) {
            return Err(RankError::MemberExists(record.member_id.clone()));
        }
        state.members.insert(record.member_id.clone(), record.clone());
        Ok(())
    }

    fn read_member(&self, member_id: &str) -> Result<MemberRecord> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        state
            .members
            .get(member_id)
            .cloned()
            .ok_or_else(|| RankError::MemberNotFound(member_id.to_string()))
    }

    fn last_link(&self, member_id: &str) -> Result<Option<ChainLink>> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .history
            .get(member_id)
            .and_then(|log| log.last())
            .map(|e| e.link()))
    }

    fn read_promotion_base(&self, member_id: &str) -> Result<(RankState, Option<ChainLink>)> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let member = state
            .members
            .get(member_id)
            .ok_or_else(|| RankError::MemberNotFound(member_id.to_string()))?;
        let head = state
            .history
            .get(member_id)
            .and_then(|log| log.last())
            .map(|e| e.link());
        Ok((member.rank_state(), head))
    }

    fn apply_promotion_atomic(
        &self,
        member_id: &str,
        next_state: &RankState,
        entry: &RankHistoryEntry,
    ) -> Result<()> {
        let mut guard = self.state.write().map_err(|_| Self::poisoned())?;
        let state = &mut *guard;

        // Validate both writes before touching anything
        match state.members.get(member_id) {
            Some(member) => entry.check_previous(&member.rank_state())?,
            None => return Err(RankError::MemberNotFound(member_id.to_string())),
        }
        let log = state.history.entry(member_id.to_string()).or_default();
        log.check_append(entry)?;

        log.append(entry.clone())?;
        if let Some(member) = state.members.get_mut(member_id) {
            member.rank = PersistedRank::from_state(next_state);
            member.updated_at = Utc::now();
        }

        Ok(())
    }

    fn list_history(&self, member_id: &str, limit: usize) -> Result<RecentEntries> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let entries = state
            .history
            .get(member_id)
            .map(|log| log.recent(limit))
            .unwrap_or_default();
        Ok(RecentEntries::new(entries))
    }

    fn full_history(&self, member_id: &str) -> Result<Vec<RankHistoryEntry>> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .history
            .get(member_id)
            .map(|log| log.entries().to_vec())
            .unwrap_or_default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Belt;
    use crate::transition::{PromotionRequest, RankTransitionEngine};
    use serde_json::json;

    #[test]
    fn test_insert_and_read_member() {
        let store = InMemoryStore::new();
        store
            .insert_member(&MemberRecord::new("m-1", "Helio", "blue"))
            .unwrap();

        let state = store.read_rank_state("m-1").unwrap();
        assert_eq!(state.belt, Belt::new("blue"));

        let dup = store.insert_member(&MemberRecord::new("m-1", "Helio", "blue"));
        assert!(matches!(dup, Err(RankError::MemberExists(_))));

        let missing = store.read_rank_state("nobody");
        assert!(matches!(missing, Err(RankError::MemberNotFound(_))));
    }

    #[test]
    fn test_rejected_append_leaves_member_untouched() {
        let store = InMemoryStore::new();
        store
            .insert_member(&MemberRecord::new("m-1", "Helio", "blue"))
            .unwrap();

        let engine = RankTransitionEngine::new();
        let current = store.read_rank_state("m-1").unwrap();
        let request = PromotionRequest::manual("purple", vec![json!("white")]);

        let first = engine.propose("m-1", &current, &request, None).unwrap();
        store
            .apply_promotion_atomic("m-1", &first.next_state, &first.history_entry)
            .unwrap();

        // Proposed from the same stale head: sequence 1 again
        let stale = engine
            .propose("m-1", &current, &PromotionRequest::manual("brown", vec![]), None)
            .unwrap();
        let result = store.apply_promotion_atomic("m-1", &stale.next_state, &stale.history_entry);

        assert!(result.is_err());
        assert_eq!(store.read_rank_state("m-1").unwrap().belt, Belt::new("purple"));
        assert_eq!(store.full_history("m-1").unwrap().len(), 1);
    }

    #[test]
    fn test_stale_previous_rejected_after_interleaved_promotion() {
        let store = InMemoryStore::new();
        store
            .insert_member(&MemberRecord::new("m-1", "Helio", "blue"))
            .unwrap();
        let engine = RankTransitionEngine::new();

        // Rank read before another promotion lands, tail read after it
        let (stale_state, _) = store.read_promotion_base("m-1").unwrap();
        let (_, empty_head) = store.read_promotion_base("m-1").unwrap();
        let other = engine
            .propose("m-1", &stale_state, &PromotionRequest::manual("blue", vec![json!("white")]), empty_head.as_ref())
            .unwrap();
        store
            .apply_promotion_atomic("m-1", &other.next_state, &other.history_entry)
            .unwrap();

        let head = store.last_link("m-1").unwrap();
        let late = engine
            .propose("m-1", &stale_state, &PromotionRequest::manual("purple", vec![]), head.as_ref())
            .unwrap();
        let result = store.apply_promotion_atomic("m-1", &late.next_state, &late.history_entry);

        assert!(matches!(result, Err(RankError::PersistenceFailure(_))));
        assert_eq!(store.read_rank_state("m-1").unwrap(), other.next_state);
        assert_eq!(store.full_history("m-1").unwrap().len(), 1);
    }

    #[test]
    fn test_promotion_for_unknown_member_rejected() {
        let store = InMemoryStore::new();
        let engine = RankTransitionEngine::new();
        let current = RankState::unstriped(Belt::new("white"));

        let t = engine
            .propose("ghost", &current, &PromotionRequest::manual("blue", vec![]), None)
            .unwrap();

        let result = store.apply_promotion_atomic("ghost", &t.next_state, &t.history_entry);
        assert!(matches!(result, Err(RankError::MemberNotFound(_))));
        assert!(store.full_history("ghost").unwrap().is_empty());
    }
}
