// 🎖️ Promotion Service - the contract exposed to UI / API layers
//
// promote_member: read state → propose → apply atomically
// get_rank_history: newest-first ledger entries (default 10)

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::{Belt, MemberRecord};
use crate::error::{RankError, Result};
use crate::history::{ChainReport, RankHistoryLedger, RecentEntries};
use crate::store::PersistenceStore;
use crate::transition::{PromotionRequest, RankState, RankTransitionEngine, DEFAULT_ACTOR};

/// Default page size for `get_rank_history`
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// What a successful promotion returns
#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
    pub next_state: RankState,
    pub history_entry_id: String,
    pub sequence: i64,

    /// Curriculum request was coerced to manual
    pub coerced: bool,
}

pub struct RankService<S: PersistenceStore> {
    store: S,
    engine: RankTransitionEngine,
    history_limit: usize,
    default_actor: String,
}

impl<S: PersistenceStore> RankService<S> {
    pub fn new(store: S) -> Self {
        RankService {
            store,
            engine: RankTransitionEngine::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_actor: DEFAULT_ACTOR.to_string(),
        }
    }

    /// Builder: default limit for `get_rank_history`
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Builder: actor recorded for requests that name none
    pub fn with_default_actor(mut self, actor: impl Into<String>) -> Self {
        self.default_actor = actor.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> RankHistoryLedger<'_, S> {
        RankHistoryLedger::new(&self.store)
    }

    /// Register a member at `belt` with no stripes (no history entry)
    pub fn enroll_member(
        &self,
        member_id: &str,
        display_name: &str,
        belt: impl Into<Belt>,
    ) -> Result<MemberRecord> {
        let record = MemberRecord::new(member_id, display_name, belt);
        self.store.insert_member(&record)?;
        info!(member_id, belt = %record.rank.belt, "enrolled member");
        Ok(record)
    }

    pub fn rank_state(&self, member_id: &str) -> Result<RankState> {
        self.store.read_rank_state(member_id)
    }

    /// Apply a promotion.
    ///
    /// Fails with `InvalidRequest` for a curriculum request on a non-youth
    /// belt without fallback, and with `PersistenceFailure` when the combined
    /// write did not commit, including when another promotion landed after
    /// the rank was read. Either way the stored rank is unchanged.
    pub fn promote_member(
        &self,
        member_id: &str,
        request: &PromotionRequest,
    ) -> Result<PromotionOutcome> {
        let request = match request.named_actor() {
            Some(_) => Cow::Borrowed(request),
            None => Cow::Owned(request.clone().with_actor(self.default_actor.as_str())),
        };
        let (current, head) = self.store.read_promotion_base(member_id)?;

        let transition = self
            .engine
            .propose(member_id, &current, &request, head.as_ref())?;

        if let Err(e) = self.store.apply_promotion_atomic(
            member_id,
            &transition.next_state,
            &transition.history_entry,
        ) {
            warn!(member_id, error = %e, "promotion not applied");
            return Err(match e {
                RankError::PersistenceFailure(_) | RankError::MemberNotFound(_) => e,
                other => RankError::PersistenceFailure(other.to_string()),
            });
        }

        let entry = &transition.history_entry;
        info!(
            member_id,
            belt = %transition.next_state.belt,
            stripes = transition.next_state.stripe_count,
            mode = transition.next_state.mode.as_str(),
            sequence = entry.sequence,
            actor = %entry.actor,
            "promotion applied"
        );

        Ok(PromotionOutcome {
            history_entry_id: entry.id.clone(),
            sequence: entry.sequence,
            next_state: transition.next_state,
            coerced: transition.coerced,
        })
    }

    /// Newest-first entries; `None` uses the configured default limit
    pub fn get_rank_history(&self, member_id: &str, limit: Option<usize>) -> Result<RecentEntries> {
        self.ledger()
            .list_recent(member_id, limit.unwrap_or(self.history_limit))
    }

    pub fn verify_history(&self, member_id: &str) -> Result<ChainReport> {
        let report = self.ledger().verify(member_id)?;
        if !report.is_intact() {
            warn!(member_id, issues = report.issues.len(), "rank history failed verification");
        }
        Ok(report)
    }

    /// Rank in force at `at`, from the ledger
    pub fn rank_as_of(&self, member_id: &str, at: DateTime<Utc>) -> Result<Option<RankState>> {
        self.ledger().state_as_of(member_id, at)
    }
}

// ============================================================================
// TESTS
// ============================================================================
