// 🔁 Rank Transition Engine - proposed → applied
//
// A promotion request is canonicalized through the stripe codec into the
// next RankState, the persisted fields for that state, and the history entry
// describing the change. Nothing is written here: the caller hands the
// result to the store, which applies it atomically or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entities::{Belt, BeltCatalog, PersistedRank};
use crate::error::{RankError, Result};
use crate::history::{ChainLink, RankHistoryEntry};
use crate::stripes::{StripeCodec, StripePattern};

// ============================================================================
// STRIPE MODE
// ============================================================================

/// How the stripes of a rank were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripeMode {
    /// Pattern edited by hand, any belt
    Manual,

    /// Youth curriculum degree (0..11)
    Curriculum,
}

impl StripeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StripeMode::Manual => "manual",
            StripeMode::Curriculum => "curriculum",
        }
    }
}

// ============================================================================
// RANK STATE
// ============================================================================

/// Live rank of a member.
///
/// Invariants:
/// - `stripe_count == StripeCodec::count_from_pattern(&pattern)`
/// - `degree.is_some()` only in `Curriculum` mode on a youth belt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankState {
    pub belt: Belt,
    pub pattern: StripePattern,
    pub stripe_count: u8,
    pub degree: Option<u8>,
    pub mode: StripeMode,
}

/// Full copy of a RankState stored in the history ledger
pub type RankStateSnapshot = RankState;

impl RankState {
    /// Manually chosen pattern on any belt
    pub fn manual(belt: Belt, pattern: StripePattern) -> Self {
        RankState {
            belt,
            stripe_count: StripeCodec::count_from_pattern(&pattern),
            pattern,
            degree: None,
            mode: StripeMode::Manual,
        }
    }

    /// Curriculum degree on a youth belt. Adult belts fall back to manual.
    pub fn curriculum(belt: Belt, degree: i64) -> Self {
        let pattern = StripeCodec::from_degree(degree);
        if !BeltCatalog::is_youth_family(&belt) {
            return RankState::manual(belt, pattern);
        }

        RankState {
            belt,
            stripe_count: StripeCodec::count_from_pattern(&pattern),
            pattern,
            degree: Some(StripeCodec::clamp_degree(degree)),
            mode: StripeMode::Curriculum,
        }
    }

    /// Fresh rank: no stripes
    pub fn unstriped(belt: Belt) -> Self {
        RankState::manual(belt, StripePattern::EMPTY)
    }

    /// Check both invariants
    pub fn is_consistent(&self) -> bool {
        let count_ok = self.stripe_count == StripeCodec::count_from_pattern(&self.pattern);
        let degree_ok = match self.mode {
            StripeMode::Manual => self.degree.is_none(),
            StripeMode::Curriculum => {
                self.degree.is_some() && BeltCatalog::is_youth_family(&self.belt)
            }
        };
        count_ok && degree_ok
    }
}

// ============================================================================
// PROMOTION REQUEST
// ============================================================================

/// What staff asked for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub belt: Belt,
    pub mode: StripeMode,

    /// Unvalidated pattern as submitted (Manual mode)
    #[serde(default)]
    pub manual_pattern: Option<Vec<serde_json::Value>>,

    /// Requested degree (Curriculum mode); clamped to 0..11
    #[serde(default)]
    pub degree: Option<i64>,

    #[serde(default)]
    pub note: Option<String>,

    /// Who is promoting; unset means the service's configured default
    #[serde(default)]
    pub actor: Option<String>,

    /// Curriculum on an adult belt is coerced to Manual instead of rejected
    #[serde(default)]
    pub fallback_to_manual: bool,
}

/// Actor recorded when neither the request nor the service names one
pub const DEFAULT_ACTOR: &str = "staff";

impl PromotionRequest {
    /// Manual request from a raw pattern
    pub fn manual(belt: impl Into<Belt>, pattern: Vec<serde_json::Value>) -> Self {
        PromotionRequest {
            belt: belt.into(),
            mode: StripeMode::Manual,
            manual_pattern: Some(pattern),
            degree: None,
            note: None,
            actor: None,
            fallback_to_manual: false,
        }
    }

    /// Curriculum request at `degree`
    pub fn curriculum(belt: impl Into<Belt>, degree: i64) -> Self {
        PromotionRequest {
            belt: belt.into(),
            mode: StripeMode::Curriculum,
            manual_pattern: None,
            degree: Some(degree),
            note: None,
            actor: None,
            fallback_to_manual: false,
        }
    }

    /// Builder: attach a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Builder: who is promoting
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Named actor, ignoring blanks
    pub fn named_actor(&self) -> Option<&str> {
        self.actor
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Builder: coerce a curriculum request on an adult belt to manual
    pub fn allow_fallback(mut self) -> Self {
        self.fallback_to_manual = true;
        self
    }
}

// ============================================================================
// TRANSITION RESULT
// ============================================================================

/// A proposed (not yet applied) promotion
#[derive(Debug, Clone)]
pub struct RankTransition {
    pub next_state: RankState,

    /// Fields to write on the member record (empty patterns omitted)
    pub persisted: PersistedRank,

    pub history_entry: RankHistoryEntry,

    /// Curriculum request was coerced to Manual
    pub coerced: bool,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RankTransitionEngine;

impl RankTransitionEngine {
    pub fn new() -> Self {
        RankTransitionEngine
    }

    /// Propose a promotion, stamped now.
    ///
    /// `head` is the member's latest ledger link, if any; the new entry
    /// continues its sequence and digest chain.
    pub fn propose(
        &self,
        member_id: &str,
        current: &RankState,
        request: &PromotionRequest,
        head: Option<&ChainLink>,
    ) -> Result<RankTransition> {
        self.propose_at(member_id, current, request, head, Utc::now())
    }

    /// Same as `propose` with an explicit timestamp
    pub fn propose_at(
        &self,
        member_id: &str,
        current: &RankState,
        request: &PromotionRequest,
        head: Option<&ChainLink>,
        at: DateTime<Utc>,
    ) -> Result<RankTransition> {
        let (next_state, coerced) = self.next_state(current, request)?;
        let persisted = PersistedRank::from_state(&next_state);

        let history_entry = RankHistoryEntry::new(
            member_id,
            current.clone(),
            next_state.clone(),
            request.named_actor().unwrap_or(DEFAULT_ACTOR),
            request.note.clone(),
            head,
            at,
        );

        Ok(RankTransition {
            next_state,
            persisted,
            history_entry,
            coerced,
        })
    }

    /// Canonical next state for a request (no ledger entry).
    pub fn next_state(&self, current: &RankState, request: &PromotionRequest) -> Result<(RankState, bool)> {
        match request.mode {
            StripeMode::Manual => {
                let raw = request.manual_pattern.as_deref().unwrap_or(&[]);
                let pattern = StripeCodec::normalize_from_raw(raw);
                Ok((RankState::manual(request.belt.clone(), pattern), false))
            }
            StripeMode::Curriculum => {
                // Missing degree keeps the current curriculum position
                let degree = request
                    .degree
                    .or_else(|| current.degree.map(i64::from))
                    .unwrap_or(0);

                if StripeCodec::degree_is_applicable(&request.belt) {
                    return Ok((RankState::curriculum(request.belt.clone(), degree), false));
                }

                if !request.fallback_to_manual {
                    return Err(RankError::InvalidRequest(format!(
                        "curriculum degrees only apply to youth belts, got '{}'",
                        request.belt
                    )));
                }

                // Keep the stripes the form was showing, drop the degree
                let pattern = match &request.manual_pattern {
                    Some(raw) => StripeCodec::normalize_from_raw(raw),
                    None => StripeCodec::from_degree(degree),
                };

                warn!(
                    belt = %request.belt,
                    "curriculum request on non-youth belt coerced to manual"
                );

                Ok((RankState::manual(request.belt.clone(), pattern), true))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripes::StripeToken;
    use serde_json::json;

    fn engine() -> RankTransitionEngine {
        RankTransitionEngine::new()
    }

    #[test]
    fn test_manual_promotion() {
        let current = RankState::unstriped(Belt::new("white"));
        let request = PromotionRequest::manual("blue", vec![json!("white"), json!("white")])
            .with_note("Great roll at open mat")
            .with_actor("coach_ana");

        let t = engine().propose("m-1", &current, &request, None).unwrap();

        assert_eq!(t.next_state.belt, Belt::new("blue"));
        assert_eq!(t.next_state.stripe_count, 2);
        assert_eq!(t.next_state.mode, StripeMode::Manual);
        assert_eq!(t.next_state.degree, None);
        assert!(t.next_state.is_consistent());
        assert!(!t.coerced);

        assert_eq!(t.persisted.stripe_count, 2);
        assert_eq!(t.persisted.stripe_pattern, Some(t.next_state.pattern));

        assert_eq!(t.history_entry.previous, current);
        assert_eq!(t.history_entry.next, t.next_state);
        assert_eq!(t.history_entry.actor, "coach_ana");
        assert_eq!(t.history_entry.sequence, 1);
    }

    #[test]
    fn test_manual_mode_drops_degree_on_youth_belt() {
        let current = RankState::curriculum(Belt::new("grey"), 6);
        let request = PromotionRequest::manual("grey", vec![json!("black")]);

        let (next, _) = engine().next_state(&current, &request).unwrap();

        assert_eq!(next.mode, StripeMode::Manual);
        assert_eq!(next.degree, None);
        assert_eq!(next.pattern.slots()[0], StripeToken::Black);
    }

    #[test]
    fn test_curriculum_promotion() {
        let current = RankState::curriculum(Belt::new("grey/white"), 8);
        let request = PromotionRequest::curriculum("grey/white", 9);

        let t = engine().propose("kid-7", &current, &request, None).unwrap();

        assert_eq!(t.next_state.mode, StripeMode::Curriculum);
        assert_eq!(t.next_state.degree, Some(9));
        assert_eq!(t.next_state.pattern, StripeCodec::from_degree(9));
        assert_eq!(t.next_state.stripe_count, 4);
        assert_eq!(t.persisted.degree, Some(9));
    }

    #[test]
    fn test_curriculum_degree_clamped() {
        let current = RankState::unstriped(Belt::new("yellow"));
        let request = PromotionRequest::curriculum("yellow", 25);

        let (next, _) = engine().next_state(&current, &request).unwrap();
        assert_eq!(next.degree, Some(11));
    }

    #[test]
    fn test_curriculum_on_adult_belt_rejected() {
        let current = RankState::curriculum(Belt::new("green"), 4);
        let request = PromotionRequest::curriculum("blue", 4);

        let err = engine().propose("m-2", &current, &request, None).unwrap_err();
        assert!(matches!(err, RankError::InvalidRequest(_)));
    }

    #[test]
    fn test_curriculum_on_adult_belt_coerced_with_fallback() {
        let current = RankState::curriculum(Belt::new("green/black"), 11);
        let request = PromotionRequest::curriculum("white", 5).allow_fallback();

        let t = engine().propose("m-3", &current, &request, None).unwrap();

        assert!(t.coerced);
        assert_eq!(t.next_state.mode, StripeMode::Manual);
        assert_eq!(t.next_state.degree, None);
        assert_eq!(t.next_state.pattern, StripeCodec::from_degree(5));
        assert_eq!(t.persisted.degree, None);
        assert!(t.next_state.is_consistent());
    }

    #[test]
    fn test_family_mode_consistency() {
        let current = RankState::unstriped(Belt::new("white"));

        for belt in ["white", "blue", "purple", "brown", "black", "no-such-belt"] {
            for degree in [-2, 0, 3, 7, 11, 40] {
                for fallback in [false, true] {
                    let mut request = PromotionRequest::curriculum(belt, degree);
                    request.fallback_to_manual = fallback;

                    if let Ok((next, _)) = engine().next_state(&current, &request) {
                        assert_eq!(next.degree, None, "{} @ {}", belt, degree);
                        assert!(next.is_consistent());
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_pattern_omitted_from_persisted_fields() {
        let current = RankState::manual(
            Belt::new("blue"),
            StripeCodec::from_legacy_count(3, StripeToken::White),
        );
        let request = PromotionRequest::manual("purple", vec![]);

        let t = engine().propose("m-4", &current, &request, None).unwrap();

        assert!(t.next_state.pattern.is_empty());
        assert_eq!(t.persisted.stripe_count, 0);
        assert_eq!(t.persisted.stripe_pattern, None);
    }

    #[test]
    fn test_missing_degree_keeps_current_position() {
        let current = RankState::curriculum(Belt::new("orange"), 3);
        let mut request = PromotionRequest::curriculum("orange", 0);
        request.degree = None;

        let (next, _) = engine().next_state(&current, &request).unwrap();
        assert_eq!(next.degree, Some(3));
    }

    #[test]
    fn test_history_continues_chain_head() {
        let current = RankState::unstriped(Belt::new("white"));
        let head = ChainLink {
            sequence: 4,
            digest: "abc".to_string(),
        };

        let t = engine()
            .propose("m-5", &current, &PromotionRequest::manual("white", vec![json!("black")]), Some(&head))
            .unwrap();

        assert_eq!(t.history_entry.sequence, 5);
        assert_eq!(t.history_entry.previous_digest.as_deref(), Some("abc"));
        assert!(t.history_entry.verify_digest());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: PromotionRequest = serde_json::from_value(json!({
            "belt": "Grey",
            "mode": "curriculum",
            "degree": 2
        }))
        .unwrap();

        assert_eq!(request.belt, Belt::new("grey"));
        assert!(request.actor.is_none());
        assert!(!request.fallback_to_manual);
        assert!(request.manual_pattern.is_none());
    }

    #[test]
    fn test_unnamed_actor_recorded_as_default() {
        let current = RankState::unstriped(Belt::new("white"));

        let request: PromotionRequest = serde_json::from_value(json!({
            "belt": "blue",
            "mode": "manual",
            "actor": "   "
        }))
        .unwrap();
        assert_eq!(request.named_actor(), None);

        let t = engine().propose("m-1", &current, &request, None).unwrap();
        assert_eq!(t.history_entry.actor, DEFAULT_ACTOR);
    }
}
