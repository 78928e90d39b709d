// 👤 Member Record - what the store keeps per member
//
// The persisted rank is NOT the same shape as the live RankState:
// - `stripePattern` is only present when at least one slot is filled
// - `degree` is only present for curriculum ranks on youth belts
//
// Legacy records carry a count and no pattern at all. Reading them back
// reconstructs a plausible pattern from the belt's default stripe color.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::belt::{Belt, BeltCatalog};
use crate::stripes::{StripeCodec, StripePattern};
use crate::transition::{RankState, StripeMode};

// ============================================================================
// PERSISTED RANK
// ============================================================================

/// Rank fields as written on the member record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRank {
    pub belt: Belt,

    /// 0..4
    pub stripe_count: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_pattern: Option<StripePattern>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<u8>,
}

impl PersistedRank {
    /// Fields to persist for a live state (empty pattern omitted)
    pub fn from_state(state: &RankState) -> Self {
        PersistedRank {
            belt: state.belt.clone(),
            stripe_count: state.stripe_count,
            stripe_pattern: if state.pattern.is_empty() {
                None
            } else {
                Some(state.pattern)
            },
            degree: match state.mode {
                StripeMode::Curriculum => state.degree,
                StripeMode::Manual => None,
            },
        }
    }

    /// Legacy record: count only
    pub fn legacy(belt: impl Into<Belt>, stripe_count: i64) -> Self {
        PersistedRank {
            belt: belt.into(),
            stripe_count: stripe_count.clamp(0, 4) as u8,
            stripe_pattern: None,
            degree: None,
        }
    }

    /// Build from untrusted stored columns; the pattern is re-canonicalized
    pub fn from_raw(
        belt: &str,
        stripe_count: i64,
        stripe_pattern: Option<&[serde_json::Value]>,
        degree: Option<i64>,
    ) -> Self {
        let pattern = stripe_pattern
            .map(StripeCodec::normalize_from_raw)
            .filter(|p| !p.is_empty());

        PersistedRank {
            belt: Belt::new(belt),
            stripe_count: stripe_count.clamp(0, 4) as u8,
            stripe_pattern: pattern,
            degree: degree.map(StripeCodec::clamp_degree),
        }
    }

    /// Canonical live state for this record.
    ///
    /// A degree on a youth belt selects curriculum mode and the pattern is
    /// derived from it. Otherwise the stored pattern is used, or rebuilt from
    /// the count with the belt's default stripe color. The count is always
    /// recomputed from the resulting pattern.
    pub fn into_state(&self) -> RankState {
        if let Some(degree) = self.degree {
            if BeltCatalog::is_youth_family(&self.belt) {
                return RankState::curriculum(self.belt.clone(), degree as i64);
            }
        }

        let pattern = match self.stripe_pattern {
            Some(p) => p,
            None => StripeCodec::from_legacy_count(
                self.stripe_count as i64,
                BeltCatalog::default_senior_token(&self.belt),
            ),
        };

        RankState::manual(self.belt.clone(), pattern)
    }
}

// ============================================================================
// MEMBER RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Stable identity
    pub member_id: String,

    pub display_name: String,

    pub rank: PersistedRank,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberRecord {
    /// New member on `belt` with no stripes
    pub fn new(member_id: impl Into<String>, display_name: impl Into<String>, belt: impl Into<Belt>) -> Self {
        Self::with_rank(member_id, display_name, PersistedRank::legacy(belt, 0))
    }

    pub fn with_rank(
        member_id: impl Into<String>,
        display_name: impl Into<String>,
        rank: PersistedRank,
    ) -> Self {
        let now = Utc::now();
        MemberRecord {
            member_id: member_id.into(),
            display_name: display_name.into(),
            rank,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn rank_state(&self) -> RankState {
        self.rank.into_state()
    }
}

// ============================================================================
// TESTS
// ============================================================================
