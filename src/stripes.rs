// 🎗️ Stripe Codec - Three ways to say "how many stripes"
//
// A stripe count reaches us as:
// 1. A bare legacy count (0..4) with no color information
// 2. A manually edited 4-slot color pattern (unvalidated input)
// 3. A youth curriculum degree (0..11)
//
// All three are converted into the canonical StripePattern. Every function
// here is pure and lenient: out-of-range input is clamped, never rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Number of slots on a belt tip
pub const SLOTS: usize = 4;

/// Highest curriculum degree before the next belt
pub const MAX_DEGREE: u8 = 11;

/// Degree units covered by one wave
const WAVE_SPAN: u8 = 4;

/// Cascading waves used by the curriculum encoding, in order
const WAVES: [StripeToken; 3] = [StripeToken::White, StripeToken::Red, StripeToken::Yellow];

// ============================================================================
// STRIPE TOKEN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripeToken {
    /// Slot unfilled
    None,
    White,
    Red,
    Yellow,
    Black,
}

impl StripeToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            StripeToken::None => "none",
            StripeToken::White => "white",
            StripeToken::Red => "red",
            StripeToken::Yellow => "yellow",
            StripeToken::Black => "black",
        }
    }

    /// Parse one of the five known tokens (exact match)
    pub fn parse(raw: &str) -> Option<StripeToken> {
        match raw {
            "none" => Some(StripeToken::None),
            "white" => Some(StripeToken::White),
            "red" => Some(StripeToken::Red),
            "yellow" => Some(StripeToken::Yellow),
            "black" => Some(StripeToken::Black),
            _ => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        *self != StripeToken::None
    }
}

impl fmt::Display for StripeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STRIPE PATTERN
// ============================================================================

/// Canonical 4-slot pattern. Slot 0 is the most senior (first filled).
///
/// Invariant: filled slots are contiguous from slot 0. Values built from
/// external input go through `StripeCodec::normalize_*`, which restores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StripePattern([StripeToken; SLOTS]);

impl StripePattern {
    pub const EMPTY: StripePattern = StripePattern([StripeToken::None; SLOTS]);

    pub fn slots(&self) -> &[StripeToken; SLOTS] {
        &self.0
    }

    /// All slots unfilled
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|t| !t.is_filled())
    }

    pub fn filled(&self) -> usize {
        self.0.iter().filter(|t| t.is_filled()).count()
    }

    /// Raw JSON form used by persisted records
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|t| serde_json::Value::String(t.as_str().to_string()))
                .collect(),
        )
    }
}

impl Default for StripePattern {
    fn default() -> Self {
        StripePattern::EMPTY
    }
}

impl fmt::Display for StripePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|t| t.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

// ============================================================================
// STRIPE CODEC
// ============================================================================

pub struct StripeCodec;

impl StripeCodec {
    /// Canonicalize an unvalidated pattern (e.g. a JSON array from a form).
    ///
    /// Only the first 4 elements are read. Anything that is not one of the
    /// five known token strings becomes `none`, short input is padded, and
    /// filled slots are compacted towards slot 0.
    pub fn normalize_from_raw(raw: &[serde_json::Value]) -> StripePattern {
        Self::canonicalize(
            raw.iter()
                .take(SLOTS)
                .map(|v| v.as_str().and_then(StripeToken::parse)),
        )
    }

    /// Same as `normalize_from_raw` for string input
    pub fn normalize_from_strs<S: AsRef<str>>(raw: &[S]) -> StripePattern {
        Self::canonicalize(
            raw.iter()
                .take(SLOTS)
                .map(|s| StripeToken::parse(s.as_ref())),
        )
    }

    /// Split "white, red" / "white red" style input into raw tokens
    pub fn pattern_tokens(input: &str) -> Vec<serde_json::Value> {
        input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| serde_json::Value::String(s.to_string()))
            .collect()
    }

    /// Parse "white, red" / "white red" style input
    pub fn parse_pattern(input: &str) -> StripePattern {
        Self::normalize_from_raw(&Self::pattern_tokens(input))
    }

    fn canonicalize<I>(tokens: I) -> StripePattern
    where
        I: Iterator<Item = Option<StripeToken>>,
    {
        let mut slots = [StripeToken::None; SLOTS];
        let mut next = 0;
        let mut gaps = false;

        for token in tokens {
            match token {
                Some(t) if t.is_filled() => {
                    slots[next] = t;
                    next += 1;
                }
                _ => gaps = true,
            }
        }

        if gaps && next > 0 {
            debug!(filled = next, "re-canonicalized stripe pattern input");
        }

        StripePattern(slots)
    }

    /// Pattern for a legacy bare count: `count` leading slots of `fallback`.
    pub fn from_legacy_count(count: i64, fallback: StripeToken) -> StripePattern {
        let filled = count.clamp(0, SLOTS as i64) as usize;
        if filled as i64 != count {
            debug!(count, filled, "clamped legacy stripe count");
        }

        let mut slots = [StripeToken::None; SLOTS];
        for slot in slots.iter_mut().take(filled) {
            *slot = fallback;
        }

        // A `none` fallback still yields an empty (and canonical) pattern
        StripePattern(slots)
    }

    /// Number of filled slots
    pub fn count_from_pattern(pattern: &StripePattern) -> u8 {
        pattern.filled() as u8
    }

    /// Curriculum degree → pattern (cascading waves).
    ///
    /// Each wave covers 4 degrees. The current wave overwrites from slot 0 and
    /// the previous wave's color stays in the remaining slots:
    ///
    /// ```text
    /// 4  → [white, white, white, white]
    /// 5  → [red,   white, white, white]
    /// 9  → [yellow, red,  red,   red  ]
    /// 11 → [yellow, yellow, yellow, red]
    /// ```
    pub fn from_degree(degree: i64) -> StripePattern {
        let degree = Self::clamp_degree(degree);
        if degree == 0 {
            return StripePattern::EMPTY;
        }

        let wave_index = ((degree - 1) / WAVE_SPAN) as usize;
        let position = ((degree - 1) % WAVE_SPAN + 1) as usize;

        let carried = if wave_index > 0 {
            WAVES[wave_index - 1]
        } else {
            StripeToken::None
        };

        let mut slots = [carried; SLOTS];
        for slot in slots.iter_mut().take(position) {
            *slot = WAVES[wave_index];
        }

        StripePattern(slots)
    }

    /// Inverse of `from_degree` for patterns the curriculum can produce
    pub fn degree_from_pattern(pattern: &StripePattern) -> Option<u8> {
        (0..=MAX_DEGREE).find(|d| Self::from_degree(*d as i64) == *pattern)
    }

    /// Clamp a requested degree into `[0, MAX_DEGREE]`
    pub fn clamp_degree(degree: i64) -> u8 {
        let clamped = degree.clamp(0, MAX_DEGREE as i64) as u8;
        if clamped as i64 != degree {
            debug!(degree, clamped, "clamped curriculum degree");
        }
        clamped
    }

    /// Degrees only apply to youth belts
    pub fn degree_is_applicable(belt: &crate::entities::Belt) -> bool {
        crate::entities::BeltCatalog::is_youth_family(belt)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Belt;
    use serde_json::json;
    use super::StripeToken::{Black, None as Empty, Red, White, Yellow};

    fn pattern(slots: [StripeToken; SLOTS]) -> StripePattern {
        StripePattern(slots)
    }

    #[test]
    fn test_normalize_pads_and_truncates() {
        let short = StripeCodec::normalize_from_raw(&[json!("white")]);
        assert_eq!(short, pattern([White, Empty, Empty, Empty]));

        let long = StripeCodec::normalize_from_raw(&[
            json!("red"),
            json!("red"),
            json!("red"),
            json!("red"),
            json!("yellow"),
        ]);
        assert_eq!(long, pattern([Red, Red, Red, Red]));
    }

    #[test]
    fn test_normalize_unknown_values_become_none() {
        let raw = [json!("white"), json!(7), json!("purple"), json!(null)];
        assert_eq!(
            StripeCodec::normalize_from_raw(&raw),
            pattern([White, Empty, Empty, Empty])
        );

        // Case matters: only the exact token strings are accepted
        let raw = [json!("WHITE"), json!("black")];
        assert_eq!(
            StripeCodec::normalize_from_raw(&raw),
            pattern([Black, Empty, Empty, Empty])
        );
    }

    #[test]
    fn test_normalize_compacts_gaps() {
        let raw = [json!("none"), json!("red"), json!("none"), json!("white")];
        assert_eq!(
            StripeCodec::normalize_from_raw(&raw),
            pattern([Red, White, Empty, Empty])
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = vec![
            vec![],
            vec![json!("none"), json!("yellow")],
            vec![json!("black"), json!(1), json!("red"), json!("white"), json!("red")],
            vec![json!({"color": "red"}), json!("white")],
            vec![json!("white"), json!("white"), json!("white"), json!("white")],
        ];

        for raw in inputs {
            let once = StripeCodec::normalize_from_raw(&raw);
            let twice = match once.to_json() {
                serde_json::Value::Array(values) => StripeCodec::normalize_from_raw(&values),
                other => panic!("pattern serialized as {}", other),
            };
            assert_eq!(once, twice, "input {:?}", raw);
        }
    }

    #[test]
    fn test_legacy_count_round_trip() {
        for token in [Empty, White, Red, Yellow, Black] {
            for n in 0..=4i64 {
                let p = StripeCodec::from_legacy_count(n, token);
                let expected = if token.is_filled() { n as u8 } else { 0 };
                assert_eq!(StripeCodec::count_from_pattern(&p), expected);
            }
        }
    }

    #[test]
    fn test_legacy_count_clamped() {
        assert_eq!(StripeCodec::from_legacy_count(-3, White), StripePattern::EMPTY);
        assert_eq!(
            StripeCodec::from_legacy_count(9, Black),
            pattern([Black, Black, Black, Black])
        );
        assert_eq!(
            StripeCodec::from_legacy_count(2, White),
            pattern([White, White, Empty, Empty])
        );
    }

    #[test]
    fn test_degree_boundary_values() {
        assert_eq!(StripeCodec::from_degree(0), pattern([Empty, Empty, Empty, Empty]));
        assert_eq!(StripeCodec::from_degree(1), pattern([White, Empty, Empty, Empty]));
        assert_eq!(StripeCodec::from_degree(4), pattern([White, White, White, White]));
        assert_eq!(StripeCodec::from_degree(5), pattern([Red, White, White, White]));
        assert_eq!(StripeCodec::from_degree(8), pattern([Red, Red, Red, Red]));
        assert_eq!(StripeCodec::from_degree(9), pattern([Yellow, Red, Red, Red]));
        assert_eq!(StripeCodec::from_degree(11), pattern([Yellow, Yellow, Yellow, Red]));
    }

    #[test]
    fn test_degree_clamped() {
        assert_eq!(StripeCodec::from_degree(-1), StripeCodec::from_degree(0));
        assert_eq!(StripeCodec::from_degree(40), StripeCodec::from_degree(11));
        assert_eq!(StripeCodec::clamp_degree(12), MAX_DEGREE);
    }

    #[test]
    fn test_degree_monotonic_fill() {
        for d in 0..MAX_DEGREE as i64 {
            let current = StripeCodec::from_degree(d);
            let next = StripeCodec::from_degree(d + 1);

            for (slot, token) in current.slots().iter().enumerate() {
                if token.is_filled() {
                    assert!(next.slots()[slot].is_filled(), "slot {} emptied at degree {}", slot, d + 1);
                }
            }
            assert!(next.filled() >= current.filled());
        }
    }

    #[test]
    fn test_degree_patterns_are_canonical() {
        for d in 0..=MAX_DEGREE as i64 {
            let p = StripeCodec::from_degree(d);
            assert_eq!(StripeCodec::normalize_from_strs(&p.slots().map(|t| t.as_str())), p);
        }
    }

    #[test]
    fn test_degree_from_pattern() {
        for d in 0..=MAX_DEGREE {
            let p = StripeCodec::from_degree(d as i64);
            assert_eq!(StripeCodec::degree_from_pattern(&p), Some(d));
        }

        assert_eq!(
            StripeCodec::degree_from_pattern(&pattern([Black, Black, Empty, Empty])),
            None
        );
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(
            StripeCodec::parse_pattern("white, red"),
            pattern([White, Red, Empty, Empty])
        );
        assert_eq!(
            StripeCodec::parse_pattern("black black  bogus"),
            pattern([Black, Black, Empty, Empty])
        );
        assert_eq!(StripeCodec::parse_pattern(""), StripePattern::EMPTY);
    }

    #[test]
    fn test_pattern_tokens_kept_raw() {
        // Tokens are only split here; validation happens on normalize
        let tokens = StripeCodec::pattern_tokens(" white,,Red bogus ");
        assert_eq!(tokens, vec![json!("white"), json!("Red"), json!("bogus")]);
        assert!(StripeCodec::pattern_tokens(" , ").is_empty());
    }

    #[test]
    fn test_degree_applicability() {
        assert!(StripeCodec::degree_is_applicable(&Belt::new("grey")));
        assert!(!StripeCodec::degree_is_applicable(&Belt::new("blue")));
    }

    #[test]
    fn test_pattern_serializes_as_array() {
        let p = pattern([White, Red, Empty, Empty]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"["white","red","none","none"]"#);
        assert_eq!(p.to_string(), "[white, red, none, none]");
    }
}
