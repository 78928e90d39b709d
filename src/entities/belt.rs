// 🥋 Belt Catalog - Static metadata about belt identifiers
//
// Belt identifiers are opaque strings stored on member records. The catalog
// only answers questions ABOUT a belt (family, label, colors, default stripe
// color); it never decides which belt may follow which.
//
// Historical records may carry identifiers that are no longer in the table,
// so every accessor falls back to a default entry instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stripes::StripeToken;

// ============================================================================
// BELT IDENTIFIER
// ============================================================================

/// Opaque belt identifier (e.g. "blue", "grey/white").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Belt(String);

impl Belt {
    /// Create a belt identifier (trimmed, lowercased)
    pub fn new(id: impl AsRef<str>) -> Self {
        Belt(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Catalog entry for this belt (falls back to the default entry)
    pub fn info(&self) -> &'static BeltInfo {
        BeltCatalog::lookup(&self.0)
    }

    /// True if this identifier has its own catalog entry
    pub fn is_known(&self) -> bool {
        BeltCatalog::find(&self.0).is_some()
    }
}

impl fmt::Display for Belt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Belt {
    fn from(id: &str) -> Self {
        Belt::new(id)
    }
}

impl From<String> for Belt {
    fn from(id: String) -> Self {
        Belt::new(id)
    }
}

impl From<Belt> for String {
    fn from(belt: Belt) -> Self {
        belt.0
    }
}

// ============================================================================
// BELT FAMILY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeltFamily {
    /// white, blue, purple, brown, black
    Adult,

    /// Base color, optionally combined with a companion color
    Youth,
}

impl BeltFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeltFamily::Adult => "adult",
            BeltFamily::Youth => "youth",
        }
    }
}

// ============================================================================
// CATALOG ENTRY
// ============================================================================

/// Presentation and family metadata for one belt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BeltInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub family: BeltFamily,

    /// Main belt color (hex)
    pub display_color: &'static str,

    /// Companion color for youth combination belts (hex)
    pub companion_color: Option<&'static str>,

    /// Entry-level belt of its family
    pub entry_level: bool,
}

const fn adult(id: &'static str, label: &'static str, color: &'static str, entry: bool) -> BeltInfo {
    BeltInfo {
        id,
        label,
        family: BeltFamily::Adult,
        display_color: color,
        companion_color: None,
        entry_level: entry,
    }
}

const fn youth(
    id: &'static str,
    label: &'static str,
    color: &'static str,
    companion: Option<&'static str>,
    entry: bool,
) -> BeltInfo {
    BeltInfo {
        id,
        label,
        family: BeltFamily::Youth,
        display_color: color,
        companion_color: companion,
        entry_level: entry,
    }
}

const WHITE: &str = "#f5f5f5";
const BLUE: &str = "#1e4fd8";
const PURPLE: &str = "#6b2fa3";
const BROWN: &str = "#6d4321";
const BLACK: &str = "#111111";
const GREY: &str = "#8c8c8c";
const YELLOW: &str = "#f2c200";
const ORANGE: &str = "#f07d00";
const GREEN: &str = "#1f8a3b";

/// Every belt the academy awards. Order is presentation order only.
static BELTS: &[BeltInfo] = &[
    adult("white", "White", WHITE, true),
    adult("blue", "Blue", BLUE, false),
    adult("purple", "Purple", PURPLE, false),
    adult("brown", "Brown", BROWN, false),
    adult("black", "Black", BLACK, false),
    youth("youth-white", "White (Youth)", WHITE, None, true),
    youth("grey/white", "Grey / White", GREY, Some(WHITE), false),
    youth("grey", "Grey", GREY, None, false),
    youth("grey/black", "Grey / Black", GREY, Some(BLACK), false),
    youth("yellow/white", "Yellow / White", YELLOW, Some(WHITE), false),
    youth("yellow", "Yellow", YELLOW, None, false),
    youth("yellow/black", "Yellow / Black", YELLOW, Some(BLACK), false),
    youth("orange/white", "Orange / White", ORANGE, Some(WHITE), false),
    youth("orange", "Orange", ORANGE, None, false),
    youth("orange/black", "Orange / Black", ORANGE, Some(BLACK), false),
    youth("green/white", "Green / White", GREEN, Some(WHITE), false),
    youth("green", "Green", GREEN, None, false),
    youth("green/black", "Green / Black", GREEN, Some(BLACK), false),
];

/// Entry used for identifiers missing from the table.
const DEFAULT_BELT: usize = 0;

// ============================================================================
// BELT CATALOG
// ============================================================================

/// Read-only accessors over the static belt table.
pub struct BeltCatalog;

impl BeltCatalog {
    /// All catalog entries, in presentation order
    pub fn all() -> &'static [BeltInfo] {
        BELTS
    }

    /// Exact catalog entry, if the identifier is known
    pub fn find(id: &str) -> Option<&'static BeltInfo> {
        let id = id.trim();
        BELTS.iter().find(|b| b.id.eq_ignore_ascii_case(id))
    }

    /// Catalog entry, falling back to the default entry for stale identifiers
    pub fn lookup(id: &str) -> &'static BeltInfo {
        Self::find(id).unwrap_or(&BELTS[DEFAULT_BELT])
    }

    pub fn family(belt: &Belt) -> BeltFamily {
        belt.info().family
    }

    pub fn is_youth_family(belt: &Belt) -> bool {
        Self::family(belt) == BeltFamily::Youth
    }

    /// Stripe color assumed for legacy records that only stored a count.
    ///
    /// Entry-level belts wear black bars, every other belt wears white tape.
    /// This only reconstructs a plausible pattern for display and migration.
    /// Unknown identifiers are not entry-level, whatever entry they borrow
    /// their label from.
    pub fn default_senior_token(belt: &Belt) -> StripeToken {
        match Self::find(belt.as_str()) {
            Some(info) if info.entry_level => StripeToken::Black,
            _ => StripeToken::White,
        }
    }

    pub fn label(belt: &Belt) -> &'static str {
        belt.info().label
    }

    pub fn display_color(belt: &Belt) -> &'static str {
        belt.info().display_color
    }
}

// ============================================================================
// TESTS
// ============================================================================
