// Rank Ledger - Core Library
// Belt & stripe progression with an append-only promotion history.
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod history;
pub mod import;
pub mod promotion;
pub mod store;
pub mod stripes;
pub mod transition;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use db::{setup_database, SqliteStore};
pub use entities::{Belt, BeltCatalog, BeltFamily, BeltInfo, MemberRecord, PersistedRank};
pub use error::{RankError, Result};
pub use history::{
    ChainIssue, ChainLink, ChainReport, HistoryLog, RankHistoryEntry, RankHistoryLedger,
    RecentEntries,
};
pub use import::{import_legacy_members, load_legacy_csv, ImportSummary, LegacyMemberRow};
pub use promotion::{PromotionOutcome, RankService, DEFAULT_HISTORY_LIMIT};
pub use store::{InMemoryStore, PersistenceStore};
pub use stripes::{StripeCodec, StripePattern, StripeToken, MAX_DEGREE, SLOTS};
pub use transition::{
    PromotionRequest, RankState, RankStateSnapshot, RankTransition, RankTransitionEngine,
    StripeMode, DEFAULT_ACTOR,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
