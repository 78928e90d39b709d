// 📥 Legacy Import - count-only member records
//
// Older rosters stored a belt and a bare stripe count. They are imported
// as-is (no pattern, no degree) so that reads keep reconstructing the
// pattern from the belt's default stripe color.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::entities::{Belt, MemberRecord, PersistedRank};
use crate::error::{RankError, Result};
use crate::store::PersistenceStore;

/// One CSV row: `member_id,display_name,belt,stripes`
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyMemberRow {
    pub member_id: String,
    pub display_name: String,
    pub belt: String,

    #[serde(default)]
    pub stripes: i64,
}

impl LegacyMemberRow {
    pub fn into_record(self) -> MemberRecord {
        MemberRecord::with_rank(
            self.member_id.trim(),
            self.display_name.trim(),
            PersistedRank::legacy(self.belt.as_str(), self.stripes),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,

    /// Belt identifiers not in the catalog (imported anyway)
    pub unknown_belts: Vec<String>,
}

pub fn load_legacy_csv(path: &Path) -> Result<Vec<LegacyMemberRow>> {
    let file = std::fs::File::open(path)?;
    load_legacy_reader(file)
}

pub fn load_legacy_reader<R: Read>(reader: R) -> Result<Vec<LegacyMemberRow>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: LegacyMemberRow = result?;
        rows.push(row);
    }

    Ok(rows)
}

/// Insert legacy rows, skipping ids that already exist
pub fn import_legacy_members<S: PersistenceStore + ?Sized>(
    store: &S,
    rows: Vec<LegacyMemberRow>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for row in rows {
        let belt = Belt::new(&row.belt);
        if !belt.is_known() && !summary.unknown_belts.contains(&row.belt) {
            warn!(belt = %row.belt, "legacy row uses a belt missing from the catalog");
            summary.unknown_belts.push(row.belt.clone());
        }

        match store.insert_member(&row.into_record()) {
            Ok(()) => summary.inserted += 1,
            Err(RankError::MemberExists(_)) => summary.duplicates += 1,
            Err(e) => return Err(e),
        }
    }

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "legacy import finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::stripes::{StripeCodec, StripeToken};

    const ROSTER: &str = "member_id,display_name,belt,stripes
m-1,Ana,white,3
m-2,Bruno,purple,2
k-1,Caio,grey/white,9
m-3,Dora,camo,1
";

    #[test]
    fn test_load_legacy_rows() {
        let rows = load_legacy_reader(ROSTER.as_bytes()).unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].member_id, "m-1");
        assert_eq!(rows[2].stripes, 9);
    }

    #[test]
    fn test_import_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();

        let first = import_legacy_members(&store, load_legacy_reader(ROSTER.as_bytes()).unwrap()).unwrap();
        assert_eq!(first.inserted, 4);
        assert_eq!(first.duplicates, 0);
        assert_eq!(first.unknown_belts, vec!["camo".to_string()]);

        let second = import_legacy_members(&store, load_legacy_reader(ROSTER.as_bytes()).unwrap()).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 4);
    }

    #[test]
    fn test_imported_records_use_default_token() {
        let store = SqliteStore::open_in_memory().unwrap();
        import_legacy_members(&store, load_legacy_reader(ROSTER.as_bytes()).unwrap()).unwrap();

        let ana = store.read_rank_state("m-1").unwrap();
        assert_eq!(ana.pattern, StripeCodec::from_legacy_count(3, StripeToken::Black));

        let bruno = store.read_rank_state("m-2").unwrap();
        assert_eq!(bruno.pattern, StripeCodec::from_legacy_count(2, StripeToken::White));

        // Count clamped to 4, no degree on legacy rows
        let caio = store.read_rank_state("k-1").unwrap();
        assert_eq!(caio.stripe_count, 4);
        assert_eq!(caio.degree, None);

        let record = store.read_member("k-1").unwrap();
        assert!(record.rank.stripe_pattern.is_none());
    }

    #[test]
    fn test_bad_row_is_an_error() {
        let csv = "member_id,display_name,belt,stripes\nm-1,Ana,white,lots\n";
        let result = load_legacy_reader(csv.as_bytes());
        assert!(matches!(result, Err(RankError::Csv(_))));
    }
}
