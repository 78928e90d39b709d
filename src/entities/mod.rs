// Entity Models
// Belts are static catalog data; members are the stored records whose rank
// the ledger tracks.

pub mod belt;
pub mod member;

pub use belt::{Belt, BeltCatalog, BeltFamily, BeltInfo};
pub use member::{MemberRecord, PersistedRank};
