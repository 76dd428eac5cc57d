//! Data models for directory records and roster history.
//!
//! - `RawRecord`: a crawled directory row before validation
//! - `CanonicalPerson`, `RosterEntry`: the persisted identity and affiliation shapes
//! - `MovementRecord`: JOIN / LEAVE / TRANSFER events
//! - `HeadcountComparison`: probe phase bookkeeping

pub mod headcount;
pub mod movement;
pub mod person;
pub mod roster;

pub use headcount::{HeadcountComparison, HeadcountSummary};
pub use movement::{MovementKind, MovementRecord};
pub use person::{CanonicalPerson, RawRecord};
pub use roster::{CurrentRosterEntry, RosterEntry};
