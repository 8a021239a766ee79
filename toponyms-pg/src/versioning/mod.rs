//! Versioning temporel des entités et des noms

pub mod diff;
pub mod temporal;
pub mod upsert;

pub use diff::geometry_hash;
pub use temporal::{Interval, NamePlan};
pub use upsert::{
    apply_change, upsert_entity, EntityChange, EntityDeletion, EntityUpsert, NameCounts,
    ToponymOutcome, UpsertResult,
};
