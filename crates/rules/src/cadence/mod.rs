//! Which jobs fire at a given minute.
//!
//! The cadence is a fixed table of cron rules evaluated against the wall
//! clock. There is no "last run" state: a minute that no tick observed is
//! never backfilled.

mod core;
pub(crate) mod cron;
mod entry;


pub use self::core::{CadenceTable, STANDARD_CADENCE};
pub use self::cron::truncate_to_minute;
pub use self::entry::CadenceEntry;
