//!  Storage is organized through [activity_storage::JsonlActivityStorage].
//!  The basic idea is:
//!   - There is a directory per relation: `raw` for every captured event, `activity` for the
//!     per app counters of each flush.
//!   - Both relations are append-only JSON-lines files, one file per UTC day.
//!   - Readers select a local day by reading every UTC file that overlaps it.

pub mod activity_storage;
pub mod entities;
pub mod record_event;
