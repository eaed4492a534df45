//!  Storage is organized through [snapshot_storage::SnapshotStorage].
//!  The basic idea is:
//!   - There is a directory with all the data.
//!   - Each local day is stored as one snapshot file `track-YYYYMMDD.json` holding the exported
//!     timeline and the daily note.
//!   - When a day ends its snapshot is additionally written to `track-backup-YYYYMMDD.json`.
//!   - Category rules live in `category_rules.json` and are shared by all days.

pub mod entities;
pub mod snapshot_storage;
