//!  Storage is organized through [log_storage::JsonLogStorage].
//!  The basic idea is:
//!   - There is a single json document holding the [entities::LogStore] of this machine.
//!   - The store is partitioned by local calendar date.
//!   - The document is always rewritten as a whole.

pub mod entities;
pub mod log_storage;
