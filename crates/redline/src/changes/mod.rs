//! Turn-scoped change tracking.
//!
//! The [`ChangeSetLedger`] is the single owner of a turn's
//! [`ChangeRecord`]s. It reduces any number of writes and deletes to the
//! same path into one net before/after pair, and drops pairs that cancel
//! out.

pub mod ledger;

pub use ledger::{ChangeKind, ChangeRecord, ChangeSetLedger};
