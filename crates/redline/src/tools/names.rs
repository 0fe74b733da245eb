//! Canonical tool name constants.
//!
//! All tool-name string literals should reference these constants so the
//! coordinator's dispatch and the advertised definitions cannot drift.

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const DELETE_FILE: &str = "delete_file";

/// Every tool the coordinator dispatches, in advertisement order.
pub const ALL: [&str; 3] = [READ_FILE, WRITE_FILE, DELETE_FILE];
