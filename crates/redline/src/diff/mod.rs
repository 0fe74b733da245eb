//! Line-based diff synthesis for a turn's change set.
//!
//! - [`align`]: optimal edit script between two line sequences
//!   ([`align::align`], [`align::split_lines`]).
//! - [`hunk`]: context-windowed hunks and per-file unified-diff text
//!   ([`hunk::build_hunks`], [`hunk::render_file_diff`]).
//!
//! [`render_change_set`] ties both together over a ledger snapshot.

pub mod align;
pub mod hunk;

pub use align::{DiffOp, DiffOpKind, align, split_lines};
pub use hunk::{DEFAULT_CONTEXT_LINES, Hunk, build_hunks, render_file_diff};

use crate::changes::ChangeRecord;

/// Returned by [`render_change_set`] for an empty change set.
pub const NO_CHANGES_MESSAGE: &str = "No file changes in the last LLM turn.";

/// Render every record as a unified diff, in ledger order.
pub fn render_change_set(records: &[ChangeRecord], context: usize) -> String {
    if records.is_empty() {
        return NO_CHANGES_MESSAGE.to_string();
    }
    records
        .iter()
        .map(|r| render_file_diff(&r.path, r.before.as_deref(), r.after.as_deref(), context))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeSetLedger;

    #[test]
    fn empty_change_set_message() {
        assert_eq!(
            render_change_set(&[], DEFAULT_CONTEXT_LINES),
            "No file changes in the last LLM turn."
        );
    }

    #[test]
    fn files_render_in_recording_order() {
        let mut ledger = ChangeSetLedger::new();
        ledger.record("src/z.rs", Some("old\n"), Some("new\n"));
        ledger.record("src/a.rs", None, Some("fresh\n"));
        ledger.record("gone.txt", Some("bye\n"), None);

        let text = render_change_set(&ledger.snapshot(), DEFAULT_CONTEXT_LINES);
        let z = text.find("--- a/src/z.rs").unwrap();
        let a = text.find("+++ b/src/a.rs").unwrap();
        let gone = text.find("--- a/gone.txt").unwrap();
        assert!(z < a && a < gone, "{text}");
        assert!(text.contains("--- /dev/null\n+++ b/src/a.rs"));
        assert!(text.contains("--- a/gone.txt\n+++ /dev/null"));
    }
}
