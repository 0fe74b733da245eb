//! Hunk grouping and unified-diff rendering.

use super::align::{DiffOp, DiffOpKind, align, split_lines};
use std::fmt;

/// Default number of unchanged lines shown around each change.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Header used for the missing side of a created or deleted file.
pub const DEV_NULL: &str = "/dev/null";

/// A contiguous window of the edit script with its unified-diff header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// Body lines, each prefixed with ` `, `+` or `-`.
    pub lines: Vec<String>,
}

impl Hunk {
    /// Build a hunk from a slice of ops and the number of old/new lines
    /// consumed before it.
    fn from_ops(ops: &[DiffOp<'_>], old_prefix: usize, new_prefix: usize) -> Self {
        let old_count = ops.iter().filter(|op| op.kind != DiffOpKind::Add).count();
        let new_count = ops
            .iter()
            .filter(|op| op.kind != DiffOpKind::Remove)
            .count();
        let lines = ops
            .iter()
            .map(|op| format!("{}{}", op.kind.prefix(), op.line))
            .collect();
        Self {
            old_start: start_line(old_prefix, old_count),
            old_count,
            new_start: start_line(new_prefix, new_count),
            new_count,
            lines,
        }
    }

    /// The `@@ -s,c +s,c @@` header line.
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        for line in &self.lines {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

/// An empty side starts at the raw prefix; a non-empty side is 1-based.
fn start_line(prefix: usize, count: usize) -> usize {
    if count == 0 { prefix } else { prefix + 1 }
}

/// Group an edit script into hunks with `context` lines of surrounding
/// unchanged text.
///
/// Changes separated by at most `2 * context` unchanged lines share a hunk;
/// a longer unchanged run closes the current hunk `context` lines after its
/// last change. A script with no changes yields no hunks.
pub fn build_hunks(ops: &[DiffOp<'_>], context: usize) -> Vec<Hunk> {
    // old_prefix[k] / new_prefix[k]: lines consumed by ops[..k].
    let mut old_prefix = Vec::with_capacity(ops.len() + 1);
    let mut new_prefix = Vec::with_capacity(ops.len() + 1);
    let (mut old, mut new) = (0, 0);
    old_prefix.push(old);
    new_prefix.push(new);
    for op in ops {
        if op.kind != DiffOpKind::Add {
            old += 1;
        }
        if op.kind != DiffOpKind::Remove {
            new += 1;
        }
        old_prefix.push(old);
        new_prefix.push(new);
    }

    let mut hunks = Vec::new();
    let mut i = 0;
    while i < ops.len() {
        if ops[i].kind == DiffOpKind::Equal {
            i += 1;
            continue;
        }

        let start = i.saturating_sub(context);
        let mut last_change = i;
        let mut j = i + 1;
        while j < ops.len() {
            if ops[j].kind != DiffOpKind::Equal {
                last_change = j;
                j += 1;
                continue;
            }
            let run_start = j;
            while j < ops.len() && ops[j].kind == DiffOpKind::Equal {
                j += 1;
            }
            if j == ops.len() || j - run_start > context.saturating_mul(2) {
                break;
            }
        }

        let end = last_change
            .saturating_add(context)
            .saturating_add(1)
            .min(ops.len());
        hunks.push(Hunk::from_ops(
            &ops[start..end],
            old_prefix[start],
            new_prefix[start],
        ));
        i = end;
    }
    hunks
}

/// Render one file's unified diff: `---`/`+++` headers followed by hunks.
///
/// `None` on either side renders as `/dev/null`. When the contents differ
/// but align to no line changes (e.g. only a trailing newline changed), a
/// single change-kind line is emitted instead.
pub fn render_file_diff(
    path: &str,
    before: Option<&str>,
    after: Option<&str>,
    context: usize,
) -> String {
    let old_lines = split_lines(before);
    let new_lines = split_lines(after);
    let ops = align(&old_lines, &new_lines);
    let hunks = build_hunks(&ops, context);

    if hunks.is_empty() {
        let kind = match (before, after) {
            (_, None) => "delete",
            (None, Some(_)) => "create",
            (Some(_), Some(_)) => "modify",
        };
        return format!("{kind} {path} (no line changes)");
    }

    let old_header = match before {
        Some(_) => format!("a/{path}"),
        None => DEV_NULL.to_string(),
    };
    let new_header = match after {
        Some(_) => format!("b/{path}"),
        None => DEV_NULL.to_string(),
    };

    let mut out = format!("--- {old_header}\n+++ {new_header}");
    for hunk in &hunks {
        out.push('\n');
        out.push_str(&hunk.to_string());
    }
    out
}
