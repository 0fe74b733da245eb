//! Line alignment: an optimal edit script between two line sequences.
//!
//! The script is derived from a longest-common-subsequence table of suffix
//! lengths. When both neighbours of a mismatch carry the same remaining LCS
//! length the backtrack consumes the `before` line first, so removals are
//! listed ahead of the additions that replace them. Golden diffs depend on
//! that ordering.

/// The kind of a single edit-script operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOpKind {
    Equal,
    Add,
    Remove,
}

impl DiffOpKind {
    /// Unified-diff body prefix for this operation.
    pub fn prefix(self) -> char {
        match self {
            DiffOpKind::Equal => ' ',
            DiffOpKind::Add => '+',
            DiffOpKind::Remove => '-',
        }
    }
}

/// One operation of an edit script, borrowing its line from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOp<'a> {
    pub kind: DiffOpKind,
    pub line: &'a str,
}

impl<'a> DiffOp<'a> {
    pub fn equal(line: &'a str) -> Self {
        Self {
            kind: DiffOpKind::Equal,
            line,
        }
    }

    pub fn add(line: &'a str) -> Self {
        Self {
            kind: DiffOpKind::Add,
            line,
        }
    }

    pub fn remove(line: &'a str) -> Self {
        Self {
            kind: DiffOpKind::Remove,
            line,
        }
    }
}

/// Split file content into lines for alignment.
///
/// `\r\n` and lone `\r` are normalized to `\n` first. A single trailing
/// empty element (text ending in a newline) is dropped, and `None` maps to
/// an empty sequence, as does the empty string.
pub fn split_lines(text: Option<&str>) -> Vec<String> {
    let Some(text) = text else {
        return Vec::new();
    };
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = normalized.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Compute a minimal edit script turning `before` into `after`.
///
/// O(n·m) time and space in line counts. Lines compare by exact string
/// equality.
pub fn align<'a, S: AsRef<str>>(before: &'a [S], after: &'a [S]) -> Vec<DiffOp<'a>> {
    let n = before.len();
    let m = after.len();
    let width = m + 1;

    // table[i * width + j] = LCS length of before[i..] and after[j..].
    let mut table = vec![0usize; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if before[i].as_ref() == after[j].as_ref() {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        let old = before[i].as_ref();
        let new = after[j].as_ref();
        if old == new {
            ops.push(DiffOp::equal(old));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(DiffOp::remove(old));
            i += 1;
        } else {
            ops.push(DiffOp::add(new));
            j += 1;
        }
    }
    ops.extend(before[i..].iter().map(|l| DiffOp::remove(l.as_ref())));
    ops.extend(after[j..].iter().map(|l| DiffOp::add(l.as_ref())));
    ops
}
