//! Path normalization shared by the coordinator, trackers and ledger.

/// Canonical spelling of a project-relative path.
///
/// Backslashes become forward slashes and any number of leading `./`
/// segments are stripped, so `.\src\main.rs`, `./src/main.rs` and
/// `src/main.rs` all name the same entity.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}
