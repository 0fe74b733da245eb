//! Tool execution: read-before-write policy, file I/O, and change recording.
//!
//! The [`ToolCoordinator`] dispatches `read_file`, `write_file` and
//! `delete_file` calls against a [`FileStore`], consulting and updating the
//! caller's [`TurnContext`]. Every outcome, including refusals and I/O
//! errors, comes back as a [`ToolExecutionResult`] for the model.
//!
//! The write gate: a `write_file` to a path that already exists is refused
//! unless the path is in the turn's [`InspectedSet`](super::InspectedSet)
//! (read this turn, written this turn, or open in the editor at turn start).

use super::context::TurnContext;
use super::core::{
    DEFAULT_READ_TRUNCATE_CHARS, DeleteFileArgs, ReadFileArgs, ToolExecutionResult, WriteFileArgs,
    parse_tool_args, truncate_output, validate_tool_arguments,
};
use super::names::{DELETE_FILE, READ_FILE, WRITE_FILE};
use super::open_files::OpenFileRegistry;
use super::path::normalize_path;
use super::spec::ToolSpec;
use super::store::FileStore;
use crate::{ToolCall, ToolDef, json_schema_for};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Executes file tool calls for one project.
pub struct ToolCoordinator {
    store: Arc<dyn FileStore>,
    open_files: Arc<dyn OpenFileRegistry>,
    project: PathBuf,
    read_truncate_chars: usize,
    validate_args: bool,
}

impl ToolCoordinator {
    pub fn new(
        store: Arc<dyn FileStore>,
        open_files: Arc<dyn OpenFileRegistry>,
        project: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            open_files,
            project: project.into(),
            read_truncate_chars: DEFAULT_READ_TRUNCATE_CHARS,
            validate_args: true,
        }
    }

    /// Set the character ceiling for `read_file` output.
    pub fn with_read_truncate_chars(mut self, max: usize) -> Self {
        self.read_truncate_chars = max;
        self
    }

    /// Enable or disable JSON Schema validation of arguments.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Function-calling definitions for the three file tools.
    pub fn definitions() -> Vec<ToolDef> {
        vec![
            ToolSpec::builder(READ_FILE)
                .purpose("Read a file from the project")
                .when_to_use(
                    "Before modifying an existing file, and whenever you need a file's current content",
                )
                .when_not_to_use(
                    "When you already read the same file earlier in this turn; reuse that result",
                )
                .parameters_for::<ReadFileArgs>()
                .example(
                    "read_file(path='src/main.rs')",
                    "Returns the file's text, truncated past a size limit",
                )
                .output_format("Raw file content as text")
                .build()
                .to_tool_def(),
            ToolSpec::builder(WRITE_FILE)
                .purpose("Create a file or replace its entire content")
                .when_to_use("To create a new file, or to rewrite a file you have read this turn")
                .when_not_to_use(
                    "On an existing file you have not read this turn; the write will be refused",
                )
                .parameters_for::<WriteFileArgs>()
                .example(
                    "write_file(path='src/lib.rs', content='pub mod util;\\n')",
                    "Replaces src/lib.rs with the given content",
                )
                .output_format("Confirmation with the written size")
                .build()
                .to_tool_def(),
            ToolSpec::builder(DELETE_FILE)
                .purpose("Delete a file from the project")
                .when_to_use("When a file is no longer needed")
                .when_not_to_use("To empty a file; write empty content with write_file instead")
                .parameters_for::<DeleteFileArgs>()
                .output_format("Confirmation")
                .build()
                .to_tool_def(),
        ]
    }

    /// Execute one tool call. Never fails: errors become `ok = false`.
    pub async fn execute(&self, call: &ToolCall, ctx: &mut TurnContext) -> ToolExecutionResult {
        let name = call.function.name.as_str();
        let id = call.id.as_str();
        let arguments = if call.function.arguments.trim().is_empty() {
            "{}"
        } else {
            call.function.arguments.as_str()
        };
        trace!("Tool {name} arguments: {arguments}");

        let start = Instant::now();
        let result = match name {
            READ_FILE => self.read_file(id, arguments, ctx).await,
            WRITE_FILE => self.write_file(id, arguments, ctx).await,
            DELETE_FILE => self.delete_file(id, arguments, ctx).await,
            other => ToolExecutionResult::failure(
                id,
                other,
                format!(
                    "unsupported tool '{other}'. Available tools: {READ_FILE}, {WRITE_FILE}, {DELETE_FILE}"
                ),
            ),
        };
        debug!(
            "Tool {name} finished in {:.1}ms: ok={}, {} chars",
            start.elapsed().as_secs_f64() * 1000.0,
            result.ok,
            result.output.len()
        );
        result
    }

    /// Validate (if enabled) and parse arguments.
    fn parse_args<T: serde::de::DeserializeOwned>(
        &self,
        tool_name: &str,
        schema: serde_json::Value,
        arguments: &str,
    ) -> Result<T, String> {
        if self.validate_args
            && let Some(err) = validate_tool_arguments(tool_name, &schema, arguments)
        {
            return Err(err);
        }
        parse_tool_args(arguments)
    }

    async fn read_file(
        &self,
        id: &str,
        arguments: &str,
        ctx: &mut TurnContext,
    ) -> ToolExecutionResult {
        let args: ReadFileArgs =
            match self.parse_args(READ_FILE, json_schema_for::<ReadFileArgs>(), arguments) {
                Ok(a) => a,
                Err(e) => return ToolExecutionResult::failure(id, READ_FILE, e),
            };
        let path = match checked_path(&args.path) {
            Ok(p) => p,
            Err(e) => return ToolExecutionResult::failure(id, READ_FILE, e),
        };

        if let Some(previous) = ctx.read_cache.get(&path) {
            debug!("read_file cache hit: {path}");
            return ToolExecutionResult::success(
                id,
                READ_FILE,
                format!(
                    "'{path}' was already read earlier in this turn ({} chars) and has not \
                     changed since. Reuse the content from that earlier read_file result \
                     instead of reading it again.",
                    previous.chars().count()
                ),
            );
        }

        match self.store.read(&self.project, &path).await {
            Ok(Some(content)) => {
                let output = truncate_output(content.clone(), self.read_truncate_chars);
                ctx.read_cache.insert(&path, content);
                ctx.inspected.insert(&path);
                ToolExecutionResult::success(id, READ_FILE, output)
            }
            Ok(None) => {
                ToolExecutionResult::failure(id, READ_FILE, format!("file not found: '{path}'"))
            }
            Err(e) => ToolExecutionResult::failure(id, READ_FILE, e),
        }
    }

    async fn write_file(
        &self,
        id: &str,
        arguments: &str,
        ctx: &mut TurnContext,
    ) -> ToolExecutionResult {
        let args: WriteFileArgs =
            match self.parse_args(WRITE_FILE, json_schema_for::<WriteFileArgs>(), arguments) {
                Ok(a) => a,
                Err(e) => return ToolExecutionResult::failure(id, WRITE_FILE, e),
            };
        let path = match checked_path(&args.path) {
            Ok(p) => p,
            Err(e) => return ToolExecutionResult::failure(id, WRITE_FILE, e),
        };

        let before = match self.store.read(&self.project, &path).await {
            Ok(before) => before,
            Err(e) => {
                return ToolExecutionResult::failure(
                    id,
                    WRITE_FILE,
                    format!("could not read current content of '{path}' before writing: {e}"),
                );
            }
        };

        if before.is_some() && !ctx.inspected.contains(&path) {
            info!("Refused write to unread file: {path}");
            return ToolExecutionResult::failure(
                id,
                WRITE_FILE,
                format!(
                    "'{path}' already exists and has not been read in this turn. \
                     Call read_file on '{path}' first, then retry write_file with the \
                     complete updated content."
                ),
            );
        }

        if let Err(e) = self.store.write(&self.project, &path, &args.content).await {
            return ToolExecutionResult::failure(id, WRITE_FILE, e);
        }

        ctx.inspected.insert(&path);
        ctx.read_cache.invalidate(&path);
        self.open_files.update(&path, &args.content);
        ctx.ledger
            .record(&path, before.as_deref(), Some(args.content.as_str()));

        let verb = if before.is_some() { "Updated" } else { "Created" };
        ToolExecutionResult::success(
            id,
            WRITE_FILE,
            format!("{verb} '{path}' ({} chars).", args.content.chars().count()),
        )
    }

    async fn delete_file(
        &self,
        id: &str,
        arguments: &str,
        ctx: &mut TurnContext,
    ) -> ToolExecutionResult {
        let args: DeleteFileArgs =
            match self.parse_args(DELETE_FILE, json_schema_for::<DeleteFileArgs>(), arguments) {
                Ok(a) => a,
                Err(e) => return ToolExecutionResult::failure(id, DELETE_FILE, e),
            };
        let path = match checked_path(&args.path) {
            Ok(p) => p,
            Err(e) => return ToolExecutionResult::failure(id, DELETE_FILE, e),
        };

        let before = match self.store.read(&self.project, &path).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                return ToolExecutionResult::failure(
                    id,
                    DELETE_FILE,
                    format!("file not found: '{path}'; nothing to delete"),
                );
            }
            Err(e) => return ToolExecutionResult::failure(id, DELETE_FILE, e),
        };

        if let Err(e) = self.store.delete(&self.project, &path).await {
            return ToolExecutionResult::failure(id, DELETE_FILE, e);
        }

        ctx.read_cache.invalidate(&path);
        self.open_files.close(&path);
        ctx.ledger.record(&path, Some(before.as_str()), None);

        ToolExecutionResult::success(id, DELETE_FILE, format!("Deleted '{path}'."))
    }
}

fn checked_path(raw: &str) -> Result<String, String> {
    let path = normalize_path(raw);
    if path.is_empty() {
        Err("'path' must not be empty".to_string())
    } else {
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use crate::tools::open_files::OpenFiles;
    use crate::tools::store::{LocalFileStore, MemoryFileStore};

    struct Fixture {
        store: Arc<MemoryFileStore>,
        open_files: Arc<OpenFiles>,
        coordinator: ToolCoordinator,
        ctx: TurnContext,
    }

    fn fixture(store: MemoryFileStore) -> Fixture {
        let store = Arc::new(store);
        let open_files = Arc::new(OpenFiles::new());
        let coordinator = ToolCoordinator::new(store.clone(), open_files.clone(), "/project");
        Fixture {
            store,
            open_files,
            coordinator,
            ctx: TurnContext::new(),
        }
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, name, args.to_string())
    }

    impl Fixture {
        async fn run(&mut self, name: &str, args: serde_json::Value) -> ToolExecutionResult {
            let call = call("call-1", name, args);
            self.coordinator.execute(&call, &mut self.ctx).await
        }
    }

    #[tokio::test]
    async fn read_returns_content_and_marks_inspected() {
        let mut f = fixture(MemoryFileStore::new().with_file("src/a.rs", "fn a() {}\n"));
        let result = f.run(READ_FILE, serde_json::json!({"path": "./src/a.rs"})).await;
        assert!(result.ok);
        assert_eq!(result.output, "fn a() {}\n");
        assert_eq!(result.tool_call_id, "call-1");
        assert!(f.ctx.inspected.contains("src/a.rs"));
        assert_eq!(f.ctx.read_cache.get("src/a.rs"), Some("fn a() {}\n"));
    }

    #[tokio::test]
    async fn second_read_returns_reuse_hint() {
        let mut f = fixture(MemoryFileStore::new().with_file("a.rs", "body-text"));
        f.run(READ_FILE, serde_json::json!({"path": "a.rs"})).await;
        let again = f.run(READ_FILE, serde_json::json!({"path": "a.rs"})).await;
        assert!(again.ok);
        assert!(again.output.contains("already read"), "{}", again.output);
        assert!(!again.output.contains("body-text"));
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let mut f = fixture(MemoryFileStore::new());
        let result = f.run(READ_FILE, serde_json::json!({"path": "nope.rs"})).await;
        assert!(!result.ok);
        assert!(result.output.contains("not found"));
        assert!(!f.ctx.inspected.contains("nope.rs"));
    }

    #[tokio::test]
    async fn read_truncates_large_files() {
        let mut f = fixture(MemoryFileStore::new().with_file("big.txt", "y".repeat(4500)));
        let result = f.run(READ_FILE, serde_json::json!({"path": "big.txt"})).await;
        assert!(result.ok);
        assert!(result.output.ends_with("...[truncated 500 chars]"));
        // The cache keeps the full text.
        assert_eq!(f.ctx.read_cache.get("big.txt").map(str::len), Some(4500));
    }

    #[tokio::test]
    async fn write_new_file_needs_no_read() {
        let mut f = fixture(MemoryFileStore::new());
        let result = f
            .run(WRITE_FILE, serde_json::json!({"path": "new.rs", "content": "x\n"}))
            .await;
        assert!(result.ok, "{}", result.output);
        assert_eq!(f.store.get("new.rs").as_deref(), Some("x\n"));
        let record = f.ctx.ledger.get("new.rs").unwrap();
        assert_eq!(record.kind, ChangeKind::Create);
        assert!(record.before.is_none());
    }

    #[tokio::test]
    async fn write_to_unread_existing_file_is_refused() {
        let mut f = fixture(MemoryFileStore::new().with_file("lib.rs", "original"));
        let result = f
            .run(WRITE_FILE, serde_json::json!({"path": "lib.rs", "content": "clobbered"}))
            .await;
        assert!(!result.ok);
        assert!(result.output.contains("read_file"));
        assert_eq!(f.store.get("lib.rs").as_deref(), Some("original"));
        assert!(f.ctx.ledger.is_empty());
    }

    #[tokio::test]
    async fn write_after_read_succeeds() {
        let mut f = fixture(MemoryFileStore::new().with_file("lib.rs", "original"));
        f.run(READ_FILE, serde_json::json!({"path": "lib.rs"})).await;
        let result = f
            .run(WRITE_FILE, serde_json::json!({"path": ".\\lib.rs", "content": "edited"}))
            .await;
        assert!(result.ok, "{}", result.output);
        assert_eq!(f.store.get("lib.rs").as_deref(), Some("edited"));
        let record = f.ctx.ledger.get("lib.rs").unwrap();
        assert_eq!(record.kind, ChangeKind::Modify);
        assert_eq!(record.before.as_deref(), Some("original"));
        assert_eq!(record.after.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn open_files_count_as_inspected_and_are_updated() {
        let mut f = fixture(MemoryFileStore::new().with_file("open.rs", "v1"));
        f.open_files.open("open.rs", "v1");
        f.ctx.begin(f.open_files.open_paths());

        let result = f
            .run(WRITE_FILE, serde_json::json!({"path": "open.rs", "content": "v2"}))
            .await;
        assert!(result.ok, "{}", result.output);
        assert_eq!(f.open_files.content("open.rs").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn rewrite_after_own_write_is_allowed_and_reread_is_fresh() {
        let mut f = fixture(MemoryFileStore::new().with_file("a.rs", "one"));
        f.run(READ_FILE, serde_json::json!({"path": "a.rs"})).await;
        f.run(WRITE_FILE, serde_json::json!({"path": "a.rs", "content": "two"}))
            .await;
        let second = f
            .run(WRITE_FILE, serde_json::json!({"path": "a.rs", "content": "three"}))
            .await;
        assert!(second.ok);

        let reread = f.run(READ_FILE, serde_json::json!({"path": "a.rs"})).await;
        assert_eq!(reread.output, "three");

        let record = f.ctx.ledger.get("a.rs").unwrap();
        assert_eq!(record.before.as_deref(), Some("one"));
        assert_eq!(record.after.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn delete_records_and_closes_open_file() {
        let mut f = fixture(MemoryFileStore::new().with_file("old.rs", "legacy"));
        f.open_files.open("old.rs", "legacy");
        let result = f.run(DELETE_FILE, serde_json::json!({"path": "old.rs"})).await;
        assert!(result.ok, "{}", result.output);
        assert!(f.store.get("old.rs").is_none());
        assert!(!f.open_files.is_open("old.rs"));
        let record = f.ctx.ledger.get("old.rs").unwrap();
        assert_eq!(record.kind, ChangeKind::Delete);
        assert_eq!(record.before.as_deref(), Some("legacy"));
    }

    #[tokio::test]
    async fn delete_missing_file_fails() {
        let mut f = fixture(MemoryFileStore::new());
        let result = f.run(DELETE_FILE, serde_json::json!({"path": "ghost.rs"})).await;
        assert!(!result.ok);
        assert!(f.ctx.ledger.is_empty());
    }

    #[tokio::test]
    async fn create_then_delete_leaves_no_change() {
        let mut f = fixture(MemoryFileStore::new());
        f.run(WRITE_FILE, serde_json::json!({"path": "tmp.rs", "content": "x"}))
            .await;
        f.run(DELETE_FILE, serde_json::json!({"path": "tmp.rs"})).await;
        assert!(f.ctx.ledger.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_named_in_failure() {
        let mut f = fixture(MemoryFileStore::new());
        let result = f.run("rename_file", serde_json::json!({"path": "a"})).await;
        assert!(!result.ok);
        assert_eq!(result.name, "rename_file");
        assert!(result.output.contains("rename_file"));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_validation() {
        let mut f = fixture(MemoryFileStore::new());
        let result = f.run(WRITE_FILE, serde_json::json!({"path": "a.rs"})).await;
        assert!(!result.ok);
        assert!(result.output.contains("content"), "{}", result.output);

        let empty = f.run(READ_FILE, serde_json::json!({"path": ""})).await;
        assert!(!empty.ok);
    }

    #[tokio::test]
    async fn io_errors_pass_through() {
        let store = MemoryFileStore::new().with_file("locked.rs", "x");
        store.fail_on("locked.rs");
        let mut f = fixture(store);
        let result = f.run(READ_FILE, serde_json::json!({"path": "locked.rs"})).await;
        assert!(!result.ok);
        assert!(result.output.contains("simulated I/O error"));

        let write = f
            .run(WRITE_FILE, serde_json::json!({"path": "locked.rs", "content": "y"}))
            .await;
        assert!(!write.ok);
        assert!(f.ctx.ledger.is_empty());
    }

    #[tokio::test]
    async fn local_store_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let coordinator = ToolCoordinator::new(
            Arc::new(LocalFileStore::new()),
            Arc::new(OpenFiles::new()),
            dir.path(),
        );
        let mut ctx = TurnContext::new();

        let read = call("c1", READ_FILE, serde_json::json!({"path": "main.rs"}));
        assert!(coordinator.execute(&read, &mut ctx).await.ok);
        let write = call(
            "c2",
            WRITE_FILE,
            serde_json::json!({"path": "main.rs", "content": "fn main() { run(); }\n"}),
        );
        assert!(coordinator.execute(&write, &mut ctx).await.ok);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.rs")).unwrap(),
            "fn main() { run(); }\n"
        );

        let escape = call("c3", READ_FILE, serde_json::json!({"path": "../secret"}));
        let result = coordinator.execute(&escape, &mut ctx).await;
        assert!(!result.ok);
        assert!(result.output.contains("traversal"));
    }

    #[test]
    fn definitions_cover_every_tool() {
        let defs = ToolCoordinator::definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(names, crate::tools::names::ALL.to_vec());
        assert!(defs[1].function.description.contains("refused"));
    }
}
