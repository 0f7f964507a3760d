mod apply;
mod file_access;
mod invocation;
mod parser;
mod search_replace;
mod seek_sequence;
mod standalone_executable;

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use similar::TextDiff;
use thiserror::Error;

pub use apply::AffectedPaths;
pub use apply::FileEdit;
pub use apply::PatchOperation;
pub use apply::PatchPlan;
pub use apply::apply_plan;
pub use apply::apply_search_replace;
pub use apply::preview_plan;
pub use apply::derive_new_contents_from_chunks;
pub use file_access::FileAccess;
pub use file_access::FileAccessError;
pub use file_access::InMemoryFileAccess;
pub use file_access::RealFileAccess;
pub use invocation::ExtractHeredocError;
pub use invocation::MaybeApplyPatch;
pub use invocation::is_implicit_apply_patch;
pub use invocation::maybe_parse_apply_patch;
pub use parser::Hunk;
pub use parser::ParseError;
pub use parser::UpdateFileChunk;
pub use parser::parse_patch;
pub use search_replace::EditOperation;
pub use search_replace::SearchReplaceError;
pub use search_replace::parse_search_replace_blocks;
pub use standalone_executable::main;

/// Hidden first argument that makes the main binary behave like the
/// standalone `apply_patch` executable.
pub const WARDEN_APPLY_PATCH_ARG1: &str = "--warden-run-as-apply-patch";

/// Context lines shown around each change in approval diffs.
const DIFF_CONTEXT_LINES: usize = 1;

#[derive(Debug, Error)]
pub enum ApplyPatchError {
    #[error(transparent)]
    ParseError(#[from] ParseError),
    #[error(transparent)]
    SearchReplaceParse(#[from] SearchReplaceError),
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),
    /// Context chunks could not be located in the target file.
    #[error("{0}")]
    ComputeReplacements(String),
    #[error("Cannot create {}: file already exists", .path.display())]
    FileAlreadyExists { path: PathBuf },
    #[error("Cannot {action} {}: file does not exist", .path.display())]
    MissingFile { action: &'static str, path: PathBuf },
    #[error("Search text not found in {}:\n{search}", .path.display())]
    SearchTextNotFound { path: PathBuf, search: String },
    #[error(
        "Search text matched {count} times in {}: multiple occurrences are ambiguous; add surrounding context or set replace_all",
        .path.display()
    )]
    MultipleOccurrences { path: PathBuf, count: usize },
    #[error("Search text for {} is empty", .path.display())]
    EmptySearch { path: PathBuf },
    #[error(
        "patch detected without explicit call to apply_patch. Rerun as [\"apply_patch\", \"<patch>\"]"
    )]
    ImplicitInvocation,
    /// The batch failed and at least one prior write could not be reverted.
    #[error("{source}; rollback failed: {}", join_errors(.rollback_errors))]
    Recovery {
        source: Box<ApplyPatchError>,
        rollback_errors: Vec<FileAccessError>,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn join_errors(errors: &[FileAccessError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Both the raw PATCH argument to `apply_patch` as well as the PATCH argument
/// parsed into hunks.
#[derive(Debug, PartialEq, Clone)]
pub struct ApplyPatchArgs {
    pub patch: String,
    pub hunks: Vec<Hunk>,
    /// Directory from a `cd <dir> &&` prefix in a shell invocation.
    pub workdir: Option<String>,
}

/// A file change as shown to the user before the patch is applied.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ApplyPatchFileChange {
    Add {
        content: String,
    },
    Delete {
        content: String,
    },
    Update {
        unified_diff: String,
        move_path: Option<PathBuf>,
        new_content: String,
    },
}

pub fn unified_diff(original: &str, new_content: &str) -> String {
    TextDiff::from_lines(original, new_content)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .to_string()
}

pub fn search_replace_success_message(count: usize) -> String {
    let plural = if count == 1 { "" } else { "s" };
    format!("Successfully applied {count} search/replace operation{plural}")
}

/// SEARCH/REPLACE blocks for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReplaceFile {
    pub path: PathBuf,
    pub diff: String,
    /// Replace every occurrence of each search text instead of requiring a
    /// unique match.
    pub replace_all: bool,
}

impl SearchReplaceFile {
    pub fn new(path: impl Into<PathBuf>, diff: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            diff: diff.into(),
            replace_all: false,
        }
    }

    pub fn with_replace_all(mut self, replace_all: bool) -> Self {
        self.replace_all = replace_all;
        self
    }
}

/// Parses every file's diff into one update operation per file.
pub fn search_replace_plan(files: &[SearchReplaceFile]) -> Result<PatchPlan, ApplyPatchError> {
    let operations = files
        .iter()
        .map(|file| {
            let edits = parse_search_replace_blocks(&file.diff)?
                .into_iter()
                .map(|edit| EditOperation {
                    replace_all: file.replace_all,
                    ..edit
                })
                .collect();
            Ok(PatchOperation::Update {
                path: file.path.clone(),
                change: FileEdit::SearchReplace(edits),
            })
        })
        .collect::<Result<Vec<_>, ApplyPatchError>>()?;
    Ok(PatchPlan { operations })
}

/// Parses every file's diff, then applies all edits as one atomic batch.
/// Returns the success message on success.
pub fn apply_search_replace_batch<F: FileAccess + ?Sized>(
    fs: &mut F,
    files: &[SearchReplaceFile],
) -> Result<String, ApplyPatchError> {
    let plan = search_replace_plan(files)?;
    apply_plan(&plan, fs)?;
    Ok(search_replace_success_message(plan.search_replace_count()))
}

/// Applies a context-block patch to the files under `cwd`, printing the
/// summary to `stdout` or the error to `stderr`.
pub fn apply_patch_in(
    patch: &str,
    cwd: &Path,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<AffectedPaths, ApplyPatchError> {
    let hunks = match parse_patch(patch) {
        Ok(source) => source.hunks,
        Err(e) => {
            match &e {
                ParseError::InvalidPatchError(message) => {
                    writeln!(stderr, "Invalid patch: {message}")?;
                }
                ParseError::InvalidHunkError {
                    message,
                    line_number,
                } => {
                    writeln!(
                        stderr,
                        "Invalid patch hunk on line {line_number}: {message}"
                    )?;
                }
            }
            return Err(e.into());
        }
    };

    let mut fs = RealFileAccess::new(cwd);
    match apply_plan(&PatchPlan::from_hunks(hunks), &mut fs) {
        Ok(affected) => {
            stdout.write_all(affected.summary().as_bytes())?;
            Ok(affected)
        }
        Err(e) => {
            writeln!(stderr, "{e}")?;
            Err(e)
        }
    }
}

/// Applies the patch relative to the current directory.
pub fn apply_patch(
    patch: &str,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<(), ApplyPatchError> {
    apply_patch_in(patch, Path::new("."), stdout, stderr).map(|_| ())
}
