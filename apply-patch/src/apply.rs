//! Applies a [`PatchPlan`] to a [`FileAccess`] as one all-or-nothing batch.

use std::path::Path;
use std::path::PathBuf;

use crate::ApplyPatchError;
use crate::ApplyPatchFileChange;
use crate::file_access::FileAccess;
use crate::file_access::FileAccessError;
use crate::file_access::OverlayFileAccess;
use crate::parser::Hunk;
use crate::parser::UpdateFileChunk;
use crate::search_replace::EditOperation;
use crate::seek_sequence::seek_sequence;
use crate::unified_diff;

/// How an existing file is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEdit {
    /// Context-addressed chunks from a `*** Begin Patch` patch.
    Chunks {
        chunks: Vec<UpdateFileChunk>,
        move_path: Option<PathBuf>,
    },
    /// Exact-match SEARCH/REPLACE edits, applied in order.
    SearchReplace(Vec<EditOperation>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOperation {
    Create { path: PathBuf, content: String },
    Delete { path: PathBuf },
    Update { path: PathBuf, change: FileEdit },
}

impl PatchOperation {
    pub fn path(&self) -> &Path {
        match self {
            PatchOperation::Create { path, .. }
            | PatchOperation::Delete { path }
            | PatchOperation::Update { path, .. } => path,
        }
    }

    /// Every path this operation writes or removes.
    pub fn touched_paths(&self) -> Vec<&Path> {
        match self {
            PatchOperation::Update {
                path,
                change:
                    FileEdit::Chunks {
                        move_path: Some(dest),
                        ..
                    },
            } => vec![path.as_path(), dest.as_path()],
            other => vec![other.path()],
        }
    }
}

/// Ordered list of operations, fully parsed before anything is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPlan {
    pub operations: Vec<PatchOperation>,
}

impl PatchPlan {
    pub fn from_hunks(hunks: Vec<Hunk>) -> Self {
        let operations = hunks
            .into_iter()
            .map(|hunk| match hunk {
                Hunk::AddFile { path, contents } => PatchOperation::Create {
                    path,
                    content: contents,
                },
                Hunk::DeleteFile { path } => PatchOperation::Delete { path },
                Hunk::UpdateFile {
                    path,
                    move_path,
                    chunks,
                } => PatchOperation::Update {
                    path,
                    change: FileEdit::Chunks { chunks, move_path },
                },
            })
            .collect();
        Self { operations }
    }

    /// Number of individual search/replace edits in the plan.
    pub fn search_replace_count(&self) -> usize {
        self.operations
            .iter()
            .map(|op| match op {
                PatchOperation::Update {
                    change: FileEdit::SearchReplace(edits),
                    ..
                } => edits.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Tracks file paths affected by applying a patch, as written in the patch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AffectedPaths {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl AffectedPaths {
    /// Renders the list printed after a successful `apply_patch`.
    pub fn summary(&self) -> String {
        let mut out = String::from("Success. Updated the following files:\n");
        for path in &self.added {
            out.push_str(&format!("A {}\n", path.display()));
        }
        for path in &self.modified {
            out.push_str(&format!("M {}\n", path.display()));
        }
        for path in &self.deleted {
            out.push_str(&format!("D {}\n", path.display()));
        }
        out
    }
}

#[derive(Debug)]
enum Undo {
    Restore { path: PathBuf, contents: String },
    Remove { path: PathBuf },
    RemoveDir { path: PathBuf },
}

/// Log of inverse operations for every mutation made so far.
#[derive(Debug, Default)]
pub(crate) struct Transaction {
    log: Vec<Undo>,
}

impl Transaction {
    fn prior_state<F: FileAccess + ?Sized>(fs: &F, path: &Path) -> Result<Undo, FileAccessError> {
        match fs.read(path) {
            Ok(contents) => Ok(Undo::Restore {
                path: path.to_path_buf(),
                contents,
            }),
            Err(err) if err.is_not_found() => Ok(Undo::Remove {
                path: path.to_path_buf(),
            }),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn write<F: FileAccess + ?Sized>(
        &mut self,
        fs: &mut F,
        path: &Path,
        contents: &str,
    ) -> Result<(), FileAccessError> {
        let undo = Self::prior_state(fs, path)?;
        let created_dirs = fs.write(path, contents)?;
        // Directories go first in the log so they are removed after the file.
        self.log.extend(
            created_dirs
                .into_iter()
                .map(|path| Undo::RemoveDir { path }),
        );
        self.log.push(undo);
        Ok(())
    }

    pub(crate) fn remove<F: FileAccess + ?Sized>(
        &mut self,
        fs: &mut F,
        path: &Path,
    ) -> Result<(), FileAccessError> {
        let undo = Self::prior_state(fs, path)?;
        fs.remove(path)?;
        self.log.push(undo);
        Ok(())
    }

    /// Replays the log in reverse. Keeps going after a failure so that as
    /// much as possible is restored.
    pub(crate) fn rollback<F: FileAccess + ?Sized>(self, fs: &mut F) -> Vec<FileAccessError> {
        let mut errors = Vec::new();
        for undo in self.log.into_iter().rev() {
            let result = match undo {
                Undo::Restore { path, contents } => fs.write(&path, &contents).map(|_| ()),
                Undo::Remove { path } => match fs.remove(&path) {
                    Err(err) if err.is_not_found() => Ok(()),
                    other => other,
                },
                Undo::RemoveDir { path } => fs.remove_dir(&path),
            };
            if let Err(err) = result {
                errors.push(err);
            }
        }
        errors
    }
}

/// Computes what every operation in `plan` would do without writing
/// anything. Operations are replayed in order on an overlay of `fs`, so each
/// one sees the effects of the ones before it and fails exactly where
/// [`apply_plan`] would.
pub fn preview_plan<F: FileAccess + ?Sized>(
    plan: &PatchPlan,
    fs: &F,
) -> Result<Vec<(PathBuf, ApplyPatchFileChange)>, ApplyPatchError> {
    let mut overlay = OverlayFileAccess::new(fs);
    let mut transaction = Transaction::default();
    let mut affected = AffectedPaths::default();
    let mut changes = Vec::with_capacity(plan.operations.len());

    for operation in &plan.operations {
        let before = overlay.read(operation.path()).ok();
        apply_operation(operation, &mut overlay, &mut transaction, &mut affected)?;
        let before = before.unwrap_or_default();

        let change = match operation {
            PatchOperation::Create { content, .. } => ApplyPatchFileChange::Add {
                content: content.clone(),
            },
            PatchOperation::Delete { .. } => ApplyPatchFileChange::Delete { content: before },
            PatchOperation::Update { path, change } => {
                let move_path = match change {
                    FileEdit::Chunks { move_path, .. } => move_path.clone(),
                    FileEdit::SearchReplace(_) => None,
                };
                let new_content = overlay.read(move_path.as_deref().unwrap_or(path))?;
                ApplyPatchFileChange::Update {
                    unified_diff: unified_diff(&before, &new_content),
                    move_path,
                    new_content,
                }
            }
        };
        changes.push((operation.path().to_path_buf(), change));
    }
    Ok(changes)
}

/// Applies every operation in order. On failure, everything written so far
/// is reverted before the error is returned.
pub fn apply_plan<F: FileAccess + ?Sized>(
    plan: &PatchPlan,
    fs: &mut F,
) -> Result<AffectedPaths, ApplyPatchError> {
    let mut transaction = Transaction::default();
    let mut affected = AffectedPaths::default();
    for operation in &plan.operations {
        if let Err(error) = apply_operation(operation, fs, &mut transaction, &mut affected) {
            let rollback_errors = transaction.rollback(fs);
            if rollback_errors.is_empty() {
                return Err(error);
            }
            return Err(ApplyPatchError::Recovery {
                source: Box::new(error),
                rollback_errors,
            });
        }
    }
    Ok(affected)
}

fn apply_operation<F: FileAccess + ?Sized>(
    operation: &PatchOperation,
    fs: &mut F,
    transaction: &mut Transaction,
    affected: &mut AffectedPaths,
) -> Result<(), ApplyPatchError> {
    match operation {
        PatchOperation::Create { path, content } => {
            if fs.exists(path) {
                return Err(ApplyPatchError::FileAlreadyExists { path: path.clone() });
            }
            transaction.write(fs, path, content)?;
            affected.added.push(path.clone());
        }
        PatchOperation::Delete { path } => {
            if !fs.exists(path) {
                return Err(ApplyPatchError::MissingFile {
                    action: "delete",
                    path: path.clone(),
                });
            }
            transaction.remove(fs, path)?;
            affected.deleted.push(path.clone());
        }
        PatchOperation::Update { path, change } => {
            let original = fs.read(path).map_err(|err| match err {
                FileAccessError::NotFound { .. } => ApplyPatchError::MissingFile {
                    action: "update",
                    path: path.clone(),
                },
                other => other.into(),
            })?;
            match change {
                FileEdit::Chunks { chunks, move_path } => {
                    let new_contents = derive_new_contents_from_chunks(&original, path, chunks)?;
                    match move_path {
                        Some(dest) if dest != path => {
                            if fs.exists(dest) {
                                return Err(ApplyPatchError::FileAlreadyExists {
                                    path: dest.clone(),
                                });
                            }
                            transaction.write(fs, dest, &new_contents)?;
                            transaction.remove(fs, path)?;
                            affected.modified.push(dest.clone());
                        }
                        _ => {
                            transaction.write(fs, path, &new_contents)?;
                            affected.modified.push(path.clone());
                        }
                    }
                }
                FileEdit::SearchReplace(edits) => {
                    let new_contents = apply_search_replace(&original, path, edits)?;
                    transaction.write(fs, path, &new_contents)?;
                    affected.modified.push(path.clone());
                }
            }
        }
    }
    Ok(())
}

/// Applies exact-match edits to `original` in order.
pub fn apply_search_replace(
    original: &str,
    path: &Path,
    edits: &[EditOperation],
) -> Result<String, ApplyPatchError> {
    let mut contents = original.to_string();
    for edit in edits {
        if edit.search.is_empty() {
            return Err(ApplyPatchError::EmptySearch {
                path: path.to_path_buf(),
            });
        }
        let occurrences = contents.matches(edit.search.as_str()).count();
        if occurrences == 0 {
            return Err(ApplyPatchError::SearchTextNotFound {
                path: path.to_path_buf(),
                search: edit.search.clone(),
            });
        }
        if occurrences > 1 && !edit.replace_all {
            return Err(ApplyPatchError::MultipleOccurrences {
                path: path.to_path_buf(),
                count: occurrences,
            });
        }
        contents = if edit.replace_all {
            contents.replace(edit.search.as_str(), &edit.replace)
        } else {
            contents.replacen(edit.search.as_str(), &edit.replace, 1)
        };
    }
    Ok(contents)
}

/// Returns the new file contents after applying `chunks` to `original`. The
/// result always ends with a newline.
pub fn derive_new_contents_from_chunks(
    original: &str,
    path: &Path,
    chunks: &[UpdateFileChunk],
) -> Result<String, ApplyPatchError> {
    let mut original_lines: Vec<String> = original.split('\n').map(String::from).collect();

    // Drop the trailing empty element produced by a final newline so line
    // counts match what editors show.
    if original_lines.last().is_some_and(String::is_empty) {
        original_lines.pop();
    }

    let replacements = compute_replacements(&original_lines, path, chunks)?;
    let mut new_lines = apply_replacements(original_lines, &replacements);
    if !new_lines.last().is_some_and(String::is_empty) {
        new_lines.push(String::new());
    }
    Ok(new_lines.join("\n"))
}

/// Computes `(start_index, old_len, new_lines)` replacements for `chunks`,
/// sorted by start index.
fn compute_replacements(
    original_lines: &[String],
    path: &Path,
    chunks: &[UpdateFileChunk],
) -> Result<Vec<(usize, usize, Vec<String>)>, ApplyPatchError> {
    let mut replacements: Vec<(usize, usize, Vec<String>)> = Vec::new();
    let mut line_index: usize = 0;

    for chunk in chunks {
        // The `@@` context is only an anchor; when it cannot be found the
        // chunk is still located by its own lines.
        if let Some(ctx_line) = &chunk.change_context
            && let Some(idx) = seek_sequence(
                original_lines,
                std::slice::from_ref(ctx_line),
                line_index,
                false,
            )
        {
            line_index = idx + 1;
        }

        if chunk.old_lines.is_empty() {
            // Pure addition: append at end of file.
            let insertion_idx = if original_lines.last().is_some_and(String::is_empty) {
                original_lines.len() - 1
            } else {
                original_lines.len()
            };
            replacements.push((insertion_idx, 0, chunk.new_lines.clone()));
            continue;
        }

        let mut pattern: &[String] = &chunk.old_lines;
        let mut new_slice: &[String] = &chunk.new_lines;
        let mut found = seek_sequence(original_lines, pattern, line_index, chunk.is_end_of_file);

        // A trailing empty line in the chunk usually stands for the final
        // newline, which is not a line of its own in `original_lines`.
        if found.is_none() && pattern.last().is_some_and(String::is_empty) {
            pattern = &pattern[..pattern.len() - 1];
            if new_slice.last().is_some_and(String::is_empty) {
                new_slice = &new_slice[..new_slice.len() - 1];
            }
            found = seek_sequence(original_lines, pattern, line_index, chunk.is_end_of_file);
        }

        match found {
            Some(start_idx) => {
                replacements.push((start_idx, pattern.len(), new_slice.to_vec()));
                line_index = start_idx + pattern.len();
            }
            None => {
                return Err(ApplyPatchError::ComputeReplacements(format!(
                    "Failed to find expected lines in {}:\n{}",
                    path.display(),
                    chunk.old_lines.join("\n"),
                )));
            }
        }
    }

    replacements.sort_by_key(|(start, _, _)| *start);
    Ok(replacements)
}

fn apply_replacements(
    mut lines: Vec<String>,
    replacements: &[(usize, usize, Vec<String>)],
) -> Vec<String> {
    // Apply back to front so earlier indices stay valid.
    for (start_idx, old_len, new_segment) in replacements.iter().rev() {
        let start_idx = *start_idx;
        let end_idx = (start_idx + *old_len).min(lines.len());
        lines.splice(start_idx..end_idx, new_segment.iter().cloned());
    }
    lines
}
