//! Declarative text patching of workspace files
//!
//! A patch list is an ordered sequence of [`PatchOperation`]s. Each operation
//! targets one workspace-relative file, locates a literal marker or a
//! line-delimited block, and replaces it with content interpolated from a
//! [`PatchContext`]. The engine knows nothing about the files it edits; any
//! ordering between operations is encoded by the list itself.

pub mod context;

use crate::error::{PipelineError, Result};
use std::path::Path;
use tokio::fs;

pub use context::{Condition, Escape, PatchContext};

/// What an operation looks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Every non-overlapping occurrence of a literal string
    Literal(String),
    /// Whole lines from one containing `start` through the next one containing `end`
    LineBlock { start: String, end: String },
}

impl Matcher {
    /// Pattern description used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            Matcher::Literal(pattern) => pattern.clone(),
            Matcher::LineBlock { start, end } => format!("{} .. {}", start, end),
        }
    }
}

/// How many matches an operation expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one match, anything else is fatal
    ExactlyOne,
    /// One or more matches, all of them replaced
    AtLeastOne,
    /// Any number of matches, including none
    BestEffort,
}

/// Condition deciding whether an operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    When(Condition),
    Unless(Condition),
}

impl Guard {
    pub fn allows(&self, ctx: &PatchContext) -> bool {
        match self {
            Guard::Always => true,
            Guard::When(condition) => ctx.is_active(*condition),
            Guard::Unless(condition) => !ctx.is_active(*condition),
        }
    }
}

/// A single declarative edit
#[derive(Debug, Clone)]
pub struct PatchOperation {
    /// Short name used in logs and reports
    pub label: &'static str,
    /// Target file relative to the workspace root
    pub file: &'static str,
    pub matcher: Matcher,
    /// Replacement with `{{key}}` placeholders
    pub replacement: String,
    pub escape: Escape,
    pub cardinality: Cardinality,
    pub guard: Guard,
}

impl PatchOperation {
    /// Replace exactly one literal occurrence
    pub fn replace(
        label: &'static str,
        file: &'static str,
        pattern: &str,
        replacement: &str,
    ) -> Self {
        Self {
            label,
            file,
            matcher: Matcher::Literal(pattern.to_string()),
            replacement: replacement.to_string(),
            escape: Escape::None,
            cardinality: Cardinality::ExactlyOne,
            guard: Guard::Always,
        }
    }

    /// Delete exactly one literal occurrence
    pub fn remove(label: &'static str, file: &'static str, pattern: &str) -> Self {
        Self::replace(label, file, pattern, "")
    }

    /// Delete a block of lines delimited by two marker lines (best effort)
    pub fn remove_block(label: &'static str, file: &'static str, start: &str, end: &str) -> Self {
        Self {
            label,
            file,
            matcher: Matcher::LineBlock {
                start: start.to_string(),
                end: end.to_string(),
            },
            replacement: String::new(),
            escape: Escape::None,
            cardinality: Cardinality::BestEffort,
            guard: Guard::Always,
        }
    }

    /// Replace every occurrence, requiring at least one
    pub fn all(mut self) -> Self {
        self.cardinality = Cardinality::AtLeastOne;
        self
    }

    /// Tolerate zero matches
    pub fn best_effort(mut self) -> Self {
        self.cardinality = Cardinality::BestEffort;
        self
    }

    pub fn escaped(mut self, escape: Escape) -> Self {
        self.escape = escape;
        self
    }

    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }
}

/// Result of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchStatus {
    /// Guard evaluated false
    Skipped,
    Applied { replacements: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub label: &'static str,
    pub file: &'static str,
    pub status: PatchStatus,
}

/// Apply `operations` in order to files under `workspace_root`.
///
/// Each operation loads its file, edits it, and persists it before the next
/// operation runs, so later operations see earlier edits.
pub async fn apply(
    workspace_root: &Path,
    operations: &[PatchOperation],
    ctx: &PatchContext,
) -> Result<Vec<PatchOutcome>> {
    let mut outcomes = Vec::with_capacity(operations.len());

    for op in operations {
        if !op.guard.allows(ctx) {
            tracing::debug!(patch = op.label, file = op.file, "guard not met, skipping");
            outcomes.push(PatchOutcome {
                label: op.label,
                file: op.file,
                status: PatchStatus::Skipped,
            });
            continue;
        }

        let path = workspace_root.join(op.file);
        let original = fs::read_to_string(&path)
            .await
            .map_err(|source| PipelineError::PatchIo {
                file: path.clone(),
                source,
            })?;

        let (patched, replacements) = apply_to_text(&original, op, ctx, &path)?;
        if patched != original {
            fs::write(&path, patched)
                .await
                .map_err(|source| PipelineError::PatchIo {
                    file: path.clone(),
                    source,
                })?;
        }

        tracing::debug!(patch = op.label, file = op.file, replacements, "patch applied");
        outcomes.push(PatchOutcome {
            label: op.label,
            file: op.file,
            status: PatchStatus::Applied { replacements },
        });
    }

    Ok(outcomes)
}

/// Apply one operation to in-memory text. `path` is only used for diagnostics.
pub fn apply_to_text(
    text: &str,
    op: &PatchOperation,
    ctx: &PatchContext,
    path: &Path,
) -> Result<(String, usize)> {
    let ranges = match &op.matcher {
        Matcher::Literal(pattern) => literal_ranges(text, pattern),
        Matcher::LineBlock { start, end } => block_ranges(text, start, end).ok_or_else(|| {
            PipelineError::PatchTargetNotFound {
                file: path.to_path_buf(),
                pattern: format!("{} (no closing marker)", op.matcher.describe()),
            }
        })?,
    };

    check_cardinality(op, ranges.len(), path)?;
    if ranges.is_empty() {
        return Ok((text.to_string(), 0));
    }

    let mut rendered = ctx.render(&op.replacement, op.escape).map_err(|key| {
        PipelineError::config(format!(
            "patch '{}' references '{}' which has no value",
            op.label, key
        ))
    })?;
    if matches!(op.matcher, Matcher::LineBlock { .. }) && !rendered.is_empty() {
        rendered.push('\n');
    }

    let mut out = String::with_capacity(text.len() + rendered.len() * ranges.len());
    let mut cursor = 0;
    for (start, end) in &ranges {
        out.push_str(&text[cursor..*start]);
        out.push_str(&rendered);
        cursor = *end;
    }
    out.push_str(&text[cursor..]);

    Ok((out, ranges.len()))
}

fn check_cardinality(op: &PatchOperation, count: usize, path: &Path) -> Result<()> {
    let not_found = || PipelineError::PatchTargetNotFound {
        file: path.to_path_buf(),
        pattern: op.matcher.describe(),
    };

    match op.cardinality {
        Cardinality::ExactlyOne if count == 0 => Err(not_found()),
        Cardinality::ExactlyOne if count > 1 => Err(PipelineError::PatchTargetAmbiguous {
            file: path.to_path_buf(),
            pattern: op.matcher.describe(),
            count,
        }),
        Cardinality::AtLeastOne if count == 0 => Err(not_found()),
        _ => Ok(()),
    }
}

fn literal_ranges(text: &str, pattern: &str) -> Vec<(usize, usize)> {
    if pattern.is_empty() {
        return Vec::new();
    }
    text.match_indices(pattern)
        .map(|(idx, m)| (idx, idx + m.len()))
        .collect()
}

/// Byte ranges of whole-line blocks, or `None` when a start marker is never closed.
fn block_ranges(text: &str, start: &str, end: &str) -> Option<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_end = offset + line.len();
        match open {
            None if line.contains(start) => {
                if line.contains(end) && !end.is_empty() && line.find(end) > line.find(start) {
                    ranges.push((offset, line_end));
                } else {
                    open = Some(offset);
                }
            }
            Some(block_start) if line.contains(end) => {
                ranges.push((block_start, line_end));
                open = None;
            }
            _ => {}
        }
        offset = line_end;
    }

    match open {
        Some(_) => None,
        None => Some(ranges),
    }
}
