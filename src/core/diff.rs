//! Unified-diff generation from before/after text.
//!
//! Lines are compared by text *and* terminator, so a final line that
//! lost (or gained) its newline shows up as a change and carries the
//! `\ No newline at end of file` marker. That keeps
//! `apply(parse(diff(o, m)), o) == m` exact.

use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag};
use tracing::trace;

use crate::core::model::{Change, ChangeKind, FilePatch, Hunk};
use crate::infra::lines::{Line, looks_binary, split_lines};

/// Default number of unchanged lines around each change.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Line-matching strategy handed to `similar`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm
{
    #[default]
    Myers,
    Patience,
    Lcs,
}

impl DiffAlgorithm
{
    fn to_similar(self) -> Algorithm
    {
        match self
        {
            DiffAlgorithm::Myers => Algorithm::Myers,
            DiffAlgorithm::Patience => Algorithm::Patience,
            DiffAlgorithm::Lcs => Algorithm::Lcs,
        }
    }
}

/// Knobs for diff generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions
{
    pub context_lines: usize,
    pub algorithm: DiffAlgorithm,
}

impl Default for DiffOptions
{
    fn default() -> Self
    {
        Self { context_lines: DEFAULT_CONTEXT_LINES, algorithm: DiffAlgorithm::default() }
    }
}

impl DiffOptions
{
    pub fn with_context(context_lines: usize) -> Self
    {
        Self { context_lines, ..Self::default() }
    }
}

/// Unified diff of an in-place edit of `path`; `""` when nothing changed.
pub fn generate_diff(
    original: &str,
    modified: &str,
    path: &str,
    context_lines: usize,
) -> String
{
    generate_file_diff(
        Some(original),
        Some(modified),
        path,
        &DiffOptions::with_context(context_lines),
    )
}

/// Unified diff where either side may be absent (create/delete).
///
/// NUL bytes on either side turn the result into a git
/// `Binary files ... differ` stanza.
pub fn generate_file_diff(
    original: Option<&str>,
    modified: Option<&str>,
    path: &str,
    opts: &DiffOptions,
) -> String
{
    if original == modified
    {
        return String::new();
    }

    let binary = original.is_some_and(looks_binary) || modified.is_some_and(looks_binary);
    if binary
    {
        trace!(path, "binary content, emitting stanza");
        return FilePatch::binary(original.map(|_| path.to_string()), modified.map(|_| path.to_string()))
            .to_unified_diff();
    }

    let hunks = diff_hunks(original.unwrap_or_default(), modified.unwrap_or_default(), opts);
    let fp = match (original, modified)
    {
        (None, _) => FilePatch::added(path, hunks),
        (_, None) => FilePatch::deleted(path, hunks),
        _ => FilePatch::modified(path, hunks),
    };
    fp.to_unified_diff()
}

/// Compute hunks between two texts.
pub fn diff_hunks(
    original: &str,
    modified: &str,
    opts: &DiffOptions,
) -> Vec<Hunk>
{
    let old = split_lines(original);
    let new = split_lines(modified);

    let ops = similar::capture_diff_slices(
        opts.algorithm
            .to_similar(),
        &old,
        &new,
    );

    let mut hunks = Vec::new();
    for group in similar::group_diff_ops(ops, opts.context_lines)
    {
        // Zero context leaves empty equal ops at group edges
        let group: Vec<_> = group
            .into_iter()
            .filter(|op| !(op.tag() == DiffTag::Equal && op.old_range().is_empty()))
            .collect();

        let (Some(old_from), Some(old_to)) = (
            group
                .iter()
                .map(|op| op.old_range().start)
                .min(),
            group
                .iter()
                .map(|op| op.old_range().end)
                .max(),
        )
        else
        {
            continue;
        };
        let new_from = group
            .iter()
            .map(|op| op.new_range().start)
            .min()
            .unwrap_or_default();
        let new_to = group
            .iter()
            .map(|op| op.new_range().end)
            .max()
            .unwrap_or_default();
        let old_len = old_to.saturating_sub(old_from);
        let new_len = new_to.saturating_sub(new_from);

        let mut changes = Vec::with_capacity(old_len + new_len);
        for op in &group
        {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag
            {
                DiffTag::Equal =>
                {
                    changes.extend(old[old_range].iter().map(|l| to_change(ChangeKind::Context, l)));
                }
                DiffTag::Delete =>
                {
                    changes.extend(old[old_range].iter().map(|l| to_change(ChangeKind::Removed, l)));
                }
                DiffTag::Insert =>
                {
                    changes.extend(new[new_range].iter().map(|l| to_change(ChangeKind::Added, l)));
                }
                DiffTag::Replace =>
                {
                    changes.extend(old[old_range].iter().map(|l| to_change(ChangeKind::Removed, l)));
                    changes.extend(new[new_range].iter().map(|l| to_change(ChangeKind::Added, l)));
                }
            }
        }

        hunks.push(Hunk::from_changes(
            header_start(old_from, old_len),
            header_start(new_from, new_len),
            None,
            changes,
        ));
    }

    trace!(hunks = hunks.len(), "diffed");
    hunks
}

/// 1-based header start; an empty range names the line before it.
fn header_start(
    index: usize,
    len: usize,
) -> usize
{
    if len == 0 { index } else { index + 1 }
}

fn to_change(
    kind: ChangeKind,
    line: &Line<'_>,
) -> Change
{
    let change = Change::new(kind, line.text);
    if line.newline { change } else { change.without_newline() }
}

/// Join per-file diffs into one blob ordered by path.
///
/// Empty entries are dropped, each entry is newline-terminated, and a
/// blank line separates entries. Input order never affects the output.
pub fn combine_diffs<I, K, V>(diffs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut entries: Vec<(String, String)> = diffs
        .into_iter()
        .filter(|(_, text)| {
            !text
                .as_ref()
                .is_empty()
        })
        .map(|(path, text)| {
            let mut text = text
                .as_ref()
                .to_string();
            if !text.ends_with('\n')
            {
                text.push('\n');
            }
            (
                path.as_ref()
                    .to_string(),
                text,
            )
        })
        .collect();

    entries.sort();

    entries
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n")
}
