//! Patch model: changes, hunks, file patches and multi-file patches.
//!
//! Values are built once by the diff generator or the parser and never
//! mutated afterwards; `reverse()` always returns a new value. Every
//! type renders back to unified-diff text that the parser reads into an
//! equal value.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::infra::lines::Line;

/// Marker printed after a line that has no terminating newline.
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Path marker for the absent side of a create/delete.
pub const DEV_NULL: &str = "/dev/null";

/// Default mode written for created/deleted files.
pub const DEFAULT_FILE_MODE: &str = "100644";

/// Disposition of a single line inside a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind
{
    Context, // unchanged (' ')
    Added,   // new side only ('+')
    Removed, // old side only ('-')
}

impl ChangeKind
{
    pub fn prefix(self) -> char
    {
        match self
        {
            ChangeKind::Context => ' ',
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self>
    {
        match c
        {
            ' ' => Some(ChangeKind::Context),
            '+' => Some(ChangeKind::Added),
            '-' => Some(ChangeKind::Removed),
            _ => None,
        }
    }

    /// Added and Removed trade places; context is its own inverse.
    pub fn reversed(self) -> Self
    {
        match self
        {
            ChangeKind::Context => ChangeKind::Context,
            ChangeKind::Added => ChangeKind::Removed,
            ChangeKind::Removed => ChangeKind::Added,
        }
    }

    pub fn on_old_side(self) -> bool
    {
        matches!(self, ChangeKind::Context | ChangeKind::Removed)
    }

    pub fn on_new_side(self) -> bool
    {
        matches!(self, ChangeKind::Context | ChangeKind::Added)
    }
}

/// One line of a hunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change
{
    pub kind: ChangeKind,
    /// Line text without its newline
    pub text: String,
    /// The line is the last one of its side and has no newline
    pub no_newline: bool,
    /// 1-based line number in the old file (context/removed)
    pub old_line: Option<usize>,
    /// 1-based line number in the new file (context/added)
    pub new_line: Option<usize>,
}

impl Change
{
    pub fn new(
        kind: ChangeKind,
        text: impl Into<String>,
    ) -> Self
    {
        Self { kind, text: text.into(), no_newline: false, old_line: None, new_line: None }
    }

    pub fn context(text: impl Into<String>) -> Self
    {
        Self::new(ChangeKind::Context, text)
    }

    pub fn added(text: impl Into<String>) -> Self
    {
        Self::new(ChangeKind::Added, text)
    }

    pub fn removed(text: impl Into<String>) -> Self
    {
        Self::new(ChangeKind::Removed, text)
    }

    pub fn without_newline(mut self) -> Self
    {
        self.no_newline = true;
        self
    }

    /// View as a buffer line for window matching and reassembly.
    pub fn as_line(&self) -> Line<'_>
    {
        Line { text: &self.text, newline: !self.no_newline }
    }

    fn reversed(&self) -> Self
    {
        Self {
            kind: self.kind.reversed(),
            text: self.text.clone(),
            no_newline: self.no_newline,
            old_line: self.new_line,
            new_line: self.old_line,
        }
    }

    fn render(
        &self,
        out: &mut String,
    )
    {
        out.push(self.kind.prefix());
        out.push_str(&self.text);
        out.push('\n');
        if self.no_newline
        {
            out.push_str(NO_NEWLINE_MARKER);
            out.push('\n');
        }
    }
}

/// A contiguous block of changes with its positional header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk
{
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
    section: Option<String>,
    changes: Vec<Change>,
}

impl Hunk
{
    /// Build a hunk from ordered changes; counts are derived and line
    /// numbers assigned from the header starts.
    ///
    /// Starts follow the `diff -u` convention: 1-based, and for an empty
    /// side the number of the line *before* the empty range.
    pub fn from_changes(
        old_start: usize,
        new_start: usize,
        section: Option<String>,
        mut changes: Vec<Change>,
    ) -> Self
    {
        let mut old_line = old_start;
        let mut new_line = new_start;
        let mut old_count = 0;
        let mut new_count = 0;

        for change in &mut changes
        {
            change.old_line = None;
            change.new_line = None;
            if change
                .kind
                .on_old_side()
            {
                change.old_line = Some(old_line);
                old_line = old_line.saturating_add(1);
                old_count += 1;
            }
            if change
                .kind
                .on_new_side()
            {
                change.new_line = Some(new_line);
                new_line = new_line.saturating_add(1);
                new_count += 1;
            }
        }

        Self { old_start, old_count, new_start, new_count, section, changes }
    }

    pub fn old_start(&self) -> usize
    {
        self.old_start
    }

    pub fn old_count(&self) -> usize
    {
        self.old_count
    }

    pub fn new_start(&self) -> usize
    {
        self.new_start
    }

    pub fn new_count(&self) -> usize
    {
        self.new_count
    }

    /// Text after the closing `@@`, e.g. an enclosing function
    pub fn section(&self) -> Option<&str>
    {
        self.section
            .as_deref()
    }

    pub fn changes(&self) -> &[Change]
    {
        &self.changes
    }

    /// 0-based index of the first old-side line in the target buffer.
    pub fn old_index(&self) -> usize
    {
        if self.old_count == 0 { self.old_start } else { self.old_start.saturating_sub(1) }
    }

    /// Last old-side line covered (1-based, inclusive); for an empty old
    /// side this is the line the insertion follows.
    pub fn old_end(&self) -> usize
    {
        if self.old_count == 0
        {
            self.old_start
        }
        else
        {
            self.old_start
                .saturating_add(self.old_count - 1)
        }
    }

    pub fn additions(&self) -> usize
    {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .count()
    }

    pub fn deletions(&self) -> usize
    {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Removed)
            .count()
    }

    pub fn has_edits(&self) -> bool
    {
        self.changes
            .iter()
            .any(|c| c.kind != ChangeKind::Context)
    }

    /// Context + removed lines, i.e. the window the hunk expects to find.
    pub fn old_lines(&self) -> Vec<Line<'_>>
    {
        self.changes
            .iter()
            .filter(|c| {
                c.kind
                    .on_old_side()
            })
            .map(Change::as_line)
            .collect()
    }

    /// Context + added lines, i.e. the window's replacement.
    pub fn new_lines(&self) -> Vec<Line<'_>>
    {
        self.changes
            .iter()
            .filter(|c| {
                c.kind
                    .on_new_side()
            })
            .map(Change::as_line)
            .collect()
    }

    /// Old side joined with '\n'
    pub fn old_content(&self) -> String
    {
        self.old_lines()
            .iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// New side joined with '\n'
    pub fn new_content(&self) -> String
    {
        self.new_lines()
            .iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn header(&self) -> String
    {
        let mut header = format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        );
        if let Some(section) = &self.section
        {
            header.push(' ');
            header.push_str(section);
        }
        header
    }

    pub fn reverse(&self) -> Self
    {
        Self {
            old_start: self.new_start,
            old_count: self.new_count,
            new_start: self.old_start,
            new_count: self.old_count,
            section: self
                .section
                .clone(),
            changes: self
                .changes
                .iter()
                .map(Change::reversed)
                .collect(),
        }
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
    )
    {
        out.push_str(&self.header());
        out.push('\n');
        for change in &self.changes
        {
            change.render(out);
        }
    }
}

/// What happened to a file as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus
{
    Added,
    Deleted,
    Modified,
    Renamed,
}

impl FileStatus
{
    pub fn reversed(self) -> Self
    {
        match self
        {
            FileStatus::Added => FileStatus::Deleted,
            FileStatus::Deleted => FileStatus::Added,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str
    {
        match self
        {
            FileStatus::Added => "added",
            FileStatus::Deleted => "deleted",
            FileStatus::Modified => "modified",
            FileStatus::Renamed => "renamed",
        }
    }
}

/// All hunks and metadata for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch
{
    pub(crate) old_path: Option<String>, // None for created files
    pub(crate) new_path: Option<String>, // None for deleted files
    pub(crate) status: FileStatus,
    pub(crate) binary: bool,
    pub(crate) old_mode: Option<String>,
    pub(crate) new_mode: Option<String>,
    pub(crate) similarity: Option<u8>,
    pub(crate) hunks: Vec<Hunk>,
}

impl FilePatch
{
    /// In-place edit of `path`.
    pub fn modified(
        path: impl Into<String>,
        hunks: Vec<Hunk>,
    ) -> Self
    {
        let path = path.into();
        Self::with_status(Some(path.clone()), Some(path), FileStatus::Modified, hunks)
    }

    /// Creation of `path`; hunks only add lines.
    pub fn added(
        path: impl Into<String>,
        hunks: Vec<Hunk>,
    ) -> Self
    {
        Self::with_status(None, Some(path.into()), FileStatus::Added, hunks)
    }

    /// Deletion of `path`; hunks only remove lines.
    pub fn deleted(
        path: impl Into<String>,
        hunks: Vec<Hunk>,
    ) -> Self
    {
        Self::with_status(Some(path.into()), None, FileStatus::Deleted, hunks)
    }

    /// Move from `old` to `new`, optionally editing content too.
    pub fn renamed(
        old: impl Into<String>,
        new: impl Into<String>,
        hunks: Vec<Hunk>,
    ) -> Self
    {
        Self::with_status(Some(old.into()), Some(new.into()), FileStatus::Renamed, hunks)
    }

    /// Opaque binary change; never diffed or applied.
    pub fn binary(
        old_path: Option<String>,
        new_path: Option<String>,
    ) -> Self
    {
        let status = match (&old_path, &new_path)
        {
            (None, _) => FileStatus::Added,
            (_, None) => FileStatus::Deleted,
            (Some(o), Some(n)) if o != n => FileStatus::Renamed,
            _ => FileStatus::Modified,
        };
        let mut fp = Self::with_status(old_path, new_path, status, Vec::new());
        fp.binary = true;
        fp
    }

    fn with_status(
        old_path: Option<String>,
        new_path: Option<String>,
        status: FileStatus,
        hunks: Vec<Hunk>,
    ) -> Self
    {
        Self {
            old_path,
            new_path,
            status,
            binary: false,
            old_mode: None,
            new_mode: None,
            similarity: None,
            hunks,
        }
    }

    pub fn old_path(&self) -> Option<&str>
    {
        self.old_path
            .as_deref()
    }

    pub fn new_path(&self) -> Option<&str>
    {
        self.new_path
            .as_deref()
    }

    /// Identifying path: the new path, or the old one for deletions.
    pub fn key(&self) -> &str
    {
        self.new_path
            .as_deref()
            .or(self
                .old_path
                .as_deref())
            .unwrap_or_default()
    }

    pub fn status(&self) -> FileStatus
    {
        self.status
    }

    pub fn is_binary(&self) -> bool
    {
        self.binary
    }

    pub fn old_mode(&self) -> Option<&str>
    {
        self.old_mode
            .as_deref()
    }

    pub fn new_mode(&self) -> Option<&str>
    {
        self.new_mode
            .as_deref()
    }

    pub fn similarity(&self) -> Option<u8>
    {
        self.similarity
    }

    pub fn hunks(&self) -> &[Hunk]
    {
        &self.hunks
    }

    pub fn additions(&self) -> usize
    {
        self.hunks
            .iter()
            .map(Hunk::additions)
            .sum()
    }

    pub fn deletions(&self) -> usize
    {
        self.hunks
            .iter()
            .map(Hunk::deletions)
            .sum()
    }

    pub fn has_changes(&self) -> bool
    {
        !self
            .hunks
            .is_empty()
            || self.status != FileStatus::Modified
            || self.binary
            || self.old_mode != self.new_mode
    }

    pub fn reverse(&self) -> Self
    {
        Self {
            old_path: self
                .new_path
                .clone(),
            new_path: self
                .old_path
                .clone(),
            status: self
                .status
                .reversed(),
            binary: self.binary,
            old_mode: self
                .new_mode
                .clone(),
            new_mode: self
                .old_mode
                .clone(),
            similarity: self.similarity,
            hunks: self
                .hunks
                .iter()
                .map(Hunk::reverse)
                .collect(),
        }
    }

    /// True when plain `---`/`+++` headers cannot express this patch.
    fn needs_git_header(&self) -> bool
    {
        self.binary
            || self.old_mode != self.new_mode
            || self.status == FileStatus::Renamed
            || (self.status != FileStatus::Modified
                && self
                    .hunks
                    .is_empty())
    }

    /// Render this file's headers and hunks.
    pub fn to_unified_diff(&self) -> String
    {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
    )
    {
        let old_label = self
            .old_path
            .as_ref()
            .map_or_else(|| DEV_NULL.to_string(), |p| format!("a/{p}"));
        let new_label = self
            .new_path
            .as_ref()
            .map_or_else(|| DEV_NULL.to_string(), |p| format!("b/{p}"));

        if self.needs_git_header()
        {
            let from = self
                .old_path
                .as_deref()
                .unwrap_or(self.key());
            let to = self
                .new_path
                .as_deref()
                .unwrap_or(self.key());
            let _ = writeln!(out, "diff --git a/{from} b/{to}");

            match self.status
            {
                FileStatus::Added =>
                {
                    let mode = self
                        .new_mode
                        .as_deref()
                        .unwrap_or(DEFAULT_FILE_MODE);
                    let _ = writeln!(out, "new file mode {mode}");
                }
                FileStatus::Deleted =>
                {
                    let mode = self
                        .old_mode
                        .as_deref()
                        .unwrap_or(DEFAULT_FILE_MODE);
                    let _ = writeln!(out, "deleted file mode {mode}");
                }
                FileStatus::Modified | FileStatus::Renamed =>
                {
                    if let (Some(old), Some(new)) = (&self.old_mode, &self.new_mode)
                    {
                        if old != new
                        {
                            let _ = writeln!(out, "old mode {old}");
                            let _ = writeln!(out, "new mode {new}");
                        }
                    }
                }
            }

            if self.status == FileStatus::Renamed
            {
                if let Some(sim) = self.similarity
                {
                    let _ = writeln!(out, "similarity index {sim}%");
                }
                let _ = writeln!(out, "rename from {from}");
                let _ = writeln!(out, "rename to {to}");
            }

            if self.binary
            {
                let _ = writeln!(out, "Binary files {old_label} and {new_label} differ");
                return;
            }

            if self
                .hunks
                .is_empty()
            {
                return;
            }
        }

        let _ = writeln!(out, "--- {old_label}");
        let _ = writeln!(out, "+++ {new_label}");
        for hunk in &self.hunks
        {
            hunk.render(out);
        }
    }
}

/// Dialect a patch was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchFormat
{
    #[default]
    Unified, // plain `diff -u`
    Git,     // `diff --git` extended headers
}

/// Ordered multi-file patch, keyed and iterated by identifying path.
///
/// A deletion and one other file patch may share a path (a file removed
/// and another renamed or created in its place); the deletion sorts
/// first. Any other repeat of a key is a duplicate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "PatchFiles")]
pub struct Patch
{
    files: Vec<FilePatch>,
    format: PatchFormat,
}

/// Deserialized form; entries are re-sorted and deduplicated.
#[derive(Deserialize)]
struct PatchFiles
{
    files: Vec<FilePatch>,
    #[serde(default)]
    format: PatchFormat,
}

impl From<PatchFiles> for Patch
{
    fn from(raw: PatchFiles) -> Self
    {
        let mut patch = Self::from_files(raw.files);
        patch.format = raw.format;
        patch
    }
}

/// Position of a file patch: identifying path, deletions first.
fn slot(fp: &FilePatch) -> (&str, bool)
{
    (fp.key(), fp.status != FileStatus::Deleted)
}

/// Equality is structural over the file patches; the dialect only
/// records where a value came from.
impl PartialEq for Patch
{
    fn eq(
        &self,
        other: &Self,
    ) -> bool
    {
        self.files == other.files
    }
}

impl Eq for Patch {}

impl Patch
{
    pub fn new(format: PatchFormat) -> Self
    {
        Self { files: Vec::new(), format }
    }

    /// Collect file patches; for duplicate keys the first one wins.
    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator<Item = FilePatch>,
    {
        let mut patch = Self::default();
        for fp in files
        {
            patch.try_insert(fp);
        }
        patch
    }

    /// Insert unless the slot is already taken; returns whether it was.
    pub(crate) fn try_insert(
        &mut self,
        fp: FilePatch,
    ) -> bool
    {
        match self
            .files
            .binary_search_by(|existing| slot(existing).cmp(&slot(&fp)))
        {
            Ok(_) => false,
            Err(at) =>
            {
                self.files
                    .insert(at, fp);
                true
            }
        }
    }

    pub fn format(&self) -> PatchFormat
    {
        self.format
    }

    pub(crate) fn set_format(
        &mut self,
        format: PatchFormat,
    )
    {
        self.format = format;
    }

    /// File patches in lexical key order.
    pub fn files(&self) -> impl Iterator<Item = &FilePatch>
    {
        self.files
            .iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str>
    {
        self.files
            .iter()
            .map(FilePatch::key)
    }

    pub fn len(&self) -> usize
    {
        self.files
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.files
            .is_empty()
    }

    /// Lookup by identifying key. When a deletion shares the key, the
    /// file patch that leaves content at the path is returned.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&FilePatch>
    {
        self.files
            .iter()
            .rev()
            .find(|fp| fp.key() == key)
    }

    /// Lookup by either the old or the new path.
    pub fn get_file(
        &self,
        path: &str,
    ) -> Option<&FilePatch>
    {
        self.get(path)
            .or_else(|| {
                self.files()
                    .find(|fp| fp.old_path() == Some(path) || fp.new_path() == Some(path))
            })
    }

    pub fn total_additions(&self) -> usize
    {
        self.files()
            .map(FilePatch::additions)
            .sum()
    }

    pub fn total_deletions(&self) -> usize
    {
        self.files()
            .map(FilePatch::deletions)
            .sum()
    }

    pub fn hunk_count(&self) -> usize
    {
        self.files()
            .map(|fp| {
                fp.hunks()
                    .len()
            })
            .sum()
    }

    fn with_status(
        &self,
        status: FileStatus,
    ) -> Vec<&FilePatch>
    {
        self.files()
            .filter(|fp| fp.status == status)
            .collect()
    }

    pub fn new_files(&self) -> Vec<&FilePatch>
    {
        self.with_status(FileStatus::Added)
    }

    pub fn deleted_files(&self) -> Vec<&FilePatch>
    {
        self.with_status(FileStatus::Deleted)
    }

    pub fn renamed_files(&self) -> Vec<&FilePatch>
    {
        self.with_status(FileStatus::Renamed)
    }

    pub fn modified_files(&self) -> Vec<&FilePatch>
    {
        self.with_status(FileStatus::Modified)
    }

    /// Undo patch: every file reversed, keys recomputed. A rename away
    /// from a path that is then recreated reverses into a deletion plus a
    /// rename sharing that path, so both are kept.
    ///
    /// Only a patch that reads one path as the source of two file patches
    /// can collide here, and no provider state satisfies such a patch.
    pub fn reverse(&self) -> Self
    {
        let mut reversed = Self::new(self.format);
        for fp in self.files()
        {
            reversed.try_insert(fp.reverse());
        }
        reversed
    }

    /// Serialize all files in key order.
    pub fn to_unified_diff(&self) -> String
    {
        let mut out = String::new();
        for fp in self.files()
        {
            fp.render(&mut out);
        }
        out
    }

    /// Human-readable overview.
    pub fn summary(&self) -> String
    {
        let mut out = String::new();
        let _ = writeln!(out, "Patch: {} file(s)", self.len());
        let _ = writeln!(out, "  +{}/-{} lines", self.total_additions(), self.total_deletions());

        for (label, count) in [
            ("New", self.new_files().len()),
            ("Deleted", self.deleted_files().len()),
            ("Renamed", self.renamed_files().len()),
            ("Modified", self.modified_files().len()),
        ]
        {
            if count > 0
            {
                let _ = writeln!(out, "  {label}: {count}");
            }
        }

        out.push_str("Files:\n");
        for fp in self.files()
        {
            let status = match fp.status
            {
                FileStatus::Added => " (new)".to_string(),
                FileStatus::Deleted => " (deleted)".to_string(),
                FileStatus::Renamed => format!(
                    " (renamed from {})",
                    fp.old_path()
                        .unwrap_or_default()
                ),
                FileStatus::Modified => String::new(),
            };
            let binary = if fp.binary { " [binary]" } else { "" };
            let _ = writeln!(
                out,
                "  {}{status}{binary}: +{}/-{}",
                fp.key(),
                fp.additions(),
                fp.deletions()
            );
        }
        out
    }
}
