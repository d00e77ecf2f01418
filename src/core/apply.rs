//! Patch application with bounded offset search.
//!
//! Each file is computed fully in memory first; the provider only sees
//! one `write` (and for renames/deletions one `remove`) per file. A
//! conflict aborts that file only.
//!
//! Files run in dependency order: deletions, then renames, then edits
//! and creations, so a path freed by one file can be taken by another.
//! Dry runs go through a [`Transaction`] that is never committed, which
//! lets later files see what earlier ones would have done.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::model::{FilePatch, FileStatus, Patch};
use crate::core::provider::{FileProvider, ProviderError};
use crate::core::transaction::Transaction;
use crate::infra::lines::{Line, join_lines, split_lines};

/// Default search radius around a hunk's declared position.
pub const DEFAULT_MAX_OFFSET: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions
{
    /// Lines to search either side of the declared position
    pub max_offset: usize,
    /// Compute results without writing anything
    pub dry_run: bool,
}

impl Default for ApplyOptions
{
    fn default() -> Self
    {
        Self { max_offset: DEFAULT_MAX_OFFSET, dry_run: false }
    }
}

/// Why a file could not be patched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason
{
    #[error("context expected near line {expected_line} not found within {searched} lines")]
    ContextNotFound
    {
        expected_line: usize,
        searched: usize,
    },

    #[error("target already exists")]
    AlreadyExists,

    #[error("current content does not match the patch")]
    ContentMismatch,

    #[error("content guard does not match")]
    GuardMismatch,
}

/// A file the patch could not be applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyConflict
{
    pub path: String,
    /// 0-based hunk (or script operation) that failed, if any
    pub hunk_index: Option<usize>,
    pub reason: ConflictReason,
}

impl ApplyConflict
{
    pub fn new(
        path: impl Into<String>,
        hunk_index: Option<usize>,
        reason: ConflictReason,
    ) -> Self
    {
        Self { path: path.into(), hunk_index, reason }
    }
}

impl fmt::Display for ApplyConflict
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self.hunk_index
        {
            Some(i) => write!(f, "{} (hunk #{}): {}", self.path, i + 1, self.reason),
            None => write!(f, "{}: {}", self.path, self.reason),
        }
    }
}

impl std::error::Error for ApplyConflict {}

/// Where a hunk actually landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HunkPlacement
{
    pub index: usize,
    /// Old-start from the hunk header
    pub declared_line: usize,
    /// 1-based first line of the window that matched
    pub applied_line: usize,
    /// Found position minus expected position
    pub offset: isize,
}

/// Result for one file of a patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome
{
    Applied
    {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        renamed_from: Option<String>,
        hunks: Vec<HunkPlacement>,
        /// Resulting content, dry runs only
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Created
    {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Deleted
    {
        path: String,
    },
    Skipped
    {
        path: String,
        reason: String,
    },
    Conflict(ApplyConflict),
    Failed
    {
        path: String,
        error: String,
    },
}

impl FileOutcome
{
    pub fn path(&self) -> &str
    {
        match self
        {
            FileOutcome::Applied { path, .. }
            | FileOutcome::Created { path, .. }
            | FileOutcome::Deleted { path }
            | FileOutcome::Skipped { path, .. }
            | FileOutcome::Failed { path, .. } => path,
            FileOutcome::Conflict(c) => &c.path,
        }
    }

    /// Computed content of a dry run (`Some("")` for deletions).
    pub fn content(&self) -> Option<&str>
    {
        match self
        {
            FileOutcome::Applied { content, .. } | FileOutcome::Created { content, .. } => content.as_deref(),
            FileOutcome::Deleted { .. } => Some(""),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool
    {
        matches!(
            self,
            FileOutcome::Applied { .. } | FileOutcome::Created { .. } | FileOutcome::Deleted { .. }
        )
    }

    fn failed(
        path: &str,
        err: &ProviderError,
    ) -> Self
    {
        FileOutcome::Failed { path: path.to_string(), error: err.to_string() }
    }
}

/// Per-file outcomes of one `apply()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport
{
    pub dry_run: bool,
    pub files: Vec<FileOutcome>,
}

impl ApplyReport
{
    /// Nothing conflicted or failed.
    pub fn is_clean(&self) -> bool
    {
        self.files
            .iter()
            .all(|f| !matches!(f, FileOutcome::Conflict(_) | FileOutcome::Failed { .. }))
    }

    pub fn conflicts(&self) -> Vec<&ApplyConflict>
    {
        self.files
            .iter()
            .filter_map(|f| match f
            {
                FileOutcome::Conflict(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Paths written, created or deleted (or that would be, in a dry run).
    pub fn applied_paths(&self) -> Vec<&str>
    {
        self.files
            .iter()
            .filter(|f| f.is_success())
            .map(FileOutcome::path)
            .collect()
    }

    pub fn outcome(
        &self,
        path: &str,
    ) -> Option<&FileOutcome>
    {
        self.files
            .iter()
            .find(|f| f.path() == path)
    }
}

/// Applies patches through a [`FileProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Applier
{
    options: ApplyOptions,
}

impl Applier
{
    pub fn new(options: ApplyOptions) -> Self
    {
        Self { options }
    }

    pub fn options(&self) -> ApplyOptions
    {
        self.options
    }

    /// Apply every file of `patch`. The report lists files in the order
    /// they were applied (see [`application_rank`]).
    #[instrument(level = "debug", skip_all, fields(files = patch.len(), dry_run = self.options.dry_run))]
    pub fn apply<P: FileProvider + ?Sized>(
        &self,
        patch: &Patch,
        provider: &mut P,
    ) -> ApplyReport
    {
        let mut ordered: Vec<&FilePatch> = patch
            .files()
            .collect();
        ordered.sort_by_key(|fp| application_rank(fp.status()));

        let files: Vec<FileOutcome> = if self
            .options
            .dry_run
        {
            let mut overlay = Transaction::new(provider);
            ordered
                .into_iter()
                .map(|fp| self.apply_staged(fp, &mut overlay))
                .collect()
        }
        else
        {
            ordered
                .into_iter()
                .map(|fp| self.apply_staged(fp, provider))
                .collect()
        };

        let report = ApplyReport { dry_run: self.options.dry_run, files };
        info!(
            applied = report
                .applied_paths()
                .len(),
            conflicts = report
                .conflicts()
                .len(),
            "apply finished"
        );
        report
    }

    /// Apply one file patch.
    pub fn apply_file<P: FileProvider + ?Sized>(
        &self,
        fp: &FilePatch,
        provider: &mut P,
    ) -> FileOutcome
    {
        if self
            .options
            .dry_run
        {
            self.apply_staged(fp, &mut Transaction::new(provider))
        }
        else
        {
            self.apply_staged(fp, provider)
        }
    }

    /// Writes go straight to `provider`; dry runs hand in an overlay.
    fn apply_staged<P: FileProvider + ?Sized>(
        &self,
        fp: &FilePatch,
        provider: &mut P,
    ) -> FileOutcome
    {
        let key = fp.key();
        if fp.is_binary()
        {
            debug!(path = key, "skipping binary file");
            return FileOutcome::Skipped { path: key.to_string(), reason: "binary file".into() };
        }

        let outcome = match fp.status()
        {
            FileStatus::Added => self.create(fp, provider),
            FileStatus::Deleted => self.delete(fp, provider),
            FileStatus::Modified | FileStatus::Renamed => self.modify(fp, provider),
        };

        if let FileOutcome::Conflict(conflict) = &outcome
        {
            warn!(%conflict, "patch does not apply");
        }
        outcome
    }

    fn create<P: FileProvider + ?Sized>(
        &self,
        fp: &FilePatch,
        provider: &mut P,
    ) -> FileOutcome
    {
        let path = fp.key();
        if provider.exists(path)
        {
            return FileOutcome::Conflict(ApplyConflict::new(path, None, ConflictReason::AlreadyExists));
        }

        let content = match self.apply_to_content(fp, "")
        {
            Ok(content) => content,
            Err(conflict) => return FileOutcome::Conflict(conflict),
        };

        if let Err(e) = provider.write(path, &content)
        {
            return FileOutcome::failed(path, &e);
        }
        FileOutcome::Created { path: path.to_string(), content: self.dry(content) }
    }

    fn delete<P: FileProvider + ?Sized>(
        &self,
        fp: &FilePatch,
        provider: &mut P,
    ) -> FileOutcome
    {
        let path = fp.key();
        let current = match provider.read(path)
        {
            Ok(Some(c)) => c,
            Ok(None) => return FileOutcome::failed(path, &ProviderError::NotFound { path: path.to_string() }),
            Err(e) => return FileOutcome::failed(path, &e),
        };

        // Removing every old-side line must leave nothing behind
        let emptied = self
            .apply_to_content(fp, &current)
            .is_ok_and(|rest| rest.is_empty());
        if !emptied
        {
            return FileOutcome::Conflict(ApplyConflict::new(path, None, ConflictReason::ContentMismatch));
        }

        if let Err(e) = provider.remove(path)
        {
            return FileOutcome::failed(path, &e);
        }
        FileOutcome::Deleted { path: path.to_string() }
    }

    fn modify<P: FileProvider + ?Sized>(
        &self,
        fp: &FilePatch,
        provider: &mut P,
    ) -> FileOutcome
    {
        let target = fp.key();
        let renamed_from = match fp.status()
        {
            FileStatus::Renamed => fp
                .old_path()
                .filter(|old| *old != target),
            _ => None,
        };
        let source = renamed_from.unwrap_or(target);

        if renamed_from.is_some() && provider.exists(target)
        {
            return FileOutcome::Conflict(ApplyConflict::new(target, None, ConflictReason::AlreadyExists));
        }

        let current = match provider.read(source)
        {
            Ok(Some(c)) => c,
            Ok(None) => return FileOutcome::failed(source, &ProviderError::NotFound { path: source.to_string() }),
            Err(e) => return FileOutcome::failed(source, &e),
        };

        let (content, hunks) = match self.place_hunks(fp, &current)
        {
            Ok(done) => done,
            Err(conflict) => return FileOutcome::Conflict(conflict),
        };

        if let Err(e) = provider.write(target, &content)
        {
            return FileOutcome::failed(target, &e);
        }
        if let Some(old) = renamed_from
        {
            if let Err(e) = provider.remove(old)
            {
                return FileOutcome::failed(old, &e);
            }
        }

        debug!(path = target, hunks = hunks.len(), "applied");
        FileOutcome::Applied {
            path: target.to_string(),
            renamed_from: renamed_from.map(str::to_string),
            hunks,
            content: self.dry(content),
        }
    }

    fn dry(
        &self,
        content: String,
    ) -> Option<String>
    {
        self.options
            .dry_run
            .then_some(content)
    }

    /// Apply `fp`'s hunks to `content` in memory.
    pub fn apply_to_content(
        &self,
        fp: &FilePatch,
        content: &str,
    ) -> Result<String, ApplyConflict>
    {
        self.place_hunks(fp, content)
            .map(|(content, _)| content)
    }

    /// In-memory core: returns the new content and where each hunk went.
    pub fn place_hunks(
        &self,
        fp: &FilePatch,
        content: &str,
    ) -> Result<(String, Vec<HunkPlacement>), ApplyConflict>
    {
        let mut lines = split_lines(content);
        let mut placements = Vec::with_capacity(
            fp.hunks()
                .len(),
        );
        let mut delta: isize = 0;
        let mut floor = 0usize;

        for (index, hunk) in fp
            .hunks()
            .iter()
            .enumerate()
        {
            let old = hunk.old_lines();
            let new = hunk.new_lines();
            let wanted = shifted(hunk.old_index(), delta);

            let Some(at) = locate(&lines, &old, wanted, floor, self.options.max_offset)
            else
            {
                return Err(ApplyConflict::new(
                    fp.key(),
                    Some(index),
                    ConflictReason::ContextNotFound {
                        expected_line: wanted.saturating_add(1),
                        searched: self.options.max_offset,
                    },
                ));
            };

            let offset = signed_distance(at, wanted);
            if offset != 0
            {
                debug!(path = fp.key(), hunk = index, offset, "hunk relocated");
            }

            lines.splice(at..at + old.len(), new.iter().copied());
            placements.push(HunkPlacement { index, declared_line: hunk.old_start(), applied_line: at + 1, offset });

            floor = at + new.len();
            delta = delta
                .saturating_add(offset)
                .saturating_add(new.len() as isize - old.len() as isize);
        }

        Ok((join_lines(lines), placements))
    }
}

/// Find where `window` sits in `lines`: `wanted` first, then outward one
/// line at a time up to `max_offset`, later before earlier at equal
/// distance. Positions before `floor` are off limits.
pub(crate) fn locate(
    lines: &[Line<'_>],
    window: &[Line<'_>],
    wanted: usize,
    floor: usize,
    max_offset: usize,
) -> Option<usize>
{
    let last_start = lines
        .len()
        .checked_sub(window.len())?;
    let fits = |pos: usize| pos >= floor && pos <= last_start && lines[pos..pos + window.len()] == *window;

    if fits(wanted)
    {
        return Some(wanted);
    }

    // Nothing closer than this can start inside the buffer
    let first_distance = wanted
        .saturating_sub(last_start)
        .max(1);

    for distance in first_distance..=max_offset
    {
        let later = wanted.saturating_add(distance);
        if fits(later)
        {
            return Some(later);
        }

        let earlier = wanted.checked_sub(distance);
        if let Some(pos) = earlier.filter(|p| fits(*p))
        {
            return Some(pos);
        }

        // Both directions exhausted
        let later_done = later >= last_start;
        let earlier_done = earlier.is_none_or(|p| p < floor);
        if later_done && earlier_done
        {
            break;
        }
    }
    None
}

/// Order in which file patches run: anything that frees a path goes
/// before anything that may need it.
pub fn application_rank(status: FileStatus) -> u8
{
    match status
    {
        FileStatus::Deleted => 0,
        FileStatus::Renamed => 1,
        FileStatus::Modified => 2,
        FileStatus::Added => 3,
    }
}

/// `index` moved by the net line delta of earlier hunks.
pub(crate) fn shifted(
    index: usize,
    delta: isize,
) -> usize
{
    index
        .checked_add_signed(delta)
        .unwrap_or(0)
}

/// `at - wanted` as a signed offset.
pub(crate) fn signed_distance(
    at: usize,
    wanted: usize,
) -> isize
{
    if at >= wanted
    {
        isize::try_from(at - wanted).unwrap_or(isize::MAX)
    }
    else
    {
        isize::try_from(wanted - at).map_or(isize::MIN, |d| -d)
    }
}

/// Apply with the default search radius.
pub fn apply<P: FileProvider + ?Sized>(
    patch: &Patch,
    provider: &mut P,
    dry_run: bool,
) -> ApplyReport
{
    Applier::new(ApplyOptions { dry_run, ..ApplyOptions::default() }).apply(patch, provider)
}

/// The patch that undoes `patch`.
pub fn reverse(patch: &Patch) -> Patch
{
    patch.reverse()
}
