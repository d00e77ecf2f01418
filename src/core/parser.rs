//! Unified / git-extended diff text → [`Patch`].
//!
//! Parsing never fails as a whole. Each file block either becomes a
//! [`FilePatch`] or is skipped with a [`ParseError`] (logged at `warn`
//! and returned in [`ParseReport::skipped`]).
//!
//! Hunk bodies are read *by count*: once the header says `-o,oc +n,nc`,
//! exactly `oc` old-side and `nc` new-side lines are consumed, so a
//! removed line that happens to read `-- foo` is never taken for a file
//! header.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::model::{
    Change, ChangeKind, DEFAULT_FILE_MODE, DEV_NULL, FilePatch, FileStatus, Hunk, Patch, PatchFormat,
};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$").expect("hunk header pattern")
});

static GIT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^diff --git "?a/(.+?)"? "?b/(.+?)"?$"#).expect("git header pattern"));

static BINARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Binary files (.+) and (.+) differ$").expect("binary pattern"));

static SIMILARITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^similarity index (\d{1,3})%$").expect("similarity pattern"));

/// Why a file block was dropped. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError
{
    #[error("line {line}: malformed hunk header `{header}`")]
    MalformedHunkHeader { line: usize, header: String },

    #[error("line {line}: hunk ends early ({old_missing} old-side, {new_missing} new-side lines missing)")]
    TruncatedHunk { line: usize, old_missing: usize, new_missing: usize },

    #[error("line {line}: unexpected line in hunk body `{content}`")]
    UnexpectedLine { line: usize, content: String },

    #[error("line {line}: `{content}` exceeds the hunk's declared counts")]
    CountMismatch { line: usize, content: String },

    #[error("line {line}: hunk overlaps or precedes the previous hunk")]
    OverlappingHunks { line: usize },

    #[error("line {line}: file block names no path")]
    MissingPath { line: usize },

    #[error("duplicate file `{path}` (first occurrence kept)")]
    DuplicateFile { path: String },

    #[error("line {line}: hunk outside any file block")]
    OrphanHunk { line: usize },
}

/// A file block that did not make it into the patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlock
{
    /// Best-known path of the block, if any header was read
    pub path: Option<String>,
    pub error: ParseError,
}

/// Parsed patch plus everything that was skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct ParseReport
{
    pub patch: Patch,
    pub skipped: Vec<SkippedBlock>,
}

/// Parse diff text, dropping unparsable file blocks.
pub fn parse(text: &str) -> Patch
{
    parse_report(text).patch
}

/// Read and parse a patch file; only I/O problems are errors.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Patch>
{
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading patch {}", path.display()))?;
    Ok(parse(&text))
}

/// Parse diff text and report skipped blocks.
#[instrument(level = "debug", skip_all, fields(bytes = text.len()))]
pub fn parse_report(text: &str) -> ParseReport
{
    let mut lines: Vec<&str> = text
        .split('\n')
        .collect();
    if text.is_empty() || text.ends_with('\n')
    {
        lines.pop();
    }

    let mut parser = Parser { lines: &lines, pos: 0, current: None, report: ParseReport::default(), git: false };
    parser.run();

    let Parser { mut report, git, .. } = parser;
    if git
    {
        report
            .patch
            .set_format(PatchFormat::Git);
    }

    debug!(files = report.patch.len(), skipped = report.skipped.len(), "parsed patch");
    report
}

/// One side of a `---`/`+++` header
#[derive(Debug, Clone, PartialEq, Eq)]
enum Side
{
    Absent,
    Path(String),
}

impl Side
{
    fn into_path(self) -> Option<String>
    {
        match self
        {
            Side::Absent => None,
            Side::Path(p) => Some(p),
        }
    }
}

/// Accumulates one file block until the next block starts.
#[derive(Debug, Default)]
struct Block
{
    line: usize,
    git: bool,
    git_old: Option<String>,
    git_new: Option<String>,
    old_header: Option<Side>,
    new_header: Option<Side>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    new_file: bool,
    deleted_file: bool,
    old_mode: Option<String>,
    new_mode: Option<String>,
    similarity: Option<u8>,
    binary: Option<(Side, Side)>,
    hunks: Vec<Hunk>,
    error: Option<ParseError>,
}

impl Block
{
    /// Still reading git extended header lines
    fn in_git_preamble(&self) -> bool
    {
        self.git
            && self
                .old_header
                .is_none()
            && self
                .hunks
                .is_empty()
    }

    fn best_path(&self) -> Option<String>
    {
        let header = |side: &Option<Side>| match side
        {
            Some(Side::Path(p)) => Some(p.clone()),
            _ => None,
        };
        header(&self.new_header)
            .or_else(|| header(&self.old_header))
            .or_else(|| {
                self.git_new
                    .clone()
            })
            .or_else(|| {
                self.git_old
                    .clone()
            })
    }

    fn finish(self) -> Result<FilePatch, ParseError>
    {
        if let Some(err) = self.error
        {
            return Err(err);
        }

        let (binary_old, binary_new) = match &self.binary
        {
            Some((o, n)) => (Some(o.clone()), Some(n.clone())),
            None => (None, None),
        };

        let old_path = if self.new_file
            || self.old_header == Some(Side::Absent)
            || binary_old == Some(Side::Absent)
        {
            None
        }
        else
        {
            self.rename_from
                .or(self
                    .old_header
                    .and_then(Side::into_path))
                .or(self.git_old)
        };

        let new_path = if self.deleted_file
            || self.new_header == Some(Side::Absent)
            || binary_new == Some(Side::Absent)
        {
            None
        }
        else
        {
            self.rename_to
                .clone()
                .or(self
                    .new_header
                    .and_then(Side::into_path))
                .or(self.git_new)
        };

        let explicit_rename = self
            .rename_to
            .is_some();
        let status = match (&old_path, &new_path)
        {
            (None, None) => return Err(ParseError::MissingPath { line: self.line }),
            (None, Some(_)) => FileStatus::Added,
            (Some(_), None) => FileStatus::Deleted,
            (Some(o), Some(n)) if o != n && (explicit_rename || self.hunks.is_empty()) => FileStatus::Renamed,
            _ => FileStatus::Modified,
        };

        Ok(FilePatch {
            old_path,
            new_path,
            status,
            binary: self
                .binary
                .is_some(),
            old_mode: self.old_mode,
            new_mode: self.new_mode,
            similarity: if status == FileStatus::Renamed { self.similarity } else { None },
            hunks: self.hunks,
        })
    }
}

struct Parser<'t>
{
    lines: &'t [&'t str],
    pos: usize,
    current: Option<Block>,
    report: ParseReport,
    git: bool,
}

impl<'t> Parser<'t>
{
    fn run(&mut self)
    {
        while self.pos
            < self
                .lines
                .len()
        {
            let line = self.lines[self.pos];

            if let Some(caps) = GIT_HEADER.captures(line)
            {
                self.flush();
                self.git = true;
                self.current = Some(Block {
                    line: self.pos + 1,
                    git: true,
                    git_old: Some(caps[1].to_string()),
                    git_new: Some(caps[2].to_string()),
                    ..Block::default()
                });
                self.pos += 1;
                continue;
            }

            if line.starts_with("--- ")
                && self
                    .lines
                    .get(self.pos + 1)
                    .is_some_and(|next| next.starts_with("+++ "))
            {
                let joins_git_block = self
                    .current
                    .as_ref()
                    .is_some_and(|b| b.in_git_preamble() && b.error.is_none());
                if !joins_git_block
                {
                    self.flush();
                    self.current = Some(Block { line: self.pos + 1, ..Block::default() });
                }
                let old = parse_side(&line[4..], "a/");
                let new = parse_side(&self.lines[self.pos + 1][4..], "b/");
                if let Some(block) = self
                    .current
                    .as_mut()
                {
                    block.old_header = Some(old);
                    block.new_header = Some(new);
                }
                self.pos += 2;
                continue;
            }

            if line.starts_with("@@")
            {
                self.hunk();
                continue;
            }

            if let Some(block) = self
                .current
                .as_mut()
                .filter(|b| b.in_git_preamble())
            {
                git_extended_line(block, line);
            }
            // Anything else is preamble or trailing noise
            self.pos += 1;
        }
        self.flush();
    }

    /// Handle a `@@` line at `pos`, consuming its body.
    fn hunk(&mut self)
    {
        let header_line = self.pos + 1;
        let parsed = parse_hunk(self.lines, &mut self.pos);
        // A malformed header consumes nothing; step over it
        if self.pos + 1 == header_line
        {
            self.pos += 1;
        }

        let Some(block) = self
            .current
            .as_mut()
        else
        {
            let error = ParseError::OrphanHunk { line: header_line };
            warn!(%error, "skipping hunk");
            self.report
                .skipped
                .push(SkippedBlock { path: None, error });
            return;
        };

        if block
            .error
            .is_some()
        {
            return;
        }

        match parsed
        {
            Ok(hunk) =>
            {
                let overlaps = block
                    .hunks
                    .last()
                    .is_some_and(|prev| {
                        hunk.old_index()
                            < prev
                                .old_index()
                                .saturating_add(prev.old_count())
                    });
                if overlaps
                {
                    block.error = Some(ParseError::OverlappingHunks { line: header_line });
                }
                else
                {
                    block
                        .hunks
                        .push(hunk);
                }
            }
            Err(err) => block.error = Some(err),
        }
    }

    fn flush(&mut self)
    {
        let Some(block) = self
            .current
            .take()
        else
        {
            return;
        };

        let path = block.best_path();
        let result = block
            .finish()
            .and_then(|fp| {
                let key = fp
                    .key()
                    .to_string();
                if self
                    .report
                    .patch
                    .try_insert(fp)
                {
                    Ok(())
                }
                else
                {
                    Err(ParseError::DuplicateFile { path: key })
                }
            });

        if let Err(error) = result
        {
            warn!(path = path.as_deref().unwrap_or("?"), %error, "skipping file block");
            self.report
                .skipped
                .push(SkippedBlock { path, error });
        }
    }
}

/// Header lines between `diff --git` and the first hunk.
fn git_extended_line(
    block: &mut Block,
    line: &str,
)
{
    if let Some(mode) = line.strip_prefix("new file mode ")
    {
        block.new_file = true;
        block.new_mode = non_default_mode(mode);
    }
    else if let Some(mode) = line.strip_prefix("deleted file mode ")
    {
        block.deleted_file = true;
        block.old_mode = non_default_mode(mode);
    }
    else if let Some(mode) = line.strip_prefix("old mode ")
    {
        block.old_mode = Some(
            mode.trim()
                .to_string(),
        );
    }
    else if let Some(mode) = line.strip_prefix("new mode ")
    {
        block.new_mode = Some(
            mode.trim()
                .to_string(),
        );
    }
    else if let Some(from) = line.strip_prefix("rename from ")
    {
        block.rename_from = Some(unquote(from));
    }
    else if let Some(to) = line.strip_prefix("rename to ")
    {
        block.rename_to = Some(unquote(to));
    }
    else if let Some(caps) = SIMILARITY.captures(line)
    {
        block.similarity = caps[1]
            .parse::<u8>()
            .ok()
            .filter(|n| *n <= 100);
    }
    else if let Some(caps) = BINARY_LINE.captures(line)
    {
        block.binary = Some((parse_side(&caps[1], "a/"), parse_side(&caps[2], "b/")));
    }
    // `index ...`, `copy ...` and friends carry nothing we keep
}

/// Creation/deletion with the regular file mode is the implicit case.
fn non_default_mode(mode: &str) -> Option<String>
{
    let mode = mode.trim();
    (mode != DEFAULT_FILE_MODE).then(|| mode.to_string())
}

/// `a/src/x.rs\t2024-01-01 ...` → `Path("src/x.rs")`
fn parse_side(
    raw: &str,
    prefix: &str,
) -> Side
{
    let raw = raw
        .split('\t')
        .next()
        .unwrap_or_default()
        .trim_end();
    let raw = unquote(raw);
    if raw == DEV_NULL
    {
        return Side::Absent;
    }
    let path = raw
        .strip_prefix(prefix)
        .map(str::to_string)
        .unwrap_or(raw);
    Side::Path(path)
}

/// Undo git's C-style quoting of unusual paths.
fn unquote(raw: &str) -> String
{
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
    else
    {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next()
    {
        if c != '\\'
        {
            out.push(c);
            continue;
        }
        match chars.next()
        {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// True for lines that open a new block or hunk.
fn looks_like_header(
    lines: &[&str],
    pos: usize,
) -> bool
{
    let line = lines[pos];
    line.starts_with("@@ ")
        || GIT_HEADER.is_match(line)
        || (line.starts_with("--- ")
            && lines
                .get(pos + 1)
                .is_some_and(|n| n.starts_with("+++ ")))
}

/// Parse the hunk whose header is at `*pos`, advancing past its body.
///
/// On error `*pos` rests on the offending line (or the header itself for
/// a malformed header) so the caller can resynchronize.
fn parse_hunk(
    lines: &[&str],
    pos: &mut usize,
) -> Result<Hunk, ParseError>
{
    let header = lines[*pos];
    let header_line = *pos + 1;
    let malformed = || ParseError::MalformedHunkHeader { line: header_line, header: header.to_string() };

    let caps = HUNK_HEADER
        .captures(header)
        .ok_or_else(malformed)?;
    let number = |idx: usize, default: usize| -> Result<usize, ParseError> {
        match caps.get(idx)
        {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| malformed()),
            None => Ok(default),
        }
    };
    let old_start = number(1, 0)?;
    let old_count = number(2, 1)?;
    let new_start = number(3, 0)?;
    let new_count = number(4, 1)?;

    // A non-empty side starts at line 1, and no range runs past usize
    let side_fits = |start: usize, count: usize| (count == 0 || start > 0) && start.checked_add(count).is_some();
    if !side_fits(old_start, old_count) || !side_fits(new_start, new_count)
    {
        return Err(malformed());
    }
    let section = caps
        .get(5)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    *pos += 1;
    let mut old_left = old_count;
    let mut new_left = new_count;
    let mut changes: Vec<Change> = Vec::with_capacity(
        old_count
            .saturating_add(new_count)
            .min(lines.len() - *pos),
    );

    while old_left > 0 || new_left > 0
    {
        let Some(&line) = lines.get(*pos)
        else
        {
            return Err(ParseError::TruncatedHunk { line: header_line, old_missing: old_left, new_missing: new_left });
        };

        if line.starts_with('\\')
        {
            if let Some(last) = changes.last_mut()
            {
                last.no_newline = true;
            }
            *pos += 1;
            continue;
        }

        let (kind, text) = match line.chars().next()
        {
            None => (Some(ChangeKind::Context), ""),
            Some(c) => (ChangeKind::from_prefix(c), &line[c.len_utf8()..]),
        };

        let fits = match kind
        {
            Some(ChangeKind::Context) => old_left > 0 && new_left > 0,
            Some(ChangeKind::Removed) => old_left > 0,
            Some(ChangeKind::Added) => new_left > 0,
            None => false,
        };

        let Some(kind) = kind.filter(|_| fits)
        else
        {
            return Err(if looks_like_header(lines, *pos)
            {
                ParseError::TruncatedHunk { line: header_line, old_missing: old_left, new_missing: new_left }
            }
            else if kind.is_some()
            {
                ParseError::CountMismatch { line: *pos + 1, content: line.to_string() }
            }
            else
            {
                ParseError::UnexpectedLine { line: *pos + 1, content: line.to_string() }
            });
        };

        if kind.on_old_side()
        {
            old_left -= 1;
        }
        if kind.on_new_side()
        {
            new_left -= 1;
        }
        changes.push(Change::new(kind, text));
        *pos += 1;
    }

    // Marker for the body's final line
    if let Some(line) = lines.get(*pos)
    {
        if line.starts_with('\\')
        {
            if let Some(last) = changes.last_mut()
            {
                last.no_newline = true;
            }
            *pos += 1;
        }
    }

    Ok(Hunk::from_changes(old_start, new_start, section, changes))
}

#[cfg(test)]
mod tests
{
    use super::*;

    const SCENARIO_A: &str = "--- a/src/app.py\n+++ b/src/app.py\n@@ -1,3 +1,3 @@\n a\n-b\n+X\n c\n";

    #[test]
    fn empty_input_has_no_files()
    {
        let report = parse_report("");
        assert!(
            report
                .patch
                .is_empty()
        );
        assert!(
            report
                .skipped
                .is_empty()
        );
    }

    #[test]
    fn parses_single_hunk_with_line_numbers()
    {
        let patch = parse(SCENARIO_A);
        let fp = patch
            .get("src/app.py")
            .expect("file present");
        assert_eq!(fp.status(), FileStatus::Modified);
        assert_eq!(patch.format(), PatchFormat::Unified);
        let hunk = &fp.hunks()[0];
        assert_eq!((hunk.old_start(), hunk.old_count(), hunk.new_start(), hunk.new_count()), (1, 3, 1, 3));
        assert_eq!(hunk.changes()[1].kind, ChangeKind::Removed);
        assert_eq!(hunk.changes()[1].old_line, Some(2));
        assert_eq!(hunk.changes()[2].new_line, Some(2));
    }

    #[test]
    fn omitted_count_means_one_and_section_is_kept()
    {
        let patch = parse("--- a/f\n+++ b/f\n@@ -3 +3 @@ fn main() {\n-x\n+y\n");
        let hunk = &patch
            .get("f")
            .expect("f")
            .hunks()[0];
        assert_eq!(hunk.old_count(), 1);
        assert_eq!(hunk.section(), Some("fn main() {"));
    }

    #[test]
    fn removed_line_that_looks_like_header_is_body()
    {
        let text = "--- a/f\n+++ b/f\n@@ -1,2 +1,1 @@\n--- a/g\n keep\n";
        let patch = parse(text);
        let hunk = &patch
            .get("f")
            .expect("f")
            .hunks()[0];
        assert_eq!(hunk.changes()[0].text, "-- a/g");
        assert_eq!(hunk.changes()[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn empty_line_in_body_is_blank_context()
    {
        let patch = parse("--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n");
        let hunk = &patch
            .get("f")
            .expect("f")
            .hunks()[0];
        assert_eq!(hunk.changes()[1].kind, ChangeKind::Context);
        assert_eq!(hunk.changes()[1].text, "");
    }

    #[test]
    fn no_newline_marker_flags_previous_line()
    {
        let patch = parse("--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+a\n");
        let hunk = &patch
            .get("f")
            .expect("f")
            .hunks()[0];
        assert!(hunk.changes()[0].no_newline);
        assert!(!hunk.changes()[1].no_newline);
    }

    #[test]
    fn truncated_hunk_skips_only_that_file()
    {
        let text = "--- a/bad\n+++ b/bad\n@@ -1,3 +1,3 @@\n a\n--- a/good\n+++ b/good\n@@ -1 +1 @@\n-x\n+y\n";
        let report = parse_report(text);
        // the `--- a/good` line is consumed as a removal of "-- a/good"
        assert!(
            report
                .patch
                .get("bad")
                .is_none()
        );
        assert_eq!(
            report
                .skipped
                .len(),
            1
        );
    }

    #[test]
    fn unexpected_prefix_is_reported()
    {
        let report = parse_report("--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n?b\n");
        assert!(matches!(report.skipped[0].error, ParseError::UnexpectedLine { line: 5, .. }));
    }

    #[test]
    fn malformed_header_skips_block_and_later_files_survive()
    {
        let text = "--- a/f\n+++ b/f\n@@ -x +1 @@\n-a\n+b\n--- a/g\n+++ b/g\n@@ -1 +1 @@\n-a\n+b\n";
        let report = parse_report(text);
        assert!(matches!(report.skipped[0].error, ParseError::MalformedHunkHeader { line: 3, .. }));
        assert!(
            report
                .patch
                .get("g")
                .is_some()
        );
    }

    #[test]
    fn line_zero_with_lines_is_malformed()
    {
        let text = "--- a/f\n+++ b/f\n@@ -0,1 +0,1 @@\n-a\n+b\n@@ -5,1 +5,1 @@\n-x\n+y\n--- a/g\n+++ b/g\n@@ -1 +1 @@\n-a\n+b\n";
        let report = parse_report(text);
        assert!(matches!(report.skipped[0].error, ParseError::MalformedHunkHeader { line: 3, .. }));
        assert!(
            report
                .patch
                .get("f")
                .is_none()
        );
        assert!(
            report
                .patch
                .get("g")
                .is_some()
        );
    }

    #[test]
    fn huge_counts_are_rejected_without_allocating()
    {
        let max = usize::MAX;
        for header in [
            format!("@@ -1,{max} +1,1 @@"),
            format!("@@ -1,1 +1,{max} @@"),
            format!("@@ -{max},2 +1,1 @@"),
        ]
        {
            let report = parse_report(&format!("--- a/f\n+++ b/f\n{header}\n-a\n"));
            assert!(
                report
                    .patch
                    .is_empty(),
                "{header}"
            );
            assert_eq!(
                report
                    .skipped
                    .len(),
                1,
                "{header}"
            );
        }
    }

    #[test]
    fn overlapping_hunks_are_rejected()
    {
        let text = "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n-b\n+c\n@@ -2,1 +2,1 @@\n-b\n+d\n";
        let report = parse_report(text);
        assert!(matches!(report.skipped[0].error, ParseError::OverlappingHunks { line: 7 }));
    }

    #[test]
    fn duplicate_file_keeps_first()
    {
        let text = "--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+c\n";
        let report = parse_report(text);
        let fp = report
            .patch
            .get("f")
            .expect("f");
        assert_eq!(fp.hunks()[0].new_content(), "b");
        assert_eq!(report.skipped[0].error, ParseError::DuplicateFile { path: "f".into() });
    }

    #[test]
    fn dev_null_sides_set_status()
    {
        let text = "--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1 @@\n+hi\n--- a/old.txt\t2024-01-01\n+++ /dev/null\n@@ -1 +0,0 @@\n-bye\n";
        let patch = parse(text);
        assert_eq!(
            patch
                .get("new.txt")
                .map(FilePatch::status),
            Some(FileStatus::Added)
        );
        assert_eq!(
            patch
                .get("old.txt")
                .map(FilePatch::status),
            Some(FileStatus::Deleted)
        );
    }

    #[test]
    fn plain_diff_with_differing_paths_is_modified_new_path()
    {
        let patch = parse("--- foo.orig\n+++ foo\n@@ -1 +1 @@\n-a\n+b\n");
        let fp = patch
            .get("foo")
            .expect("keyed by new path");
        assert_eq!(fp.status(), FileStatus::Modified);
        assert_eq!(fp.old_path(), Some("foo.orig"));
    }

    #[test]
    fn git_rename_with_hunk()
    {
        let text = "diff --git a/old.rs b/new.rs\nsimilarity index 90%\nrename from old.rs\nrename to new.rs\nindex 1234..5678 100644\n--- a/old.rs\n+++ b/new.rs\n@@ -1 +1 @@\n-a\n+b\n";
        let patch = parse(text);
        assert_eq!(patch.format(), PatchFormat::Git);
        let fp = patch
            .get("new.rs")
            .expect("renamed");
        assert_eq!(fp.status(), FileStatus::Renamed);
        assert_eq!(fp.old_path(), Some("old.rs"));
        assert_eq!(fp.similarity(), Some(90));
        assert_eq!(
            fp.hunks()
                .len(),
            1
        );
    }

    #[test]
    fn git_binary_and_mode_change()
    {
        let text = "diff --git a/logo.png b/logo.png\nnew file mode 100755\nBinary files /dev/null and b/logo.png differ\ndiff --git a/run.sh b/run.sh\nold mode 100644\nnew mode 100755\n";
        let patch = parse(text);
        let logo = patch
            .get("logo.png")
            .expect("logo");
        assert!(logo.is_binary());
        assert_eq!(logo.status(), FileStatus::Added);
        assert_eq!(logo.new_mode(), Some("100755"));
        let run = patch
            .get("run.sh")
            .expect("run");
        assert_eq!(run.status(), FileStatus::Modified);
        assert_eq!(run.old_mode(), Some("100644"));
        assert_eq!(run.new_mode(), Some("100755"));
    }

    #[test]
    fn orphan_hunk_is_skipped()
    {
        let report = parse_report("@@ -1 +1 @@\n-a\n+b\n");
        assert!(
            report
                .patch
                .is_empty()
        );
        assert_eq!(report.skipped[0].error, ParseError::OrphanHunk { line: 1 });
    }

    #[test]
    fn rendering_then_parsing_is_identity()
    {
        let patch = parse(SCENARIO_A);
        assert_eq!(parse(&patch.to_unified_diff()), patch);
        let reversed = patch.reverse();
        assert_eq!(parse(&reversed.to_unified_diff()), reversed);
    }
}
