//! Newline-aware line splitting shared by diffing and patch application.
//!
//! Goals
//! - Single memchr pass over bytes to find '\n' positions.
//! - Every line remembers whether it was terminated, so a file that
//!   lacks a final newline survives diff → parse → apply unchanged.
//!
//! Notes
//! - Only '\n' terminates a line; a preceding '\r' stays in the text.
//! - An empty buffer has 0 lines.
//! - A non-empty buffer without a trailing '\n' ends with an
//!   unterminated line.

/// One line of a text buffer, borrowed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Line<'a>
{
    /// Line text without the terminating '\n'
    pub text: &'a str,
    /// False only for a final line with no '\n'
    pub newline: bool,
}

impl<'a> Line<'a>
{
    pub fn terminated(text: &'a str) -> Self
    {
        Self { text, newline: true }
    }

    /// Byte length including the terminator.
    pub fn len_with_eol(&self) -> usize
    {
        self.text.len() + usize::from(self.newline)
    }
}

/// Split `text` into lines, recording the final line's terminator.
pub fn split_lines(text: &str) -> Vec<Line<'_>>
{
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 40 + 1);
    let mut start = 0usize;

    while let Some(pos) = memchr::memchr(b'\n', &bytes[start..])
    {
        let end = start + pos;
        out.push(Line { text: &text[start..end], newline: true });
        start = end + 1;
    }

    // Trailing unterminated line
    if start < bytes.len()
    {
        out.push(Line { text: &text[start..], newline: false });
    }

    out
}

/// Reassemble lines into a buffer; inverse of [`split_lines`].
pub fn join_lines<'a, I>(lines: I) -> String
where
    I: IntoIterator<Item = Line<'a>>,
{
    let mut out = String::new();
    for line in lines
    {
        out.reserve(line.len_with_eol());
        out.push_str(line.text);
        if line.newline
        {
            out.push('\n');
        }
    }
    out
}

/// NUL bytes never appear in text files we are willing to diff.
pub fn looks_binary(text: &str) -> bool
{
    memchr::memchr(0, text.as_bytes()).is_some()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn empty_buffer_has_no_lines()
    {
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn final_line_without_newline_is_flagged()
    {
        let lines = split_lines("a\nb");
        assert_eq!(lines, vec![Line::terminated("a"), Line { text: "b", newline: false }]);
    }

    #[test]
    fn crlf_keeps_carriage_return_in_text()
    {
        let lines = split_lines("a\r\nb\r\n");
        assert_eq!(lines[0].text, "a\r");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn join_is_inverse_of_split()
    {
        for sample in ["", "\n", "a", "a\n", "a\n\nb", "x\r\ny\r\n"]
        {
            assert_eq!(join_lines(split_lines(sample)), sample);
        }
    }

    #[test]
    fn nul_marks_binary()
    {
        assert!(looks_binary("PNG\0\x01"));
        assert!(!looks_binary("plain text\n"));
    }
}
