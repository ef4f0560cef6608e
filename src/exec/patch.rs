//! Patch envelope parsing.
//!
//! Jobs carry patches as a text envelope: metadata headers, a commit
//! description, then the diff itself. Two header serializations occur in
//! the wild and both parse here:
//!
//! ```text
//! # HG changeset patch
//! # User Jane Doe <jane@example.com>
//! # Date 1496239141 +0000
//! commit message
//!
//! diff --git a/f b/f
//! ...
//! ```
//!
//! and the bare form with `User:` / `Date:` lines. The diff begins at the
//! first line starting with `diff `; an envelope without one is malformed.

use thiserror::Error;

/// Errors from parsing a patch envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The envelope contains no `diff` line.
    #[error("patch has no diff start line")]
    NoDiffStart,

    /// A required metadata header is absent.
    #[error("patch is missing required header {0}")]
    MissingHeader(&'static str),
}

/// A parsed patch envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Author in `Name <email>` form, from the `User` header.
    pub author: String,

    /// Authorship date, kept verbatim from the `Date` header.
    pub date: String,

    /// The commit description (header block stripped, edges trimmed).
    pub message: String,

    /// The diff body, from the first `diff ` line to the end.
    pub diff: String,
}

/// Splits an envelope into headers, description, and diff.
pub fn parse_patch(content: &str) -> Result<Patch, PatchError> {
    let diff_offset = find_diff_offset(content).ok_or(PatchError::NoDiffStart)?;
    let (head, diff) = content.split_at(diff_offset);

    let mut author = None;
    let mut date = None;
    let mut description_lines: Vec<&str> = Vec::new();
    let mut in_headers = true;

    for line in head.lines() {
        if in_headers {
            if let Some(value) = header_value(line, "User") {
                author = Some(value.to_string());
                continue;
            }
            if let Some(value) = header_value(line, "Date") {
                date = Some(value.to_string());
                continue;
            }
            if line.starts_with('#') {
                // Other envelope headers (Node ID, Parent, the banner line).
                continue;
            }
            in_headers = false;
        }
        description_lines.push(line);
    }

    Ok(Patch {
        author: author.ok_or(PatchError::MissingHeader("User"))?,
        date: date.ok_or(PatchError::MissingHeader("Date"))?,
        message: description_lines.join("\n").trim().to_string(),
        diff: diff.to_string(),
    })
}

/// Byte offset of the first line starting with `diff `.
fn find_diff_offset(content: &str) -> Option<usize> {
    if content.starts_with("diff ") {
        return Some(0);
    }
    content.find("\ndiff ").map(|newline| newline + 1)
}

/// Extracts a header value in either `# User x` or `User: x` form.
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    if let Some(rest) = line.strip_prefix("# ") {
        if let Some(value) = rest.strip_prefix(name) {
            if let Some(value) = value.strip_prefix(' ') {
                return Some(value.trim());
            }
        }
        return None;
    }
    line.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim)
}
