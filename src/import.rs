//! Line parsing and duplicate detection for bulk title import.
//!
//! Bulk import is stricter than import by id: a title that already exists in
//! the target collection (case-insensitive, trimmed) is reported back as a
//! duplicate instead of being skipped or imported again.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::normalize;

/// Maximum number of non-blank lines accepted by one bulk import.
pub const MAX_IMPORT_LINES: usize = 1000;

/// Checkbox marker stripped from the start of a line, as pasted from
/// checklist-style notes.
pub const CHECKBOX_MARKER: char = '☐';

/// Number of items created by an import by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCount {
    pub count: usize,
}

/// Outcome of a bulk import by title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkImportOutcome {
    /// Titles of the created items, title-cased.
    pub imported: Vec<String>,
    /// Lines that matched an existing title, as given.
    pub duplicates: Vec<String>,
    /// Non-blank lines dropped because the line cap was reached.
    pub truncated: usize,
}

/// A non-blank input line with its cleaned-up title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleLine {
    /// The line without its line break, as it was given.
    pub raw: String,
    /// The line without checkbox marker and surrounding whitespace.
    pub title: String,
}

/// Lines accepted for import plus how many were cut off by the cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLines {
    pub lines: Vec<TitleLine>,
    pub truncated: usize,
}

/// Splits raw input into title lines.
///
/// Every input string may hold several lines. Each line loses one leading
/// [`CHECKBOX_MARKER`] (after leading whitespace) and is trimmed; blank lines
/// are dropped. At most [`MAX_IMPORT_LINES`] lines are kept.
///
/// # Examples
///
/// ```
/// use tunebook::parse_title_lines;
///
/// let parsed = parse_title_lines(&["☐ Misty\n\n  Solar  ".to_string()]);
/// let titles: Vec<&str> = parsed.lines.iter().map(|l| l.title.as_str()).collect();
/// assert_eq!(titles, vec!["Misty", "Solar"]);
/// ```
pub fn parse_title_lines(raw_lines: &[String]) -> ParsedLines {
    let mut lines = Vec::new();
    let mut truncated = 0;

    for line in raw_lines.iter().flat_map(|chunk| chunk.lines()) {
        let title = strip_checkbox(line).trim();
        if title.is_empty() {
            continue;
        }
        if lines.len() == MAX_IMPORT_LINES {
            truncated += 1;
            continue;
        }
        lines.push(TitleLine {
            raw: line.to_string(),
            title: title.to_string(),
        });
    }

    ParsedLines { lines, truncated }
}

fn strip_checkbox(line: &str) -> &str {
    let trimmed = line.trim_start();
    trimmed.strip_prefix(CHECKBOX_MARKER).unwrap_or(trimmed)
}

/// Splits parsed lines into new titles and duplicates.
///
/// A line is a duplicate when its title matches one of `existing_titles` or
/// a title accepted earlier in the same batch. Titles are compared with
/// whitespace runs collapsed, the form [`title_case`] commits. Returns
/// `(accepted, duplicates)`: accepted titles are title-cased, duplicates are
/// the raw lines.
pub fn partition_duplicates<'a>(
    existing_titles: impl IntoIterator<Item = &'a str>,
    lines: Vec<TitleLine>,
) -> (Vec<String>, Vec<String>) {
    let mut seen: HashSet<String> = existing_titles.into_iter().map(title_key).collect();
    let mut accepted = Vec::new();
    let mut duplicates = Vec::new();

    for line in lines {
        if seen.insert(title_key(&line.title)) {
            accepted.push(title_case(&line.title));
        } else {
            duplicates.push(line.raw);
        }
    }

    (accepted, duplicates)
}

fn title_key(title: &str) -> String {
    normalize(&title.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Upper-cases the first letter of every word and lower-cases the rest.
///
/// Words are separated by whitespace; runs of whitespace collapse to a
/// single space.
///
/// # Examples
///
/// ```
/// use tunebook::title_case;
///
/// assert_eq!(title_case("AUTUMN LEAVES"), "Autumn Leaves");
/// assert_eq!(title_case("all  the things you are"), "All The Things You Are");
/// ```
pub fn title_case(title: &str) -> String {
    title
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
