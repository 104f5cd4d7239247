//! Glob matching over object names
//!
//! Supports:
//! - `*` - any run of characters, including none
//! - `?` - exactly one character
//! - `[...]` - one character from a class; `a-z` ranges, `-` literal at
//!   either end, `]` literal when it comes first
//! - `\` - the next character literally
//!
//! Matching is case-sensitive and anchored at both ends.

use crate::core::directory::DirectoryIndex;

/// Check whether `candidate` matches `pattern`
///
/// # Examples
/// ```
/// use geomdb::core::pattern::matches;
///
/// assert!(matches("a*c", "abc"));
/// assert!(matches("[a-c]x", "bx"));
/// assert!(!matches("a?c", "ac"));
/// ```
pub fn matches(pattern: &str, candidate: &str) -> bool {
    match_from(pattern, candidate)
}

/// Every pattern step consumes at least one pattern character, so
/// recursion depth is bounded by the pattern length.
fn match_from(pattern: &str, candidate: &str) -> bool {
    let (first, rest) = match split_first(pattern) {
        Some(split) => split,
        None => return candidate.is_empty(),
    };

    match first {
        '*' => {
            // Runs of stars behave like one
            let rest = rest.trim_start_matches('*');
            if rest.is_empty() {
                return true;
            }
            candidate
                .char_indices()
                .map(|(offset, _)| offset)
                .chain(std::iter::once(candidate.len()))
                .any(|offset| match_from(rest, &candidate[offset..]))
        }
        '?' => split_first(candidate).map_or(false, |(_, remaining)| match_from(rest, remaining)),
        '[' => match CharClass::parse(rest) {
            Some((class, after)) => split_first(candidate)
                .map_or(false, |(ch, remaining)| class.contains(ch) && match_from(after, remaining)),
            // Unterminated class never matches
            None => false,
        },
        '\\' => match split_first(rest) {
            Some((literal, after)) => split_first(candidate)
                .map_or(false, |(ch, remaining)| ch == literal && match_from(after, remaining)),
            None => candidate == "\\",
        },
        literal => split_first(candidate)
            .map_or(false, |(ch, remaining)| ch == literal && match_from(rest, remaining)),
    }
}

fn split_first(text: &str) -> Option<(char, &str)> {
    let mut chars = text.chars();
    chars.next().map(|ch| (ch, chars.as_str()))
}

/// Members of a `[...]` class, without the brackets
#[derive(Debug, Clone, Copy)]
struct CharClass<'a> {
    members: &'a str,
}

impl<'a> CharClass<'a> {
    /// Parse the class that starts right after `[`
    ///
    /// Returns the class and the pattern remaining after the closing `]`.
    fn parse(body: &'a str) -> Option<(CharClass<'a>, &'a str)> {
        // A leading ']' is a member, not the terminator
        let mut rest = body.strip_prefix(']').unwrap_or(body);

        loop {
            let (ch, after) = split_first(rest)?;
            if ch == ']' {
                let end = body.len() - rest.len();
                return Some((CharClass { members: &body[..end] }, after));
            }
            rest = range_end(after).map_or(after, |(_, after_range)| after_range);
        }
    }

    fn contains(&self, ch: char) -> bool {
        let mut rest = self.members;
        if let Some(after) = rest.strip_prefix(']') {
            if ch == ']' {
                return true;
            }
            rest = after;
        }

        while let Some((low, after)) = split_first(rest) {
            let (high, next) = range_end(after).unwrap_or((low, after));
            if low <= ch && ch <= high {
                return true;
            }
            rest = next;
        }
        false
    }
}

/// `-x` closing a range, as long as `x` is not the class terminator
fn range_end(text: &str) -> Option<(char, &str)> {
    let after_dash = text.strip_prefix('-')?;
    match split_first(after_dash) {
        Some((end, rest)) if end != ']' => Some((end, rest)),
        _ => None,
    }
}

/// Check whether a pattern uses any metacharacter
pub fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '\\'])
}

/// Names in the directory matching `pattern`, in directory iteration order
pub fn match_all(directory: &DirectoryIndex, pattern: &str) -> Vec<String> {
    directory
        .iter()
        .filter(|entry| match_from(pattern, entry.name()))
        .map(|entry| entry.name().to_string())
        .collect()
}

/// Like [`match_all`], but yields the pattern itself when nothing matches
pub fn expand(directory: &DirectoryIndex, pattern: &str) -> Vec<String> {
    let found = match_all(directory, pattern);
    if found.is_empty() {
        vec![pattern.to_string()]
    } else {
        found
    }
}
