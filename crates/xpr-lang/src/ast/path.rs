use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::node::Block;
use crate::lexer::{balanced_end, is_ident_char, is_ident_start};
use crate::range::Range;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Segment {
    /// `.name`; `null_safe` for `.?name`.
    Name { name: SmolStr, null_safe: bool },
    /// `[expr]`
    Index { expr: Block },
    /// `name(args)`
    Call {
        name: SmolStr,
        args: Vec<Block>,
        null_safe: bool,
    },
}

impl Segment {
    pub fn name(&self) -> Option<&SmolStr> {
        match self {
            Segment::Name { name, .. } | Segment::Call { name, .. } => Some(name),
            Segment::Index { .. } => None,
        }
    }

    /// The segment yields null instead of failing when its base is null.
    pub fn is_null_safe(&self) -> bool {
        matches!(
            self,
            Segment::Name { null_safe: true, .. } | Segment::Call { null_safe: true, .. }
        )
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name { name, .. } => write!(f, "{}", name),
            Segment::Index { .. } => write!(f, "[]"),
            Segment::Call { name, args, .. } => write!(f, "{}({})", name, args.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyPath {
    pub text: SmolStr,
    pub segments: Vec<Segment>,
}

impl PropertyPath {
    /// Name of a path consisting of exactly one plain segment.
    pub fn simple_name(&self) -> Option<&SmolStr> {
        match self.segments.as_slice() {
            [Segment::Name { name, null_safe: false }] => Some(name),
            _ => None,
        }
    }

    pub fn root_name(&self) -> Option<&SmolStr> {
        self.segments.first().and_then(Segment::name)
    }

    pub(crate) fn blocks_mut(&mut self) -> Vec<&mut Block> {
        self.segments
            .iter_mut()
            .flat_map(|segment| match segment {
                Segment::Name { .. } => Vec::new(),
                Segment::Index { expr } => vec![expr],
                Segment::Call { args, .. } => args.iter_mut().collect(),
            })
            .collect()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// A path segment before its sub-expressions are parsed. Ranges are relative
/// to the path text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawSegment {
    Name { name: SmolStr, null_safe: bool },
    Index { inner: Range },
    Call { name: SmolStr, args: Vec<Range>, null_safe: bool },
}

/// Splits path text at `.`, `.?`, `[..]` and `(..)` boundaries.
pub(crate) fn split_segments(text: &str) -> Option<Vec<RawSegment>> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let mut null_safe = false;

    loop {
        let len = ident_len(&text[pos..]);
        if len == 0 {
            return None;
        }
        let name = SmolStr::new(&text[pos..pos + len]);
        pos += len;

        if text[pos..].starts_with('(') {
            let end = pos + balanced_end(&text[pos..])?;
            let args = split_top_level(text, Range::new(pos + 1, end - 1), ',');
            segments.push(RawSegment::Call { name, args, null_safe });
            pos = end;
        } else {
            segments.push(RawSegment::Name { name, null_safe });
        }

        while text[pos..].starts_with('[') {
            let end = pos + balanced_end(&text[pos..])?;
            segments.push(RawSegment::Index {
                inner: Range::new(pos + 1, end - 1),
            });
            pos = end;
        }

        let rest = &text[pos..];
        if rest.is_empty() {
            return Some(segments);
        } else if rest.starts_with(".?") {
            null_safe = true;
            pos += 2;
        } else if rest.starts_with('.') {
            null_safe = false;
            pos += 1;
        } else {
            return None;
        }
    }
}

fn ident_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => chars
            .find(|(_, c)| !is_ident_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(s.len()),
        _ => 0,
    }
}

/// Splits `text[range]` at every `sep` outside brackets and quotes.
/// Whitespace-only input yields no pieces.
pub(crate) fn split_top_level(text: &str, range: Range, sep: char) -> Vec<Range> {
    let inner = &text[range.start..range.end];
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for offset in top_level_positions(inner, move |c, _| c == sep) {
        pieces.push(Range::new(range.start + start, range.start + offset));
        start = offset + sep.len_utf8();
    }
    pieces.push(Range::new(range.start + start, range.end));
    pieces
}

/// Offset of the `:` separating a map entry's key from its value, ignoring
/// colons that belong to a ternary.
pub(crate) fn entry_colon(text: &str, range: Range) -> Option<usize> {
    let inner = &text[range.start..range.end];
    let mut pending_ternaries = 0usize;
    top_level_positions(inner, |c, prev| matches!(c, '?' | ':') && !(c == '?' && prev == Some('.')))
        .find(|&offset| {
            if inner[offset..].starts_with('?') {
                pending_ternaries += 1;
                false
            } else if pending_ternaries > 0 {
                pending_ternaries -= 1;
                false
            } else {
                true
            }
        })
        .map(|offset| range.start + offset)
}

fn top_level_positions<'a>(
    text: &'a str,
    mut matches: impl FnMut(char, Option<char>) -> bool + 'a,
) -> impl Iterator<Item = usize> + 'a {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev: Option<char> = None;

    text.char_indices().filter_map(move |(i, c)| {
        let before = prev.replace(c);
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            return None;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if depth == 0 && matches(c, before) => return Some(i),
            _ => {}
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn name(n: &str, null_safe: bool) -> RawSegment {
        RawSegment::Name {
            name: n.into(),
            null_safe,
        }
    }

    #[rstest]
    #[case("a", Some(vec![name("a", false)]))]
    #[case("a.b.?c", Some(vec![name("a", false), name("b", false), name("c", true)]))]
    #[case("list[1]", Some(vec![name("list", false), RawSegment::Index { inner: Range::new(5, 6) }]))]
    #[case("m['k'][0]", Some(vec![
        name("m", false),
        RawSegment::Index { inner: Range::new(2, 5) },
        RawSegment::Index { inner: Range::new(7, 8) },
    ]))]
    #[case("a.size()", Some(vec![
        name("a", false),
        RawSegment::Call { name: "size".into(), args: vec![], null_safe: false },
    ]))]
    #[case("f(1, g(2, 3))", Some(vec![
        RawSegment::Call { name: "f".into(), args: vec![Range::new(2, 3), Range::new(4, 12)], null_safe: false },
    ]))]
    #[case("a.", None)]
    #[case("a(1)(2)", None)]
    fn test_split_segments(#[case] text: &str, #[case] expected: Option<Vec<RawSegment>>) {
        assert_eq!(split_segments(text), expected);
    }

    #[rstest]
    #[case("1, 'a,b', [2, 3]", vec!["1", " 'a,b'", " [2, 3]"])]
    #[case("  ", vec![])]
    #[case("x", vec!["x"])]
    fn test_split_top_level(#[case] text: &str, #[case] expected: Vec<&str>) {
        let pieces: Vec<_> = split_top_level(text, Range::new(0, text.len()), ',')
            .into_iter()
            .map(|r| &text[r.start..r.end])
            .collect();
        assert_eq!(pieces, expected);
    }

    #[rstest]
    #[case("'k': 1", Some(3))]
    #[case("a ? b : c", None)]
    #[case("a ? b : c : d", Some(10))]
    #[case("x.?y : 1", Some(5))]
    #[case("'a:b'", None)]
    fn test_entry_colon(#[case] text: &str, #[case] expected: Option<usize>) {
        assert_eq!(entry_colon(text, Range::new(0, text.len())), expected);
    }
}
