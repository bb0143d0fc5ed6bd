use nom_locate::LocatedSpan;
use serde::{Deserialize, Serialize};

pub type Span<'a> = LocatedSpan<&'a str>;

/// One-based line and column of a byte offset, computed on demand for diagnostics.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }

    /// Locates `offset` in `source`, counting columns in characters.
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() as u32 + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Position { line, column }
    }
}

/// Byte range into the source an expression was compiled from.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Range { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest range covering both.
    pub fn join(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn start_position(&self, source: &str) -> Position {
        Position::locate(source, self.start)
    }

    /// Creates a range for `span` whose fragment was cut out of a larger source at `base`.
    pub fn from_span(span: &Span<'_>, base: usize) -> Self {
        let start = base + span.location_offset();
        Range {
            start,
            end: start + span.fragment().len(),
        }
    }
}

impl From<Range> for miette::SourceSpan {
    fn from(range: Range) -> Self {
        miette::SourceSpan::new(range.start.into(), range.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a + b", 0, Position::new(1, 1))]
    #[case("a + b", 4, Position::new(1, 5))]
    #[case("a;\nb", 3, Position::new(2, 1))]
    #[case("x = 'é';\ny", 10, Position::new(2, 1))]
    #[case("abc", 99, Position::new(1, 4))]
    fn test_locate(#[case] source: &str, #[case] offset: usize, #[case] expected: Position) {
        assert_eq!(Position::locate(source, offset), expected);
    }

    #[rstest]
    #[case(Range::new(0, 3), Range::new(5, 8), Range::new(0, 8))]
    #[case(Range::new(4, 6), Range::new(1, 5), Range::new(1, 6))]
    fn test_join(#[case] a: Range, #[case] b: Range, #[case] expected: Range) {
        assert_eq!(a.join(&b), expected);
    }

    #[test]
    fn test_from_span() {
        let span = Span::new("abc");
        assert_eq!(Range::from_span(&span, 10), Range::new(10, 13));
    }
}
