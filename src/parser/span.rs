use std::fmt;

/// A position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    /// Line number (1-indexed, 0 for synthesized nodes)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of file
    pub offset: usize,
}

impl Location {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }

    pub fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }

    /// Synthesized nodes carry line 0
    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open range of source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn single(location: Location) -> Self {
        Self { start: location, end: location }
    }

    /// Span used by nodes created by rewrites
    pub fn synthetic() -> Self {
        Self::default()
    }

    /// Smallest span covering both
    pub fn to(&self, other: Span) -> Span {
        if self.is_synthetic() {
            return other;
        }
        let start = if other.start < self.start && !other.start.is_synthetic() {
            other.start
        } else {
            self.start
        };
        let end = if other.end > self.end { other.end } else { self.end };
        Span { start, end }
    }

    pub fn is_synthetic(&self) -> bool {
        self.start.is_synthetic()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Nodes that know where they came from
pub trait HasSpan {
    fn span(&self) -> Span;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge_keeps_outer_bounds() {
        let a = Span::new(Location::new(1, 5, 4), Location::new(1, 9, 8));
        let b = Span::new(Location::new(2, 1, 10), Location::new(2, 4, 13));
        let merged = a.to(b);
        assert_eq!(merged.start, a.start);
        assert_eq!(merged.end, b.end);
        assert_eq!(merged.to_string(), "1:5");
    }

    #[test]
    fn test_synthetic_span_does_not_move_start() {
        let real = Span::single(Location::new(3, 2, 20));
        assert_eq!(real.to(Span::synthetic()).start, real.start);
        assert!(Span::synthetic().is_synthetic());
    }
}
