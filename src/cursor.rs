//! Line/column view over source text.

/// Tracks a `(line, column)` position over text split into lines.
///
/// Both coordinates are 0-based. Advancing past the end of a line wraps
/// to the start of the next one; callers check the range predicates
/// before reading.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    lines: Vec<&'a str>,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            line: 0,
            column: 0,
        }
    }

    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub const fn column(&self) -> usize {
        self.column
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_line_in_range(&self) -> bool {
        self.line < self.lines.len()
    }

    #[must_use]
    pub fn is_column_in_range(&self) -> bool {
        self.lines
            .get(self.line)
            .is_some_and(|line| self.column < line.len())
    }

    /// Text from the current column to the end of the line.
    #[must_use]
    pub fn rest_of_line(&self) -> Option<&'a str> {
        if !self.is_column_in_range() {
            return None;
        }
        self.lines
            .get(self.line)
            .and_then(|line| line.get(self.column..))
    }

    #[must_use]
    pub fn current_line(&self) -> Option<&'a str> {
        self.lines.get(self.line).copied()
    }

    /// Move `step` bytes right, wrapping to the next line at its end.
    pub fn advance_column(&mut self, step: usize) {
        self.column += step;
        if !self.is_column_in_range() {
            self.advance_line();
        }
    }

    pub const fn advance_line(&mut self) {
        self.line += 1;
        self.column = 0;
    }
}
