//! The [`LineStream`] and [`LineCursor`] primitives for positional parsing.
//!
//! A `.fam` file is not self-describing: there are no delimiters beyond line
//! breaks and no record markers. Every field is addressed by a 1-based line
//! position computed from counts read earlier in the file, so the parsers in
//! this crate thread a single [`LineCursor`] through the stream and advance
//! it by data-dependent strides. The cursor makes those strides explicit and
//! lets each record type be tested in isolation.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::FamError;

lazy_static! {
    /// Matches `Label = value` pairs embedded in free-text info lines,
    /// e.g. `DatabaseSize = 600, Dropout = 0.05`.
    static ref LABELED_FIELD: Regex =
        Regex::new(r"(?i)([A-Za-z][A-Za-z0-9_/ ]*?)\s*=\s*(-?[0-9]+(?:\.[0-9]+)?)").unwrap();
}

/// An ordered, 1-indexed sequence of raw file lines.
///
/// Immutable once loaded; embedded quote characters are stripped at load
/// time by [`InputFile::read_lines`](crate::io::file::InputFile::read_lines).
#[derive(Clone, Debug, Default)]
pub struct LineStream {
    lines: Vec<String>,
}

impl LineStream {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// The line at 1-based position `pos`, or `None` past the end.
    pub fn get(&self, pos: usize) -> Option<&str> {
        if pos == 0 {
            return None;
        }
        self.lines.get(pos - 1).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 1-based position of the first line exactly equal to `needle`.
    pub fn find(&self, needle: &str) -> Option<usize> {
        self.lines.iter().position(|l| l == needle).map(|i| i + 1)
    }

    pub fn cursor(&self) -> LineCursor<'_> {
        LineCursor {
            stream: self,
            pos: 1,
        }
    }

    pub fn cursor_at(&self, pos: usize) -> LineCursor<'_> {
        LineCursor { stream: self, pos }
    }
}

impl<S: Into<String>> FromIterator<S> for LineStream {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// A moving read position over a [`LineStream`].
///
/// All reads are relative to the current position; [`LineCursor::advance`]
/// moves it forward by a stride the caller computes from values already
/// read. The cursor never moves backwards.
#[derive(Clone, Debug)]
pub struct LineCursor<'a> {
    stream: &'a LineStream,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    /// The current 1-based line position.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// The line `offset` lines ahead of the cursor, or `None` past the end.
    pub fn peek(&self, offset: usize) -> Option<&'a str> {
        self.stream.get(self.pos + offset)
    }

    /// The line `offset` lines ahead, or [`FamError::UnexpectedEnd`] naming
    /// `expected` if the file ends before it.
    pub fn line_at(&self, offset: usize, expected: &str) -> Result<&'a str, FamError> {
        self.peek(offset).ok_or_else(|| FamError::UnexpectedEnd {
            line: self.pos + offset,
            expected: expected.to_string(),
        })
    }

    /// Parse the line `offset` lines ahead as an integer.
    pub fn read_int(&self, offset: usize, expected: &str) -> Result<i64, FamError> {
        let text = self.line_at(offset, expected)?;
        text.trim()
            .parse::<i64>()
            .map_err(|_| FamError::format(self.pos + offset, expected, text))
    }

    /// Like [`LineCursor::read_int`], but also rejects values above `max`.
    pub fn read_int_max(&self, offset: usize, expected: &str, max: i64) -> Result<i64, FamError> {
        let value = self.read_int(offset, expected)?;
        if value > max {
            let text = self.line_at(offset, expected)?;
            return Err(FamError::format(
                self.pos + offset,
                format!("{} (at most {})", expected, max),
                text,
            ));
        }
        Ok(value)
    }

    /// Parse a non-negative count at `offset`.
    pub fn read_count(&self, offset: usize, expected: &str) -> Result<usize, FamError> {
        let value = self.read_int(offset, expected)?;
        usize::try_from(value)
            .map_err(|_| FamError::format(self.pos + offset, expected, value.to_string()))
    }

    /// Parse the line at `offset` as a float.
    pub fn read_float(&self, offset: usize, expected: &str) -> Result<f64, FamError> {
        let text = self.line_at(offset, expected)?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| FamError::format(self.pos + offset, expected, text))
    }

    /// Read the current line and advance one line.
    pub fn next_str(&mut self, expected: &str) -> Result<&'a str, FamError> {
        let text = self.line_at(0, expected)?;
        self.pos += 1;
        Ok(text)
    }

    /// Read the current line as an integer and advance one line.
    pub fn next_int(&mut self, expected: &str) -> Result<i64, FamError> {
        let value = self.read_int(0, expected)?;
        self.pos += 1;
        Ok(value)
    }

    /// Read the current line as a count and advance one line.
    pub fn next_count(&mut self, expected: &str) -> Result<usize, FamError> {
        let value = self.read_count(0, expected)?;
        self.pos += 1;
        Ok(value)
    }

    /// Read the current line as a float and advance one line.
    pub fn next_float(&mut self, expected: &str) -> Result<f64, FamError> {
        let value = self.read_float(0, expected)?;
        self.pos += 1;
        Ok(value)
    }

    /// Validate that the current line is exactly `literal` and advance past it.
    pub fn expect_literal(&mut self, literal: &str) -> Result<(), FamError> {
        let text = self.line_at(0, &format!("the literal line '{}'", literal))?;
        if text != literal {
            return Err(FamError::format(
                self.pos,
                format!("the literal line '{}'", literal),
                text,
            ));
        }
        self.pos += 1;
        Ok(())
    }
}

/// Familias boolean flags are serialized as `#TRUE#` / `#FALSE#`.
pub fn is_true_flag(text: &str) -> bool {
    text.trim() == "#TRUE#"
}

/// Numeric coercion that yields `None` instead of failing on non-numeric
/// text. Used for loosely-structured metadata such as theta or dropout
/// values embedded in free-text info lines.
pub fn parse_optional_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// Extract a labeled numeric field (e.g. `DatabaseSize = 600`) from a
/// free-text line. Label comparison ignores case; absence is not an error.
pub fn extract_labeled_number(text: &str, label: &str) -> Option<f64> {
    for caps in LABELED_FIELD.captures_iter(text) {
        if caps[1].trim().eq_ignore_ascii_case(label) {
            return caps[2].parse().ok();
        }
    }
    None
}
