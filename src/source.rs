//! Source positions and the offset → line/column mapping.
//!
//! Every AST node carries a [`Loc`], a byte offset into the preprocessed
//! text. The [`SourceMap`] owns the text and a precomputed line-start table
//! and turns offsets back into 1-based `(file, line, column)` positions for
//! diagnostics. Unknown locations degrade to `line == 0` so a diagnostic
//! can simply omit its position clause.

use std::fmt;
use std::rc::Rc;

/// A byte offset into the preprocessed source text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Loc(pub u32);

impl Loc {
  /// The "no location" sentinel.
  pub const NONE: Loc = Loc(u32::MAX);

  #[must_use] pub fn is_none(self) -> bool { self == Loc::NONE }
}

impl fmt::Debug for Loc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_none() { write!(f, "Loc(-)") } else { write!(f, "Loc({})", self.0) }
  }
}

/// A resolved source position. `line == 0` means the position is unknown
/// and the other fields are meaningless.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
  pub file: Rc<str>,
  /// 1-based, or 0 for unknown.
  pub line: u32,
  /// 1-based.
  pub column: u32,
}

impl Position {
  #[must_use] pub fn is_known(&self) -> bool { self.line != 0 }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.line, self.column)
  }
}

/// The preprocessed text of one translation unit, with its line table.
/// Initialized once before lexing; read-only afterwards.
pub struct SourceMap {
  file: Rc<str>,
  text: String,
  /// Byte offset of the start of each line. `line_starts[0] == 0`.
  line_starts: Vec<u32>,
}

impl SourceMap {
  pub fn new(file: impl Into<Rc<str>>, text: impl Into<String>) -> Self {
    let text = text.into();
    assert!(u32::try_from(text.len()).is_ok(), "source file too large");
    let mut line_starts = vec![0];
    for (i, b) in text.bytes().enumerate() {
      if b == b'\n' { line_starts.push(i as u32 + 1) }
    }
    Self { file: file.into(), text, line_starts }
  }

  #[must_use] pub fn file(&self) -> &Rc<str> { &self.file }
  #[must_use] pub fn text(&self) -> &str { &self.text }

  /// Resolve an offset to a `(file, line, column)` position.
  #[must_use] pub fn locate(&self, loc: Loc) -> Position {
    if loc.is_none() || loc.0 as usize > self.text.len() {
      return Position { file: self.file.clone(), line: 0, column: 0 }
    }
    let line = self.line_starts.partition_point(|&start| start <= loc.0);
    let column = loc.0 - self.line_starts[line - 1] + 1;
    Position { file: self.file.clone(), line: line as u32, column }
  }
}

impl fmt::Debug for SourceMap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SourceMap").field("file", &self.file).field("len", &self.text.len()).finish()
  }
}
