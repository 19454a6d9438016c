//! Diagnostics.
//!
//! Every pass reports at most one error: the first failure it detects,
//! carrying the best source position available at that point. A
//! [`Diagnostic`] renders as
//! `"<phase> error at <file>:<line>:<col>: <message>"`, with the `at`
//! clause omitted when no position is known.

use std::error::Error;
use std::fmt;

use crate::source::{Loc, Position, SourceMap};

/// The pipeline phase an error was detected in. Determines both the
/// diagnostic prefix and the process exit code a driver should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
  Lex,
  Parse,
  Resolve,
  Label,
  Type,
  Lower,
}

impl Phase {
  /// The documented driver exit code for a failure in this phase.
  #[must_use] pub fn exit_code(self) -> i32 {
    match self {
      Phase::Lex => 1,
      Phase::Parse => 2,
      Phase::Resolve => 3,
      Phase::Label => 4,
      Phase::Type => 5,
      Phase::Lower => 6,
    }
  }

  fn name(self) -> &'static str {
    match self {
      Phase::Lex => "Lexer",
      Phase::Parse => "Parse",
      Phase::Resolve => "Identifier Resolution",
      Phase::Label => "Label",
      Phase::Type => "Type",
      Phase::Lower => "Lowering",
    }
  }
}

/// A single compiler error. Positions are resolved eagerly against the
/// [`SourceMap`] at construction time, so the diagnostic stays printable
/// after the pipeline's arena and source context are gone.
#[derive(Clone, Debug)]
pub struct Diagnostic {
  pub phase: Phase,
  pub pos: Option<Position>,
  pub message: String,
}

impl Diagnostic {
  /// Build a diagnostic for `phase` at `loc`, resolving the position now.
  pub fn new(map: &SourceMap, phase: Phase, loc: Loc, message: impl Into<String>) -> Self {
    let pos = Some(map.locate(loc)).filter(Position::is_known);
    Diagnostic { phase, pos, message: message.into() }
  }

  /// A diagnostic with no source position.
  pub fn unlocated(phase: Phase, message: impl Into<String>) -> Self {
    Diagnostic { phase, pos: None, message: message.into() }
  }

  /// The driver exit code for this error.
  #[must_use] pub fn exit_code(&self) -> i32 { self.phase.exit_code() }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.pos {
      Some(pos) => write!(f, "{} error at {pos}: {}", self.phase.name(), self.message),
      None => write!(f, "{} error: {}", self.phase.name(), self.message),
    }
  }
}

impl Error for Diagnostic {}

pub type Result<T, E = Diagnostic> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_with_position() {
    let map = SourceMap::new("t.c", "int @;\n");
    let d = Diagnostic::new(&map, Phase::Parse, Loc(4), "unexpected token");
    assert_eq!(d.to_string(), "Parse error at t.c:1:5: unexpected token");
    assert_eq!(d.exit_code(), 2);
  }

  #[test]
  fn display_without_position() {
    let map = SourceMap::new("t.c", "");
    let d = Diagnostic::new(&map, Phase::Type, Loc::NONE, "conflicting declaration");
    assert_eq!(d.to_string(), "Type error: conflicting declaration");
    let d = Diagnostic::unlocated(Phase::Lex, "stray byte");
    assert_eq!(d.to_string(), "Lexer error: stray byte");
    assert_eq!(d.exit_code(), 1);
  }
}
