//! mcc: a compiler frontend for a substantial subset of C, producing
//! three-address code.
//!
//! The pipeline runs in fixed stages, each a complete pass over its
//! input:
//!
//! 1. [`lexer`] turns the preprocessed text into a token sequence.
//! 2. [`parser`] builds the AST with full declarator handling and a
//!    precedence-climbing expression grammar.
//! 3. [`resolve`] rewrites every local identifier to a unique name and
//!    validates scoping and linkage.
//! 4. [`labels`] assigns labels to loops and switches and resolves
//!    `break`/`continue`/`goto`/`case`/`default`.
//! 5. [`infer`] builds the symbol table, annotates every expression with
//!    a type, materializes implicit conversions, and folds constant
//!    initializers.
//! 6. [`build_tac`] lowers the typed tree to [`types::tac`] instructions.
//!
//! The AST lives in a single bump arena created at pipeline entry and
//! released after lowering; the TAC program owns its storage and
//! survives. [`interp`] is a reference evaluator over TAC used to
//! validate lowering.
//!
//! Each pass reports at most one [`Diagnostic`], carrying the phase (and
//! its driver exit code) plus the best available source position.

pub mod errors;
pub mod source;
pub mod symbol;
pub mod token;
pub mod lexer;
pub mod types;
pub mod parser;
pub mod resolve;
pub mod labels;
pub mod infer;
pub mod build_tac;
pub mod interp;

use bumpalo::Bump;
use log::{debug, log_enabled, trace};

pub use crate::errors::{Diagnostic, Phase, Result};
pub use crate::source::SourceMap;
pub use crate::symbol::{Interner, Symbol};

/// The pipeline context: the source mapping and the string table. Both
/// outlive the AST arena, so diagnostics and TAC stay renderable after
/// compilation.
pub struct Compiler {
  map: SourceMap,
  names: Interner,
}

impl Compiler {
  pub fn new(file: impl Into<std::rc::Rc<str>>, text: impl Into<String>) -> Self {
    Compiler { map: SourceMap::new(file, text), names: Interner::new() }
  }

  #[must_use] pub fn source_map(&self) -> &SourceMap { &self.map }
  #[must_use] pub fn names(&self) -> &Interner { &self.names }
  pub fn names_mut(&mut self) -> &mut Interner { &mut self.names }

  /// Run the whole pipeline. The arena holding the AST is released
  /// before this returns; only the TAC program survives.
  pub fn compile(&mut self) -> Result<types::tac::Program> {
    let tokens = lexer::tokenize(&self.map, &mut self.names)?;
    let arena = Bump::new();
    let prog = parser::parse(&arena, &self.map, &tokens)?;
    let prog = resolve::run(&arena, &self.map, &mut self.names, &prog)?;
    let prog = labels::run(&arena, &self.map, &mut self.names, &prog)?;
    let (prog, table) = infer::run(&arena, &self.map, &mut self.names, &prog)?;
    if log_enabled!(log::Level::Trace) {
      trace!("typed tree for {}:\n{}", self.map.file(), prog.display(&self.names));
    }
    let tac = build_tac::run(&mut self.names, &table, &prog);
    debug!("compiled {}: {} top-level items", self.map.file(), tac.top.len());
    Ok(tac)
  }

  /// Evaluate a compiled program's `main` through the reference
  /// interpreter. `None` when the program has no `main`.
  pub fn run(&mut self, prog: &types::tac::Program) -> Option<i32> {
    let main = self.names.intern("main");
    interp::run(prog, main)
  }
}

/// Compile and immediately interpret one translation unit; the result is
/// `main`'s return value. Programs without `main` report a lowering-phase
/// diagnostic.
pub fn compile_and_run(file: &str, text: &str) -> Result<i32> {
  let mut compiler = Compiler::new(file, text);
  let prog = compiler.compile()?;
  compiler.run(&prog)
    .ok_or_else(|| Diagnostic::unlocated(Phase::Lower, "program has no `main` function"))
}
