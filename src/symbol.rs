//! Interned names.
//!
//! Every identifier, minted unique name, and control-flow label in the
//! compiler is a [`Symbol`]: a small `Copy` index into an [`Interner`].
//! Interning is content-keyed, so two occurrences of the same spelling
//! anywhere in the translation unit compare equal as integers.
//!
//! The interner also owns the monotonic counter used to mint unique names
//! (`x.17`) and labels (`main.loop.3`). The counter is never reset, so a
//! minted name can never collide with another minted name, and because user
//! identifiers cannot contain `.`, minted names can never collide with
//! source identifiers either.

use std::fmt;
use std::rc::Rc;
use hashbrown::HashMap;

/// An interned string. Cheap to copy, compare and hash; resolve the
/// spelling through the [`Interner`] that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
  /// The index of this symbol in its interner.
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "s{}", self.0) }
}

/// The string table. One per [`Compiler`](crate::Compiler); it outlives the
/// AST arena so that TAC programs and diagnostics can still render names
/// after the tree is gone.
#[derive(Default)]
pub struct Interner {
  names: Vec<Rc<str>>,
  map: HashMap<Rc<str>, Symbol>,
  counter: u64,
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern a string, returning the canonical [`Symbol`] for its content.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let name: Rc<str> = s.into();
    let sym = Symbol(u32::try_from(self.names.len()).expect("too many symbols"));
    self.names.push(name.clone());
    self.map.insert(name, sym);
    sym
  }

  /// The spelling of `sym`.
  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str { &self.names[sym.into_usize()] }

  /// Mint a unique name derived from `base`, as `base.N` for a fresh `N`.
  pub fn fresh(&mut self, base: Symbol) -> Symbol {
    let n = self.bump();
    let name = format!("{}.{n}", self.resolve(base));
    self.intern(&name)
  }

  /// Mint a fresh temporary, `tmp.N`.
  pub fn fresh_tmp(&mut self) -> Symbol {
    let n = self.bump();
    let name = format!("tmp.{n}");
    self.intern(&name)
  }

  /// Mint a control-flow label `func.kind.N`, e.g. `main.loop.4`.
  pub fn fresh_label(&mut self, func: Symbol, kind: &str) -> Symbol {
    let n = self.bump();
    let name = format!("{}.{kind}.{n}", self.resolve(func));
    self.intern(&name)
  }

  /// The destination label for the user-written label `name` in `func`,
  /// `func.user.name`. Deterministic: `goto` sites and label definitions
  /// agree without coordination.
  pub fn user_label(&mut self, func: Symbol, name: Symbol) -> Symbol {
    let label = format!("{}.user.{}", self.resolve(func), self.resolve(name));
    self.intern(&label)
  }

  fn bump(&mut self) -> u64 {
    let n = self.counter;
    self.counter += 1;
    n
  }
}

impl fmt::Debug for Interner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Interner").field("names", &self.names.len()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intern_is_content_keyed() {
    let mut i = Interner::new();
    let a = i.intern("x");
    let b = i.intern("y");
    let c = i.intern("x");
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(i.resolve(a), "x");
  }

  #[test]
  fn minted_names_never_collide() {
    let mut i = Interner::new();
    let x = i.intern("x");
    let a = i.fresh(x);
    let b = i.fresh(x);
    assert_ne!(a, b);
    assert!(i.resolve(a).starts_with("x."));
    let f = i.intern("f");
    let l1 = i.fresh_label(f, "loop");
    let l2 = i.fresh_label(f, "loop");
    assert_ne!(l1, l2);
  }

  #[test]
  fn user_labels_are_deterministic() {
    let mut i = Interner::new();
    let f = i.intern("f");
    let l = i.intern("top");
    assert_eq!(i.user_label(f, l), i.user_label(f, l));
    let ul = i.user_label(f, l);
    assert_eq!(i.resolve(ul), "f.user.top");
  }
}
