//! The abstract syntax tree.
//!
//! All nodes are allocated in the pipeline arena and referenced by shared
//! `&'a` pointers; the passes that "rewrite" the tree (identifier
//! resolution, label resolution, typechecking) are rebuilding translators
//! that map a tree to a new tree in the same arena. Fields documented as
//! "filled by" a pass are `None`/empty until that pass has run.

use crate::source::Loc;
use crate::symbol::Symbol;
use crate::types::{Const, Ty, TypeKind};

pub type ExprP<'a> = &'a Expr<'a>;
pub type StmtP<'a> = &'a Stmt<'a>;
pub type DeclP<'a> = &'a Decl<'a>;
pub type InitP<'a> = &'a Init<'a>;

/// One translation unit.
#[derive(Debug)]
pub struct Program<'a> {
  pub decls: &'a [DeclP<'a>],
}

/// An expression. `ty` is the type of the expression as evaluated,
/// filled by the typechecker; lvalue-ness is the separate predicate
/// [`Expr::is_lvalue`].
#[derive(Debug)]
pub struct Expr<'a> {
  pub kind: ExprKind<'a>,
  pub loc: Loc,
  pub ty: Option<Ty<'a>>,
}

#[derive(Clone, Copy, Debug)]
pub enum ExprKind<'a> {
  /// An integer or character literal.
  Lit(Const),
  /// A string literal, escapes decoded, without terminator.
  Str(&'a [u8]),
  Var(Symbol),
  /// `lhs = rhs`, or `lhs op= rhs` when `op` is present.
  Assign { op: Option<BinOp>, lhs: ExprP<'a>, rhs: ExprP<'a> },
  /// Postfix `++`/`--`; yields the value before the update.
  PostAssign { op: IncDec, operand: ExprP<'a> },
  Unary { op: UnOp, operand: ExprP<'a> },
  Binary { op: BinOp, lhs: ExprP<'a>, rhs: ExprP<'a> },
  Conditional { cond: ExprP<'a>, then: ExprP<'a>, els: ExprP<'a> },
  Call { func: Symbol, args: &'a [ExprP<'a>] },
  Cast { to: Ty<'a>, operand: ExprP<'a> },
  AddrOf(ExprP<'a>),
  Deref(ExprP<'a>),
  Subscript { base: ExprP<'a>, index: ExprP<'a> },
}

impl<'a> Expr<'a> {
  /// An expression that designates a storage location: a variable, a
  /// dereference, a subscript, or a string literal.
  #[must_use] pub fn is_lvalue(&self) -> bool {
    matches!(self.kind,
      ExprKind::Var(_) | ExprKind::Deref(_) | ExprKind::Subscript { .. } | ExprKind::Str(_))
  }

  /// An lvalue other than a string literal.
  #[must_use] pub fn is_assignable(&self) -> bool {
    matches!(self.kind, ExprKind::Var(_) | ExprKind::Deref(_) | ExprKind::Subscript { .. })
  }

  /// The filled type annotation. Panics if the typechecker has not run.
  #[must_use] pub fn ty(&self) -> Ty<'a> { self.ty.expect("expression not typechecked") }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
  /// `~`
  Complement,
  /// `-`
  Negate,
  /// `!`
  Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncDec { Inc, Dec }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
  Add, Sub, Mul, Div, Rem,
  BitAnd, BitOr, BitXor, Shl, Shr,
  And, Or,
  Eq, Ne, Lt, Le, Gt, Ge,
}

impl BinOp {
  /// True for `&&` and `||`, which short-circuit and never fold their
  /// operands into a common type.
  #[must_use] pub fn is_logical(self) -> bool { matches!(self, BinOp::And | BinOp::Or) }

  /// True for the six comparisons, whose result type is `int`.
  #[must_use] pub fn is_comparison(self) -> bool {
    matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
  }

  /// True for `<<` and `>>`: the right operand converts to the left's
  /// type instead of a common type.
  #[must_use] pub fn is_shift(self) -> bool { matches!(self, BinOp::Shl | BinOp::Shr) }
}

/// A statement.
#[derive(Debug)]
pub struct Stmt<'a> {
  pub kind: StmtKind<'a>,
  pub loc: Loc,
}

#[derive(Clone, Copy, Debug)]
pub enum StmtKind<'a> {
  Return(Option<ExprP<'a>>),
  Expr(ExprP<'a>),
  If { cond: ExprP<'a>, then: StmtP<'a>, els: Option<StmtP<'a>> },
  /// A user label `name:`; `label` is the mangled destination, filled by
  /// label resolution.
  Labeled { name: Symbol, label: Option<Symbol>, body: StmtP<'a> },
  Goto { name: Symbol, label: Option<Symbol> },
  Compound(&'a [BlockItem<'a>]),
  Break { label: Option<Symbol> },
  Continue { label: Option<Symbol> },
  While { cond: ExprP<'a>, body: StmtP<'a>, label: Option<Symbol> },
  DoWhile { body: StmtP<'a>, cond: ExprP<'a>, label: Option<Symbol> },
  For {
    init: ForInit<'a>,
    cond: Option<ExprP<'a>>,
    step: Option<ExprP<'a>>,
    body: StmtP<'a>,
    label: Option<Symbol>,
  },
  /// `cases` is the collected case list (the default entry included),
  /// filled by label resolution.
  Switch { cond: ExprP<'a>, body: StmtP<'a>, label: Option<Symbol>, cases: &'a [SwitchCase] },
  Case { value: ExprP<'a>, body: StmtP<'a>, label: Option<Symbol> },
  Default { body: StmtP<'a>, label: Option<Symbol> },
  Null,
}

/// One entry of a switch's dispatch list. `value` is `None` for the
/// default entry.
#[derive(Clone, Copy, Debug)]
pub struct SwitchCase {
  pub value: Option<i64>,
  pub label: Symbol,
}

#[derive(Clone, Copy, Debug)]
pub enum BlockItem<'a> {
  Stmt(StmtP<'a>),
  Decl(DeclP<'a>),
}

#[derive(Clone, Copy, Debug)]
pub enum ForInit<'a> {
  Decl(DeclP<'a>),
  Expr(Option<ExprP<'a>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
  None,
  Static,
  Extern,
}

/// A declaration, at file scope or as a block item.
#[derive(Debug)]
pub struct Decl<'a> {
  pub kind: DeclKind<'a>,
  pub loc: Loc,
}

#[derive(Clone, Copy, Debug)]
pub enum DeclKind<'a> {
  Var(VarDecl<'a>),
  Fn(FnDecl<'a>),
}

#[derive(Clone, Copy, Debug)]
pub struct VarDecl<'a> {
  pub name: Symbol,
  pub ty: Ty<'a>,
  pub storage: Storage,
  pub init: Option<InitP<'a>>,
}

/// A function declaration or definition. `ty` is the function type; its
/// parameter types are stored after array-to-pointer decay, matching
/// `params`. The body, if present, is a [`StmtKind::Compound`].
#[derive(Clone, Copy, Debug)]
pub struct FnDecl<'a> {
  pub name: Symbol,
  pub ty: Ty<'a>,
  pub storage: Storage,
  pub params: &'a [Param<'a>],
  pub body: Option<StmtP<'a>>,
}

/// A function parameter. The name is optional in a declaration without a
/// body; identifier resolution rejects unnamed parameters of definitions.
#[derive(Clone, Copy, Debug)]
pub struct Param<'a> {
  pub name: Option<Symbol>,
  pub ty: Ty<'a>,
  pub loc: Loc,
}

/// An initializer: a single expression, or a brace-enclosed list for
/// arrays. `ty` is filled by the typechecker.
#[derive(Debug)]
pub struct Init<'a> {
  pub kind: InitKind<'a>,
  pub loc: Loc,
  pub ty: Option<Ty<'a>>,
}

#[derive(Clone, Copy, Debug)]
pub enum InitKind<'a> {
  Single(ExprP<'a>),
  Compound(&'a [InitP<'a>]),
}

// Listing support. Like the TAC printer, rendering borrows the interner
// that produced the names; the output is a line-oriented tree used in
// trace logs and tests.

impl UnOp {
  #[must_use] pub fn symbol(self) -> &'static str {
    match self {
      UnOp::Complement => "~",
      UnOp::Negate => "-",
      UnOp::Not => "!",
    }
  }
}

impl BinOp {
  #[must_use] pub fn symbol(self) -> &'static str {
    match self {
      BinOp::Add => "+", BinOp::Sub => "-", BinOp::Mul => "*",
      BinOp::Div => "/", BinOp::Rem => "%",
      BinOp::BitAnd => "&", BinOp::BitOr => "|", BinOp::BitXor => "^",
      BinOp::Shl => "<<", BinOp::Shr => ">>",
      BinOp::And => "&&", BinOp::Or => "||",
      BinOp::Eq => "==", BinOp::Ne => "!=",
      BinOp::Lt => "<", BinOp::Le => "<=", BinOp::Gt => ">", BinOp::Ge => ">=",
    }
  }
}

impl<'a> Program<'a> {
  /// A line-oriented listing of the whole tree.
  #[must_use] pub fn display<'x>(
    &'x self, names: &'x crate::symbol::Interner,
  ) -> impl core::fmt::Display + 'x {
    DisplayProgram { prog: self, names }
  }
}

struct DisplayProgram<'x, 'a> {
  prog: &'x Program<'a>,
  names: &'x crate::symbol::Interner,
}

struct Printer<'x, 'f1, 'f2> {
  f: &'f1 mut core::fmt::Formatter<'f2>,
  names: &'x crate::symbol::Interner,
  indent: usize,
}

impl core::fmt::Display for DisplayProgram<'_, '_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    let mut p = Printer { f, names: self.names, indent: 0 };
    for &decl in self.prog.decls {
      p.decl(decl)?;
    }
    Ok(())
  }
}

impl Printer<'_, '_, '_> {
  fn line(&mut self, args: core::fmt::Arguments<'_>) -> core::fmt::Result {
    for _ in 0..self.indent {
      self.f.write_str("  ")?;
    }
    self.f.write_fmt(args)?;
    self.f.write_str("\n")
  }

  fn name(&self, s: Symbol) -> &str { self.names.resolve(s) }

  fn storage(storage: Storage) -> &'static str {
    match storage {
      Storage::None => "",
      Storage::Static => "static ",
      Storage::Extern => "extern ",
    }
  }

  fn decl(&mut self, d: DeclP<'_>) -> core::fmt::Result {
    match d.kind {
      DeclKind::Var(v) => {
        match v.init {
          None => {
            let name = self.name(v.name).to_string();
            self.line(format_args!(
              "{}var {}: {};", Self::storage(v.storage), name, v.ty))
          }
          Some(init) => {
            let rendered = self.init(init);
            let name = self.name(v.name).to_string();
            self.line(format_args!("{}var {}: {} = {rendered};",
              Self::storage(v.storage), name, v.ty))
          }
        }
      }
      DeclKind::Fn(func) => {
        let params: Vec<String> = func.params.iter().map(|p| match p.name {
          Some(n) => format!("{}: {}", self.name(n), p.ty),
          None => p.ty.to_string(),
        }).collect();
        let TypeKind::Fn { ret, .. } = *func.ty else { unreachable!("function type") };
        match func.body {
          None => {
            let name = self.name(func.name).to_string();
            self.line(format_args!("{}fn {}({}) -> {ret};",
              Self::storage(func.storage), name, params.join(", ")))
          }
          Some(body) => {
            let name = self.name(func.name).to_string();
            self.line(format_args!("{}fn {}({}) -> {ret}",
              Self::storage(func.storage), name, params.join(", ")))?;
            self.stmt(body)
          }
        }
      }
    }
  }

  fn init(&self, init: InitP<'_>) -> String {
    match init.kind {
      InitKind::Single(e) => self.expr(e),
      InitKind::Compound(items) => {
        let items: Vec<String> = items.iter().map(|&i| self.init(i)).collect();
        format!("{{{}}}", items.join(", "))
      }
    }
  }

  fn opt_label(&self, label: Option<Symbol>) -> String {
    label.map_or(String::new(), |l| format!(" @{}", self.name(l)))
  }

  fn stmt(&mut self, s: StmtP<'_>) -> core::fmt::Result {
    match s.kind {
      StmtKind::Return(None) => self.line(format_args!("return;")),
      StmtKind::Return(Some(e)) => {
        let e = self.expr(e);
        self.line(format_args!("return {e};"))
      }
      StmtKind::Expr(e) => {
        let e = self.expr(e);
        self.line(format_args!("{e};"))
      }
      StmtKind::If { cond, then, els } => {
        let cond = self.expr(cond);
        self.line(format_args!("if {cond}"))?;
        self.nested(then)?;
        if let Some(els) = els {
          self.line(format_args!("else"))?;
          self.nested(els)?;
        }
        Ok(())
      }
      StmtKind::Labeled { name, label, body } => {
        let label = self.opt_label(label);
        let name = self.name(name).to_string();
        self.line(format_args!("{}:{label}", name))?;
        self.stmt(body)
      }
      StmtKind::Goto { name, label } => {
        let label = self.opt_label(label);
        let name = self.name(name).to_string();
        self.line(format_args!("goto {}{label};", name))
      }
      StmtKind::Compound(items) => {
        self.line(format_args!("{{"))?;
        self.indent += 1;
        for item in items {
          match *item {
            BlockItem::Stmt(s) => self.stmt(s)?,
            BlockItem::Decl(d) => self.decl(d)?,
          }
        }
        self.indent -= 1;
        self.line(format_args!("}}"))
      }
      StmtKind::Break { label } => {
        let label = self.opt_label(label);
        self.line(format_args!("break{label};"))
      }
      StmtKind::Continue { label } => {
        let label = self.opt_label(label);
        self.line(format_args!("continue{label};"))
      }
      StmtKind::While { cond, body, label } => {
        let cond = self.expr(cond);
        let label = self.opt_label(label);
        self.line(format_args!("while {cond}{label}"))?;
        self.nested(body)
      }
      StmtKind::DoWhile { body, cond, label } => {
        let label = self.opt_label(label);
        self.line(format_args!("do{label}"))?;
        self.nested(body)?;
        let cond = self.expr(cond);
        self.line(format_args!("while {cond};"))
      }
      StmtKind::For { init, cond, step, body, label } => {
        let label = self.opt_label(label);
        let cond = cond.map_or(String::new(), |e| self.expr(e));
        let step = step.map_or(String::new(), |e| self.expr(e));
        match init {
          ForInit::Decl(d) => {
            self.line(format_args!("for{label} init:"))?;
            self.indent += 1;
            self.decl(d)?;
            self.indent -= 1;
            self.line(format_args!("for-rest ; {cond} ; {step}"))?;
          }
          ForInit::Expr(e) => {
            let e = e.map_or(String::new(), |e| self.expr(e));
            self.line(format_args!("for{label} {e} ; {cond} ; {step}"))?;
          }
        }
        self.nested(body)
      }
      StmtKind::Switch { cond, body, label, cases } => {
        let cond = self.expr(cond);
        let label = self.opt_label(label);
        self.line(format_args!("switch {cond}{label}"))?;
        if !cases.is_empty() {
          let cases: Vec<String> = cases.iter().map(|c| match c.value {
            Some(v) => format!("{v} -> {}", self.name(c.label)),
            None => format!("default -> {}", self.name(c.label)),
          }).collect();
          self.indent += 1;
          self.line(format_args!("dispatch [{}]", cases.join(", ")))?;
          self.indent -= 1;
        }
        self.nested(body)
      }
      StmtKind::Case { value, body, label } => {
        let value = self.expr(value);
        let label = self.opt_label(label);
        self.line(format_args!("case {value}:{label}"))?;
        self.stmt(body)
      }
      StmtKind::Default { body, label } => {
        let label = self.opt_label(label);
        self.line(format_args!("default:{label}"))?;
        self.stmt(body)
      }
      StmtKind::Null => self.line(format_args!(";")),
    }
  }

  /// A body statement, indented one level unless it is a block (blocks
  /// indent themselves).
  fn nested(&mut self, s: StmtP<'_>) -> core::fmt::Result {
    if matches!(s.kind, StmtKind::Compound(_)) {
      self.stmt(s)
    } else {
      self.indent += 1;
      let r = self.stmt(s);
      self.indent -= 1;
      r
    }
  }

  fn expr(&self, e: ExprP<'_>) -> String {
    match e.kind {
      ExprKind::Lit(c) => format!("{}", c.bits() as i64),
      ExprKind::Str(s) => format!("{:?}", String::from_utf8_lossy(s)),
      ExprKind::Var(v) => self.name(v).to_string(),
      ExprKind::Assign { op: None, lhs, rhs } =>
        format!("({} = {})", self.expr(lhs), self.expr(rhs)),
      ExprKind::Assign { op: Some(op), lhs, rhs } =>
        format!("({} {}= {})", self.expr(lhs), op.symbol(), self.expr(rhs)),
      ExprKind::PostAssign { op: IncDec::Inc, operand } =>
        format!("({}++)", self.expr(operand)),
      ExprKind::PostAssign { op: IncDec::Dec, operand } =>
        format!("({}--)", self.expr(operand)),
      ExprKind::Unary { op, operand } => format!("({}{})", op.symbol(), self.expr(operand)),
      ExprKind::Binary { op, lhs, rhs } =>
        format!("({} {} {})", self.expr(lhs), op.symbol(), self.expr(rhs)),
      ExprKind::Conditional { cond, then, els } =>
        format!("({} ? {} : {})", self.expr(cond), self.expr(then), self.expr(els)),
      ExprKind::Call { func, args } => {
        let args: Vec<String> = args.iter().map(|&a| self.expr(a)).collect();
        format!("{}({})", self.name(func), args.join(", "))
      }
      ExprKind::Cast { to, operand } => format!("(({to}) {})", self.expr(operand)),
      ExprKind::AddrOf(inner) => format!("(&{})", self.expr(inner)),
      ExprKind::Deref(inner) => format!("(*{})", self.expr(inner)),
      ExprKind::Subscript { base, index } =>
        format!("{}[{}]", self.expr(base), self.expr(index)),
    }
  }
}

#[cfg(test)]
mod tests {
  use bumpalo::Bump;
  use crate::source::SourceMap;
  use crate::symbol::Interner;
  use crate::{lexer, parser};

  #[test]
  fn listing_renders_declarations_and_control_flow() {
    let src = "
      int g = 1;
      int main(void) {
        int x = 2;
        if (x > 1) x = x * 3; else x = 0;
        while (x) x = x - 1;
        return g + x;
      }";
    let map = SourceMap::new("t.c", src);
    let mut names = Interner::new();
    let tokens = lexer::tokenize(&map, &mut names).expect("lex error");
    let arena = Bump::new();
    let prog = parser::parse(&arena, &map, &tokens).expect("parse error");
    let listing = prog.display(&names).to_string();
    assert!(listing.contains("var g: int = 1;"), "{listing}");
    assert!(listing.contains("fn main() -> int"), "{listing}");
    assert!(listing.contains("if (x > 1)"), "{listing}");
    assert!(listing.contains("(x = (x * 3));"), "{listing}");
    assert!(listing.contains("while x"), "{listing}");
    assert!(listing.contains("return (g + x);"), "{listing}");
  }

  #[test]
  fn listing_renders_loops_switches_and_labels() {
    let src = "
      int main(void) {
        int s = 0;
        for (int i = 0; i < 3; i += 1) { s += i; }
        switch (s) { case 1: break; default: s = 9; }
        top: s--;
        do ; while (s > 0 && s < 99);
        if (s) goto top;
        return s;
      }";
    let map = SourceMap::new("t.c", src);
    let mut names = Interner::new();
    let tokens = lexer::tokenize(&map, &mut names).expect("lex error");
    let arena = Bump::new();
    let prog = parser::parse(&arena, &map, &tokens).expect("parse error");
    let listing = prog.display(&names).to_string();
    assert!(listing.contains("for init:"), "{listing}");
    assert!(listing.contains("(s += i);"), "{listing}");
    assert!(listing.contains("switch s"), "{listing}");
    assert!(listing.contains("case 1:"), "{listing}");
    assert!(listing.contains("top:"), "{listing}");
    assert!(listing.contains("(s--);"), "{listing}");
    assert!(listing.contains("goto top;"), "{listing}");
    assert!(listing.contains("while ((s > 0) && (s < 99));"), "{listing}");
  }
}
