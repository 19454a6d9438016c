//! Identifier resolution.
//!
//! Rewrites every local identifier to a freshly minted unique name
//! (`x.17`) and validates scoping and linkage. The pass keeps a stack of
//! scope maps: index 0 is the file scope; each compound statement, each
//! `for` statement, and each function body (shared with its parameters)
//! pushes a scope on entry and pops it on exit.
//!
//! The pass is a rebuilding translator: it maps the parsed tree to a new
//! tree in the same arena with all names replaced. It aborts on the first
//! ill-formed construct.

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use hashbrown::HashMap;
use log::debug;
use smallvec::SmallVec;

use crate::errors::{Diagnostic, Phase, Result};
use crate::source::{Loc, SourceMap};
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{
  BlockItem, Decl, DeclKind, DeclP, Expr, ExprKind, ExprP, FnDecl, ForInit, Init, InitKind, InitP,
  Param, Program, Stmt, StmtKind, StmtP, Storage, VarDecl,
};

/// Resolve all identifiers in `prog`, or report the first scoping error.
pub fn run<'a>(
  arena: &'a Bump, map: &SourceMap, names: &mut Interner, prog: &Program<'a>,
) -> Result<Program<'a>> {
  let mut r = Resolver { arena, map, names, scopes: SmallVec::new() };
  r.scopes.push(Scope::new());
  let mut decls = BumpVec::new_in(arena);
  for &decl in prog.decls {
    decls.push(r.file_scope_decl(decl)?);
  }
  debug!("resolved {} top-level declarations", decls.len());
  Ok(Program { decls: decls.into_bump_slice() })
}

/// What a name currently refers to.
#[derive(Clone, Copy)]
struct Binding {
  unique: Symbol,
  /// Whether the declaration this binding came from has linkage; only
  /// linkage-bearing bindings are visible to block-scope `extern`.
  has_linkage: bool,
}

type Scope = HashMap<Symbol, Binding>;

struct Resolver<'a, 'c> {
  arena: &'a Bump,
  map: &'c SourceMap,
  names: &'c mut Interner,
  scopes: SmallVec<[Scope; 8]>,
}

impl<'a> Resolver<'a, '_> {
  fn err(&self, loc: Loc, msg: impl Into<String>) -> Diagnostic {
    Diagnostic::new(self.map, Phase::Resolve, loc, msg)
  }

  fn current_scope(&mut self) -> &mut Scope {
    self.scopes.last_mut().expect("scope stack is never empty")
  }

  /// Innermost binding for `name`.
  fn lookup(&self, name: Symbol) -> Option<Binding> {
    self.scopes.iter().rev().find_map(|s| s.get(&name).copied())
  }

  /// Innermost linkage-bearing binding for `name`.
  fn lookup_linked(&self, name: Symbol) -> Option<Binding> {
    self.scopes.iter().rev()
      .find_map(|s| s.get(&name).filter(|b| b.has_linkage).copied())
  }

  // declarations

  fn file_scope_decl(&mut self, decl: DeclP<'a>) -> Result<DeclP<'a>> {
    match decl.kind {
      DeclKind::Var(v) => {
        // file-scope objects keep their original name; redeclarations
        // are validated later, by the typechecker
        self.current_scope().insert(v.name, Binding {
          unique: v.name,
          has_linkage: v.storage != Storage::Static,
        });
        let init = v.init.map(|i| self.init(i)).transpose()?;
        Ok(self.rebuild_var(decl, v, v.name, init))
      }
      DeclKind::Fn(f) => {
        self.current_scope().insert(f.name, Binding {
          unique: f.name,
          has_linkage: f.storage != Storage::Static,
        });
        self.function(decl, f)
      }
    }
  }

  /// A function declaration: parameters and body share one new scope.
  fn function(&mut self, decl: DeclP<'a>, f: FnDecl<'a>) -> Result<DeclP<'a>> {
    self.scopes.push(Scope::new());
    let mut params: SmallVec<[Param<'a>; 8]> = SmallVec::new();
    for &p in f.params {
      let name = match p.name {
        Some(name) => {
          let unique = self.names.fresh(name);
          let clash = self.current_scope()
            .insert(name, Binding { unique, has_linkage: false });
          if clash.is_some() {
            return Err(self.err(p.loc,
              format!("multiple declarations of `{}`", self.names.resolve(name))))
          }
          Some(unique)
        }
        None if f.body.is_some() =>
          return Err(self.err(p.loc, "parameter of a function definition requires a name")),
        None => None,
      };
      params.push(Param { name, ty: p.ty, loc: p.loc });
    }
    let body = match f.body {
      Some(body) => {
        let StmtKind::Compound(items) = body.kind else { unreachable!("body is a block") };
        let items = self.block_items(items)?;
        Some(&*self.arena.alloc(Stmt { kind: StmtKind::Compound(items), loc: body.loc }))
      }
      None => None,
    };
    self.scopes.pop();
    let kind = DeclKind::Fn(FnDecl {
      name: f.name, ty: f.ty, storage: f.storage,
      params: self.arena.alloc_slice_copy(&params), body,
    });
    Ok(&*self.arena.alloc(Decl { kind, loc: decl.loc }))
  }

  fn block_decl(&mut self, decl: DeclP<'a>) -> Result<DeclP<'a>> {
    match decl.kind {
      DeclKind::Var(v) => self.local_var(decl, v),
      DeclKind::Fn(f) => {
        if f.storage == Storage::Static {
          return Err(self.err(decl.loc,
            format!("block-scope function `{}` may not be static", self.names.resolve(f.name))))
        }
        if f.body.is_some() {
          return Err(self.err(decl.loc,
            format!("nested definition of function `{}`", self.names.resolve(f.name))))
        }
        if let Some(prev) = self.current_scope().get(&f.name) {
          if !prev.has_linkage {
            return Err(self.err(decl.loc,
              format!("multiple declarations of `{}`", self.names.resolve(f.name))))
          }
        }
        self.current_scope().insert(f.name, Binding { unique: f.name, has_linkage: true });
        self.function(decl, f)
      }
    }
  }

  fn local_var(&mut self, decl: DeclP<'a>, v: VarDecl<'a>) -> Result<DeclP<'a>> {
    if let Some(prev) = self.current_scope().get(&v.name) {
      // a repeated extern referring to the same linked object is the one
      // permitted redeclaration within a scope
      if !(prev.has_linkage && v.storage == Storage::Extern) {
        return Err(self.err(decl.loc,
          format!("multiple declarations of `{}`", self.names.resolve(v.name))))
      }
    }
    if v.storage == Storage::Extern {
      // bind to the nearest linkage-bearing declaration if there is one,
      // otherwise introduce the name with linkage, spelling unchanged
      let unique = match self.lookup_linked(v.name) {
        Some(b) => b.unique,
        None => v.name,
      };
      self.current_scope().insert(v.name, Binding { unique, has_linkage: true });
      let init = v.init.map(|i| self.init(i)).transpose()?;
      return Ok(self.rebuild_var(decl, v, unique, init))
    }
    let unique = self.names.fresh(v.name);
    self.current_scope().insert(v.name, Binding { unique, has_linkage: false });
    // the initializer resolves in the post-insertion scope: `int a = a`
    // refers to the `a` being declared
    let init = v.init.map(|i| self.init(i)).transpose()?;
    Ok(self.rebuild_var(decl, v, unique, init))
  }

  fn rebuild_var(
    &mut self, decl: DeclP<'a>, v: VarDecl<'a>, name: Symbol, init: Option<InitP<'a>>,
  ) -> DeclP<'a> {
    let kind = DeclKind::Var(VarDecl { name, ty: v.ty, storage: v.storage, init });
    self.arena.alloc(Decl { kind, loc: decl.loc })
  }

  fn init(&mut self, init: InitP<'a>) -> Result<InitP<'a>> {
    let kind = match init.kind {
      InitKind::Single(e) => InitKind::Single(self.expr(e)?),
      InitKind::Compound(items) => {
        let mut out = BumpVec::new_in(self.arena);
        for &item in items {
          out.push(self.init(item)?);
        }
        InitKind::Compound(out.into_bump_slice())
      }
    };
    Ok(self.arena.alloc(Init { kind, loc: init.loc, ty: init.ty }))
  }

  // statements

  fn block_items(&mut self, items: &'a [BlockItem<'a>]) -> Result<&'a [BlockItem<'a>]> {
    let mut out = BumpVec::new_in(self.arena);
    for &item in items {
      out.push(match item {
        BlockItem::Stmt(s) => BlockItem::Stmt(self.stmt(s)?),
        BlockItem::Decl(d) => BlockItem::Decl(self.block_decl(d)?),
      });
    }
    Ok(out.into_bump_slice())
  }

  fn stmt(&mut self, s: StmtP<'a>) -> Result<StmtP<'a>> {
    let kind = match s.kind {
      StmtKind::Return(e) => StmtKind::Return(e.map(|e| self.expr(e)).transpose()?),
      StmtKind::Expr(e) => StmtKind::Expr(self.expr(e)?),
      StmtKind::If { cond, then, els } => StmtKind::If {
        cond: self.expr(cond)?,
        then: self.stmt(then)?,
        els: els.map(|e| self.stmt(e)).transpose()?,
      },
      StmtKind::Labeled { name, label, body } =>
        StmtKind::Labeled { name, label, body: self.stmt(body)? },
      StmtKind::Goto { name, label } => StmtKind::Goto { name, label },
      StmtKind::Compound(items) => {
        self.scopes.push(Scope::new());
        let items = self.block_items(items)?;
        self.scopes.pop();
        StmtKind::Compound(items)
      }
      StmtKind::Break { label } => StmtKind::Break { label },
      StmtKind::Continue { label } => StmtKind::Continue { label },
      StmtKind::While { cond, body, label } => StmtKind::While {
        cond: self.expr(cond)?,
        body: self.stmt(body)?,
        label,
      },
      StmtKind::DoWhile { body, cond, label } => StmtKind::DoWhile {
        body: self.stmt(body)?,
        cond: self.expr(cond)?,
        label,
      },
      StmtKind::For { init, cond, step, body, label } => {
        self.scopes.push(Scope::new());
        let init = match init {
          ForInit::Decl(d) => {
            if let DeclKind::Var(v) = d.kind {
              if v.storage != Storage::None {
                return Err(self.err(d.loc, "storage class in for-loop declaration"))
              }
            }
            ForInit::Decl(self.block_decl(d)?)
          }
          ForInit::Expr(e) => ForInit::Expr(e.map(|e| self.expr(e)).transpose()?),
        };
        let kind = StmtKind::For {
          init,
          cond: cond.map(|e| self.expr(e)).transpose()?,
          step: step.map(|e| self.expr(e)).transpose()?,
          body: self.stmt(body)?,
          label,
        };
        self.scopes.pop();
        kind
      }
      StmtKind::Switch { cond, body, label, cases } => StmtKind::Switch {
        cond: self.expr(cond)?,
        body: self.stmt(body)?,
        label,
        cases,
      },
      StmtKind::Case { value, body, label } => StmtKind::Case {
        value: self.expr(value)?,
        body: self.stmt(body)?,
        label,
      },
      StmtKind::Default { body, label } =>
        StmtKind::Default { body: self.stmt(body)?, label },
      StmtKind::Null => StmtKind::Null,
    };
    Ok(self.arena.alloc(Stmt { kind, loc: s.loc }))
  }

  // expressions

  fn expr(&mut self, e: ExprP<'a>) -> Result<ExprP<'a>> {
    let kind = match e.kind {
      ExprKind::Lit(c) => ExprKind::Lit(c),
      ExprKind::Str(s) => ExprKind::Str(s),
      ExprKind::Var(name) => match self.lookup(name) {
        Some(b) => ExprKind::Var(b.unique),
        None => return Err(self.err(e.loc,
          format!("no declaration for `{}`", self.names.resolve(name)))),
      },
      ExprKind::Assign { op, lhs, rhs } =>
        ExprKind::Assign { op, lhs: self.expr(lhs)?, rhs: self.expr(rhs)? },
      ExprKind::PostAssign { op, operand } =>
        ExprKind::PostAssign { op, operand: self.expr(operand)? },
      ExprKind::Unary { op, operand } =>
        ExprKind::Unary { op, operand: self.expr(operand)? },
      ExprKind::Binary { op, lhs, rhs } =>
        ExprKind::Binary { op, lhs: self.expr(lhs)?, rhs: self.expr(rhs)? },
      ExprKind::Conditional { cond, then, els } => ExprKind::Conditional {
        cond: self.expr(cond)?,
        then: self.expr(then)?,
        els: self.expr(els)?,
      },
      ExprKind::Call { func, args } => {
        let func = match self.lookup(func) {
          Some(b) => b.unique,
          None => return Err(self.err(e.loc,
            format!("no declaration for `{}`", self.names.resolve(func)))),
        };
        let mut out = BumpVec::new_in(self.arena);
        for &a in args {
          out.push(self.expr(a)?);
        }
        ExprKind::Call { func, args: out.into_bump_slice() }
      }
      ExprKind::Cast { to, operand } => ExprKind::Cast { to, operand: self.expr(operand)? },
      ExprKind::AddrOf(inner) => ExprKind::AddrOf(self.expr(inner)?),
      ExprKind::Deref(inner) => ExprKind::Deref(self.expr(inner)?),
      ExprKind::Subscript { base, index } =>
        ExprKind::Subscript { base: self.expr(base)?, index: self.expr(index)? },
    };
    Ok(self.arena.alloc(Expr { kind, loc: e.loc, ty: e.ty }))
  }
}
