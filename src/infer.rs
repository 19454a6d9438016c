//! The typechecker.
//!
//! Builds the symbol table, annotates every expression with its type,
//! materializes every implicit conversion as an explicit cast node,
//! validates declarations, and folds constant initializers. Like the
//! other middle passes this is a rebuilding translator: it maps the
//! resolved tree to a typed tree in the same arena.
//!
//! The restricted constant evaluator [`eval_const`] also lives here; label
//! resolution borrows it for `case` values, and static initializers must
//! reduce through it.

use arrayvec::ArrayVec;
use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use byteorder::{ByteOrder, LE};
use hashbrown::HashMap;
use if_chain::if_chain;
use log::debug;

use crate::errors::{Diagnostic, Phase, Result};
use crate::source::{Loc, SourceMap};
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{
  BinOp, BlockItem, Decl, DeclKind, DeclP, Expr, ExprKind, ExprP, FnDecl, ForInit, Init, InitKind,
  InitP, Program, Stmt, StmtKind, StmtP, Storage, UnOp, VarDecl,
};
use crate::types::{self, Const, IntTy, Ty, TypeKind};

/// Typecheck `prog`: returns the typed tree and the symbol table that TAC
/// lowering reads.
pub fn run<'a>(
  arena: &'a Bump, map: &SourceMap, names: &mut Interner, prog: &Program<'a>,
) -> Result<(Program<'a>, SymbolTable<'a>)> {
  let mut tc = TypeChecker { arena, map, names, table: SymbolTable::default(), ret_ty: None };
  let mut decls = BumpVec::new_in(arena);
  for &decl in prog.decls {
    decls.push(match decl.kind {
      DeclKind::Var(v) => tc.file_scope_var(decl, v)?,
      DeclKind::Fn(f) => tc.function(decl, f)?,
    });
  }
  debug!("typechecked {} symbols", tc.table.map.len());
  Ok((Program { decls: decls.into_bump_slice() }, tc.table))
}

/// The symbol table: unique name to type and attributes. Created here,
/// read by TAC lowering.
#[derive(Default, Debug)]
pub struct SymbolTable<'a> {
  map: HashMap<Symbol, Entry<'a>>,
  /// Insertion order, for deterministic emission of static data.
  order: Vec<Symbol>,
}

#[derive(Debug)]
pub struct Entry<'a> {
  pub ty: Ty<'a>,
  pub attrs: Attrs,
}

#[derive(Debug)]
pub enum Attrs {
  Fn { defined: bool, global: bool },
  Static { init: InitState, global: bool },
  Local,
}

/// Initialization state of a static object. States only increase along
/// `NoInit < Tentative < Initial` as declarations accumulate.
#[derive(Debug)]
pub enum InitState {
  NoInit,
  Tentative,
  Initial(Vec<u8>),
}

impl InitState {
  fn rank(&self) -> u8 {
    match self {
      InitState::NoInit => 0,
      InitState::Tentative => 1,
      InitState::Initial(_) => 2,
    }
  }
}

impl<'a> SymbolTable<'a> {
  #[must_use] pub fn get(&self, name: Symbol) -> &Entry<'a> {
    self.map.get(&name).expect("name not in symbol table")
  }

  #[must_use] pub fn lookup(&self, name: Symbol) -> Option<&Entry<'a>> { self.map.get(&name) }

  /// All entries in declaration order.
  pub fn iter_ordered(&self) -> impl Iterator<Item = (Symbol, &Entry<'a>)> {
    self.order.iter().map(move |&s| (s, self.get(s)))
  }

  fn insert(&mut self, name: Symbol, entry: Entry<'a>) {
    if self.map.insert(name, entry).is_none() {
      self.order.push(name);
    }
  }
}

struct TypeChecker<'a, 'c> {
  arena: &'a Bump,
  map: &'c SourceMap,
  names: &'c mut Interner,
  table: SymbolTable<'a>,
  /// Return type of the function currently being checked.
  ret_ty: Option<Ty<'a>>,
}

impl<'a> TypeChecker<'a, '_> {
  fn err(&self, loc: Loc, msg: impl Into<String>) -> Diagnostic {
    Diagnostic::new(self.map, Phase::Type, loc, msg)
  }

  fn named(&self, s: Symbol) -> &str { self.names.resolve(s) }

  // declarations

  /// A declared object type must be complete and concrete: no function
  /// elements or referents, no void anywhere but behind nothing.
  fn check_object_ty(&self, ty: Ty<'a>, loc: Loc) -> Result<()> {
    match *ty {
      TypeKind::Void => Err(self.err(loc, "variable has incomplete type `void`")),
      TypeKind::Fn { .. } => Err(self.err(loc, "object declared with function type")),
      TypeKind::Ptr(to) => match *to {
        TypeKind::Void => Err(self.err(loc, "pointer to void is not supported")),
        TypeKind::Fn { .. } => Err(self.err(loc, "pointer to function is not supported")),
        _ => self.check_object_ty(to, loc),
      },
      TypeKind::Array(elem, _) => self.check_object_ty(elem, loc),
      _ => Ok(()),
    }
  }

  fn file_scope_var(&mut self, decl: DeclP<'a>, v: VarDecl<'a>) -> Result<DeclP<'a>> {
    self.check_object_ty(v.ty, decl.loc)?;
    let mut global = v.storage != Storage::Static;
    let init = v.init.map(|i| self.init(i, v.ty)).transpose()?;
    let mut state = match init {
      Some(init) => InitState::Initial(self.fold_static_init(init, v.ty)?),
      None if v.storage == Storage::Extern => InitState::NoInit,
      None => InitState::Tentative,
    };

    // validate against an earlier declaration, and keep the stronger of
    // the two initialization states
    let prev = match self.table.lookup(v.name) {
      None => None,
      Some(prev) => {
        let Attrs::Static { init: prev_state, global: prev_global } = &prev.attrs else {
          return Err(self.err(decl.loc,
            format!("`{}` redeclared as a different kind of symbol", self.named(v.name))))
        };
        if prev.ty != v.ty {
          return Err(self.err(decl.loc,
            format!("conflicting types for `{}`", self.named(v.name))))
        }
        let kept = match prev_state {
          InitState::Initial(bytes) => InitState::Initial(bytes.clone()),
          InitState::Tentative => InitState::Tentative,
          InitState::NoInit => InitState::NoInit,
        };
        Some((kept, *prev_global))
      }
    };
    if let Some((prev_state, prev_global)) = prev {
      if v.storage == Storage::Extern {
        // extern adopts the visible linkage
        global = prev_global;
      } else if prev_global != global {
        return Err(self.err(decl.loc,
          format!("conflicting linkage for `{}`", self.named(v.name))))
      }
      if matches!((&prev_state, &state), (InitState::Initial(_), InitState::Initial(_))) {
        return Err(self.err(decl.loc,
          format!("`{}` initialized twice", self.named(v.name))))
      }
      if prev_state.rank() > state.rank() {
        state = prev_state;
      }
    }
    self.table.insert(v.name, Entry { ty: v.ty, attrs: Attrs::Static { init: state, global } });
    Ok(self.rebuild_var(decl, v, init))
  }

  fn rebuild_var(
    &mut self, decl: DeclP<'a>, v: VarDecl<'a>, init: Option<InitP<'a>>,
  ) -> DeclP<'a> {
    let kind = DeclKind::Var(VarDecl { init, ..v });
    self.arena.alloc(Decl { kind, loc: decl.loc })
  }

  fn function(&mut self, decl: DeclP<'a>, f: FnDecl<'a>) -> Result<DeclP<'a>> {
    let TypeKind::Fn { ret, params: param_tys } = *f.ty else { unreachable!("function type") };
    if ret.is_array() || ret.is_function() {
      return Err(self.err(decl.loc,
        format!("function `{}` returns a non-scalar type", self.named(f.name))))
    }
    if *ret != TypeKind::Void {
      self.check_object_ty(ret, decl.loc)?;
    }
    for p in f.params {
      self.check_object_ty(p.ty, p.loc)?;
    }
    let mut global = f.storage != Storage::Static;
    let mut defined = f.body.is_some();
    if let Some(prev) = self.table.lookup(f.name) {
      let Attrs::Fn { defined: prev_defined, global: prev_global } = &prev.attrs else {
        return Err(self.err(decl.loc,
          format!("`{}` redeclared as a different kind of symbol", self.named(f.name))))
      };
      if prev.ty != f.ty {
        return Err(self.err(decl.loc,
          format!("conflicting declarations of function `{}`", self.named(f.name))))
      }
      if *prev_defined && f.body.is_some() {
        return Err(self.err(decl.loc,
          format!("multiple definitions of function `{}`", self.named(f.name))))
      }
      if f.storage == Storage::Static && *prev_global {
        return Err(self.err(decl.loc,
          format!("static declaration of `{}` follows non-static", self.named(f.name))))
      }
      // a plain declaration inherits visible static linkage
      global = *prev_global;
      defined |= *prev_defined;
    }
    self.table.insert(f.name, Entry { ty: f.ty, attrs: Attrs::Fn { defined, global } });

    let body = match f.body {
      Some(body) => {
        for (p, &ty) in f.params.iter().zip(param_tys) {
          let name = p.name.expect("definition parameters are named");
          self.table.insert(name, Entry { ty, attrs: Attrs::Local });
        }
        self.ret_ty = Some(ret);
        let StmtKind::Compound(items) = body.kind else { unreachable!("body is a block") };
        let items = self.block_items(items)?;
        self.ret_ty = None;
        Some(&*self.arena.alloc(Stmt { kind: StmtKind::Compound(items), loc: body.loc }))
      }
      None => None,
    };
    let kind = DeclKind::Fn(FnDecl { body, ..f });
    Ok(&*self.arena.alloc(Decl { kind, loc: decl.loc }))
  }

  fn local_decl(&mut self, decl: DeclP<'a>) -> Result<DeclP<'a>> {
    match decl.kind {
      DeclKind::Fn(f) => self.function(decl, f),
      DeclKind::Var(v) => {
        self.check_object_ty(v.ty, decl.loc)?;
        match v.storage {
          Storage::Extern => {
            if v.init.is_some() {
              return Err(self.err(decl.loc,
                format!("initializer on block-scope extern `{}`", self.named(v.name))))
            }
            if let Some(prev) = self.table.lookup(v.name) {
              if !matches!(prev.attrs, Attrs::Static { .. }) {
                return Err(self.err(decl.loc,
                  format!("`{}` redeclared as a different kind of symbol", self.named(v.name))))
              }
              if prev.ty != v.ty {
                return Err(self.err(decl.loc,
                  format!("conflicting types for `{}`", self.named(v.name))))
              }
            } else {
              self.table.insert(v.name, Entry {
                ty: v.ty,
                attrs: Attrs::Static { init: InitState::NoInit, global: true },
              });
            }
            Ok(decl)
          }
          Storage::Static => {
            // a block-scope static is a file-scope object bound to this
            // unique name; its initializer must fold
            let init = v.init.map(|i| self.init(i, v.ty)).transpose()?;
            let bytes = match init {
              Some(init) => self.fold_static_init(init, v.ty)?,
              None => vec![0; v.ty.size() as usize],
            };
            self.table.insert(v.name, Entry {
              ty: v.ty,
              attrs: Attrs::Static { init: InitState::Initial(bytes), global: false },
            });
            Ok(self.rebuild_var(decl, v, init))
          }
          Storage::None => {
            self.table.insert(v.name, Entry { ty: v.ty, attrs: Attrs::Local });
            let init = v.init.map(|i| self.init(i, v.ty)).transpose()?;
            Ok(self.rebuild_var(decl, v, init))
          }
        }
      }
    }
  }

  // initializers

  fn init(&mut self, init: InitP<'a>, target: Ty<'a>) -> Result<InitP<'a>> {
    let kind = match init.kind {
      InitKind::Single(e) => {
        // a string literal may initialize a char array of sufficient size
        if_chain! {
          if let TypeKind::Array(elem, n) = *target;
          if let ExprKind::Str(s) = e.kind;
          then {
            if !elem.is_char_kind() {
              return Err(self.err(e.loc, "string initializer for a non-character array"))
            }
            if s.len() > n {
              return Err(self.err(e.loc, "string initializer is too long"))
            }
            let e = &*self.arena.alloc(Expr { kind: e.kind, loc: e.loc, ty: Some(target) });
            let kind = InitKind::Single(e);
            return Ok(&*self.arena.alloc(Init { kind, loc: init.loc, ty: Some(target) }))
          }
        }
        if target.is_array() {
          return Err(self.err(init.loc, "array initializer must be a brace-enclosed list"))
        }
        let e = self.expr_val(e)?;
        let e = self.convert_by_assignment(e, target)?;
        InitKind::Single(e)
      }
      InitKind::Compound(items) => {
        let TypeKind::Array(elem, n) = *target else {
          return Err(self.err(init.loc, "compound initializer for a scalar object"))
        };
        if items.len() > n {
          return Err(self.err(init.loc, "too many values in array initializer"))
        }
        let mut out = BumpVec::new_in(self.arena);
        for &item in items {
          out.push(self.init(item, elem)?);
        }
        // missing elements are padded with zero-valued initializers
        for _ in items.len()..n {
          out.push(self.zero_init(elem, init.loc)?);
        }
        InitKind::Compound(out.into_bump_slice())
      }
    };
    Ok(self.arena.alloc(Init { kind, loc: init.loc, ty: Some(target) }))
  }

  /// A zero-valued initializer of the given type.
  fn zero_init(&mut self, ty: Ty<'a>, loc: Loc) -> Result<InitP<'a>> {
    let kind = match *ty {
      TypeKind::Array(elem, n) => {
        let mut out = BumpVec::new_in(self.arena);
        for _ in 0..n {
          out.push(self.zero_init(elem, loc)?);
        }
        InitKind::Compound(out.into_bump_slice())
      }
      _ => {
        let zero = self.arena.alloc(Expr {
          kind: ExprKind::Lit(Const::Int(0)), loc, ty: Some(&TypeKind::Int),
        });
        InitKind::Single(self.convert_to(zero, ty))
      }
    };
    Ok(self.arena.alloc(Init { kind, loc, ty: Some(ty) }))
  }

  /// Reduce a typechecked initializer to its constant byte image.
  fn fold_static_init(&mut self, init: InitP<'a>, target: Ty<'a>) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(target.size() as usize);
    self.fold_static_into(init, target, &mut bytes)?;
    debug_assert_eq!(bytes.len() as u64, target.size());
    Ok(bytes)
  }

  fn fold_static_into(&mut self, init: InitP<'a>, target: Ty<'a>, out: &mut Vec<u8>)
      -> Result<()> {
    match init.kind {
      InitKind::Single(e) => {
        if let (ExprKind::Str(s), TypeKind::Array(_, n)) = (e.kind, target) {
          out.extend_from_slice(s);
          out.extend(std::iter::repeat_n(0, n - s.len()));
          return Ok(())
        }
        let c = eval_const(e)
          .ok_or_else(|| self.err(e.loc, "static initializer is not a constant"))?;
        let ity = target.int_ty().expect("scalar initializer target");
        let mut buf = ArrayVec::<u8, 8>::new();
        buf.extend([0; 8]);
        LE::write_u64(&mut buf, ity.normalize(c.bits));
        out.extend_from_slice(&buf[..ity.bytes as usize]);
        Ok(())
      }
      InitKind::Compound(items) => {
        let TypeKind::Array(elem, _) = *target else { unreachable!("checked in init") };
        for &item in items {
          self.fold_static_into(item, elem, out)?;
        }
        Ok(())
      }
    }
  }

  // statements

  fn block_items(&mut self, items: &'a [BlockItem<'a>]) -> Result<&'a [BlockItem<'a>]> {
    let mut out = BumpVec::new_in(self.arena);
    for &item in items {
      out.push(match item {
        BlockItem::Stmt(s) => BlockItem::Stmt(self.stmt(s)?),
        BlockItem::Decl(d) => BlockItem::Decl(self.local_decl(d)?),
      });
    }
    Ok(out.into_bump_slice())
  }

  /// A condition operand: any scalar.
  fn condition(&mut self, e: ExprP<'a>) -> Result<ExprP<'a>> {
    let e = self.expr_val(e)?;
    if !e.ty().is_scalar() {
      return Err(self.err(e.loc, "condition is not a scalar"))
    }
    Ok(e)
  }

  fn stmt(&mut self, s: StmtP<'a>) -> Result<StmtP<'a>> {
    let kind = match s.kind {
      StmtKind::Return(e) => {
        let ret = self.ret_ty.expect("return inside a function");
        let e = match e {
          Some(e) => {
            if *ret == TypeKind::Void {
              return Err(self.err(s.loc, "returning a value from a void function"))
            }
            let e = self.expr_val(e)?;
            Some(self.convert_by_assignment(e, ret)?)
          }
          None => None,
        };
        StmtKind::Return(e)
      }
      StmtKind::Expr(e) => StmtKind::Expr(self.expr_val(e)?),
      StmtKind::If { cond, then, els } => StmtKind::If {
        cond: self.condition(cond)?,
        then: self.stmt(then)?,
        els: els.map(|e| self.stmt(e)).transpose()?,
      },
      StmtKind::Labeled { name, label, body } =>
        StmtKind::Labeled { name, label, body: self.stmt(body)? },
      StmtKind::Compound(items) => StmtKind::Compound(self.block_items(items)?),
      StmtKind::While { cond, body, label } => StmtKind::While {
        cond: self.condition(cond)?,
        body: self.stmt(body)?,
        label,
      },
      StmtKind::DoWhile { body, cond, label } => StmtKind::DoWhile {
        body: self.stmt(body)?,
        cond: self.condition(cond)?,
        label,
      },
      StmtKind::For { init, cond, step, body, label } => StmtKind::For {
        init: match init {
          ForInit::Decl(d) => ForInit::Decl(self.local_decl(d)?),
          ForInit::Expr(e) => ForInit::Expr(e.map(|e| self.expr_val(e)).transpose()?),
        },
        cond: cond.map(|e| self.condition(e)).transpose()?,
        step: step.map(|e| self.expr_val(e)).transpose()?,
        body: self.stmt(body)?,
        label,
      },
      StmtKind::Switch { cond, body, label, cases } => {
        let cond = self.expr_val(cond)?;
        if !cond.ty().is_arithmetic() {
          return Err(self.err(cond.loc, "switch condition is not arithmetic"))
        }
        StmtKind::Switch { cond, body: self.stmt(body)?, label, cases }
      }
      StmtKind::Case { value, body, label } => {
        let value = self.expr_val(value)?;
        if !value.ty().is_arithmetic() {
          return Err(self.err(value.loc, "case value is not arithmetic"))
        }
        StmtKind::Case { value, body: self.stmt(body)?, label }
      }
      StmtKind::Default { body, label } =>
        StmtKind::Default { body: self.stmt(body)?, label },
      kind @ (StmtKind::Goto { .. } | StmtKind::Break { .. } | StmtKind::Continue { .. }
        | StmtKind::Null) => kind,
    };
    Ok(&*self.arena.alloc(Stmt { kind, loc: s.loc }))
  }

  // expressions

  fn alloc_expr(&self, loc: Loc, kind: ExprKind<'a>, ty: Ty<'a>) -> ExprP<'a> {
    self.arena.alloc(Expr { kind, loc, ty: Some(ty) })
  }

  /// Insert a cast node unless the value type already matches.
  fn convert_to(&self, e: ExprP<'a>, ty: Ty<'a>) -> ExprP<'a> {
    if e.ty() == ty { e } else {
      self.alloc_expr(e.loc, ExprKind::Cast { to: ty, operand: e }, ty)
    }
  }

  /// The integer-promoted value of `e`: char kinds widen to `int`.
  fn promote(&self, e: ExprP<'a>) -> ExprP<'a> {
    self.convert_to(e, e.ty().promote())
  }

  /// The usual arithmetic conversions: promote char kinds; equal types
  /// stand; at equal width the unsigned type wins; otherwise the wider.
  fn common_type(&self, a: Ty<'a>, b: Ty<'a>) -> Ty<'a> {
    let a = a.promote();
    let b = b.promote();
    if a == b { return a }
    if a.size() == b.size() {
      return if a.is_signed() { b } else { a }
    }
    if a.size() > b.size() { a } else { b }
  }

  /// Assignment conversion: identical types pass; arithmetic converts to
  /// arithmetic; a null-pointer constant converts to any pointer.
  fn convert_by_assignment(&mut self, e: ExprP<'a>, target: Ty<'a>) -> Result<ExprP<'a>> {
    let ty = e.ty();
    if ty == target { return Ok(e) }
    if ty.is_arithmetic() && target.is_arithmetic() {
      return Ok(self.convert_to(e, target))
    }
    if target.is_pointer() && is_null_constant(e) {
      return Ok(self.convert_to(e, target))
    }
    Err(self.err(e.loc, format!("cannot convert `{ty}` to `{target}`")))
  }

  /// Typecheck in a value context: arrays decay to a pointer to their
  /// first element, materialized as an address-of node.
  fn expr_val(&mut self, e: ExprP<'a>) -> Result<ExprP<'a>> {
    let e = self.expr(e)?;
    Ok(self.decay(e))
  }

  fn decay(&self, e: ExprP<'a>) -> ExprP<'a> {
    match *e.ty() {
      TypeKind::Array(elem, _) =>
        self.alloc_expr(e.loc, ExprKind::AddrOf(e), types::ptr_to(self.arena, elem)),
      _ => e,
    }
  }

  fn expr(&mut self, e: ExprP<'a>) -> Result<ExprP<'a>> {
    match e.kind {
      ExprKind::Lit(c) => Ok(self.alloc_expr(e.loc, e.kind, c.ty())),
      ExprKind::Str(s) => {
        let ty = types::array_of(self.arena, &TypeKind::Char, s.len() + 1);
        Ok(self.alloc_expr(e.loc, e.kind, ty))
      }
      ExprKind::Var(name) => {
        let entry = self.table.lookup(name)
          .unwrap_or_else(|| panic!("unresolved name `{}`", self.names.resolve(name)));
        if entry.ty.is_function() {
          return Err(self.err(e.loc,
            format!("function `{}` used as a variable", self.named(name))))
        }
        let ty = entry.ty;
        Ok(self.alloc_expr(e.loc, e.kind, ty))
      }
      ExprKind::Assign { op: None, lhs, rhs } => {
        let lhs = self.expr(lhs)?;
        self.check_assignable(lhs)?;
        let rhs = self.expr_val(rhs)?;
        let rhs = self.convert_by_assignment(rhs, lhs.ty())?;
        Ok(self.alloc_expr(e.loc, ExprKind::Assign { op: None, lhs, rhs }, lhs.ty()))
      }
      ExprKind::Assign { op: Some(op), lhs, rhs } => self.compound_assign(e, op, lhs, rhs),
      ExprKind::PostAssign { op, operand } => {
        let operand = self.expr(operand)?;
        self.check_assignable(operand)?;
        if !operand.ty().is_scalar() {
          return Err(self.err(e.loc, "operand of `++`/`--` is not a scalar"))
        }
        Ok(self.alloc_expr(e.loc, ExprKind::PostAssign { op, operand }, operand.ty()))
      }
      ExprKind::Unary { op, operand } => {
        let operand = self.expr_val(operand)?;
        match op {
          UnOp::Negate | UnOp::Complement => {
            if !operand.ty().is_arithmetic() {
              return Err(self.err(e.loc, "unary operand is not arithmetic"))
            }
            let operand = self.promote(operand);
            Ok(self.alloc_expr(e.loc, ExprKind::Unary { op, operand }, operand.ty()))
          }
          UnOp::Not => {
            if !operand.ty().is_scalar() {
              return Err(self.err(e.loc, "operand of `!` is not a scalar"))
            }
            Ok(self.alloc_expr(e.loc, ExprKind::Unary { op, operand }, &TypeKind::Int))
          }
        }
      }
      ExprKind::Binary { op, lhs, rhs } => self.binary(e, op, lhs, rhs),
      ExprKind::Conditional { cond, then, els } => {
        let cond = self.condition(cond)?;
        let then = self.expr_val(then)?;
        let els = self.expr_val(els)?;
        let ty = self.conditional_ty(e.loc, then, els)?;
        let then = self.convert_to(then, ty);
        let els = self.convert_to(els, ty);
        Ok(self.alloc_expr(e.loc, ExprKind::Conditional { cond, then, els }, ty))
      }
      ExprKind::Call { func, args } => {
        let entry = self.table.lookup(func)
          .unwrap_or_else(|| panic!("unresolved name `{}`", self.names.resolve(func)));
        let TypeKind::Fn { ret, params } = *entry.ty else {
          return Err(self.err(e.loc,
            format!("called object `{}` is not a function", self.named(func))))
        };
        if args.len() != params.len() {
          return Err(self.err(e.loc, format!(
            "function `{}` expects {} arguments, {} given",
            self.named(func), params.len(), args.len())))
        }
        let mut out = BumpVec::new_in(self.arena);
        for (&a, &p) in args.iter().zip(params) {
          let a = self.expr_val(a)?;
          out.push(self.convert_by_assignment(a, p)?);
        }
        let kind = ExprKind::Call { func, args: out.into_bump_slice() };
        Ok(self.alloc_expr(e.loc, kind, ret))
      }
      ExprKind::Cast { to, operand } => {
        if to.is_array() {
          return Err(self.err(e.loc, "cast to array type"))
        }
        let operand = self.expr_val(operand)?;
        if *to != TypeKind::Void && !(operand.ty().is_scalar() && to.is_scalar()) {
          return Err(self.err(e.loc,
            format!("invalid cast from `{}` to `{to}`", operand.ty())))
        }
        Ok(self.alloc_expr(e.loc, ExprKind::Cast { to, operand }, to))
      }
      ExprKind::AddrOf(inner) => {
        let inner = self.expr(inner)?;
        if !inner.is_lvalue() {
          return Err(self.err(e.loc, "address of a non-lvalue"))
        }
        let ty = types::ptr_to(self.arena, inner.ty());
        Ok(self.alloc_expr(e.loc, ExprKind::AddrOf(inner), ty))
      }
      ExprKind::Deref(inner) => {
        let inner = self.expr_val(inner)?;
        let Some(to) = inner.ty().referenced() else {
          return Err(self.err(e.loc, "dereference of a non-pointer"))
        };
        Ok(self.alloc_expr(e.loc, ExprKind::Deref(inner), to))
      }
      ExprKind::Subscript { base, index } => {
        let base = self.expr_val(base)?;
        let index = self.expr_val(index)?;
        // if the pointer is on the right, swap the operands
        let (base, index) = if base.ty().is_pointer() { (base, index) }
          else if index.ty().is_pointer() { (index, base) }
          else {
            return Err(self.err(e.loc, "subscript of a non-pointer"))
          };
        if !index.ty().is_arithmetic() {
          return Err(self.err(e.loc, "subscript index is not arithmetic"))
        }
        let index = self.convert_to(index, &TypeKind::Int);
        let to = base.ty().referenced().expect("pointer base");
        Ok(self.alloc_expr(e.loc, ExprKind::Subscript { base, index }, to))
      }
    }
  }

  fn check_assignable(&self, e: ExprP<'a>) -> Result<()> {
    if !e.is_assignable() {
      return Err(self.err(e.loc, "assignment to a non-lvalue"))
    }
    if e.ty().is_array() {
      return Err(self.err(e.loc, "assignment to an array"))
    }
    Ok(())
  }

  fn compound_assign(
    &mut self, e: ExprP<'a>, op: BinOp, lhs: ExprP<'a>, rhs: ExprP<'a>,
  ) -> Result<ExprP<'a>> {
    let lhs = self.expr(lhs)?;
    self.check_assignable(lhs)?;
    let rhs = self.expr_val(rhs)?;
    let lhs_ty = lhs.ty();
    let rhs = if lhs_ty.is_pointer() {
      // pointer arithmetic only composes with += and -=
      if !matches!(op, BinOp::Add | BinOp::Sub) || !rhs.ty().is_arithmetic() {
        return Err(self.err(e.loc, "invalid pointer arithmetic"))
      }
      self.check_complete_pointee(lhs_ty, e.loc)?;
      self.convert_to(rhs, &TypeKind::Int)
    } else if op.is_shift() {
      if !lhs_ty.is_arithmetic() || !rhs.ty().is_arithmetic() {
        return Err(self.err(e.loc, "shift operand is not arithmetic"))
      }
      self.convert_to(rhs, lhs_ty.promote())
    } else {
      if !lhs_ty.is_arithmetic() || !rhs.ty().is_arithmetic() {
        return Err(self.err(e.loc, "invalid operands to compound assignment"))
      }
      let common = self.common_type(lhs_ty, rhs.ty());
      self.convert_to(rhs, common)
    };
    Ok(self.alloc_expr(e.loc, ExprKind::Assign { op: Some(op), lhs, rhs }, lhs_ty))
  }

  /// Pointer arithmetic needs the referent size.
  fn check_complete_pointee(&self, ty: Ty<'a>, loc: Loc) -> Result<()> {
    match ty.referenced() {
      Some(to) if !to.is_function() && *to != TypeKind::Void => Ok(()),
      _ => Err(self.err(loc, "pointer arithmetic on an incomplete pointee")),
    }
  }

  fn binary(&mut self, e: ExprP<'a>, op: BinOp, lhs: ExprP<'a>, rhs: ExprP<'a>)
      -> Result<ExprP<'a>> {
    let lhs = self.expr_val(lhs)?;
    let rhs = self.expr_val(rhs)?;
    let (lt, rt) = (lhs.ty(), rhs.ty());

    if op.is_logical() {
      if !lt.is_scalar() || !rt.is_scalar() {
        return Err(self.err(e.loc, "logical operand is not a scalar"))
      }
      let kind = ExprKind::Binary { op, lhs, rhs };
      return Ok(self.alloc_expr(e.loc, kind, &TypeKind::Int))
    }

    if op.is_shift() {
      if !lt.is_arithmetic() || !rt.is_arithmetic() {
        return Err(self.err(e.loc, "shift operand is not arithmetic"))
      }
      let lhs = self.promote(lhs);
      // the right operand converts to the left's type; the result takes
      // the left's type
      let rhs = self.convert_to(rhs, lhs.ty());
      let kind = ExprKind::Binary { op, lhs, rhs };
      return Ok(self.alloc_expr(e.loc, kind, lhs.ty()))
    }

    if matches!(op, BinOp::Eq | BinOp::Ne) && (lt.is_pointer() || rt.is_pointer()) {
      let (lhs, rhs) = if lt == rt {
        (lhs, rhs)
      } else if lt.is_pointer() && is_null_constant(rhs) {
        (lhs, self.convert_to(rhs, lt))
      } else if rt.is_pointer() && is_null_constant(lhs) {
        (self.convert_to(lhs, rt), rhs)
      } else {
        return Err(self.err(e.loc, format!("comparison of `{lt}` with `{rt}`")))
      };
      let kind = ExprKind::Binary { op, lhs, rhs };
      return Ok(self.alloc_expr(e.loc, kind, &TypeKind::Int))
    }

    if matches!(op, BinOp::Add | BinOp::Sub) && (lt.is_pointer() || rt.is_pointer()) {
      // int + ptr, ptr + int, ptr - int; everything else is rejected
      let (ptr, int) = match (lt.is_pointer(), rt.is_pointer()) {
        (true, false) => (lhs, rhs),
        (false, true) if op == BinOp::Add => (rhs, lhs),
        _ => return Err(self.err(e.loc, "invalid pointer arithmetic")),
      };
      if !int.ty().is_arithmetic() {
        return Err(self.err(e.loc, "invalid pointer arithmetic"))
      }
      self.check_complete_pointee(ptr.ty(), e.loc)?;
      let int = self.convert_to(int, &TypeKind::Int);
      // keep the pointer on the left in the typed tree
      let (lhs, rhs) = (ptr, int);
      let kind = ExprKind::Binary { op, lhs, rhs };
      return Ok(self.alloc_expr(e.loc, kind, lhs.ty()))
    }

    if !lt.is_arithmetic() || !rt.is_arithmetic() {
      return Err(self.err(e.loc, "invalid operands to binary expression"))
    }
    let common = self.common_type(lt, rt);
    let lhs = self.convert_to(lhs, common);
    let rhs = self.convert_to(rhs, common);
    let ty = if op.is_comparison() { &TypeKind::Int } else { common };
    Ok(self.alloc_expr(e.loc, ExprKind::Binary { op, lhs, rhs }, ty))
  }

  fn conditional_ty(&mut self, loc: Loc, then: ExprP<'a>, els: ExprP<'a>) -> Result<Ty<'a>> {
    let (tt, et) = (then.ty(), els.ty());
    if tt.is_arithmetic() && et.is_arithmetic() {
      return Ok(self.common_type(tt, et))
    }
    if tt == et { return Ok(tt) }
    if tt.is_pointer() && is_null_constant(els) { return Ok(tt) }
    if et.is_pointer() && is_null_constant(then) { return Ok(et) }
    Err(self.err(loc, format!("mismatched conditional branches: `{tt}` and `{et}`")))
  }
}

/// A null-pointer constant: an integer literal of value zero.
fn is_null_constant(e: ExprP<'_>) -> bool {
  matches!(e.kind, ExprKind::Lit(c) if c.is_zero())
}

// constant folding

/// A folded constant: a 64-bit pattern plus the shape it was computed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstVal {
  pub bits: u64,
  pub ty: IntTy,
}

/// The restricted constant evaluator, over literal, unary, binary, cast
/// and conditional expressions. Signedness follows the annotated type
/// when the typechecker has run, and the operands' own shapes otherwise.
/// Division or remainder by zero is not a constant.
pub fn eval_const(e: ExprP<'_>) -> Option<ConstVal> {
  let v = match e.kind {
    ExprKind::Lit(c) => {
      let ty = c.ty().int_ty().expect("literal is integral");
      ConstVal { bits: c.bits(), ty }
    }
    ExprKind::Unary { op, operand } => {
      let v = eval_const(operand)?;
      let ty = annotated(e).unwrap_or(promote_ity(v.ty));
      let bits = match op {
        UnOp::Complement => !v.bits,
        UnOp::Negate => v.bits.wrapping_neg(),
        UnOp::Not => u64::from(v.bits == 0),
      };
      ConstVal { bits: ty.normalize(bits), ty }
    }
    ExprKind::Binary { op, lhs, rhs } => {
      let l = eval_const(lhs)?;
      let r = eval_const(rhs)?;
      return eval_binary(e, op, l, r)
    }
    ExprKind::Cast { to, operand } => {
      let v = eval_const(operand)?;
      let ty = to.int_ty()?;
      ConstVal { bits: ty.normalize(v.bits), ty }
    }
    ExprKind::Conditional { cond, then, els } => {
      let c = eval_const(cond)?;
      let v = if c.bits != 0 { eval_const(then)? } else { eval_const(els)? };
      let ty = annotated(e).unwrap_or(v.ty);
      ConstVal { bits: ty.normalize(v.bits), ty }
    }
    _ => return None,
  };
  Some(v)
}

fn annotated(e: ExprP<'_>) -> Option<IntTy> {
  e.ty.and_then(TypeKind::int_ty)
}

fn promote_ity(ty: IntTy) -> IntTy {
  if ty.bytes < 4 { IntTy::I32 } else { ty }
}

fn common_ity(a: IntTy, b: IntTy) -> IntTy {
  let a = promote_ity(a);
  let b = promote_ity(b);
  if a == b { return a }
  if a.bytes == b.bytes {
    return if a.signed { b } else { a }
  }
  if a.bytes > b.bytes { a } else { b }
}

fn eval_binary(e: ExprP<'_>, op: BinOp, l: ConstVal, r: ConstVal) -> Option<ConstVal> {
  use BinOp::*;
  // logical and comparison results are int; everything else computes at
  // the common (or annotated) shape
  match op {
    And => return Some(ConstVal { bits: u64::from(l.bits != 0 && r.bits != 0), ty: IntTy::I32 }),
    Or => return Some(ConstVal { bits: u64::from(l.bits != 0 || r.bits != 0), ty: IntTy::I32 }),
    _ => {}
  }
  if op.is_comparison() {
    let ty = common_ity(l.ty, r.ty);
    let (a, b) = (ty.normalize(l.bits), ty.normalize(r.bits));
    let res = if ty.signed {
      let (a, b) = (a as i64, b as i64);
      match op { Eq => a == b, Ne => a != b, Lt => a < b, Le => a <= b,
                 Gt => a > b, Ge => a >= b, _ => unreachable!() }
    } else {
      match op { Eq => a == b, Ne => a != b, Lt => a < b, Le => a <= b,
                 Gt => a > b, Ge => a >= b, _ => unreachable!() }
    };
    return Some(ConstVal { bits: u64::from(res), ty: IntTy::I32 })
  }
  let ty = annotated(e).unwrap_or_else(|| if op.is_shift() {
    promote_ity(l.ty)
  } else {
    common_ity(l.ty, r.ty)
  });
  let (a, b) = (ty.normalize(l.bits), ty.normalize(r.bits));
  let bits = match op {
    Add => a.wrapping_add(b),
    Sub => a.wrapping_sub(b),
    Mul => a.wrapping_mul(b),
    Div if b == 0 => return None,
    Rem if b == 0 => return None,
    Div => if ty.signed { (a as i64).wrapping_div(b as i64) as u64 } else { a / b },
    Rem => if ty.signed { (a as i64).wrapping_rem(b as i64) as u64 } else { a % b },
    BitAnd => a & b,
    BitOr => a | b,
    BitXor => a ^ b,
    Shl => a.wrapping_shl(b as u32 & 63),
    Shr => if ty.signed {
      ((a as i64).wrapping_shr(b as u32 & 63)) as u64
    } else {
      a.wrapping_shr(b as u32 & 63)
    },
    _ => unreachable!("handled above"),
  };
  Some(ConstVal { bits: ty.normalize(bits), ty })
}
