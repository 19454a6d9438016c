//! The translation pass from the typed AST to three-address code.
//!
//! Each function body flattens to a linear instruction stream; each static
//! object becomes a data record with its folded byte image. Temporaries
//! and labels come from the same monotonic counter as unique names, so
//! they can never collide with anything the earlier passes minted.
//!
//! Lowering cannot fail: the typechecker has already rejected every
//! ill-formed construct, and every invariant this pass relies on
//! (annotated expressions, resolved labels, collected case lists) is
//! enforced with assertions rather than diagnostics.

use log::debug;

use crate::infer::{Attrs, InitState, SymbolTable};
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{
  self, BlockItem, DeclKind, DeclP, ExprKind, ExprP, ForInit, IncDec, InitKind, InitP, Program,
  StmtKind, StmtP,
};
use crate::types::tac::{self, BinOp, Cond, Function, Instr, StaticVar, TopLevel, UnOp, Val};
use crate::types::{IntTy, Ty, TypeKind};

/// Lower the typechecked `prog` against its symbol table.
pub fn run(names: &mut Interner, table: &SymbolTable<'_>, prog: &Program<'_>) -> tac::Program {
  let str_base = names.intern("str");
  let mut out = tac::Program::default();
  let mut strings = Vec::new();

  // static objects, in declaration order
  for (name, entry) in table.iter_ordered() {
    let Attrs::Static { init, global } = &entry.attrs else { continue };
    let init = match init {
      InitState::Initial(bytes) => bytes.clone(),
      InitState::Tentative => vec![0; entry.ty.size() as usize],
      // declared extern and never defined here; nothing to emit
      InitState::NoInit => continue,
    };
    let scalar = if entry.ty.is_array() { None } else { entry.ty.int_ty() };
    out.top.push(TopLevel::StaticVar(StaticVar { name, global: *global, scalar, init }));
  }

  for &decl in prog.decls {
    let DeclKind::Fn(f) = decl.kind else { continue };
    let Some(body) = f.body else { continue };
    let Attrs::Fn { global, .. } = &table.get(f.name).attrs else {
      unreachable!("function without function attributes")
    };
    let mut b = Builder {
      names: &mut *names,
      table,
      func: f.name,
      str_base,
      instrs: Vec::new(),
      arrays: Vec::new(),
      strings: &mut strings,
    };
    let StmtKind::Compound(items) = body.kind else { unreachable!("body is a block") };
    b.block_items(items);
    // a function that runs off its end returns a deterministic zero
    b.emit(Instr::Return(Some(Val::Const(0))));
    let func = Function {
      name: f.name,
      global: *global,
      params: f.params.iter().map(|p| p.name.expect("definition parameters are named")).collect(),
      arrays: b.arrays,
      body: b.instrs,
    };
    debug!("lowered `{}`: {} instructions", names.resolve(f.name), func.body.len());
    out.top.push(TopLevel::Fn(func));
  }

  // string literals referenced by the lowered bodies
  out.top.extend(strings.into_iter().map(TopLevel::StaticVar));
  out
}

/// Where an assignable expression lives: a named slot, or a computed
/// address with the width of its pointee.
enum Place {
  Var(Symbol),
  Mem(Val, IntTy),
}

struct Builder<'c, 'a> {
  names: &'c mut Interner,
  table: &'c SymbolTable<'a>,
  func: Symbol,
  str_base: Symbol,
  instrs: Vec<Instr>,
  arrays: Vec<(Symbol, u64)>,
  strings: &'c mut Vec<StaticVar>,
}

impl<'a> Builder<'_, 'a> {
  fn emit(&mut self, i: Instr) { self.instrs.push(i) }

  fn fresh(&mut self) -> Symbol { self.names.fresh_tmp() }

  fn label(&mut self, kind: &str) -> Symbol { self.names.fresh_label(self.func, kind) }

  /// Derive the jump target `base.suffix` from a construct's label.
  fn derived(&mut self, base: Symbol, suffix: &str) -> Symbol {
    let name = format!("{}.{suffix}", self.names.resolve(base));
    self.names.intern(&name)
  }

  fn int_ty(ty: Ty<'_>) -> IntTy {
    ty.int_ty().expect("scalar value type")
  }

  /// Compare a scalar against zero and jump to `target` if it is zero.
  fn jump_if_zero(&mut self, v: Val, ty: Ty<'_>, target: Symbol) {
    self.emit(Instr::Cmp { lhs: v, rhs: Val::Const(0), ty: Self::int_ty(ty) });
    self.emit(Instr::JumpIf { cond: Cond::Eq, target });
  }

  // declarations

  fn local_decl(&mut self, d: DeclP<'a>) {
    let DeclKind::Var(v) = d.kind else { return };
    match self.table.get(v.name).attrs {
      // static and extern locals are data, not frame slots
      Attrs::Static { .. } => {}
      Attrs::Fn { .. } => unreachable!("variable with function attributes"),
      Attrs::Local => {
        if let TypeKind::Array(..) = *v.ty {
          self.arrays.push((v.name, v.ty.size()));
          if let Some(init) = v.init {
            self.array_init(v.name, init, v.ty, 0);
          }
        } else if let Some(init) = v.init {
          let InitKind::Single(e) = init.kind else { unreachable!("scalar initializer") };
          let val = self.expr(e);
          self.emit(Instr::Copy { dst: v.name, src: val });
        }
      }
    }
  }

  /// A local compound (or string) initializer: a run of `copy_to_offset`
  /// into the array's byte storage.
  fn array_init(&mut self, base: Symbol, init: InitP<'a>, ty: Ty<'a>, offset: u64) {
    match init.kind {
      InitKind::Single(e) => {
        if let ExprKind::Str(s) = e.kind {
          let TypeKind::Array(_, n) = *ty else { unreachable!("string initializes an array") };
          for i in 0..n as u64 {
            let byte = s.get(i as usize).copied().unwrap_or(0);
            self.emit(Instr::CopyToOffset {
              base, src: Val::Const(i64::from(byte as i8)), offset: offset + i, ty: IntTy::I8,
            });
          }
          return
        }
        let val = self.expr(e);
        self.emit(Instr::CopyToOffset { base, src: val, offset, ty: Self::int_ty(ty) });
      }
      InitKind::Compound(items) => {
        let TypeKind::Array(elem, _) = *ty else { unreachable!("compound initializes an array") };
        let stride = elem.size();
        for (i, &item) in items.iter().enumerate() {
          self.array_init(base, item, elem, offset + i as u64 * stride);
        }
      }
    }
  }

  // statements

  fn block_items(&mut self, items: &'a [BlockItem<'a>]) {
    for &item in items {
      match item {
        BlockItem::Stmt(s) => self.stmt(s),
        BlockItem::Decl(d) => self.local_decl(d),
      }
    }
  }

  fn stmt(&mut self, s: StmtP<'a>) {
    match s.kind {
      StmtKind::Return(e) => {
        let v = e.map(|e| self.expr(e));
        self.emit(Instr::Return(v));
      }
      StmtKind::Expr(e) => { self.expr(e); }
      StmtKind::If { cond, then, els } => {
        let v = self.expr(cond);
        match els {
          None => {
            let end = self.label("if_end");
            self.jump_if_zero(v, cond.ty(), end);
            self.stmt(then);
            self.emit(Instr::Label(end));
          }
          Some(els) => {
            let else_l = self.label("if_else");
            let end = self.label("if_end");
            self.jump_if_zero(v, cond.ty(), else_l);
            self.stmt(then);
            self.emit(Instr::Jump(end));
            self.emit(Instr::Label(else_l));
            self.stmt(els);
            self.emit(Instr::Label(end));
          }
        }
      }
      StmtKind::Labeled { label, body, .. } => {
        self.emit(Instr::Label(label.expect("labels resolved")));
        self.stmt(body);
      }
      StmtKind::Goto { label, .. } => {
        self.emit(Instr::Jump(label.expect("labels resolved")));
      }
      StmtKind::Compound(items) => self.block_items(items),
      StmtKind::Break { label } => {
        let target = self.derived(label.expect("labels resolved"), "break");
        self.emit(Instr::Jump(target));
      }
      StmtKind::Continue { label } => {
        let target = self.derived(label.expect("labels resolved"), "continue");
        self.emit(Instr::Jump(target));
      }
      StmtKind::While { cond, body, label } => {
        let label = label.expect("labels resolved");
        let continue_l = self.derived(label, "continue");
        let break_l = self.derived(label, "break");
        self.emit(Instr::Label(continue_l));
        let v = self.expr(cond);
        self.jump_if_zero(v, cond.ty(), break_l);
        self.stmt(body);
        self.emit(Instr::Jump(continue_l));
        self.emit(Instr::Label(break_l));
      }
      StmtKind::DoWhile { body, cond, label } => {
        let label = label.expect("labels resolved");
        let start = self.derived(label, "start");
        let continue_l = self.derived(label, "continue");
        let break_l = self.derived(label, "break");
        self.emit(Instr::Label(start));
        self.stmt(body);
        self.emit(Instr::Label(continue_l));
        let v = self.expr(cond);
        self.emit(Instr::Cmp { lhs: v, rhs: Val::Const(0), ty: Self::int_ty(cond.ty()) });
        self.emit(Instr::JumpIf { cond: Cond::Ne, target: start });
        self.emit(Instr::Label(break_l));
      }
      StmtKind::For { init, cond, step, body, label } => {
        let label = label.expect("labels resolved");
        let start = self.derived(label, "start");
        let continue_l = self.derived(label, "continue");
        let break_l = self.derived(label, "break");
        match init {
          ForInit::Decl(d) => self.local_decl(d),
          ForInit::Expr(e) => { e.map(|e| self.expr(e)); }
        }
        self.emit(Instr::Label(start));
        if let Some(cond) = cond {
          let v = self.expr(cond);
          self.jump_if_zero(v, cond.ty(), break_l);
        }
        self.stmt(body);
        self.emit(Instr::Label(continue_l));
        if let Some(step) = step {
          self.expr(step);
        }
        self.emit(Instr::Jump(start));
        self.emit(Instr::Label(break_l));
      }
      StmtKind::Switch { cond, body, label, cases } => {
        let label = label.expect("labels resolved");
        let break_l = self.derived(label, "break");
        let v = self.expr(cond);
        let ty = Self::int_ty(cond.ty());
        // the controlling expression lowers once, then a linear sequence
        // of compares dispatches to the collected case labels
        let mut default = None;
        for case in cases {
          match case.value {
            Some(value) => {
              self.emit(Instr::Cmp { lhs: v, rhs: Val::Const(value), ty });
              self.emit(Instr::JumpIf { cond: Cond::Eq, target: case.label });
            }
            None => default = Some(case.label),
          }
        }
        self.emit(Instr::Jump(default.unwrap_or(break_l)));
        self.stmt(body);
        self.emit(Instr::Label(break_l));
      }
      StmtKind::Case { body, label, .. } => {
        self.emit(Instr::Label(label.expect("labels resolved")));
        self.stmt(body);
      }
      StmtKind::Default { body, label } => {
        self.emit(Instr::Label(label.expect("labels resolved")));
        self.stmt(body);
      }
      StmtKind::Null => {}
    }
  }

  // expressions

  /// Lower an expression to a value operand.
  fn expr(&mut self, e: ExprP<'a>) -> Val {
    match e.kind {
      ExprKind::Lit(c) => Val::Const(c.bits() as i64),
      ExprKind::Var(v) => Val::Var(v),
      ExprKind::Str(_) => unreachable!("string outside an address or initializer context"),
      ExprKind::Assign { op: None, lhs, rhs } => {
        let place = self.place(lhs);
        let v = self.expr(rhs);
        self.store(&place, v);
        v
      }
      ExprKind::Assign { op: Some(op), lhs, rhs } => self.compound_assign(op, lhs, rhs),
      ExprKind::PostAssign { op, operand } => {
        let place = self.place(operand);
        let old = self.load(&place, operand.ty());
        // the yielded value must survive the update of the place
        let saved = self.fresh();
        self.emit(Instr::Copy { dst: saved, src: old });
        let (delta, ty) = match *operand.ty() {
          TypeKind::Ptr(to) => (to.size() as i64, IntTy::U64),
          ref t => (1, t.int_ty().expect("scalar operand")),
        };
        let op = match op { IncDec::Inc => BinOp::Add, IncDec::Dec => BinOp::Sub };
        let new = self.fresh();
        self.emit(Instr::Binary { op, dst: new, lhs: Val::Var(saved), rhs: Val::Const(delta), ty });
        self.store(&place, Val::Var(new));
        Val::Var(saved)
      }
      ExprKind::Unary { op, operand } => {
        let src = self.expr(operand);
        let dst = self.fresh();
        let (op, ty) = match op {
          ast::UnOp::Complement => (UnOp::Complement, Self::int_ty(e.ty())),
          ast::UnOp::Negate => (UnOp::Negate, Self::int_ty(e.ty())),
          ast::UnOp::Not => (UnOp::Not, Self::int_ty(operand.ty())),
        };
        self.emit(Instr::Unary { op, dst, src, ty });
        Val::Var(dst)
      }
      ExprKind::Binary { op, lhs, rhs } => self.binary(e, op, lhs, rhs),
      ExprKind::Conditional { cond, then, els } => {
        let else_l = self.label("cond_else");
        let end = self.label("cond_end");
        let dst = self.fresh();
        let c = self.expr(cond);
        self.jump_if_zero(c, cond.ty(), else_l);
        let tv = self.expr(then);
        self.emit(Instr::Copy { dst, src: tv });
        self.emit(Instr::Jump(end));
        self.emit(Instr::Label(else_l));
        let ev = self.expr(els);
        self.emit(Instr::Copy { dst, src: ev });
        self.emit(Instr::Label(end));
        Val::Var(dst)
      }
      ExprKind::Call { func, args } => {
        let args = args.iter().map(|&a| self.expr(a)).collect();
        let dst = self.fresh();
        self.emit(Instr::Call { func, args, dst });
        Val::Var(dst)
      }
      ExprKind::Cast { to, operand } => {
        let v = self.expr(operand);
        if *to == TypeKind::Void {
          return v
        }
        let from = Self::int_ty(operand.ty());
        let to = Self::int_ty(to);
        if from == to {
          return v
        }
        let dst = self.fresh();
        self.emit(Instr::Unary { op: UnOp::Convert, dst, src: v, ty: to });
        Val::Var(dst)
      }
      ExprKind::AddrOf(inner) => self.addr_of(inner),
      ExprKind::Deref(inner) => {
        let ptr = self.expr(inner);
        let dst = self.fresh();
        self.emit(Instr::Load { dst, ptr, ty: Self::int_ty(e.ty()) });
        Val::Var(dst)
      }
      ExprKind::Subscript { base, index } => {
        let addr = self.subscript_addr(base, index);
        let dst = self.fresh();
        self.emit(Instr::Load { dst, ptr: addr, ty: Self::int_ty(e.ty()) });
        Val::Var(dst)
      }
    }
  }

  /// The address of an lvalue, without loading from it.
  fn addr_of(&mut self, e: ExprP<'a>) -> Val {
    match e.kind {
      ExprKind::Var(v) => {
        let dst = self.fresh();
        self.emit(Instr::GetAddress { dst, src: v });
        Val::Var(dst)
      }
      ExprKind::Str(s) => {
        // the literal becomes an internal static with a terminator
        let name = self.names.fresh(self.str_base);
        let mut init = s.to_vec();
        init.push(0);
        self.strings.push(StaticVar { name, global: false, scalar: None, init });
        let dst = self.fresh();
        self.emit(Instr::GetAddress { dst, src: name });
        Val::Var(dst)
      }
      // &*p is p
      ExprKind::Deref(inner) => self.expr(inner),
      // &a[i] stops before the load
      ExprKind::Subscript { base, index } => self.subscript_addr(base, index),
      _ => unreachable!("address of a non-lvalue"),
    }
  }

  /// The element address `base + index * sizeof(elem)`. Pointer
  /// arithmetic is scaled here, at lowering time.
  fn subscript_addr(&mut self, base: ExprP<'a>, index: ExprP<'a>) -> Val {
    let elem = base.ty().referenced().expect("subscript base is a pointer");
    let b = self.expr(base);
    let i = self.expr(index);
    let scaled = self.fresh();
    self.emit(Instr::Binary {
      op: BinOp::Mul, dst: scaled, lhs: i, rhs: Val::Const(elem.size() as i64), ty: IntTy::I64,
    });
    let addr = self.fresh();
    self.emit(Instr::Binary {
      op: BinOp::Add, dst: addr, lhs: b, rhs: Val::Var(scaled), ty: IntTy::U64,
    });
    Val::Var(addr)
  }

  fn place(&mut self, e: ExprP<'a>) -> Place {
    match e.kind {
      ExprKind::Var(v) => Place::Var(v),
      ExprKind::Deref(inner) => {
        let ptr = self.expr(inner);
        Place::Mem(ptr, Self::int_ty(e.ty()))
      }
      ExprKind::Subscript { base, index } => {
        let addr = self.subscript_addr(base, index);
        Place::Mem(addr, Self::int_ty(e.ty()))
      }
      _ => unreachable!("assignment to a non-lvalue"),
    }
  }

  fn store(&mut self, place: &Place, v: Val) {
    match *place {
      Place::Var(dst) => self.emit(Instr::Copy { dst, src: v }),
      Place::Mem(ptr, ty) => self.emit(Instr::Store { ptr, src: v, ty }),
    }
  }

  fn load(&mut self, place: &Place, ty: Ty<'a>) -> Val {
    match *place {
      Place::Var(v) => Val::Var(v),
      Place::Mem(ptr, _) => {
        let dst = self.fresh();
        self.emit(Instr::Load { dst, ptr, ty: Self::int_ty(ty) });
        Val::Var(dst)
      }
    }
  }

  fn compound_assign(&mut self, op: ast::BinOp, lhs: ExprP<'a>, rhs: ExprP<'a>) -> Val {
    let place = self.place(lhs);
    let old = self.load(&place, lhs.ty());
    let rhs_v = self.expr(rhs);
    let lhs_ty = lhs.ty();
    let result = if let TypeKind::Ptr(to) = *lhs_ty {
      // p += n and p -= n scale by the referent size
      let scaled = self.fresh();
      self.emit(Instr::Binary {
        op: BinOp::Mul, dst: scaled, lhs: rhs_v,
        rhs: Val::Const(to.size() as i64), ty: IntTy::I64,
      });
      let dst = self.fresh();
      self.emit(Instr::Binary {
        op: tac_binop(op), dst, lhs: old, rhs: Val::Var(scaled), ty: IntTy::U64,
      });
      Val::Var(dst)
    } else {
      // the typechecker converted the right side to the operation type;
      // widen the left side to match, operate, and narrow back
      let op_ty = Self::int_ty(rhs.ty());
      let lhs_ity = Self::int_ty(lhs_ty);
      let widened = self.convert(old, lhs_ity, op_ty);
      let dst = self.fresh();
      self.emit(Instr::Binary { op: tac_binop(op), dst, lhs: widened, rhs: rhs_v, ty: op_ty });
      self.convert(Val::Var(dst), op_ty, lhs_ity)
    };
    self.store(&place, result);
    result
  }

  fn convert(&mut self, v: Val, from: IntTy, to: IntTy) -> Val {
    if from == to { return v }
    let dst = self.fresh();
    self.emit(Instr::Unary { op: UnOp::Convert, dst, src: v, ty: to });
    Val::Var(dst)
  }

  fn binary(&mut self, e: ExprP<'a>, op: ast::BinOp, lhs: ExprP<'a>, rhs: ExprP<'a>) -> Val {
    use ast::BinOp::*;
    match op {
      And | Or => {
        // short-circuit: compare each operand against zero in turn
        let (short_cond, short_val, other_val) = if op == And {
          (Cond::Eq, 0, 1)
        } else {
          (Cond::Ne, 1, 0)
        };
        let short_l = self.label("sc_short");
        let end = self.label("sc_end");
        let dst = self.fresh();
        let l = self.expr(lhs);
        self.emit(Instr::Cmp { lhs: l, rhs: Val::Const(0), ty: Self::int_ty(lhs.ty()) });
        self.emit(Instr::JumpIf { cond: short_cond, target: short_l });
        let r = self.expr(rhs);
        self.emit(Instr::Cmp { lhs: r, rhs: Val::Const(0), ty: Self::int_ty(rhs.ty()) });
        self.emit(Instr::JumpIf { cond: short_cond, target: short_l });
        self.emit(Instr::Copy { dst, src: Val::Const(other_val) });
        self.emit(Instr::Jump(end));
        self.emit(Instr::Label(short_l));
        self.emit(Instr::Copy { dst, src: Val::Const(short_val) });
        self.emit(Instr::Label(end));
        Val::Var(dst)
      }
      Eq | Ne | Lt | Le | Gt | Ge => {
        let l = self.expr(lhs);
        let r = self.expr(rhs);
        let true_l = self.label("cmp_true");
        let end = self.label("cmp_end");
        let dst = self.fresh();
        // both operands were converted to a common type already
        self.emit(Instr::Cmp { lhs: l, rhs: r, ty: Self::int_ty(lhs.ty()) });
        self.emit(Instr::JumpIf { cond: tac_cond(op), target: true_l });
        self.emit(Instr::Copy { dst, src: Val::Const(0) });
        self.emit(Instr::Jump(end));
        self.emit(Instr::Label(true_l));
        self.emit(Instr::Copy { dst, src: Val::Const(1) });
        self.emit(Instr::Label(end));
        Val::Var(dst)
      }
      Add | Sub if lhs.ty().is_pointer() => {
        // the typechecker put the pointer on the left
        let to = lhs.ty().referenced().expect("pointer operand");
        let l = self.expr(lhs);
        let r = self.expr(rhs);
        let scaled = self.fresh();
        self.emit(Instr::Binary {
          op: BinOp::Mul, dst: scaled, lhs: r, rhs: Val::Const(to.size() as i64), ty: IntTy::I64,
        });
        let dst = self.fresh();
        self.emit(Instr::Binary {
          op: tac_binop(op), dst, lhs: l, rhs: Val::Var(scaled), ty: IntTy::U64,
        });
        Val::Var(dst)
      }
      _ => {
        let l = self.expr(lhs);
        let r = self.expr(rhs);
        let dst = self.fresh();
        self.emit(Instr::Binary { op: tac_binop(op), dst, lhs: l, rhs: r,
          ty: Self::int_ty(e.ty()) });
        Val::Var(dst)
      }
    }
  }
}

fn tac_binop(op: ast::BinOp) -> BinOp {
  match op {
    ast::BinOp::Add => BinOp::Add,
    ast::BinOp::Sub => BinOp::Sub,
    ast::BinOp::Mul => BinOp::Mul,
    ast::BinOp::Div => BinOp::Div,
    ast::BinOp::Rem => BinOp::Rem,
    ast::BinOp::BitAnd => BinOp::BitAnd,
    ast::BinOp::BitOr => BinOp::BitOr,
    ast::BinOp::BitXor => BinOp::BitXor,
    ast::BinOp::Shl => BinOp::Shl,
    ast::BinOp::Shr => BinOp::Shr,
    _ => unreachable!("not a value-producing binary operator"),
  }
}

fn tac_cond(op: ast::BinOp) -> Cond {
  match op {
    ast::BinOp::Eq => Cond::Eq,
    ast::BinOp::Ne => Cond::Ne,
    ast::BinOp::Lt => Cond::Lt,
    ast::BinOp::Le => Cond::Le,
    ast::BinOp::Gt => Cond::Gt,
    ast::BinOp::Ge => Cond::Ge,
    _ => unreachable!("not a comparison"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bumpalo::Bump;
  use hashbrown::HashSet;
  use crate::source::SourceMap;
  use crate::{infer, labels, lexer, parser, resolve};

  fn lower(text: &str) -> (tac::Program, Interner) {
    let map = SourceMap::new("t.c", text);
    let mut names = Interner::new();
    let tokens = lexer::tokenize(&map, &mut names).expect("lex error");
    let arena = Bump::new();
    let prog = parser::parse(&arena, &map, &tokens).expect("parse error");
    let prog = resolve::run(&arena, &map, &mut names, &prog).expect("resolve error");
    let prog = labels::run(&arena, &map, &mut names, &prog).expect("label error");
    let (prog, table) = infer::run(&arena, &map, &mut names, &prog).expect("type error");
    let tac = run(&mut names, &table, &prog);
    (tac, names)
  }

  fn first_fn(prog: &tac::Program) -> &Function {
    prog.top.iter().find_map(|t| match t {
      TopLevel::Fn(f) => Some(f),
      TopLevel::StaticVar(_) => None,
    }).expect("a lowered function")
  }

  #[test]
  fn every_jump_target_is_a_unique_label() {
    let src = "
      int main(void) {
        int s = 0;
        for (int i = 0; i < 10; i = i + 1) {
          if (i == 3) continue;
          switch (i) { case 4: s += 1; break; default: s += 2; }
          while (s > 100) { s -= 1; break; }
          if (s && i || s < i) goto out;
        }
        out: return s;
      }";
    let (prog, _) = lower(src);
    for top in &prog.top {
      let TopLevel::Fn(f) = top else { continue };
      let mut labels = HashSet::new();
      for inst in &f.body {
        if let Instr::Label(l) = inst {
          assert!(labels.insert(*l), "label emitted twice");
        }
      }
      for inst in &f.body {
        match inst {
          Instr::Jump(t) | Instr::JumpIf { target: t, .. } =>
            assert!(labels.contains(t), "jump to a missing label"),
          _ => {}
        }
      }
    }
  }

  #[test]
  fn pointer_arithmetic_is_scaled() {
    let (prog, _) = lower("int main(void) { long a[4]; long *p = a; return (int)*(p + 2); }");
    let f = first_fn(&prog);
    let scaled = f.body.iter().any(|i| matches!(i,
      Instr::Binary { op: BinOp::Mul, rhs: Val::Const(8), .. }));
    assert!(scaled, "expected an 8-byte scale for long pointers");
  }

  #[test]
  fn statics_are_emitted_in_order() {
    let src = "int a = 1; static int b; int c[2] = {1, 2}; int main(void) { return a; }";
    let (prog, names) = lower(src);
    let statics: Vec<_> = prog.top.iter().filter_map(|t| match t {
      TopLevel::StaticVar(v) => Some(v),
      TopLevel::Fn(_) => None,
    }).collect();
    assert_eq!(statics.len(), 3);
    assert_eq!(names.resolve(statics[0].name), "a");
    assert!(statics[0].global && statics[0].scalar.is_some());
    assert_eq!(statics[0].init, vec![1, 0, 0, 0]);
    assert_eq!(names.resolve(statics[1].name), "b");
    assert!(!statics[1].global, "static linkage is internal");
    assert_eq!(statics[1].init, vec![0; 4], "tentative definitions are zero-filled");
    assert_eq!(names.resolve(statics[2].name), "c");
    assert!(statics[2].scalar.is_none(), "arrays stay byte-addressed");
    assert_eq!(statics[2].init, vec![1, 0, 0, 0, 2, 0, 0, 0]);
  }

  #[test]
  fn string_literals_become_internal_statics() {
    let (prog, _) = lower("int main(void) { char *s = \"hi\"; return *s; }");
    let lit = prog.top.iter().find_map(|t| match t {
      TopLevel::StaticVar(v) if !v.global => Some(v),
      _ => None,
    }).expect("a string static");
    assert_eq!(lit.init, vec![b'h', b'i', 0], "terminator included");
  }

  #[test]
  fn local_arrays_get_frame_storage() {
    let (prog, _) = lower("int main(void) { int a[3] = {7}; return a[0]; }");
    let f = first_fn(&prog);
    assert_eq!(f.arrays.len(), 1);
    assert_eq!(f.arrays[0].1, 12);
    // three copy_to_offset writes: the value and two zero pads
    let writes: Vec<_> = f.body.iter().filter_map(|i| match i {
      Instr::CopyToOffset { src, offset, .. } => Some((*src, *offset)),
      _ => None,
    }).collect();
    assert_eq!(writes, vec![
      (Val::Const(7), 0), (Val::Const(0), 4), (Val::Const(0), 8),
    ]);
  }

  #[test]
  fn functions_end_with_a_return() {
    let (prog, _) = lower("int f(void) { return 3; } int main(void) { return f(); }");
    for top in &prog.top {
      let TopLevel::Fn(f) = top else { continue };
      assert!(matches!(f.body.last(), Some(Instr::Return(_))));
    }
  }
}
