//! Three-address code.
//!
//! The output of lowering: a flat list of top-level items, each a function
//! with a linear instruction stream or a static variable with its initial
//! bytes. TAC owns all of its storage (names are interned [`Symbol`]s, no
//! arena references), so it outlives the AST arena.

use std::fmt;

use hashbrown::HashMap;

use crate::symbol::{Interner, Symbol};
use crate::types::IntTy;

#[derive(Debug, Default)]
pub struct Program {
  pub top: Vec<TopLevel>,
}

#[derive(Debug)]
pub enum TopLevel {
  Fn(Function),
  StaticVar(StaticVar),
}

#[derive(Debug)]
pub struct Function {
  pub name: Symbol,
  /// False for internal (`static`) linkage.
  pub global: bool,
  pub params: Vec<Symbol>,
  /// Frame locals backed by byte storage rather than a scalar slot:
  /// arrays, with their size in bytes. Everything else in the frame is a
  /// 64-bit slot.
  pub arrays: Vec<(Symbol, u64)>,
  pub body: Vec<Instr>,
}

impl Function {
  /// Map each label to its instruction index. Every jump target appears
  /// exactly once as a [`Instr::Label`]; a duplicate is a lowering bug.
  #[must_use] pub fn label_index(&self) -> HashMap<Symbol, usize> {
    let mut map = HashMap::new();
    for (i, inst) in self.body.iter().enumerate() {
      if let Instr::Label(l) = *inst {
        assert!(map.insert(l, i).is_none(), "duplicate label in function body");
      }
    }
    map
  }
}

#[derive(Debug)]
pub struct StaticVar {
  pub name: Symbol,
  pub global: bool,
  /// `Some` for scalar objects, carrying their machine shape so an
  /// evaluator can decode `init` into a slot value; `None` for arrays,
  /// which stay byte-addressed.
  pub scalar: Option<IntTy>,
  /// The full object image; tentative definitions are all zero.
  pub init: Vec<u8>,
}

/// An operand: a 64-bit constant (narrower constants are sign-extended at
/// lowering time) or a named variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Val {
  Const(i64),
  Var(Symbol),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
  /// `~`
  Complement,
  /// `-`
  Negate,
  /// `!`, producing 0 or 1.
  Not,
  /// Width conversion: normalize the source pattern to the instruction's
  /// [`IntTy`]. Lowered from cast expressions.
  Convert,
}

/// Arithmetic and bitwise operators. Comparisons are not values at this
/// level; they lower to a [`Instr::Cmp`]/[`Instr::JumpIf`] pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
  Add, Sub, Mul, Div, Rem,
  BitAnd, BitOr, BitXor, Shl, Shr,
}

/// Condition codes for [`Instr::JumpIf`], consulting the preceding
/// [`Instr::Cmp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond { Eq, Ne, Lt, Le, Gt, Ge }

#[derive(Clone, Debug)]
pub enum Instr {
  Return(Option<Val>),
  Copy { dst: Symbol, src: Val },
  Unary { op: UnOp, dst: Symbol, src: Val, ty: IntTy },
  Binary { op: BinOp, dst: Symbol, lhs: Val, rhs: Val, ty: IntTy },
  /// Compare and record; the next instruction, if a [`Instr::JumpIf`],
  /// consumes the result.
  Cmp { lhs: Val, rhs: Val, ty: IntTy },
  JumpIf { cond: Cond, target: Symbol },
  Jump(Symbol),
  Label(Symbol),
  Call { func: Symbol, args: Vec<Val>, dst: Symbol },
  /// `dst = &src`.
  GetAddress { dst: Symbol, src: Symbol },
  /// `dst = *(ty*)ptr`, extended to 64 bits per `ty`.
  Load { dst: Symbol, ptr: Val, ty: IntTy },
  /// `*(ty*)ptr = src`, truncated per `ty`.
  Store { ptr: Val, src: Val, ty: IntTy },
  /// Write `src` into `base`'s byte storage at `offset`.
  CopyToOffset { base: Symbol, src: Val, offset: u64, ty: IntTy },
}

// Display plumbing: TAC names are symbols, so rendering borrows the
// interner that produced them.

impl Program {
  #[must_use] pub fn display<'x>(&'x self, names: &'x Interner) -> impl fmt::Display + 'x {
    DisplayProgram { prog: self, names }
  }
}

struct DisplayProgram<'x> {
  prog: &'x Program,
  names: &'x Interner,
}

struct DisplayVal<'a, 'b>(&'a Val, &'b Interner);

impl fmt::Display for DisplayVal<'_, '_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self.0 {
      Val::Const(n) => write!(f, "{n}"),
      Val::Var(v) => f.write_str(self.1.resolve(v)),
    }
  }
}

impl fmt::Display for DisplayProgram<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names = self.names;
    fn val<'a, 'b>(v: &'a Val, names: &'b Interner) -> DisplayVal<'a, 'b> { DisplayVal(v, names) }
    for item in &self.prog.top {
      match item {
        TopLevel::StaticVar(v) => {
          writeln!(f, "static {}{} = {:?}", self.names.resolve(v.name),
            if v.global { "" } else { " (internal)" }, v.init)?;
        }
        TopLevel::Fn(func) => {
          write!(f, "fn {}(", names.resolve(func.name))?;
          for (i, p) in func.params.iter().enumerate() {
            if i > 0 { write!(f, ", ")? }
            f.write_str(names.resolve(*p))?;
          }
          writeln!(f, "){} {{", if func.global { "" } else { " (internal)" })?;
          for inst in &func.body {
            match inst {
              Instr::Label(l) => writeln!(f, "{}:", names.resolve(*l))?,
              Instr::Return(None) => writeln!(f, "  ret")?,
              Instr::Return(Some(v)) => writeln!(f, "  ret {}", val(v, names))?,
              Instr::Copy { dst, src } =>
                writeln!(f, "  {} = {}", names.resolve(*dst), val(src, names))?,
              Instr::Unary { op, dst, src, ty } => {
                let op = match op {
                  UnOp::Complement => "not", UnOp::Negate => "neg",
                  UnOp::Not => "lnot", UnOp::Convert => "conv",
                };
                writeln!(f, "  {} = {op}.{ty} {}", names.resolve(*dst), val(src, names))?
              }
              Instr::Binary { op, dst, lhs, rhs, ty } => {
                let op = match op {
                  BinOp::Add => "add", BinOp::Sub => "sub", BinOp::Mul => "mul",
                  BinOp::Div => "div", BinOp::Rem => "rem", BinOp::BitAnd => "and",
                  BinOp::BitOr => "or", BinOp::BitXor => "xor",
                  BinOp::Shl => "shl", BinOp::Shr => "shr",
                };
                writeln!(f, "  {} = {op}.{ty} {}, {}",
                  names.resolve(*dst), val(lhs, names), val(rhs, names))?
              }
              Instr::Cmp { lhs, rhs, ty } =>
                writeln!(f, "  cmp.{ty} {}, {}", val(lhs, names), val(rhs, names))?,
              Instr::JumpIf { cond, target } => {
                let cc = match cond {
                  Cond::Eq => "eq", Cond::Ne => "ne", Cond::Lt => "lt",
                  Cond::Le => "le", Cond::Gt => "gt", Cond::Ge => "ge",
                };
                writeln!(f, "  j{cc} {}", names.resolve(*target))?
              }
              Instr::Jump(l) => writeln!(f, "  jmp {}", names.resolve(*l))?,
              Instr::Call { func, args, dst } => {
                write!(f, "  {} = call {}(", names.resolve(*dst), names.resolve(*func))?;
                for (i, a) in args.iter().enumerate() {
                  if i > 0 { write!(f, ", ")? }
                  write!(f, "{}", val(a, names))?;
                }
                writeln!(f, ")")?
              }
              Instr::GetAddress { dst, src } =>
                writeln!(f, "  {} = &{}", names.resolve(*dst), names.resolve(*src))?,
              Instr::Load { dst, ptr, ty } =>
                writeln!(f, "  {} = load.{ty} [{}]", names.resolve(*dst), val(ptr, names))?,
              Instr::Store { ptr, src, ty } =>
                writeln!(f, "  store.{ty} [{}] = {}", val(ptr, names), val(src, names))?,
              Instr::CopyToOffset { base, src, offset, ty } =>
                writeln!(f, "  {}+{offset} = {} ({ty})", names.resolve(*base), val(src, names))?,
            }
          }
          writeln!(f, "}}")?;
        }
      }
    }
    Ok(())
  }
}
