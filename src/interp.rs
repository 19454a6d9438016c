//! The reference TAC evaluator.
//!
//! Executes a lowered program deterministically and returns `main`'s
//! result projected to a signed 32-bit integer. Used to validate lowering;
//! it is not a performance-oriented interpreter.
//!
//! The machine model: every named scalar (global, local, or temporary) is
//! a 64-bit slot; arrays are byte buffers. Each object is assigned a
//! disjoint range of a flat virtual address space, so `get_address`,
//! pointer arithmetic, `load` and `store` all operate on plain 64-bit
//! addresses. Slots are addressable as 8 little-endian bytes, which keeps
//! narrow stores through casted pointers well defined. Programs whose C
//! source had undefined behavior (wild pointers, division by zero) panic
//! with a message rather than returning garbage.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use hashbrown::HashMap;
use itertools::Itertools;
use log::trace;

use crate::symbol::Symbol;
use crate::types::IntTy;
use crate::types::tac::{BinOp, Cond, Function, Instr, Program, TopLevel, UnOp, Val};

/// Run `main`, returning its result as a 32-bit signed integer, or `None`
/// when the program has no function named `main`.
pub fn run(prog: &Program, main: Symbol) -> Option<i32> {
  let mut m = Machine::load(prog);
  let f = *m.funcs.get(&main)?;
  let ret = m.call(f, &[]);
  Some(ret as i32)
}

/// One storage object: a scalar slot or an array's bytes.
enum Object {
  Slot(i64),
  Bytes(Vec<u8>),
}

/// Flat storage with a virtual address per object. Objects are never
/// deallocated; a frame that returns simply drops its name bindings, so
/// dangling pointers read stale but deterministic data.
#[derive(Default)]
struct Memory {
  objects: Vec<Object>,
  /// Base address of each object, parallel to `objects`.
  addrs: Vec<u64>,
  /// start address → (object index, size in bytes)
  ranges: BTreeMap<u64, (usize, u64)>,
  next_addr: u64,
}

const BASE_ADDR: u64 = 0x1000;

impl Memory {
  fn alloc(&mut self, obj: Object) -> usize {
    let size = match &obj {
      Object::Slot(_) => 8,
      Object::Bytes(b) => b.len().max(1) as u64,
    };
    if self.next_addr == 0 { self.next_addr = BASE_ADDR }
    let start = self.next_addr;
    self.next_addr += (size + 7) & !7;
    let id = self.objects.len();
    self.objects.push(obj);
    self.addrs.push(start);
    self.ranges.insert(start, (id, size));
    id
  }

  fn addr_of(&self, id: usize) -> u64 { self.addrs[id] }

  fn resolve(&self, addr: u64) -> (usize, u64) {
    let (&start, &(id, size)) = self.ranges.range(..=addr).next_back()
      .expect("pointer outside any object");
    let off = addr - start;
    assert!(off < size, "pointer outside any object");
    (id, off)
  }

  fn load(&self, addr: u64, ty: IntTy) -> i64 {
    let (id, off) = self.resolve(addr);
    let mut raw = [0u8; 8];
    match &self.objects[id] {
      Object::Slot(v) => {
        let bytes = v.to_le_bytes();
        raw[..ty.bytes as usize].copy_from_slice(&bytes[off as usize..][..ty.bytes as usize]);
      }
      Object::Bytes(b) => {
        raw[..ty.bytes as usize].copy_from_slice(&b[off as usize..][..ty.bytes as usize]);
      }
    }
    ty.normalize(u64::from_le_bytes(raw)) as i64
  }

  fn store(&mut self, addr: u64, ty: IntTy, v: i64) {
    let (id, off) = self.resolve(addr);
    let src = v.to_le_bytes();
    match &mut self.objects[id] {
      Object::Slot(slot) => {
        let mut bytes = slot.to_le_bytes();
        bytes[off as usize..][..ty.bytes as usize].copy_from_slice(&src[..ty.bytes as usize]);
        *slot = i64::from_le_bytes(bytes);
      }
      Object::Bytes(b) => {
        b[off as usize..][..ty.bytes as usize].copy_from_slice(&src[..ty.bytes as usize]);
      }
    }
  }
}

/// A function activation: unique names to object ids.
#[derive(Default)]
struct Frame {
  vars: HashMap<Symbol, usize>,
}

struct Machine<'p> {
  funcs: HashMap<Symbol, &'p Function>,
  globals: HashMap<Symbol, usize>,
  memory: Memory,
}

impl<'p> Machine<'p> {
  fn load(prog: &'p Program) -> Self {
    let mut m = Machine {
      funcs: HashMap::new(),
      globals: HashMap::new(),
      memory: Memory::default(),
    };
    for top in &prog.top {
      match top {
        TopLevel::Fn(f) => { m.funcs.insert(f.name, f); }
        TopLevel::StaticVar(v) => {
          let obj = match v.scalar {
            Some(ty) => {
              let mut raw = [0u8; 8];
              let n = v.init.len().min(8);
              raw[..n].copy_from_slice(&v.init[..n]);
              Object::Slot(ty.normalize(u64::from_le_bytes(raw)) as i64)
            }
            None => Object::Bytes(v.init.clone()),
          };
          let id = m.memory.alloc(obj);
          m.globals.insert(v.name, id);
        }
      }
    }
    m
  }

  /// The storage object a name refers to in `frame`, allocating a fresh
  /// local slot on first use.
  fn object(&mut self, frame: &mut Frame, name: Symbol) -> usize {
    if let Some(&id) = frame.vars.get(&name) { return id }
    if let Some(&id) = self.globals.get(&name) { return id }
    let id = self.memory.alloc(Object::Slot(0));
    frame.vars.insert(name, id);
    id
  }

  fn read(&mut self, frame: &mut Frame, v: Val) -> i64 {
    match v {
      Val::Const(n) => n,
      Val::Var(name) => {
        let id = self.object(frame, name);
        match self.memory.objects[id] {
          Object::Slot(v) => v,
          Object::Bytes(_) => panic!("array read as a scalar"),
        }
      }
    }
  }

  fn write(&mut self, frame: &mut Frame, name: Symbol, v: i64) {
    let id = self.object(frame, name);
    match &mut self.memory.objects[id] {
      Object::Slot(slot) => *slot = v,
      Object::Bytes(_) => panic!("array written as a scalar"),
    }
  }

  fn call(&mut self, f: &'p Function, args: &[i64]) -> i64 {
    let mut frame = Frame::default();
    for (&p, &a) in f.params.iter().zip_eq(args) {
      let id = self.memory.alloc(Object::Slot(a));
      frame.vars.insert(p, id);
    }
    for &(name, size) in &f.arrays {
      let id = self.memory.alloc(Object::Bytes(vec![0; size as usize]));
      frame.vars.insert(name, id);
    }
    let labels = f.label_index();
    let mut cmp_flag = Ordering::Equal;
    let mut pc = 0;
    while let Some(inst) = f.body.get(pc) {
      trace!("pc {pc}: {inst:?}");
      pc += 1;
      match inst {
        Instr::Return(v) => {
          return v.map_or(0, |v| self.read(&mut frame, v))
        }
        Instr::Copy { dst, src } => {
          let v = self.read(&mut frame, *src);
          self.write(&mut frame, *dst, v);
        }
        Instr::Unary { op, dst, src, ty } => {
          let v = self.read(&mut frame, *src) as u64;
          let r = match op {
            UnOp::Complement => ty.normalize(!v),
            UnOp::Negate => ty.normalize(v.wrapping_neg()),
            UnOp::Not => u64::from(v == 0),
            UnOp::Convert => ty.normalize(v),
          };
          self.write(&mut frame, *dst, r as i64);
        }
        Instr::Binary { op, dst, lhs, rhs, ty } => {
          let a = ty.normalize(self.read(&mut frame, *lhs) as u64);
          let b = ty.normalize(self.read(&mut frame, *rhs) as u64);
          let r = binary(*op, a, b, *ty);
          self.write(&mut frame, *dst, ty.normalize(r) as i64);
        }
        Instr::Cmp { lhs, rhs, ty } => {
          let a = ty.normalize(self.read(&mut frame, *lhs) as u64);
          let b = ty.normalize(self.read(&mut frame, *rhs) as u64);
          cmp_flag = if ty.signed { (a as i64).cmp(&(b as i64)) } else { a.cmp(&b) };
        }
        Instr::JumpIf { cond, target } => {
          let taken = match cond {
            Cond::Eq => cmp_flag == Ordering::Equal,
            Cond::Ne => cmp_flag != Ordering::Equal,
            Cond::Lt => cmp_flag == Ordering::Less,
            Cond::Le => cmp_flag != Ordering::Greater,
            Cond::Gt => cmp_flag == Ordering::Greater,
            Cond::Ge => cmp_flag != Ordering::Less,
          };
          if taken {
            pc = labels[target];
          }
        }
        Instr::Jump(target) => pc = labels[target],
        Instr::Label(_) => {}
        Instr::Call { func, args, dst } => {
          let callee = *self.funcs.get(func).expect("call to an undefined function");
          let vals: Vec<i64> = args.iter().map(|&a| self.read(&mut frame, a)).collect();
          let r = self.call(callee, &vals);
          self.write(&mut frame, *dst, r);
        }
        Instr::GetAddress { dst, src } => {
          let id = self.object(&mut frame, *src);
          let addr = self.memory.addr_of(id);
          self.write(&mut frame, *dst, addr as i64);
        }
        Instr::Load { dst, ptr, ty } => {
          let addr = self.read(&mut frame, *ptr) as u64;
          let v = self.memory.load(addr, *ty);
          self.write(&mut frame, *dst, v);
        }
        Instr::Store { ptr, src, ty } => {
          let addr = self.read(&mut frame, *ptr) as u64;
          let v = self.read(&mut frame, *src);
          self.memory.store(addr, *ty, v);
        }
        Instr::CopyToOffset { base, src, offset, ty } => {
          let v = self.read(&mut frame, *src);
          let id = self.object(&mut frame, *base);
          let addr = self.memory.addr_of(id) + offset;
          self.memory.store(addr, *ty, v);
        }
      }
    }
    // running off the end of a body; lowering always appends a return
    0
  }
}

fn binary(op: BinOp, a: u64, b: u64, ty: IntTy) -> u64 {
  match op {
    BinOp::Add => a.wrapping_add(b),
    BinOp::Sub => a.wrapping_sub(b),
    BinOp::Mul => a.wrapping_mul(b),
    BinOp::Div | BinOp::Rem if b == 0 => panic!("division by zero"),
    BinOp::Div => if ty.signed { (a as i64).wrapping_div(b as i64) as u64 } else { a / b },
    BinOp::Rem => if ty.signed { (a as i64).wrapping_rem(b as i64) as u64 } else { a % b },
    BinOp::BitAnd => a & b,
    BinOp::BitOr => a | b,
    BinOp::BitXor => a ^ b,
    BinOp::Shl => a.wrapping_shl(b as u32 & 63),
    BinOp::Shr => if ty.signed {
      (a as i64).wrapping_shr(b as u32 & 63) as u64
    } else {
      a.wrapping_shr(b as u32 & 63)
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::Interner;
  use crate::types::tac::StaticVar;

  fn sym(names: &mut Interner, s: &str) -> Symbol { names.intern(s) }

  #[test]
  fn straight_line_arithmetic() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let t = sym(&mut names, "tmp.0");
    let prog = Program { top: vec![TopLevel::Fn(Function {
      name: main, global: true, params: vec![], arrays: vec![],
      body: vec![
        Instr::Binary { op: BinOp::Mul, dst: t, lhs: Val::Const(6), rhs: Val::Const(7),
          ty: IntTy::I32 },
        Instr::Return(Some(Val::Var(t))),
      ],
    })] };
    assert_eq!(run(&prog, main), Some(42));
  }

  #[test]
  fn int_arithmetic_wraps_at_32_bits() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let t = sym(&mut names, "tmp.0");
    let prog = Program { top: vec![TopLevel::Fn(Function {
      name: main, global: true, params: vec![], arrays: vec![],
      body: vec![
        Instr::Binary { op: BinOp::Add, dst: t, lhs: Val::Const(i32::MAX as i64),
          rhs: Val::Const(1), ty: IntTy::I32 },
        Instr::Return(Some(Val::Var(t))),
      ],
    })] };
    assert_eq!(run(&prog, main), Some(i32::MIN));
  }

  #[test]
  fn globals_and_addresses() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let g = sym(&mut names, "g");
    let p = sym(&mut names, "tmp.0");
    let v = sym(&mut names, "tmp.1");
    let prog = Program { top: vec![
      TopLevel::StaticVar(StaticVar {
        name: g, global: true, scalar: Some(IntTy::I32), init: vec![41, 0, 0, 0],
      }),
      TopLevel::Fn(Function {
        name: main, global: true, params: vec![], arrays: vec![],
        body: vec![
          Instr::GetAddress { dst: p, src: g },
          Instr::Load { dst: v, ptr: Val::Var(p), ty: IntTy::I32 },
          Instr::Binary { op: BinOp::Add, dst: v, lhs: Val::Var(v), rhs: Val::Const(1),
            ty: IntTy::I32 },
          Instr::Store { ptr: Val::Var(p), src: Val::Var(v), ty: IntTy::I32 },
          Instr::Return(Some(Val::Var(g))),
        ],
      }),
    ] };
    assert_eq!(run(&prog, main), Some(42));
  }

  #[test]
  fn negative_global_initializer_sign_extends() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let g = sym(&mut names, "g");
    let prog = Program { top: vec![
      TopLevel::StaticVar(StaticVar {
        name: g, global: true, scalar: Some(IntTy::I32), init: vec![0xff; 4],
      }),
      TopLevel::Fn(Function {
        name: main, global: true, params: vec![], arrays: vec![],
        body: vec![Instr::Return(Some(Val::Var(g)))],
      }),
    ] };
    assert_eq!(run(&prog, main), Some(-1));
  }

  #[test]
  fn array_storage_and_copy_to_offset() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let a = sym(&mut names, "a.0");
    let p = sym(&mut names, "tmp.0");
    let q = sym(&mut names, "tmp.1");
    let v = sym(&mut names, "tmp.2");
    let prog = Program { top: vec![TopLevel::Fn(Function {
      name: main, global: true, params: vec![], arrays: vec![(a, 12)],
      body: vec![
        Instr::CopyToOffset { base: a, src: Val::Const(7), offset: 4, ty: IntTy::I32 },
        Instr::GetAddress { dst: p, src: a },
        // q = a + 4
        Instr::Binary { op: BinOp::Add, dst: q, lhs: Val::Var(p), rhs: Val::Const(4),
          ty: IntTy::U64 },
        Instr::Load { dst: v, ptr: Val::Var(q), ty: IntTy::I32 },
        Instr::Return(Some(Val::Var(v))),
      ],
    })] };
    assert_eq!(run(&prog, main), Some(7));
  }

  #[test]
  fn unsigned_comparison() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let r = sym(&mut names, "tmp.0");
    let t = sym(&mut names, "l");
    let e = sym(&mut names, "e");
    // (unsigned)-1 > 1 is true
    let prog = Program { top: vec![TopLevel::Fn(Function {
      name: main, global: true, params: vec![], arrays: vec![],
      body: vec![
        Instr::Cmp { lhs: Val::Const(-1), rhs: Val::Const(1), ty: IntTy::U32 },
        Instr::JumpIf { cond: Cond::Gt, target: t },
        Instr::Copy { dst: r, src: Val::Const(0) },
        Instr::Jump(e),
        Instr::Label(t),
        Instr::Copy { dst: r, src: Val::Const(1) },
        Instr::Label(e),
        Instr::Return(Some(Val::Var(r))),
      ],
    })] };
    assert_eq!(run(&prog, main), Some(1));
  }

  #[test]
  fn missing_main_is_none() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    assert_eq!(run(&Program::default(), main), None);
  }

  #[test]
  fn calls_bind_parameters() {
    let mut names = Interner::new();
    let main = sym(&mut names, "main");
    let f = sym(&mut names, "f");
    let x = sym(&mut names, "x.0");
    let t = sym(&mut names, "tmp.0");
    let prog = Program { top: vec![
      TopLevel::Fn(Function {
        name: f, global: true, params: vec![x], arrays: vec![],
        body: vec![
          Instr::Binary { op: BinOp::Add, dst: x, lhs: Val::Var(x), rhs: Val::Const(1),
            ty: IntTy::I32 },
          Instr::Return(Some(Val::Var(x))),
        ],
      }),
      TopLevel::Fn(Function {
        name: main, global: true, params: vec![], arrays: vec![],
        body: vec![
          Instr::Call { func: f, args: vec![Val::Const(41)], dst: t },
          Instr::Return(Some(Val::Var(t))),
        ],
      }),
    ] };
    assert_eq!(run(&prog, main), Some(42));
  }
}
