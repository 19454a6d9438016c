//! The data model shared between passes: types, constants, the AST and
//! the TAC instruction set.

pub mod ast;
pub mod tac;

use std::fmt;
use bumpalo::Bump;

/// A reference to an arena-allocated type node. Types are compared
/// structurally; since function parameter types are stored after
/// array-to-pointer decay, derived structural equality is exactly the
/// type-equality relation of the language.
pub type Ty<'a> = &'a TypeKind<'a>;

#[derive(Debug, PartialEq, Eq)]
pub enum TypeKind<'a> {
  Char,
  SChar,
  UChar,
  Short,
  UShort,
  Int,
  UInt,
  Long,
  ULong,
  Ptr(Ty<'a>),
  Array(Ty<'a>, usize),
  Fn { ret: Ty<'a>, params: &'a [Ty<'a>] },
  Void,
}

/// Pointers are 8 bytes throughout: arithmetic scaling and the
/// interpreter's address model use the same width.
pub const PTR_SIZE: u64 = 8;

impl<'a> TypeKind<'a> {
  /// Object size in bytes. Only meaningful for object types; function and
  /// void types have no size.
  #[must_use] pub fn size(&self) -> u64 {
    match *self {
      TypeKind::Char | TypeKind::SChar | TypeKind::UChar => 1,
      TypeKind::Short | TypeKind::UShort => 2,
      TypeKind::Int | TypeKind::UInt => 4,
      TypeKind::Long | TypeKind::ULong => 8,
      TypeKind::Ptr(_) => PTR_SIZE,
      TypeKind::Array(elem, n) => elem.size() * n as u64,
      TypeKind::Fn { .. } | TypeKind::Void => unreachable!("sizeless type"),
    }
  }

  /// The machine-level integer shape of this type, if it has one.
  /// Pointers count as unsigned 8-byte integers.
  #[must_use] pub fn int_ty(&self) -> Option<IntTy> {
    Some(match *self {
      TypeKind::Char | TypeKind::SChar => IntTy::I8,
      TypeKind::UChar => IntTy::U8,
      TypeKind::Short => IntTy::I16,
      TypeKind::UShort => IntTy::U16,
      TypeKind::Int => IntTy::I32,
      TypeKind::UInt => IntTy::U32,
      TypeKind::Long => IntTy::I64,
      TypeKind::ULong => IntTy::U64,
      TypeKind::Ptr(_) => IntTy::U64,
      TypeKind::Array(..) | TypeKind::Fn { .. } | TypeKind::Void => return None,
    })
  }

  #[must_use] pub fn is_arithmetic(&self) -> bool {
    matches!(*self,
      TypeKind::Char | TypeKind::SChar | TypeKind::UChar |
      TypeKind::Short | TypeKind::UShort | TypeKind::Int | TypeKind::UInt |
      TypeKind::Long | TypeKind::ULong)
  }

  #[must_use] pub fn is_signed(&self) -> bool {
    matches!(*self,
      TypeKind::Char | TypeKind::SChar | TypeKind::Short | TypeKind::Int | TypeKind::Long)
  }

  /// `char`, `signed char` and `unsigned char` all promote to `int`.
  #[must_use] pub fn is_char_kind(&self) -> bool {
    matches!(*self, TypeKind::Char | TypeKind::SChar | TypeKind::UChar)
  }

  #[must_use] pub fn is_pointer(&self) -> bool { matches!(*self, TypeKind::Ptr(_)) }
  #[must_use] pub fn is_array(&self) -> bool { matches!(*self, TypeKind::Array(..)) }
  #[must_use] pub fn is_function(&self) -> bool { matches!(*self, TypeKind::Fn { .. }) }

  /// Arithmetic or pointer: a valid condition operand.
  #[must_use] pub fn is_scalar(&self) -> bool { self.is_arithmetic() || self.is_pointer() }

  /// The integer-promoted version of this type: char kinds become `int`,
  /// everything else is unchanged.
  #[must_use] pub fn promote(&'a self) -> Ty<'a> {
    if self.is_char_kind() { &TypeKind::Int } else { self }
  }

  /// The pointee of a pointer type.
  #[must_use] pub fn referenced(&self) -> Option<Ty<'a>> {
    if let TypeKind::Ptr(to) = *self { Some(to) } else { None }
  }
}

/// Allocate a pointer-to-`ty` type node.
pub fn ptr_to<'a>(arena: &'a Bump, ty: Ty<'a>) -> Ty<'a> {
  arena.alloc(TypeKind::Ptr(ty))
}

/// Allocate an array-of-`elem` type node.
pub fn array_of<'a>(arena: &'a Bump, elem: Ty<'a>, len: usize) -> Ty<'a> {
  arena.alloc(TypeKind::Array(elem, len))
}

/// Allocate a function type node. `params` must already be decayed.
pub fn func_ty<'a>(arena: &'a Bump, ret: Ty<'a>, params: &[Ty<'a>]) -> Ty<'a> {
  arena.alloc(TypeKind::Fn { ret, params: arena.alloc_slice_copy(params) })
}

impl fmt::Display for TypeKind<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      TypeKind::Char => write!(f, "char"),
      TypeKind::SChar => write!(f, "signed char"),
      TypeKind::UChar => write!(f, "unsigned char"),
      TypeKind::Short => write!(f, "short"),
      TypeKind::UShort => write!(f, "unsigned short"),
      TypeKind::Int => write!(f, "int"),
      TypeKind::UInt => write!(f, "unsigned int"),
      TypeKind::Long => write!(f, "long"),
      TypeKind::ULong => write!(f, "unsigned long"),
      TypeKind::Ptr(to) => write!(f, "{to}*"),
      TypeKind::Array(elem, n) => write!(f, "{elem}[{n}]"),
      TypeKind::Fn { ret, params } => {
        write!(f, "{ret}(")?;
        for (i, p) in params.iter().enumerate() {
          if i > 0 { write!(f, ", ")? }
          write!(f, "{p}")?;
        }
        write!(f, ")")
      }
      TypeKind::Void => write!(f, "void"),
    }
  }
}

/// The machine shape of an integer operation: width in bytes plus
/// signedness. Carried on TAC instructions so the evaluator (and any
/// later backend) can pick the right 64-bit semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntTy {
  pub bytes: u8,
  pub signed: bool,
}

impl IntTy {
  pub const I8: IntTy = IntTy { bytes: 1, signed: true };
  pub const U8: IntTy = IntTy { bytes: 1, signed: false };
  pub const I16: IntTy = IntTy { bytes: 2, signed: true };
  pub const U16: IntTy = IntTy { bytes: 2, signed: false };
  pub const I32: IntTy = IntTy { bytes: 4, signed: true };
  pub const U32: IntTy = IntTy { bytes: 4, signed: false };
  pub const I64: IntTy = IntTy { bytes: 8, signed: true };
  pub const U64: IntTy = IntTy { bytes: 8, signed: false };

  /// Truncate a 64-bit pattern to this width, then extend it back to 64
  /// bits according to signedness.
  #[must_use] pub fn normalize(self, bits: u64) -> u64 {
    if self.bytes == 8 { return bits }
    let width = u32::from(self.bytes) * 8;
    let masked = bits & (u64::MAX >> (64 - width));
    if self.signed && masked >> (width - 1) != 0 {
      masked | (u64::MAX << width)
    } else {
      masked
    }
  }
}

impl fmt::Display for IntTy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", if self.signed { 'i' } else { 'u' }, u32::from(self.bytes) * 8)
  }
}

/// A classified integer or character constant, as produced by the lexer
/// and carried on literal expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Const {
  Int(i32),
  UInt(u32),
  Long(i64),
  ULong(u64),
  Char(i8),
}

impl Const {
  /// The type of this constant.
  #[must_use] pub fn ty(self) -> Ty<'static> {
    match self {
      Const::Int(_) => &TypeKind::Int,
      Const::UInt(_) => &TypeKind::UInt,
      Const::Long(_) => &TypeKind::Long,
      Const::ULong(_) => &TypeKind::ULong,
      Const::Char(_) => &TypeKind::Char,
    }
  }

  /// The 64-bit pattern of this constant: sign-extended for the signed
  /// kinds, zero-extended otherwise.
  #[must_use] pub fn bits(self) -> u64 {
    match self {
      Const::Int(n) => n as i64 as u64,
      Const::UInt(n) => u64::from(n),
      Const::Long(n) => n as u64,
      Const::ULong(n) => n,
      Const::Char(n) => n as i64 as u64,
    }
  }

  /// True for an integer literal of value zero: the null-pointer constant.
  #[must_use] pub fn is_zero(self) -> bool { self.bits() == 0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn structural_type_equality() {
    let arena = Bump::new();
    let p1 = ptr_to(&arena, &TypeKind::Int);
    let p2 = ptr_to(&arena, &TypeKind::Int);
    assert_eq!(p1, p2);
    assert_ne!(p1, ptr_to(&arena, &TypeKind::Long));
    let a1 = array_of(&arena, p1, 3);
    let a2 = array_of(&arena, p2, 3);
    assert_eq!(a1, a2);
    assert_ne!(a1, array_of(&arena, p1, 4));
  }

  #[test]
  fn sizes() {
    let arena = Bump::new();
    assert_eq!(TypeKind::Char.size(), 1);
    assert_eq!(TypeKind::UShort.size(), 2);
    assert_eq!(TypeKind::Int.size(), 4);
    assert_eq!(TypeKind::ULong.size(), 8);
    assert_eq!(ptr_to(&arena, &TypeKind::Char).size(), 8);
    assert_eq!(array_of(&arena, &TypeKind::Int, 5).size(), 20);
  }

  #[test]
  fn normalize_patterns() {
    assert_eq!(IntTy::I8.normalize(200), (-56i64) as u64);
    assert_eq!(IntTy::U8.normalize(200), 200);
    assert_eq!(IntTy::I32.normalize(0xffff_ffff), u64::MAX);
    assert_eq!(IntTy::U32.normalize(0x1_0000_0001), 1);
    assert_eq!(IntTy::I64.normalize(u64::MAX), u64::MAX);
  }

  #[test]
  fn const_bits_extend() {
    assert_eq!(Const::Int(-1).bits(), u64::MAX);
    assert_eq!(Const::UInt(u32::MAX).bits(), 0xffff_ffff);
    assert_eq!(Const::Char(-1).bits(), u64::MAX);
    assert!(Const::Int(0).is_zero());
    assert!(!Const::ULong(1).is_zero());
  }
}
