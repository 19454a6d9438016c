//! The recursive-descent parser.
//!
//! Declarations are parsed as a specifier list followed by a declarator
//! tree which [`Parser::process_declarator`] unwinds into a name and a
//! derived type; expressions use a precedence climber over an integer
//! table. Backtracking is bounded and local: an alternation saves the
//! cursor and restores it on a soft failure, and the parser records the
//! furthest cursor ever consumed so that the one diagnostic it can emit
//! points at the furthest genuine progress point.

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use log::debug;
use smallvec::SmallVec;

use crate::errors::{Diagnostic, Phase, Result};
use crate::source::{Loc, SourceMap};
use crate::symbol::Symbol;
use crate::token::{Kw, Punct, Token, TokenKind};
use crate::types::ast::{
  BinOp, BlockItem, Decl, DeclKind, DeclP, Expr, ExprKind, ExprP, FnDecl, ForInit, IncDec, Init,
  InitKind, InitP, Param, Program, Stmt, StmtKind, StmtP, Storage, UnOp, VarDecl,
};
use crate::types::{self, Const, Ty, TypeKind};

/// Parse a token sequence into a [`Program`], or report the first
/// syntactic error.
pub fn parse<'a, 's>(
  arena: &'a Bump, map: &'s SourceMap, tokens: &'s [Token<'s>],
) -> Result<Program<'a>> {
  let mut p = Parser { arena, map, tokens, pos: 0, high_water: 0 };
  match p.program() {
    Ok(prog) => {
      debug!("parsed {} top-level declarations", prog.decls.len());
      Ok(prog)
    }
    Err(Fail::Fatal(d)) => Err(d),
    Err(Fail::Soft) => Err(p.unexpected_token()),
  }
}

/// A sub-parse failure. `Soft` means "this alternative does not apply":
/// the caller restores its saved cursor and tries the next one. `Fatal`
/// aborts the whole parse with a specific diagnostic.
enum Fail {
  Soft,
  Fatal(Diagnostic),
}

impl From<Diagnostic> for Fail {
  fn from(d: Diagnostic) -> Fail { Fail::Fatal(d) }
}

type PResult<T> = Result<T, Fail>;

/// A parsed declarator tree, unwound by `process_declarator`.
#[derive(Debug)]
enum Declarator<'a> {
  /// The declared identifier.
  Name(Symbol, Loc),
  /// The hole of an abstract declarator (casts, unnamed parameters).
  Anon(Loc),
  Ptr(&'a Declarator<'a>),
  Array(&'a Declarator<'a>, usize),
  Func(&'a Declarator<'a>, &'a [Param<'a>]),
}

/// The result of unwinding a declarator against a base type.
struct Declared<'a> {
  name: Option<(Symbol, Loc)>,
  ty: Ty<'a>,
  /// Present when the declarator declares a function (name applied
  /// directly to a parameter list).
  params: Option<&'a [Param<'a>]>,
}

struct Parser<'a, 's> {
  arena: &'a Bump,
  map: &'s SourceMap,
  tokens: &'s [Token<'s>],
  pos: usize,
  /// Furthest cursor position ever consumed, for error reporting.
  high_water: usize,
}

impl<'a, 's> Parser<'a, 's> {
  // cursor primitives

  fn peek(&self) -> Option<&Token<'s>> { self.tokens.get(self.pos) }

  fn advance(&mut self) -> &Token<'s> {
    let tok = &self.tokens[self.pos];
    self.pos += 1;
    if self.pos > self.high_water { self.high_water = self.pos }
    tok
  }

  fn save(&self) -> usize { self.pos }
  fn restore(&mut self, saved: usize) { self.pos = saved }

  fn cur_loc(&self) -> Loc {
    self.peek().map_or(Loc::NONE, |t| t.loc)
  }

  fn fatal(&self, loc: Loc, msg: impl Into<String>) -> Fail {
    Fail::Fatal(Diagnostic::new(self.map, Phase::Parse, loc, msg))
  }

  /// The single end-of-parse diagnostic, at the furthest progress point.
  fn unexpected_token(&self) -> Diagnostic {
    match self.tokens.get(self.high_water) {
      Some(tok) => {
        let start = tok.loc.0 as usize;
        let text = &self.map.text()[start..start + tok.len as usize];
        Diagnostic::new(self.map, Phase::Parse, tok.loc, format!("unexpected token `{text}`"))
      }
      None => {
        let loc = self.tokens.last().map_or(Loc::NONE, |t| t.loc);
        Diagnostic::new(self.map, Phase::Parse, loc, "unexpected end of file")
      }
    }
  }

  fn eat_punct(&mut self, p: Punct) -> PResult<Loc> {
    match self.peek() {
      Some(&Token { kind: TokenKind::Punct(q), loc, .. }) if q == p => {
        self.advance();
        Ok(loc)
      }
      _ => Err(Fail::Soft),
    }
  }

  fn at_punct(&self, p: Punct) -> bool {
    matches!(self.peek(), Some(&Token { kind: TokenKind::Punct(q), .. }) if q == p)
  }

  fn eat_kw(&mut self, kw: Kw) -> PResult<Loc> {
    match self.peek() {
      Some(&Token { kind: TokenKind::Kw(k), loc, .. }) if k == kw => {
        self.advance();
        Ok(loc)
      }
      _ => Err(Fail::Soft),
    }
  }

  fn eat_ident(&mut self) -> PResult<(Symbol, Loc)> {
    match self.peek() {
      Some(&Token { kind: TokenKind::Ident(name), loc, .. }) => {
        self.advance();
        Ok((name, loc))
      }
      _ => Err(Fail::Soft),
    }
  }

  fn expr(&self, loc: Loc, kind: ExprKind<'a>) -> ExprP<'a> {
    self.arena.alloc(Expr { kind, loc, ty: None })
  }

  fn stmt(&self, loc: Loc, kind: StmtKind<'a>) -> StmtP<'a> {
    self.arena.alloc(Stmt { kind, loc })
  }

  // program structure

  fn program(&mut self) -> PResult<Program<'a>> {
    let mut decls = BumpVec::new_in(self.arena);
    while self.peek().is_some() {
      decls.push(self.declaration()?);
    }
    Ok(Program { decls: decls.into_bump_slice() })
  }

  // declarations

  /// `specifiers declarator (';' | '=' init ';' | body)`.
  fn declaration(&mut self) -> PResult<DeclP<'a>> {
    let saved = self.save();
    self.declaration_inner().map_err(|e| {
      self.restore(saved);
      e
    })
  }

  fn declaration_inner(&mut self) -> PResult<DeclP<'a>> {
    let loc = self.cur_loc();
    let (base, storage) = self.specifiers()?;
    let d = self.declarator(false)?;
    let Declared { name, ty, params } = self.process_declarator(base, d)?;
    let Some((name, name_loc)) = name else {
      return Err(self.fatal(loc, "declaration requires an identifier"))
    };

    if let TypeKind::Fn { .. } = *ty {
      let Some(params) = params else {
        return Err(self.fatal(name_loc, "malformed function declarator"))
      };
      let body = if self.at_punct(Punct::LBrace) {
        Some(self.block()?)
      } else {
        self.eat_punct(Punct::Semi)?;
        None
      };
      let kind = DeclKind::Fn(FnDecl { name, ty, storage, params, body });
      return Ok(&*self.arena.alloc(Decl { kind, loc }))
    }

    let init = if self.eat_punct(Punct::Eq).is_ok() {
      let init = self.initializer()?;
      self.eat_punct(Punct::Semi)?;
      Some(init)
    } else {
      self.eat_punct(Punct::Semi)?;
      None
    };
    let kind = DeclKind::Var(VarDecl { name, ty, storage, init });
    Ok(&*self.arena.alloc(Decl { kind, loc }))
  }

  /// Storage classes and type specifiers, in any order. Soft-fails when
  /// no type specifier is present (the tokens are not a declaration);
  /// illegal combinations are fatal.
  fn specifiers(&mut self) -> PResult<(Ty<'a>, Storage)> {
    let mut storage = Storage::None;
    let mut specs = Specs::empty();
    let start = self.cur_loc();
    loop {
      let Some(&Token { kind: TokenKind::Kw(kw), loc, .. }) = self.peek() else { break };
      match kw {
        Kw::Static | Kw::Extern => {
          if storage != Storage::None {
            return Err(self.fatal(loc, "multiple storage classes in declaration"))
          }
          storage = if kw == Kw::Static { Storage::Static } else { Storage::Extern };
        }
        _ if kw.is_type_specifier() || kw == Kw::Void => {
          let flag = match kw {
            Kw::Int => Specs::INT,
            Kw::Signed => Specs::SIGNED,
            Kw::Unsigned => Specs::UNSIGNED,
            Kw::Long => Specs::LONG,
            Kw::Short => Specs::SHORT,
            Kw::Char => Specs::CHAR,
            Kw::Void => Specs::VOID,
            _ => unreachable!(),
          };
          if specs.contains(flag) {
            return Err(self.fatal(loc, "duplicate type specifier"))
          }
          specs |= flag;
        }
        _ => break,
      }
      self.advance();
    }
    if specs.is_empty() {
      if storage != Storage::None {
        return Err(self.fatal(start, "declaration requires a type specifier"))
      }
      return Err(Fail::Soft)
    }
    let ty = base_type(specs).ok_or_else(|| self.fatal(start, "invalid type specifier combination"))?;
    Ok((ty, storage))
  }

  /// `*D`, `(D)`, `D[N]`, `D(params)`, identifier, or (when
  /// `abstract_ok`) nothing.
  fn declarator(&mut self, abstract_ok: bool) -> PResult<&'a Declarator<'a>> {
    if self.eat_punct(Punct::Star).is_ok() {
      let inner = self.declarator(abstract_ok)?;
      return Ok(&*self.arena.alloc(Declarator::Ptr(inner)))
    }
    let mut d = self.direct_declarator(abstract_ok)?;
    loop {
      if self.eat_punct(Punct::LBracket).is_ok() {
        let loc = self.cur_loc();
        let n = match self.peek() {
          Some(&Token { kind: TokenKind::IntLit(c), .. }) => {
            self.advance();
            usize::try_from(c.bits() as i64)
              .map_err(|_| self.fatal(loc, "invalid array size"))?
          }
          _ => return Err(self.fatal(loc, "array size must be an integer literal")),
        };
        self.eat_punct(Punct::RBracket)?;
        d = self.arena.alloc(Declarator::Array(d, n));
      } else if self.at_punct(Punct::LParen) {
        let params = self.param_list()?;
        d = self.arena.alloc(Declarator::Func(d, params));
      } else {
        return Ok(d)
      }
    }
  }

  fn direct_declarator(&mut self, abstract_ok: bool) -> PResult<&'a Declarator<'a>> {
    if let Ok((name, loc)) = self.eat_ident() {
      return Ok(&*self.arena.alloc(Declarator::Name(name, loc)))
    }
    // `(` is a grouping only if it encloses a declarator; for abstract
    // declarators a parameter list or `()` also starts with `(`.
    if self.at_punct(Punct::LParen) && !self.paren_starts_params() {
      self.eat_punct(Punct::LParen)?;
      let inner = self.declarator(abstract_ok)?;
      self.eat_punct(Punct::RParen)?;
      return Ok(inner)
    }
    if abstract_ok {
      return Ok(&*self.arena.alloc(Declarator::Anon(self.cur_loc())))
    }
    Err(Fail::Soft)
  }

  /// After a direct declarator position, decide whether a `(` opens a
  /// parameter list rather than a grouped declarator.
  fn paren_starts_params(&self) -> bool {
    match self.tokens.get(self.pos + 1) {
      Some(Token { kind: TokenKind::Punct(Punct::RParen), .. }) => true,
      Some(Token { kind: TokenKind::Kw(kw), .. }) => kw.is_type_specifier() || *kw == Kw::Void,
      _ => false,
    }
  }

  /// `(void)`, `()`, or a comma-separated list of parameter declarations.
  /// Array-typed parameters decay to pointers here, so the declared
  /// function type never mentions array parameters.
  fn param_list(&mut self) -> PResult<&'a [Param<'a>]> {
    self.eat_punct(Punct::LParen)?;
    if self.eat_punct(Punct::RParen).is_ok() {
      return Ok(&[])
    }
    {
      let saved = self.save();
      if self.eat_kw(Kw::Void).is_ok() && self.eat_punct(Punct::RParen).is_ok() {
        return Ok(&[])
      }
      self.restore(saved);
    }
    let mut params: SmallVec<[Param<'a>; 8]> = SmallVec::new();
    loop {
      let loc = self.cur_loc();
      let (base, storage) = self.specifiers()?;
      if storage != Storage::None {
        return Err(self.fatal(loc, "storage class on parameter"))
      }
      let d = self.declarator(true)?;
      let Declared { name, ty, .. } = self.process_declarator(base, d)?;
      let ty = match *ty {
        TypeKind::Array(elem, _) => types::ptr_to(self.arena, elem),
        _ => ty,
      };
      params.push(Param { name: name.map(|(n, _)| n), ty, loc });
      if self.eat_punct(Punct::Comma).is_err() { break }
    }
    self.eat_punct(Punct::RParen)?;
    Ok(self.arena.alloc_slice_copy(&params))
  }

  /// Unwind a declarator tree outward, wrapping the base type. Array
  /// dimensions appear in source order, so the outermost dimension wraps
  /// last.
  fn process_declarator(&mut self, base: Ty<'a>, d: &'a Declarator<'a>)
      -> PResult<Declared<'a>> {
    match *d {
      Declarator::Name(name, loc) =>
        Ok(Declared { name: Some((name, loc)), ty: base, params: None }),
      Declarator::Anon(_) => Ok(Declared { name: None, ty: base, params: None }),
      Declarator::Ptr(inner) =>
        self.process_declarator(types::ptr_to(self.arena, base), inner),
      Declarator::Array(inner, n) =>
        self.process_declarator(types::array_of(self.arena, base, n), inner),
      Declarator::Func(inner, params) => {
        let param_tys: SmallVec<[Ty<'a>; 8]> = params.iter().map(|p| p.ty).collect();
        let fn_ty = types::func_ty(self.arena, base, &param_tys);
        if let Declarator::Name(name, loc) = *inner {
          Ok(Declared { name: Some((name, loc)), ty: fn_ty, params: Some(params) })
        } else {
          // function type in a larger declarator (e.g. a pointer to it):
          // no parameter list is declared here
          let mut res = self.process_declarator(fn_ty, inner)?;
          res.params = None;
          Ok(res)
        }
      }
    }
  }

  /// `expr` or `{ init, ... }` (trailing comma allowed).
  fn initializer(&mut self) -> PResult<InitP<'a>> {
    let loc = self.cur_loc();
    if self.eat_punct(Punct::LBrace).is_ok() {
      let mut items = BumpVec::new_in(self.arena);
      loop {
        items.push(self.initializer()?);
        if self.eat_punct(Punct::Comma).is_err() { break }
        if self.at_punct(Punct::RBrace) { break }
      }
      self.eat_punct(Punct::RBrace)?;
      let kind = InitKind::Compound(items.into_bump_slice());
      return Ok(&*self.arena.alloc(Init { kind, loc, ty: None }))
    }
    let e = self.expression(0)?;
    Ok(&*self.arena.alloc(Init { kind: InitKind::Single(e), loc, ty: None }))
  }

  // statements

  fn block(&mut self) -> PResult<StmtP<'a>> {
    let loc = self.eat_punct(Punct::LBrace)?;
    let mut items = BumpVec::new_in(self.arena);
    loop {
      // a block item is first tried as a statement, then as a declaration
      let saved = self.save();
      match self.statement() {
        Ok(s) => {
          items.push(BlockItem::Stmt(s));
          continue
        }
        Err(Fail::Fatal(d)) => return Err(Fail::Fatal(d)),
        Err(Fail::Soft) => self.restore(saved),
      }
      match self.declaration() {
        Ok(d) => items.push(BlockItem::Decl(d)),
        Err(Fail::Fatal(d)) => return Err(Fail::Fatal(d)),
        Err(Fail::Soft) => break,
      }
    }
    self.eat_punct(Punct::RBrace)?;
    if items.is_empty() {
      items.push(BlockItem::Stmt(self.stmt(loc, StmtKind::Null)));
    }
    Ok(self.stmt(loc, StmtKind::Compound(items.into_bump_slice())))
  }

  fn statement(&mut self) -> PResult<StmtP<'a>> {
    let saved = self.save();
    self.statement_inner().map_err(|e| {
      self.restore(saved);
      e
    })
  }

  fn statement_inner(&mut self) -> PResult<StmtP<'a>> {
    let loc = self.cur_loc();
    match self.peek() {
      Some(Token { kind: TokenKind::Punct(Punct::Semi), .. }) => {
        self.advance();
        Ok(self.stmt(loc, StmtKind::Null))
      }
      Some(Token { kind: TokenKind::Punct(Punct::LBrace), .. }) => self.block(),
      Some(Token { kind: TokenKind::Kw(kw), .. }) => {
        let kw = *kw;
        match kw {
          Kw::Return => {
            self.advance();
            let value = if self.at_punct(Punct::Semi) { None } else { Some(self.expression(0)?) };
            self.eat_punct(Punct::Semi)?;
            Ok(self.stmt(loc, StmtKind::Return(value)))
          }
          Kw::If => {
            self.advance();
            self.eat_punct(Punct::LParen)?;
            let cond = self.expression(0)?;
            self.eat_punct(Punct::RParen)?;
            let then = self.statement()?;
            let els = if self.eat_kw(Kw::Else).is_ok() { Some(self.statement()?) } else { None };
            Ok(self.stmt(loc, StmtKind::If { cond, then, els }))
          }
          Kw::Goto => {
            self.advance();
            let (name, _) = self.eat_ident()?;
            self.eat_punct(Punct::Semi)?;
            Ok(self.stmt(loc, StmtKind::Goto { name, label: None }))
          }
          Kw::Break => {
            self.advance();
            self.eat_punct(Punct::Semi)?;
            Ok(self.stmt(loc, StmtKind::Break { label: None }))
          }
          Kw::Continue => {
            self.advance();
            self.eat_punct(Punct::Semi)?;
            Ok(self.stmt(loc, StmtKind::Continue { label: None }))
          }
          Kw::While => {
            self.advance();
            self.eat_punct(Punct::LParen)?;
            let cond = self.expression(0)?;
            self.eat_punct(Punct::RParen)?;
            let body = self.statement()?;
            Ok(self.stmt(loc, StmtKind::While { cond, body, label: None }))
          }
          Kw::Do => {
            self.advance();
            let body = self.statement()?;
            self.eat_kw(Kw::While)?;
            self.eat_punct(Punct::LParen)?;
            let cond = self.expression(0)?;
            self.eat_punct(Punct::RParen)?;
            self.eat_punct(Punct::Semi)?;
            Ok(self.stmt(loc, StmtKind::DoWhile { body, cond, label: None }))
          }
          Kw::For => {
            self.advance();
            self.eat_punct(Punct::LParen)?;
            let init = self.for_init()?;
            let cond = if self.at_punct(Punct::Semi) { None } else { Some(self.expression(0)?) };
            self.eat_punct(Punct::Semi)?;
            let step = if self.at_punct(Punct::RParen) { None } else { Some(self.expression(0)?) };
            self.eat_punct(Punct::RParen)?;
            let body = self.statement()?;
            Ok(self.stmt(loc, StmtKind::For { init, cond, step, body, label: None }))
          }
          Kw::Switch => {
            self.advance();
            self.eat_punct(Punct::LParen)?;
            let cond = self.expression(0)?;
            self.eat_punct(Punct::RParen)?;
            let body = self.statement()?;
            Ok(self.stmt(loc, StmtKind::Switch { cond, body, label: None, cases: &[] }))
          }
          Kw::Case => {
            self.advance();
            let value = self.expression(0)?;
            self.eat_punct(Punct::Colon)?;
            let body = self.statement()?;
            Ok(self.stmt(loc, StmtKind::Case { value, body, label: None }))
          }
          Kw::Default => {
            self.advance();
            self.eat_punct(Punct::Colon)?;
            let body = self.statement()?;
            Ok(self.stmt(loc, StmtKind::Default { body, label: None }))
          }
          _ => Err(Fail::Soft),
        }
      }
      _ => {
        // a label: `ident ':' statement`
        let saved = self.save();
        if let Ok((name, _)) = self.eat_ident() {
          if self.eat_punct(Punct::Colon).is_ok() {
            let body = self.statement()?;
            return Ok(self.stmt(loc, StmtKind::Labeled { name, label: None, body }))
          }
          self.restore(saved);
        }
        let e = self.expression(0)?;
        self.eat_punct(Punct::Semi)?;
        Ok(self.stmt(loc, StmtKind::Expr(e)))
      }
    }
  }

  fn for_init(&mut self) -> PResult<ForInit<'a>> {
    let saved = self.save();
    match self.declaration() {
      Ok(d) => return Ok(ForInit::Decl(d)),
      Err(Fail::Fatal(d)) => return Err(Fail::Fatal(d)),
      Err(Fail::Soft) => self.restore(saved),
    }
    let e = if self.at_punct(Punct::Semi) { None } else { Some(self.expression(0)?) };
    self.eat_punct(Punct::Semi)?;
    Ok(ForInit::Expr(e))
  }

  // expressions

  /// Precedence climbing over the binary/ternary/assignment table.
  fn expression(&mut self, min_prec: u8) -> PResult<ExprP<'a>> {
    let mut lhs = self.factor()?;
    loop {
      let Some(&Token { kind: TokenKind::Punct(p), loc, .. }) = self.peek() else { return Ok(lhs) };
      let Some(prec) = binary_prec(p) else { return Ok(lhs) };
      if prec < min_prec { return Ok(lhs) }
      self.advance();
      lhs = if let Some(op) = assign_op(p) {
        // assignments are right-associative: the right side reenters at
        // the same precedence
        let rhs = self.expression(ASSIGN_PREC)?;
        self.expr(loc, ExprKind::Assign { op, lhs, rhs })
      } else if p == Punct::Question {
        let then = self.expression(0)?;
        self.eat_punct(Punct::Colon)?;
        let els = self.expression(TERNARY_PREC)?;
        self.expr(loc, ExprKind::Conditional { cond: lhs, then, els })
      } else {
        let op = binary_op(p).expect("operator with a precedence");
        let rhs = self.expression(prec + 1)?;
        self.expr(loc, ExprKind::Binary { op, lhs, rhs })
      };
    }
  }

  /// factor = unary | cast | postfix.
  fn factor(&mut self) -> PResult<ExprP<'a>> {
    let loc = self.cur_loc();
    if let Some(&Token { kind: TokenKind::Punct(p), .. }) = self.peek() {
      match p {
        Punct::Tilde | Punct::Minus | Punct::Bang => {
          self.advance();
          let op = match p {
            Punct::Tilde => UnOp::Complement,
            Punct::Minus => UnOp::Negate,
            _ => UnOp::Not,
          };
          let operand = self.factor()?;
          return Ok(self.expr(loc, ExprKind::Unary { op, operand }))
        }
        Punct::Star => {
          self.advance();
          let operand = self.factor()?;
          return Ok(self.expr(loc, ExprKind::Deref(operand)))
        }
        Punct::Amp => {
          self.advance();
          let operand = self.factor()?;
          return Ok(self.expr(loc, ExprKind::AddrOf(operand)))
        }
        // prefix increment/decrement desugar to compound assignment
        Punct::PlusPlus | Punct::MinusMinus => {
          self.advance();
          let op = if p == Punct::PlusPlus { BinOp::Add } else { BinOp::Sub };
          let lhs = self.factor()?;
          let one = self.expr(loc, ExprKind::Lit(Const::Int(1)));
          return Ok(self.expr(loc, ExprKind::Assign { op: Some(op), lhs, rhs: one }))
        }
        Punct::LParen if self.cast_follows() => {
          self.advance();
          let (base, storage) = self.specifiers()?;
          if storage != Storage::None {
            return Err(self.fatal(loc, "storage class in cast"))
          }
          let d = self.declarator(true)?;
          let Declared { name, ty, .. } = self.process_declarator(base, d)?;
          if name.is_some() {
            return Err(self.fatal(loc, "cast type may not declare an identifier"))
          }
          self.eat_punct(Punct::RParen)?;
          let operand = self.factor()?;
          return Ok(self.expr(loc, ExprKind::Cast { to: ty, operand }))
        }
        _ => {}
      }
    }
    self.postfix()
  }

  /// True when the `(` at the cursor opens a cast: the next token is a
  /// type specifier. (There are no typedefs, so this one-token lookahead
  /// is exact.)
  fn cast_follows(&self) -> bool {
    matches!(self.tokens.get(self.pos + 1),
      Some(Token { kind: TokenKind::Kw(kw), .. }) if kw.is_type_specifier())
  }

  fn postfix(&mut self) -> PResult<ExprP<'a>> {
    let mut e = self.primary()?;
    loop {
      let loc = self.cur_loc();
      if self.eat_punct(Punct::LBracket).is_ok() {
        let index = self.expression(0)?;
        self.eat_punct(Punct::RBracket)?;
        e = self.expr(loc, ExprKind::Subscript { base: e, index });
      } else if self.eat_punct(Punct::PlusPlus).is_ok() {
        e = self.expr(loc, ExprKind::PostAssign { op: IncDec::Inc, operand: e });
      } else if self.eat_punct(Punct::MinusMinus).is_ok() {
        e = self.expr(loc, ExprKind::PostAssign { op: IncDec::Dec, operand: e });
      } else {
        return Ok(e)
      }
    }
  }

  fn primary(&mut self) -> PResult<ExprP<'a>> {
    let Some(&Token { kind, loc, .. }) = self.peek() else { return Err(Fail::Soft) };
    match kind {
      TokenKind::IntLit(c) => {
        self.advance();
        Ok(self.expr(loc, ExprKind::Lit(c)))
      }
      TokenKind::CharLit(raw) => {
        self.advance();
        let bytes = self.decode_escapes(raw, loc)?;
        let [b] = *bytes else {
          return Err(self.fatal(loc, "character literal must denote a single byte"))
        };
        Ok(self.expr(loc, ExprKind::Lit(Const::Char(b as i8))))
      }
      TokenKind::StrLit(_) => self.string_literal(),
      TokenKind::Ident(name) => {
        self.advance();
        if self.at_punct(Punct::LParen) {
          let args = self.call_args()?;
          return Ok(self.expr(loc, ExprKind::Call { func: name, args }))
        }
        Ok(self.expr(loc, ExprKind::Var(name)))
      }
      TokenKind::Punct(Punct::LParen) => {
        self.advance();
        let e = self.expression(0)?;
        self.eat_punct(Punct::RParen)?;
        Ok(e)
      }
      _ => Err(Fail::Soft),
    }
  }

  fn call_args(&mut self) -> PResult<&'a [ExprP<'a>]> {
    self.eat_punct(Punct::LParen)?;
    let mut args = BumpVec::new_in(self.arena);
    if self.eat_punct(Punct::RParen).is_ok() {
      return Ok(args.into_bump_slice())
    }
    loop {
      args.push(self.expression(0)?);
      if self.eat_punct(Punct::Comma).is_err() { break }
    }
    self.eat_punct(Punct::RParen)?;
    Ok(args.into_bump_slice())
  }

  /// One or more adjacent string-literal tokens, concatenated, escapes
  /// decoded into a single arena buffer.
  fn string_literal(&mut self) -> PResult<ExprP<'a>> {
    let mut bytes: Vec<u8> = Vec::new();
    let loc = self.cur_loc();
    while let Some(&Token { kind: TokenKind::StrLit(raw), loc: tok_loc, .. }) = self.peek() {
      self.advance();
      bytes.extend_from_slice(&self.decode_escapes(raw, tok_loc)?);
    }
    Ok(self.expr(loc, ExprKind::Str(self.arena.alloc_slice_copy(&bytes))))
  }

  /// Decode the supported escape sequences. Any other backslash escape
  /// is a parse error.
  fn decode_escapes(&self, raw: &str, loc: Loc) -> PResult<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut it = raw.bytes();
    while let Some(b) = it.next() {
      if b != b'\\' {
        out.push(b);
        continue
      }
      let decoded = match it.next() {
        Some(b'\'') => b'\'',
        Some(b'"') => b'"',
        Some(b'?') => b'?',
        Some(b'\\') => b'\\',
        Some(b'a') => 0x07,
        Some(b'b') => 0x08,
        Some(b'f') => 0x0c,
        Some(b'n') => b'\n',
        Some(b'r') => b'\r',
        Some(b't') => b'\t',
        Some(b'v') => 0x0b,
        Some(b'0') => 0,
        _ => return Err(self.fatal(loc, "invalid escape sequence")),
      };
      out.push(decoded);
    }
    Ok(out)
  }
}

const ASSIGN_PREC: u8 = 1;
const TERNARY_PREC: u8 = 3;

/// The binding power of a binary, ternary or assignment operator; `None`
/// for tokens that cannot continue an expression.
fn binary_prec(p: Punct) -> Option<u8> {
  Some(match p {
    Punct::Star | Punct::Slash | Punct::Percent => 50,
    Punct::Plus | Punct::Minus => 45,
    Punct::Shl | Punct::Shr => 40,
    Punct::Lt | Punct::Gt | Punct::Le | Punct::Ge => 35,
    Punct::EqEq | Punct::Ne => 30,
    Punct::Amp => 25,
    Punct::Caret => 20,
    Punct::Pipe => 15,
    Punct::AndAnd => 10,
    Punct::OrOr => 5,
    Punct::Question => TERNARY_PREC,
    Punct::Eq | Punct::PlusEq | Punct::MinusEq | Punct::StarEq | Punct::SlashEq
    | Punct::PercentEq | Punct::AmpEq | Punct::PipeEq | Punct::CaretEq
    | Punct::ShlEq | Punct::ShrEq => ASSIGN_PREC,
    _ => return None,
  })
}

fn binary_op(p: Punct) -> Option<BinOp> {
  Some(match p {
    Punct::Star => BinOp::Mul,
    Punct::Slash => BinOp::Div,
    Punct::Percent => BinOp::Rem,
    Punct::Plus => BinOp::Add,
    Punct::Minus => BinOp::Sub,
    Punct::Shl => BinOp::Shl,
    Punct::Shr => BinOp::Shr,
    Punct::Lt => BinOp::Lt,
    Punct::Gt => BinOp::Gt,
    Punct::Le => BinOp::Le,
    Punct::Ge => BinOp::Ge,
    Punct::EqEq => BinOp::Eq,
    Punct::Ne => BinOp::Ne,
    Punct::Amp => BinOp::BitAnd,
    Punct::Caret => BinOp::BitXor,
    Punct::Pipe => BinOp::BitOr,
    Punct::AndAnd => BinOp::And,
    Punct::OrOr => BinOp::Or,
    _ => return None,
  })
}

/// For an assignment or compound-assignment token, the base operation
/// (`None` inside the option means plain `=`).
fn assign_op(p: Punct) -> Option<Option<BinOp>> {
  Some(match p {
    Punct::Eq => None,
    Punct::PlusEq => Some(BinOp::Add),
    Punct::MinusEq => Some(BinOp::Sub),
    Punct::StarEq => Some(BinOp::Mul),
    Punct::SlashEq => Some(BinOp::Div),
    Punct::PercentEq => Some(BinOp::Rem),
    Punct::AmpEq => Some(BinOp::BitAnd),
    Punct::PipeEq => Some(BinOp::BitOr),
    Punct::CaretEq => Some(BinOp::BitXor),
    Punct::ShlEq => Some(BinOp::Shl),
    Punct::ShrEq => Some(BinOp::Shr),
    _ => return None,
  })
}

bitflags::bitflags! {
  /// Which type-specifier keywords have appeared in a specifier list.
  #[derive(Clone, Copy, PartialEq, Eq)]
  struct Specs: u8 {
    const INT = 1;
    const SIGNED = 1 << 1;
    const UNSIGNED = 1 << 2;
    const LONG = 1 << 3;
    const SHORT = 1 << 4;
    const CHAR = 1 << 5;
    const VOID = 1 << 6;
  }
}

/// Map a legal specifier set to its type; `None` if the combination is
/// illegal. Legality: `void` stands alone; `signed`/`unsigned` are
/// mutually exclusive; at most one of `char`/`short`/`long`; `char`
/// excludes `int`.
fn base_type(specs: Specs) -> Option<Ty<'static>> {
  if specs.contains(Specs::VOID) {
    return if specs == Specs::VOID { Some(&TypeKind::Void) } else { None }
  }
  if specs.contains(Specs::SIGNED | Specs::UNSIGNED) { return None }
  let sizes = specs & (Specs::CHAR | Specs::SHORT | Specs::LONG);
  if sizes.bits().count_ones() > 1 { return None }
  if specs.contains(Specs::CHAR | Specs::INT) { return None }
  let unsigned = specs.contains(Specs::UNSIGNED);
  Some(if specs.contains(Specs::SHORT) {
    if unsigned { &TypeKind::UShort } else { &TypeKind::Short }
  } else if specs.contains(Specs::LONG) {
    if unsigned { &TypeKind::ULong } else { &TypeKind::Long }
  } else if specs.contains(Specs::CHAR) {
    if specs.contains(Specs::SIGNED) { &TypeKind::SChar }
    else if unsigned { &TypeKind::UChar }
    else { &TypeKind::Char }
  } else if unsigned {
    &TypeKind::UInt
  } else {
    &TypeKind::Int
  })
}
