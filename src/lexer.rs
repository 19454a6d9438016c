//! The token source: preprocessed text to token sequence.
//!
//! Integer literals are classified here, by value and suffix; character
//! and string literal payloads are handed to the parser raw (between the
//! quotes, escapes undecoded) so adjacent string literals can be decoded
//! and concatenated into a single buffer during parsing.

use log::trace;

use crate::errors::{Diagnostic, Phase, Result};
use crate::source::{Loc, SourceMap};
use crate::symbol::Interner;
use crate::token::{Kw, Punct, Token, TokenKind};
use crate::types::Const;

/// Tokenize the whole translation unit, or report the first lexical error.
pub fn tokenize<'s>(map: &'s SourceMap, names: &mut Interner) -> Result<Vec<Token<'s>>> {
  let mut lexer = Lexer { map, src: map.text().as_bytes(), pos: 0, names };
  let mut tokens = Vec::new();
  while let Some(tok) = lexer.next_token()? {
    tokens.push(tok);
  }
  trace!("lexed {} tokens from {}", tokens.len(), map.file());
  Ok(tokens)
}

struct Lexer<'s, 'c> {
  map: &'s SourceMap,
  src: &'s [u8],
  pos: usize,
  names: &'c mut Interner,
}

impl<'s> Lexer<'s, '_> {
  fn err(&self, at: usize, msg: impl Into<String>) -> Diagnostic {
    Diagnostic::new(self.map, Phase::Lex, Loc(at as u32), msg)
  }

  fn peek(&self) -> Option<u8> { self.src.get(self.pos).copied() }
  fn peek_at(&self, n: usize) -> Option<u8> { self.src.get(self.pos + n).copied() }

  fn skip_trivia(&mut self) -> Result<()> {
    loop {
      match self.peek() {
        Some(b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c) => self.pos += 1,
        Some(b'/') if self.peek_at(1) == Some(b'/') => {
          while !matches!(self.peek(), None | Some(b'\n')) { self.pos += 1 }
        }
        Some(b'/') if self.peek_at(1) == Some(b'*') => {
          let start = self.pos;
          self.pos += 2;
          loop {
            match self.peek() {
              Some(b'*') if self.peek_at(1) == Some(b'/') => { self.pos += 2; break }
              Some(_) => self.pos += 1,
              None => return Err(self.err(start, "unterminated block comment")),
            }
          }
        }
        _ => return Ok(()),
      }
    }
  }

  fn next_token(&mut self) -> Result<Option<Token<'s>>> {
    self.skip_trivia()?;
    let start = self.pos;
    let Some(c) = self.peek() else { return Ok(None) };
    let kind = match c {
      b'0'..=b'9' => self.int_literal()?,
      b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.ident(),
      b'\'' => TokenKind::CharLit(self.quoted(b'\'', "character literal")?),
      b'"' => TokenKind::StrLit(self.quoted(b'"', "string literal")?),
      _ => TokenKind::Punct(self.punct()?),
    };
    Ok(Some(Token { kind, loc: Loc(start as u32), len: (self.pos - start) as u32 }))
  }

  fn ident(&mut self) -> TokenKind<'s> {
    let start = self.pos;
    while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) {
      self.pos += 1;
    }
    let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii identifier");
    match Kw::from_str(text) {
      Some(kw) => TokenKind::Kw(kw),
      None => TokenKind::Ident(self.names.intern(text)),
    }
  }

  /// Decimal integer literal with optional `u`/`l` suffixes (either
  /// order, either case). Classification is by suffix first, then by the
  /// smallest type of that signedness the value fits.
  fn int_literal(&mut self) -> Result<TokenKind<'s>> {
    let start = self.pos;
    let mut value: u64 = 0;
    while let Some(d @ b'0'..=b'9') = self.peek() {
      value = value.checked_mul(10)
        .and_then(|v| v.checked_add(u64::from(d - b'0')))
        .ok_or_else(|| self.err(start, "integer literal too large"))?;
      self.pos += 1;
    }
    let (mut uns, mut long) = (false, false);
    loop {
      match self.peek() {
        Some(b'u' | b'U') if !uns => uns = true,
        Some(b'l' | b'L') if !long => long = true,
        Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') =>
          return Err(self.err(self.pos, "invalid integer literal suffix")),
        _ => break,
      }
      self.pos += 1;
    }
    let c = match (uns, long) {
      (false, false) if value <= i32::MAX as u64 => Const::Int(value as i32),
      (false, _) if value <= i64::MAX as u64 => Const::Long(value as i64),
      (false, _) => return Err(self.err(start, "integer literal too large")),
      (true, false) if value <= u64::from(u32::MAX) => Const::UInt(value as u32),
      (true, _) => Const::ULong(value),
    };
    Ok(TokenKind::IntLit(c))
  }

  /// The body of a quoted literal, quotes stripped, escapes left in
  /// place. A backslash always consumes the following byte, so escaped
  /// quotes do not terminate the literal.
  fn quoted(&mut self, quote: u8, what: &str) -> Result<&'s str> {
    let open = self.pos;
    self.pos += 1;
    let start = self.pos;
    loop {
      match self.peek() {
        Some(q) if q == quote => break,
        Some(b'\n') | None => return Err(self.err(open, format!("unterminated {what}"))),
        Some(b'\\') if self.peek_at(1).is_some() => self.pos += 2,
        Some(_) => self.pos += 1,
      }
    }
    let body = &self.src[start..self.pos];
    self.pos += 1;
    std::str::from_utf8(body).map_err(|_| self.err(open, format!("non-ascii {what}")))
  }

  fn punct(&mut self) -> Result<Punct> {
    let rest = &self.src[self.pos..];
    // maximal munch: three-byte operators first, then two, then one
    let table: &[(&[u8], Punct)] = &[
      (b"<<=", Punct::ShlEq), (b">>=", Punct::ShrEq),
      (b"<<", Punct::Shl), (b">>", Punct::Shr),
      (b"<=", Punct::Le), (b">=", Punct::Ge),
      (b"==", Punct::EqEq), (b"!=", Punct::Ne),
      (b"&&", Punct::AndAnd), (b"||", Punct::OrOr),
      (b"++", Punct::PlusPlus), (b"--", Punct::MinusMinus),
      (b"+=", Punct::PlusEq), (b"-=", Punct::MinusEq),
      (b"*=", Punct::StarEq), (b"/=", Punct::SlashEq), (b"%=", Punct::PercentEq),
      (b"&=", Punct::AmpEq), (b"|=", Punct::PipeEq), (b"^=", Punct::CaretEq),
      (b"(", Punct::LParen), (b")", Punct::RParen),
      (b"{", Punct::LBrace), (b"}", Punct::RBrace),
      (b"[", Punct::LBracket), (b"]", Punct::RBracket),
      (b";", Punct::Semi), (b",", Punct::Comma),
      (b":", Punct::Colon), (b"?", Punct::Question),
      (b"+", Punct::Plus), (b"-", Punct::Minus), (b"*", Punct::Star),
      (b"/", Punct::Slash), (b"%", Punct::Percent),
      (b"&", Punct::Amp), (b"|", Punct::Pipe), (b"^", Punct::Caret),
      (b"~", Punct::Tilde), (b"!", Punct::Bang),
      (b"<", Punct::Lt), (b">", Punct::Gt), (b"=", Punct::Eq),
    ];
    for &(pat, p) in table {
      if rest.starts_with(pat) {
        self.pos += pat.len();
        return Ok(p)
      }
    }
    Err(self.err(self.pos, "unrecognized character"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lex(text: &str) -> Result<Vec<Const>> {
    let map = SourceMap::new("t.c", text);
    let mut names = Interner::new();
    Ok(tokenize(&map, &mut names)?.into_iter().filter_map(|t| match t.kind {
      TokenKind::IntLit(c) => Some(c),
      _ => None,
    }).collect())
  }

  fn lex_kinds(text: &str) -> Vec<String> {
    let map = SourceMap::new("t.c", text);
    let mut names = Interner::new();
    tokenize(&map, &mut names).unwrap().iter().map(|t| format!("{:?}", t.kind)).collect()
  }

  #[test]
  fn int_literal_boundaries() {
    assert_eq!(lex("2147483647").unwrap(), vec![Const::Int(i32::MAX)]);
    assert_eq!(lex("2147483648").unwrap(), vec![Const::Long(2_147_483_648)]);
    assert_eq!(lex("4294967295u").unwrap(), vec![Const::UInt(u32::MAX)]);
    assert_eq!(lex("4294967296u").unwrap(), vec![Const::ULong(4_294_967_296)]);
    assert_eq!(lex("9223372036854775807").unwrap(), vec![Const::Long(i64::MAX)]);
    assert!(lex("9223372036854775808").is_err());
    assert_eq!(lex("9223372036854775808u").unwrap(), vec![Const::ULong(1 << 63)]);
    assert_eq!(lex("1l").unwrap(), vec![Const::Long(1)]);
    assert_eq!(lex("1ul").unwrap(), vec![Const::ULong(1)]);
    assert_eq!(lex("1lu").unwrap(), vec![Const::ULong(1)]);
    assert_eq!(lex("4294967295").unwrap(), vec![Const::Long(4_294_967_295)]);
  }

  #[test]
  fn suffix_errors() {
    assert!(lex("1x").is_err());
    assert!(lex("1uu").is_err());
    assert!(lex("1ll").is_err());
    assert!(lex("18446744073709551616").is_err());
  }

  #[test]
  fn operators_maximal_munch() {
    assert_eq!(lex_kinds("a <<= b >> 1"), vec![
      "Ident(s0)", "Punct(ShlEq)", "Ident(s1)", "Punct(Shr)", "IntLit(Int(1))",
    ]);
    assert_eq!(lex_kinds("x+++y"), vec![
      "Ident(s0)", "Punct(PlusPlus)", "Punct(Plus)", "Ident(s1)",
    ]);
  }

  #[test]
  fn keywords_and_idents() {
    assert_eq!(lex_kinds("int returns"), vec!["Kw(Int)", "Ident(s0)"]);
    assert_eq!(lex_kinds("return"), vec!["Kw(Return)"]);
  }

  #[test]
  fn quoted_literals_kept_raw() {
    assert_eq!(lex_kinds(r#""a\n" 'b'"#), vec![r#"StrLit("a\\n")"#, r#"CharLit("b")"#]);
    assert_eq!(lex_kinds(r#""\"""#), vec![r#"StrLit("\\\"")"#]);
    let map = SourceMap::new("t.c", "\"abc");
    let mut names = Interner::new();
    assert!(tokenize(&map, &mut names).is_err());
  }

  #[test]
  fn comments_skipped() {
    assert_eq!(lex_kinds("1 // x\n2 /* y */ 3"),
      vec!["IntLit(Int(1))", "IntLit(Int(2))", "IntLit(Int(3))"]);
    let map = SourceMap::new("t.c", "/* open");
    let mut names = Interner::new();
    assert!(tokenize(&map, &mut names).is_err());
  }

  #[test]
  fn stray_byte_is_reported() {
    let map = SourceMap::new("t.c", "int @;");
    let mut names = Interner::new();
    let err = tokenize(&map, &mut names).unwrap_err();
    assert_eq!(err.phase, Phase::Lex);
    assert_eq!(err.to_string(), "Lexer error at t.c:1:5: unrecognized character");
  }
}
