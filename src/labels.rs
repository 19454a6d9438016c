//! Control-flow label resolution.
//!
//! Two phases per function. The first walk assigns a fresh label to each
//! loop and switch (`<func>.loop.N`, `<func>.switch.N`), points every
//! `break`/`continue` at the innermost matching construct, and collects
//! `case`/`default` entries into their enclosing switch, folding each case
//! value to a compile-time constant. The second walk resolves `goto`: a
//! user label `L:` defines the destination `<func>.user.L`, and each
//! `goto L` is rewritten to it.

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use hashbrown::HashMap;
use log::debug;
use smallvec::SmallVec;

use crate::errors::{Diagnostic, Phase, Result};
use crate::infer::eval_const;
use crate::source::{Loc, SourceMap};
use crate::symbol::{Interner, Symbol};
use crate::types::ast::{
  BlockItem, Decl, DeclKind, DeclP, FnDecl, Program, Stmt, StmtKind, StmtP, SwitchCase,
};

/// Resolve all control-flow labels in `prog`.
pub fn run<'a>(
  arena: &'a Bump, map: &SourceMap, names: &mut Interner, prog: &Program<'a>,
) -> Result<Program<'a>> {
  let mut decls = BumpVec::new_in(arena);
  for &decl in prog.decls {
    decls.push(match decl.kind {
      DeclKind::Fn(f) if f.body.is_some() => {
        let mut l = Labeler {
          arena, map,
          names: &mut *names,
          func: f.name,
          frames: SmallVec::new(),
          user_labels: HashMap::new(),
        };
        l.function(decl, f)?
      }
      _ => decl,
    });
  }
  Ok(Program { decls: decls.into_bump_slice() })
}

/// An enclosing construct that `break`/`continue` can target. A switch
/// frame also accumulates the case list of its body.
enum Frame {
  Loop(Symbol),
  Switch { label: Symbol, cases: Vec<SwitchCase>, has_default: bool },
}

struct Labeler<'a, 'c> {
  arena: &'a Bump,
  map: &'c SourceMap,
  names: &'c mut Interner,
  func: Symbol,
  frames: SmallVec<[Frame; 8]>,
  /// User labels defined in this function, by source name.
  user_labels: HashMap<Symbol, Loc>,
}

impl<'a> Labeler<'a, '_> {
  fn err(&self, loc: Loc, msg: impl Into<String>) -> Diagnostic {
    Diagnostic::new(self.map, Phase::Label, loc, msg)
  }

  fn function(&mut self, decl: DeclP<'a>, f: FnDecl<'a>) -> Result<DeclP<'a>> {
    let body = f.body.expect("checked by caller");
    let body = self.stmt(body)?;
    debug!("labeled `{}`: {} user labels", self.names.resolve(self.func), self.user_labels.len());
    let body = self.resolve_gotos(body)?;
    let kind = DeclKind::Fn(FnDecl { body: Some(body), ..f });
    Ok(&*self.arena.alloc(Decl { kind, loc: decl.loc }))
  }

  // phase 1: loops, switches, break/continue, case collection

  fn block_items(&mut self, items: &'a [BlockItem<'a>]) -> Result<&'a [BlockItem<'a>]> {
    let mut out = BumpVec::new_in(self.arena);
    for &item in items {
      out.push(match item {
        BlockItem::Stmt(s) => BlockItem::Stmt(self.stmt(s)?),
        BlockItem::Decl(d) => BlockItem::Decl(d),
      });
    }
    Ok(out.into_bump_slice())
  }

  fn stmt(&mut self, s: StmtP<'a>) -> Result<StmtP<'a>> {
    let kind = match s.kind {
      StmtKind::Break { .. } => {
        let label = match self.frames.last() {
          Some(Frame::Loop(l)) => *l,
          Some(Frame::Switch { label, .. }) => *label,
          None => return Err(self.err(s.loc, "break outside of loop or switch")),
        };
        StmtKind::Break { label: Some(label) }
      }
      StmtKind::Continue { .. } => {
        let label = self.frames.iter().rev().find_map(|f| match f {
          Frame::Loop(l) => Some(*l),
          Frame::Switch { .. } => None,
        });
        match label {
          Some(label) => StmtKind::Continue { label: Some(label) },
          None => return Err(self.err(s.loc, "continue outside of loop")),
        }
      }
      StmtKind::While { cond, body, .. } => {
        let label = self.names.fresh_label(self.func, "loop");
        self.frames.push(Frame::Loop(label));
        let body = self.stmt(body)?;
        self.frames.pop();
        StmtKind::While { cond, body, label: Some(label) }
      }
      StmtKind::DoWhile { body, cond, .. } => {
        let label = self.names.fresh_label(self.func, "loop");
        self.frames.push(Frame::Loop(label));
        let body = self.stmt(body)?;
        self.frames.pop();
        StmtKind::DoWhile { body, cond, label: Some(label) }
      }
      StmtKind::For { init, cond, step, body, .. } => {
        let label = self.names.fresh_label(self.func, "loop");
        self.frames.push(Frame::Loop(label));
        let body = self.stmt(body)?;
        self.frames.pop();
        StmtKind::For { init, cond, step, body, label: Some(label) }
      }
      StmtKind::Switch { cond, body, .. } => {
        let label = self.names.fresh_label(self.func, "switch");
        self.frames.push(Frame::Switch { label, cases: Vec::new(), has_default: false });
        let body = self.stmt(body)?;
        let Some(Frame::Switch { cases, .. }) = self.frames.pop() else { unreachable!() };
        StmtKind::Switch {
          cond, body, label: Some(label),
          cases: self.arena.alloc_slice_copy(&cases),
        }
      }
      StmtKind::Case { value, body, .. } => {
        let folded = eval_const(value)
          .ok_or_else(|| self.err(value.loc, "case value is not a constant"))?;
        let value_bits = folded.bits as i64;
        let label = self.names.fresh_label(self.func, "case");
        let switch = self.frames.iter_mut().rev().find_map(|f| match f {
          Frame::Switch { cases, has_default, .. } => Some((cases, has_default)),
          Frame::Loop(_) => None,
        });
        let Some((cases, _)) = switch else {
          return Err(self.err(s.loc, "case outside of switch"))
        };
        if cases.iter().any(|c| c.value == Some(value_bits)) {
          return Err(self.err(s.loc, format!("duplicate case value `{value_bits}`")))
        }
        cases.push(SwitchCase { value: Some(value_bits), label });
        let body = self.stmt(body)?;
        StmtKind::Case { value, body, label: Some(label) }
      }
      StmtKind::Default { body, .. } => {
        let label = self.names.fresh_label(self.func, "default");
        let switch = self.frames.iter_mut().rev().find_map(|f| match f {
          Frame::Switch { cases, has_default, .. } => Some((cases, has_default)),
          Frame::Loop(_) => None,
        });
        let Some((cases, has_default)) = switch else {
          return Err(self.err(s.loc, "default outside of switch"))
        };
        if *has_default {
          return Err(self.err(s.loc, "multiple default labels in one switch"))
        }
        *has_default = true;
        cases.push(SwitchCase { value: None, label });
        let body = self.stmt(body)?;
        StmtKind::Default { body, label: Some(label) }
      }
      StmtKind::Labeled { name, body, .. } => {
        if self.user_labels.insert(name, s.loc).is_some() {
          return Err(self.err(s.loc,
            format!("duplicate label `{}`", self.names.resolve(name))))
        }
        let label = self.names.user_label(self.func, name);
        StmtKind::Labeled { name, label: Some(label), body: self.stmt(body)? }
      }
      StmtKind::If { cond, then, els } => StmtKind::If {
        cond,
        then: self.stmt(then)?,
        els: els.map(|e| self.stmt(e)).transpose()?,
      },
      StmtKind::Compound(items) => StmtKind::Compound(self.block_items(items)?),
      kind @ (StmtKind::Return(_) | StmtKind::Expr(_) | StmtKind::Goto { .. }
        | StmtKind::Null) => kind,
    };
    Ok(&*self.arena.alloc(Stmt { kind, loc: s.loc }))
  }

  // phase 2: goto resolution

  fn resolve_gotos(&mut self, s: StmtP<'a>) -> Result<StmtP<'a>> {
    let kind = match s.kind {
      StmtKind::Goto { name, .. } => {
        if !self.user_labels.contains_key(&name) {
          return Err(self.err(s.loc,
            format!("goto to undefined label `{}`", self.names.resolve(name))))
        }
        StmtKind::Goto { name, label: Some(self.names.user_label(self.func, name)) }
      }
      StmtKind::Labeled { name, label, body } =>
        StmtKind::Labeled { name, label, body: self.resolve_gotos(body)? },
      StmtKind::If { cond, then, els } => StmtKind::If {
        cond,
        then: self.resolve_gotos(then)?,
        els: els.map(|e| self.resolve_gotos(e)).transpose()?,
      },
      StmtKind::Compound(items) => {
        let mut out = BumpVec::new_in(self.arena);
        for &item in items {
          out.push(match item {
            BlockItem::Stmt(s) => BlockItem::Stmt(self.resolve_gotos(s)?),
            BlockItem::Decl(d) => BlockItem::Decl(d),
          });
        }
        StmtKind::Compound(out.into_bump_slice())
      }
      StmtKind::While { cond, body, label } =>
        StmtKind::While { cond, body: self.resolve_gotos(body)?, label },
      StmtKind::DoWhile { body, cond, label } =>
        StmtKind::DoWhile { body: self.resolve_gotos(body)?, cond, label },
      StmtKind::For { init, cond, step, body, label } =>
        StmtKind::For { init, cond, step, body: self.resolve_gotos(body)?, label },
      StmtKind::Switch { cond, body, label, cases } =>
        StmtKind::Switch { cond, body: self.resolve_gotos(body)?, label, cases },
      StmtKind::Case { value, body, label } =>
        StmtKind::Case { value, body: self.resolve_gotos(body)?, label },
      StmtKind::Default { body, label } =>
        StmtKind::Default { body: self.resolve_gotos(body)?, label },
      kind @ (StmtKind::Return(_) | StmtKind::Expr(_) | StmtKind::Break { .. }
        | StmtKind::Continue { .. } | StmtKind::Null) => kind,
    };
    Ok(&*self.arena.alloc(Stmt { kind, loc: s.loc }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{lexer, parser, resolve};

  fn label_src<R>(text: &str, f: impl FnOnce(&Interner, Result<Program<'_>>) -> R) -> R {
    let map = SourceMap::new("t.c", text);
    let mut names = Interner::new();
    let tokens = lexer::tokenize(&map, &mut names).expect("lex error");
    let arena = Bump::new();
    let prog = parser::parse(&arena, &map, &tokens).expect("parse error");
    let prog = resolve::run(&arena, &map, &mut names, &prog).expect("resolve error");
    let res = run(&arena, &map, &mut names, &prog);
    f(&names, res)
  }

  fn body_items<'a>(prog: &Program<'a>) -> &'a [BlockItem<'a>] {
    let DeclKind::Fn(f) = prog.decls[0].kind else { panic!("expected fn") };
    let StmtKind::Compound(items) = f.body.expect("body").kind else { panic!("block") };
    items
  }

  #[test]
  fn break_and_continue_target_innermost() {
    let src = "
      int main(void) {
        while (1) {
          switch (2) { case 1: break; }
          if (3) continue;
          break;
        }
        return 0;
      }";
    label_src(src, |names, res| {
      let prog = res.expect("label error");
      let BlockItem::Stmt(w) = body_items(&prog)[0] else { panic!() };
      let StmtKind::While { body, label, .. } = w.kind else { panic!() };
      let loop_label = label.unwrap();
      assert!(names.resolve(loop_label).starts_with("main.loop."));
      let StmtKind::Compound(items) = body.kind else { panic!() };
      // the break inside the switch targets the switch
      let BlockItem::Stmt(sw) = items[0] else { panic!() };
      let StmtKind::Switch { body: sw_body, label: sw_label, cases, .. } = sw.kind else { panic!() };
      assert!(names.resolve(sw_label.unwrap()).starts_with("main.switch."));
      assert_eq!(cases.len(), 1);
      assert_eq!(cases[0].value, Some(1));
      let StmtKind::Case { body: case_body, .. } = sw_body.kind else { panic!() };
      let StmtKind::Break { label } = case_body.kind else { panic!() };
      assert_eq!(label.unwrap(), sw_label.unwrap());
      // the continue targets the loop
      let BlockItem::Stmt(iff) = items[1] else { panic!() };
      let StmtKind::If { then, .. } = iff.kind else { panic!() };
      let StmtKind::Continue { label } = then.kind else { panic!() };
      assert_eq!(label.unwrap(), loop_label);
      // the trailing break targets the loop
      let BlockItem::Stmt(brk) = items[2] else { panic!() };
      let StmtKind::Break { label } = brk.kind else { panic!() };
      assert_eq!(label.unwrap(), loop_label);
    });
  }

  #[test]
  fn switch_collects_cases_and_default() {
    let src = "
      int main(void) {
        switch (2) {
          case 1: return 10;
          case 1 + 1: return 20;
          default: return 30;
        }
        return 0;
      }";
    label_src(src, |_, res| {
      let prog = res.expect("label error");
      let BlockItem::Stmt(sw) = body_items(&prog)[0] else { panic!() };
      let StmtKind::Switch { cases, .. } = sw.kind else { panic!() };
      assert_eq!(cases.len(), 3);
      assert_eq!(cases[0].value, Some(1));
      assert_eq!(cases[1].value, Some(2), "case value is constant-folded");
      assert_eq!(cases[2].value, None);
    });
  }

  #[test]
  fn control_flow_errors() {
    label_src("int main(void) { break; }", |_, res| {
      let err = res.unwrap_err();
      assert_eq!(err.phase, Phase::Label);
      assert!(err.message.contains("break outside"), "{err}");
    });
    label_src("int main(void) { continue; }", |_, res| {
      assert!(res.unwrap_err().message.contains("continue outside"));
    });
    label_src("int main(void) { switch (1) { continue; } return 0; }", |_, res| {
      assert!(res.unwrap_err().message.contains("continue outside"));
    });
    label_src("int main(void) { case 1: return 0; }", |_, res| {
      assert!(res.unwrap_err().message.contains("case outside"));
    });
    label_src("int main(void) { switch (1) { case 2: case 1 + 1: return 0; } }", |_, res| {
      assert!(res.unwrap_err().message.contains("duplicate case"));
    });
    label_src("int main(void) { switch (1) { default: default: return 0; } }", |_, res| {
      assert!(res.unwrap_err().message.contains("multiple default"));
    });
    label_src("int x; int main(void) { switch (1) { case x: return 0; } }", |_, res| {
      assert!(res.unwrap_err().message.contains("not a constant"));
    });
  }

  #[test]
  fn goto_resolution() {
    let src = "
      int main(void) {
        int i = 0;
        top: i = i + 1;
        if (i < 3) goto top;
        return i;
      }";
    label_src(src, |names, res| {
      let prog = res.expect("label error");
      let items = body_items(&prog);
      let BlockItem::Stmt(lab) = items[1] else { panic!() };
      let StmtKind::Labeled { label, .. } = lab.kind else { panic!() };
      assert_eq!(names.resolve(label.unwrap()), "main.user.top");
      let BlockItem::Stmt(iff) = items[2] else { panic!() };
      let StmtKind::If { then, .. } = iff.kind else { panic!() };
      let StmtKind::Goto { label, .. } = then.kind else { panic!() };
      assert_eq!(names.resolve(label.unwrap()), "main.user.top");
    });
    label_src("int main(void) { goto nowhere; return 0; }", |_, res| {
      assert!(res.unwrap_err().message.contains("undefined label"));
    });
    label_src("int main(void) { x: x: return 0; }", |_, res| {
      assert!(res.unwrap_err().message.contains("duplicate label"));
    });
  }
}
