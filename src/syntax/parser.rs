use beef::lean::Cow;

use super::ast::{Expr, Function, Ident, Member, ObjectLit, Top};
use super::lexer::{Lexer, Span, TokenKind};
use crate::error::{Result, SyntaxError};

/// Parse a whole program.
pub fn parse(src: &str) -> Result<Top<'_>> {
  let mut parser = Parser {
    src,
    lex: Lexer::new(src),
  };
  parser.top()
}

struct Parser<'src> {
  src: &'src str,
  lex: Lexer<'src>,
}

impl<'src> Parser<'src> {
  fn top(&mut self) -> Result<Top<'src>> {
    let mut exprs = vec![];
    if !self.at(TokenKind::Eof) {
      loop {
        exprs.push(self.expr()?);
        if self.at(TokenKind::Eof) {
          break;
        }
        self.expect(TokenKind::Semicolon)?;
        if self.at(TokenKind::Eof) {
          break;
        }
      }
    }
    Ok(Top { exprs })
  }

  fn expr(&mut self) -> Result<Expr<'src>> {
    match self.lex.current().kind {
      TokenKind::Let => {
        self.lex.bump();
        let name = self.ident()?;
        self.expect(TokenKind::Equal)?;
        let value = Box::new(self.expr()?);
        Ok(Expr::Let { name, value })
      }
      TokenKind::Function => {
        self.lex.bump();
        if self.at(TokenKind::Ident) {
          // `function f(a, b) -> body` is sugar for `let f = function ...`
          let name = self.ident()?;
          let function = self.function_tail()?;
          Ok(Expr::Let {
            name,
            value: Box::new(function),
          })
        } else {
          self.function_tail()
        }
      }
      _ => self.assignment(),
    }
  }

  fn function_tail(&mut self) -> Result<Expr<'src>> {
    self.expect(TokenKind::ParenL)?;
    let mut params = vec![];
    if !self.eat(TokenKind::ParenR) {
      loop {
        params.push(self.ident()?);
        if self.eat(TokenKind::ParenR) {
          break;
        }
        self.expect(TokenKind::Comma)?;
      }
    }
    self.expect(TokenKind::Arrow)?;
    let body = self.expr()?;
    Ok(Expr::Function(Box::new(Function { params, body })))
  }

  fn assignment(&mut self) -> Result<Expr<'src>> {
    let target = self.disjunction()?;
    if !self.eat(TokenKind::Equal) {
      return Ok(target);
    }
    let value = Box::new(self.expr()?);
    match target {
      Expr::Variable(name) => Ok(Expr::Assign { name, value }),
      Expr::FieldAccess { object, field } => Ok(Expr::FieldAssign {
        object,
        field,
        value,
      }),
      Expr::Index { object, index } => Ok(Expr::IndexAssign {
        object,
        index,
        value,
      }),
      _ => Err(self.error("invalid assignment target")),
    }
  }

  fn disjunction(&mut self) -> Result<Expr<'src>> {
    let mut lhs = self.conjunction()?;
    while self.at(TokenKind::Pipe) {
      lhs = self.desugar_operator(lhs, Self::conjunction)?;
    }
    Ok(lhs)
  }

  fn conjunction(&mut self) -> Result<Expr<'src>> {
    let mut lhs = self.comparison()?;
    while self.at(TokenKind::Amp) {
      lhs = self.desugar_operator(lhs, Self::comparison)?;
    }
    Ok(lhs)
  }

  fn comparison(&mut self) -> Result<Expr<'src>> {
    let mut lhs = self.term()?;
    while matches!(
      self.lex.current().kind,
      TokenKind::EqualEqual
        | TokenKind::BangEqual
        | TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual
    ) {
      lhs = self.desugar_operator(lhs, Self::term)?;
    }
    Ok(lhs)
  }

  fn term(&mut self) -> Result<Expr<'src>> {
    let mut lhs = self.factor()?;
    while matches!(self.lex.current().kind, TokenKind::Plus | TokenKind::Minus) {
      lhs = self.desugar_operator(lhs, Self::factor)?;
    }
    Ok(lhs)
  }

  fn factor(&mut self) -> Result<Expr<'src>> {
    let mut lhs = self.postfix()?;
    while matches!(
      self.lex.current().kind,
      TokenKind::Star | TokenKind::Slash | TokenKind::Percent
    ) {
      lhs = self.desugar_operator(lhs, Self::postfix)?;
    }
    Ok(lhs)
  }

  /// Consume the operator at the cursor and the right operand, producing
  /// the method-call form both backends execute.
  fn desugar_operator(
    &mut self,
    lhs: Expr<'src>,
    operand: fn(&mut Self) -> Result<Expr<'src>>,
  ) -> Result<Expr<'src>> {
    let name = self.lex.current().kind.operator().expect("caller checked");
    self.lex.bump();
    let rhs = operand(self)?;
    Ok(Expr::MethodCall {
      object: Box::new(lhs),
      name: Cow::borrowed(name),
      args: vec![rhs],
    })
  }

  fn postfix(&mut self) -> Result<Expr<'src>> {
    let mut expr = self.primary()?;
    loop {
      match self.lex.current().kind {
        TokenKind::Dot => {
          self.lex.bump();
          let kind = self.lex.current().kind;
          if kind == TokenKind::Ident {
            let name = self.ident()?;
            if self.at(TokenKind::ParenL) {
              let args = self.call_args()?;
              expr = Expr::MethodCall {
                object: Box::new(expr),
                name,
                args,
              };
            } else {
              expr = Expr::FieldAccess {
                object: Box::new(expr),
                field: name,
              };
            }
          } else if let Some(name) = kind.operator() {
            self.lex.bump();
            if !self.at(TokenKind::ParenL) {
              return Err(self.error("expected argument list after operator method name"));
            }
            let args = self.call_args()?;
            expr = Expr::MethodCall {
              object: Box::new(expr),
              name: Cow::borrowed(name),
              args,
            };
          } else {
            return Err(self.error("expected field or method name after `.`"));
          }
        }
        TokenKind::ParenL => {
          let args = self.call_args()?;
          expr = Expr::Call {
            callee: Box::new(expr),
            args,
          };
        }
        TokenKind::SquareL => {
          self.lex.bump();
          let index = Box::new(self.expr()?);
          self.expect(TokenKind::SquareR)?;
          expr = Expr::Index {
            object: Box::new(expr),
            index,
          };
        }
        _ => return Ok(expr),
      }
    }
  }

  fn primary(&mut self) -> Result<Expr<'src>> {
    let token = *self.lex.current();
    match token.kind {
      TokenKind::Int => {
        self.lex.bump();
        self.integer(self.lex.lexeme(&token), token.span)
      }
      TokenKind::Minus => {
        self.lex.bump();
        let token = *self.lex.current();
        if token.kind != TokenKind::Int {
          return Err(self.error("expected integer literal after `-`"));
        }
        self.lex.bump();
        let text = format!("-{}", self.lex.lexeme(&token));
        self.integer(&text, token.span)
      }
      TokenKind::True => {
        self.lex.bump();
        Ok(Expr::Boolean(true))
      }
      TokenKind::False => {
        self.lex.bump();
        Ok(Expr::Boolean(false))
      }
      TokenKind::Null => {
        self.lex.bump();
        Ok(Expr::Null)
      }
      TokenKind::Ident => {
        self.lex.bump();
        Ok(Expr::Variable(Cow::borrowed(self.lex.lexeme(&token))))
      }
      TokenKind::ParenL => {
        self.lex.bump();
        let inner = self.expr()?;
        self.expect(TokenKind::ParenR)?;
        Ok(inner)
      }
      TokenKind::Begin => {
        self.lex.bump();
        let mut exprs = vec![];
        if !self.eat(TokenKind::End) {
          loop {
            exprs.push(self.expr()?);
            if self.eat(TokenKind::End) {
              break;
            }
            self.expect(TokenKind::Semicolon)?;
            if self.eat(TokenKind::End) {
              break;
            }
          }
        }
        Ok(Expr::Block(exprs))
      }
      TokenKind::If => {
        self.lex.bump();
        let condition = Box::new(self.expr()?);
        self.expect(TokenKind::Then)?;
        let consequent = Box::new(self.expr()?);
        let alternative = if self.eat(TokenKind::Else) {
          Box::new(self.expr()?)
        } else {
          Box::new(Expr::Null)
        };
        Ok(Expr::If {
          condition,
          consequent,
          alternative,
        })
      }
      TokenKind::While => {
        self.lex.bump();
        let condition = Box::new(self.expr()?);
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.expr()?);
        Ok(Expr::While { condition, body })
      }
      TokenKind::Object => {
        self.lex.bump();
        let extends = if self.eat(TokenKind::Extends) {
          self.expr()?
        } else {
          Expr::Null
        };
        self.expect(TokenKind::CurlyL)?;
        let mut members = vec![];
        if !self.eat(TokenKind::CurlyR) {
          loop {
            members.push(self.member()?);
            if self.eat(TokenKind::CurlyR) {
              break;
            }
            self.expect(TokenKind::Semicolon)?;
            if self.eat(TokenKind::CurlyR) {
              break;
            }
          }
        }
        Ok(Expr::Object(Box::new(ObjectLit { extends, members })))
      }
      TokenKind::SquareL => {
        self.lex.bump();
        let size = Box::new(self.expr()?);
        self.expect(TokenKind::Semicolon)?;
        let init = Box::new(self.expr()?);
        self.expect(TokenKind::SquareR)?;
        Ok(Expr::Array { size, init })
      }
      TokenKind::Print => {
        self.lex.bump();
        self.expect(TokenKind::ParenL)?;
        let format = self.string()?;
        let mut args = vec![];
        while self.eat(TokenKind::Comma) {
          args.push(self.expr()?);
        }
        self.expect(TokenKind::ParenR)?;
        Ok(Expr::Print { format, args })
      }
      TokenKind::Function => {
        // anonymous functions nest anywhere an expression does
        self.lex.bump();
        self.function_tail()
      }
      TokenKind::Str => Err(self.error("string literals may only appear as print formats")),
      kind => Err(self.error(format!("unexpected {}", kind.name()))),
    }
  }

  /// An object member: a field or method definition.
  fn member(&mut self) -> Result<Member<'src>> {
    match self.lex.current().kind {
      TokenKind::Let => {
        self.lex.bump();
        let name = self.ident()?;
        self.expect(TokenKind::Equal)?;
        let value = self.expr()?;
        Ok(Member { name, value })
      }
      TokenKind::Function => {
        self.lex.bump();
        let name = self.ident()?;
        let value = self.function_tail()?;
        Ok(Member { name, value })
      }
      kind => Err(self.error(format!(
        "expected `let` or `function` member, found {}",
        kind.name()
      ))),
    }
  }

  fn integer(&self, text: &str, span: Span) -> Result<Expr<'src>> {
    match text.parse::<i32>() {
      Ok(v) => Ok(Expr::Integer(v)),
      Err(_) => Err(self.error_at(span, "integer literal out of range")),
    }
  }

  fn ident(&mut self) -> Result<Ident<'src>> {
    let token = *self.lex.current();
    if token.kind != TokenKind::Ident {
      return Err(self.error(format!("expected identifier, found {}", token.kind.name())));
    }
    self.lex.bump();
    Ok(Cow::borrowed(self.lex.lexeme(&token)))
  }

  /// A string literal with its quotes stripped. Escape sequences are kept
  /// verbatim; `print` interprets them at output time.
  fn string(&mut self) -> Result<Ident<'src>> {
    let token = *self.lex.current();
    if token.kind != TokenKind::Str {
      return Err(self.error(format!(
        "expected string literal, found {}",
        token.kind.name()
      )));
    }
    self.lex.bump();
    let lexeme = self.lex.lexeme(&token);
    Ok(Cow::borrowed(&lexeme[1..lexeme.len() - 1]))
  }

  fn call_args(&mut self) -> Result<Vec<Expr<'src>>> {
    self.expect(TokenKind::ParenL)?;
    let mut args = vec![];
    if !self.eat(TokenKind::ParenR) {
      loop {
        args.push(self.expr()?);
        if self.eat(TokenKind::ParenR) {
          break;
        }
        self.expect(TokenKind::Comma)?;
      }
    }
    Ok(args)
  }

  fn at(&self, kind: TokenKind) -> bool {
    self.lex.current().kind == kind
  }

  fn eat(&mut self, kind: TokenKind) -> bool {
    if self.at(kind) {
      self.lex.bump();
      return true;
    }
    false
  }

  fn expect(&mut self, kind: TokenKind) -> Result<()> {
    if !self.eat(kind) {
      return Err(self.error(format!(
        "expected {}, found {}",
        kind.name(),
        self.lex.current().kind.name()
      )));
    }
    Ok(())
  }

  fn error(&self, message: impl Into<String>) -> crate::error::Error {
    self.error_at(self.lex.current().span, message)
  }

  fn error_at(&self, span: Span, message: impl Into<String>) -> crate::error::Error {
    let before = &self.src[..span.start.min(self.src.len())];
    let line = before.bytes().filter(|b| *b == b'\n').count() + 1;
    let column = before.len() - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
    SyntaxError {
      message: message.into(),
      line,
      column,
    }
    .into()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse_one(src: &str) -> Expr<'_> {
    let mut top = parse(src).unwrap();
    assert_eq!(top.exprs.len(), 1);
    top.exprs.remove(0)
  }

  #[test]
  fn operators_desugar_to_method_calls() {
    let expr = parse_one("1 + 2 * 3");
    let Expr::MethodCall { name, object, args } = expr else {
      panic!("expected method call");
    };
    assert_eq!(name.as_ref(), "+");
    assert!(matches!(*object, Expr::Integer(1)));
    assert!(matches!(&args[0], Expr::MethodCall { name, .. } if name.as_ref() == "*"));
  }

  #[test]
  fn dotted_operator_call() {
    let expr = parse_one("1.+(2)");
    assert!(matches!(
      expr,
      Expr::MethodCall { name, .. } if name.as_ref() == "+"
    ));
  }

  #[test]
  fn named_function_is_sugar_for_let() {
    let expr = parse_one("function f(x) -> x");
    let Expr::Let { name, value } = expr else {
      panic!("expected let");
    };
    assert_eq!(name.as_ref(), "f");
    assert!(matches!(*value, Expr::Function(_)));
  }

  #[test]
  fn assignment_targets() {
    assert!(matches!(parse_one("x = 1"), Expr::Assign { .. }));
    assert!(matches!(parse_one("o.f = 1"), Expr::FieldAssign { .. }));
    assert!(matches!(parse_one("a[0] = 1"), Expr::IndexAssign { .. }));
    assert!(parse("1 = 2").is_err());
  }

  #[test]
  fn object_literal_members() {
    let expr = parse_one("object extends null { let v = 5; function get() -> this.v }");
    let Expr::Object(obj) = expr else {
      panic!("expected object");
    };
    assert!(matches!(obj.extends, Expr::Null));
    assert_eq!(obj.members.len(), 2);
    assert_eq!(obj.members[0].name.as_ref(), "v");
    assert_eq!(obj.members[1].name.as_ref(), "get");
  }

  #[test]
  fn array_literal_and_indexing() {
    assert!(matches!(parse_one("[3; 0]"), Expr::Array { .. }));
    assert!(matches!(parse_one("a[1]"), Expr::Index { .. }));
  }

  #[test]
  fn if_without_else_defaults_to_null() {
    let Expr::If { alternative, .. } = parse_one("if true then 1") else {
      panic!("expected if");
    };
    assert!(matches!(*alternative, Expr::Null));
  }

  #[test]
  fn print_requires_a_format_string() {
    assert!(matches!(parse_one(r#"print("~\n", 1)"#), Expr::Print { .. }));
    assert!(parse("print(1)").is_err());
  }

  #[test]
  fn negative_literals_and_overflow() {
    assert!(matches!(parse_one("-2147483648"), Expr::Integer(i32::MIN)));
    assert!(parse("2147483648").is_err());
  }

  #[test]
  fn comments_are_skipped() {
    let top = parse("// line\n1; /* block */ 2").unwrap();
    assert_eq!(top.exprs.len(), 2);
  }

  #[test]
  fn string_outside_print_is_rejected() {
    assert!(parse(r#"let s = "nope""#).is_err());
  }

  #[test]
  fn empty_source_parses() {
    assert!(parse("").unwrap().exprs.is_empty());
  }
}
