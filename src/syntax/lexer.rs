use std::ops::Range;

use logos::Logos;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
  pub start: usize,
  pub end: usize,
}

impl From<Span> for Range<usize> {
  fn from(span: Span) -> Self {
    span.start..span.end
  }
}

#[derive(Clone, Copy, Debug)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
}

/// Streaming lexer: `current` is the lookahead, `bump` advances.
pub struct Lexer<'src> {
  src: &'src str,
  inner: logos::Lexer<'src, TokenKind>,
  current: Token,
}

impl<'src> Lexer<'src> {
  pub fn new(src: &'src str) -> Self {
    let mut lex = Self {
      src,
      inner: TokenKind::lexer(src),
      current: Token {
        kind: TokenKind::Eof,
        span: Span { start: 0, end: 0 },
      },
    };
    lex.bump();
    lex
  }

  #[inline]
  pub fn current(&self) -> &Token {
    &self.current
  }

  #[inline]
  pub fn lexeme(&self, token: &Token) -> &'src str {
    &self.src[Range::from(token.span)]
  }

  pub fn bump(&mut self) {
    self.current = match self.inner.next() {
      Some(kind) => Token {
        kind,
        span: Span {
          start: self.inner.span().start,
          end: self.inner.span().end,
        },
      },
      None => Token {
        kind: TokenKind::Eof,
        span: Span {
          start: self.src.len(),
          end: self.src.len(),
        },
      },
    };
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Logos)]
pub enum TokenKind {
  // Keywords
  #[token("let")]
  Let,
  #[token("function")]
  Function,
  #[token("if")]
  If,
  #[token("then")]
  Then,
  #[token("else")]
  Else,
  #[token("while")]
  While,
  #[token("do")]
  Do,
  #[token("object")]
  Object,
  #[token("extends")]
  Extends,
  #[token("begin")]
  Begin,
  #[token("end")]
  End,
  #[token("print")]
  Print,
  #[token("null")]
  Null,
  #[token("true")]
  True,
  #[token("false")]
  False,

  // Brackets
  #[token("(")]
  ParenL,
  #[token(")")]
  ParenR,
  #[token("[")]
  SquareL,
  #[token("]")]
  SquareR,
  #[token("{")]
  CurlyL,
  #[token("}")]
  CurlyR,

  // Punctuation
  #[token(".")]
  Dot,
  #[token(",")]
  Comma,
  #[token(";")]
  Semicolon,
  #[token("->")]
  Arrow,
  #[token("=")]
  Equal,

  // Operators, all of which are also method names
  #[token("==")]
  EqualEqual,
  #[token("!=")]
  BangEqual,
  #[token("<")]
  Less,
  #[token("<=")]
  LessEqual,
  #[token(">")]
  Greater,
  #[token(">=")]
  GreaterEqual,
  #[token("+")]
  Plus,
  #[token("-")]
  Minus,
  #[token("*")]
  Star,
  #[token("/")]
  Slash,
  #[token("%")]
  Percent,
  #[token("&")]
  Amp,
  #[token("|")]
  Pipe,

  // Literals
  #[regex("[0-9]+")]
  Int,
  #[regex(r#""([^"\\]|\\.)*""#)]
  Str,
  #[regex("[a-zA-Z_][a-zA-Z0-9_]*")]
  Ident,

  /// Produced by the wrapper once the source is exhausted.
  Eof,

  #[regex(r"[ \t\r\n\f]+", logos::skip)]
  #[regex(r"//[^\n]*", logos::skip)]
  #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
  #[error]
  Error,
}

impl TokenKind {
  /// The operator spelling, when this token doubles as a method name.
  pub fn operator(self) -> Option<&'static str> {
    let name = match self {
      TokenKind::EqualEqual => "==",
      TokenKind::BangEqual => "!=",
      TokenKind::Less => "<",
      TokenKind::LessEqual => "<=",
      TokenKind::Greater => ">",
      TokenKind::GreaterEqual => ">=",
      TokenKind::Plus => "+",
      TokenKind::Minus => "-",
      TokenKind::Star => "*",
      TokenKind::Slash => "/",
      TokenKind::Percent => "%",
      TokenKind::Amp => "&",
      TokenKind::Pipe => "|",
      _ => return None,
    };
    Some(name)
  }

  pub fn name(self) -> &'static str {
    match self {
      TokenKind::Let => "`let`",
      TokenKind::Function => "`function`",
      TokenKind::If => "`if`",
      TokenKind::Then => "`then`",
      TokenKind::Else => "`else`",
      TokenKind::While => "`while`",
      TokenKind::Do => "`do`",
      TokenKind::Object => "`object`",
      TokenKind::Extends => "`extends`",
      TokenKind::Begin => "`begin`",
      TokenKind::End => "`end`",
      TokenKind::Print => "`print`",
      TokenKind::Null => "`null`",
      TokenKind::True => "`true`",
      TokenKind::False => "`false`",
      TokenKind::ParenL => "`(`",
      TokenKind::ParenR => "`)`",
      TokenKind::SquareL => "`[`",
      TokenKind::SquareR => "`]`",
      TokenKind::CurlyL => "`{`",
      TokenKind::CurlyR => "`}`",
      TokenKind::Dot => "`.`",
      TokenKind::Comma => "`,`",
      TokenKind::Semicolon => "`;`",
      TokenKind::Arrow => "`->`",
      TokenKind::Equal => "`=`",
      TokenKind::EqualEqual => "`==`",
      TokenKind::BangEqual => "`!=`",
      TokenKind::Less => "`<`",
      TokenKind::LessEqual => "`<=`",
      TokenKind::Greater => "`>`",
      TokenKind::GreaterEqual => "`>=`",
      TokenKind::Plus => "`+`",
      TokenKind::Minus => "`-`",
      TokenKind::Star => "`*`",
      TokenKind::Slash => "`/`",
      TokenKind::Percent => "`%`",
      TokenKind::Amp => "`&`",
      TokenKind::Pipe => "`|`",
      TokenKind::Int => "integer literal",
      TokenKind::Str => "string literal",
      TokenKind::Ident => "identifier",
      TokenKind::Eof => "end of input",
      TokenKind::Error => "unrecognized character",
    }
  }
}
