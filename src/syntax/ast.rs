use beef::lean::Cow;

/// Identifiers and string literals borrow from the source text.
pub type Ident<'src> = Cow<'src, str>;

/// A whole program: the `;`-separated expressions at the top level.
#[cfg_attr(test, derive(Debug))]
pub struct Top<'src> {
  pub exprs: Vec<Expr<'src>>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Function<'src> {
  pub params: Vec<Ident<'src>>,
  pub body: Expr<'src>,
}

#[cfg_attr(test, derive(Debug))]
pub struct ObjectLit<'src> {
  /// The `extends` expression; `null` when omitted.
  pub extends: Expr<'src>,
  pub members: Vec<Member<'src>>,
}

#[cfg_attr(test, derive(Debug))]
pub struct Member<'src> {
  pub name: Ident<'src>,
  pub value: Expr<'src>,
}

/// Everything in FML is an expression; infix operators are desugared to
/// method calls by the parser, so neither backend knows about them.
#[cfg_attr(test, derive(Debug))]
pub enum Expr<'src> {
  Integer(i32),
  Boolean(bool),
  Null,
  Variable(Ident<'src>),
  Let {
    name: Ident<'src>,
    value: Box<Expr<'src>>,
  },
  Assign {
    name: Ident<'src>,
    value: Box<Expr<'src>>,
  },
  Function(Box<Function<'src>>),
  Call {
    callee: Box<Expr<'src>>,
    args: Vec<Expr<'src>>,
  },
  MethodCall {
    object: Box<Expr<'src>>,
    name: Ident<'src>,
    args: Vec<Expr<'src>>,
  },
  FieldAccess {
    object: Box<Expr<'src>>,
    field: Ident<'src>,
  },
  FieldAssign {
    object: Box<Expr<'src>>,
    field: Ident<'src>,
    value: Box<Expr<'src>>,
  },
  Index {
    object: Box<Expr<'src>>,
    index: Box<Expr<'src>>,
  },
  IndexAssign {
    object: Box<Expr<'src>>,
    index: Box<Expr<'src>>,
    value: Box<Expr<'src>>,
  },
  Array {
    size: Box<Expr<'src>>,
    init: Box<Expr<'src>>,
  },
  Object(Box<ObjectLit<'src>>),
  Block(Vec<Expr<'src>>),
  If {
    condition: Box<Expr<'src>>,
    consequent: Box<Expr<'src>>,
    alternative: Box<Expr<'src>>,
  },
  While {
    condition: Box<Expr<'src>>,
    body: Box<Expr<'src>>,
  },
  Print {
    format: Ident<'src>,
    args: Vec<Expr<'src>>,
  },
}
