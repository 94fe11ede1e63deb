/// Built-in methods on primitive and array receivers.
///
/// Method names arrive as strings; both interpreters lower the name to one
/// of these once per call and dispatch on `(receiver kind, builtin)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Le,
  Ge,
  Lt,
  Gt,
  Eq,
  Ne,
  And,
  Or,
  Get,
  Set,
}

impl Builtin {
  pub fn parse(name: &[u8]) -> Option<Builtin> {
    let builtin = match name {
      b"+" => Builtin::Add,
      b"-" => Builtin::Sub,
      b"*" => Builtin::Mul,
      b"/" => Builtin::Div,
      b"%" => Builtin::Rem,
      b"<=" => Builtin::Le,
      b">=" => Builtin::Ge,
      b"<" => Builtin::Lt,
      b">" => Builtin::Gt,
      b"==" => Builtin::Eq,
      b"!=" => Builtin::Ne,
      b"&" => Builtin::And,
      b"|" => Builtin::Or,
      b"get" => Builtin::Get,
      b"set" => Builtin::Set,
      _ => return None,
    };
    Some(builtin)
  }

  pub fn name(self) -> &'static str {
    match self {
      Builtin::Add => "+",
      Builtin::Sub => "-",
      Builtin::Mul => "*",
      Builtin::Div => "/",
      Builtin::Rem => "%",
      Builtin::Le => "<=",
      Builtin::Ge => ">=",
      Builtin::Lt => "<",
      Builtin::Gt => ">",
      Builtin::Eq => "==",
      Builtin::Ne => "!=",
      Builtin::And => "&",
      Builtin::Or => "|",
      Builtin::Get => "get",
      Builtin::Set => "set",
    }
  }
}
