use beef::lean::Cow;
use indexmap::IndexMap;

use super::opcode::Opcode;
use super::Program;
use crate::error::{CompileError, Result};
use crate::pool::ConstPool;
use crate::syntax::ast::{Expr, Top};
use crate::value::{layout, ValueKind};

pub const MAX_FUN_NUM: usize = 1024;
pub const MAX_FUN_BODY_SZ: usize = 1024 * 1024;
pub const MAX_VARS: usize = 256;
pub const MAX_SCOPES: usize = 256;
pub const MAX_FIXUPS_NUM: usize = 64;

/// Lower a program to a constant pool, a globals table, and an entry-point
/// function.
pub fn compile(top: &Top<'_>) -> Result<Program> {
  let mut compiler = Compiler::new();
  let entry = compiler.compile_top(top)?;
  Ok(Program {
    pool: compiler.pool,
    globals: compiler.globals,
    entry,
  })
}

/// Key for constant deduplication: structurally equal constants share one
/// pool slot.
#[derive(Hash, PartialEq, Eq)]
enum ConstKey {
  Null,
  Bool(bool),
  Int(i32),
  Str(String),
}

struct Variable<'src> {
  name: Cow<'src, str>,
  /// Local slot for locals, constant-pool index of the name for globals.
  index: u16,
}

struct Scope<'src> {
  vars: Vec<Variable<'src>>,
}

/// A forward reference to a global that was not yet defined when its use
/// site was emitted. `offset` addresses the placeholder operand relative
/// to the start of the owning function's record; `fun` is that function's
/// constant-pool index, filled in at its epilogue.
pub(crate) struct Reloc {
  pub fun: u16,
  pub offset: usize,
  pub name: String,
  pub fixed: bool,
}

/// Staging state for one function under compilation. The buffer holds the
/// whole record (tag and header included) so the blank locals/length
/// fields can be patched in place at the epilogue.
struct FunBuilder<'src> {
  code: Vec<u8>,
  scopes: Vec<Scope<'src>>,
  /// Next free local slot. Rewound when a scope is left so sibling scopes
  /// reuse the same slots.
  current_var: u16,
  /// High-water mark of `current_var`; becomes the `locals` header field.
  locals: u16,
  relocs: Vec<Reloc>,
}

struct Compiler<'src> {
  pool: ConstPool,
  consts: IndexMap<ConstKey, u16>,
  globals: Vec<u16>,
  globals_by_name: IndexMap<String, u16>,
  /// Stack of functions being compiled; index 0 is the entry point.
  funs: Vec<FunBuilder<'src>>,
  /// Relocations of functions that already reached their epilogue.
  relocs: Vec<Reloc>,
}

impl<'src> Compiler<'src> {
  fn new() -> Compiler<'src> {
    Compiler {
      pool: ConstPool::new(),
      consts: IndexMap::new(),
      globals: Vec::new(),
      globals_by_name: IndexMap::new(),
      funs: Vec::new(),
      relocs: Vec::new(),
    }
  }

  fn compile_top(&mut self, top: &Top<'src>) -> Result<u16> {
    self.fun_alloc(&[])?;
    for (i, expr) in top.exprs.iter().enumerate() {
      self.compile_expr(expr)?;
      if i + 1 < top.exprs.len() {
        self.emit_op(Opcode::Drop)?;
      }
    }
    let entry = self.fun_epilogue()?;
    self.final_fixup()?;
    Ok(entry)
  }

  /// Begin a new function: push a staging buffer, emit the record header
  /// with blank locals/length fields, and bring `this` plus the parameters
  /// into scope.
  fn fun_alloc(&mut self, params: &[Cow<'src, str>]) -> Result<()> {
    if self.funs.len() >= MAX_FUN_NUM {
      return Err(CompileError::TooManyFunctions.into());
    }
    // the receiver occupies slot 0, so the header counts it as a parameter
    if params.len() + 1 > u8::MAX as usize {
      return Err(CompileError::TooManyParameters.into());
    }
    let mut code = Vec::new();
    code.push(ValueKind::Function as u8);
    code.push(params.len() as u8 + 1);
    code.resize(layout::FUNC_BODY, 0);
    self.funs.push(FunBuilder {
      code,
      scopes: vec![Scope { vars: vec![] }],
      current_var: 0,
      locals: 0,
      relocs: vec![],
    });
    self.add_name_to_scope(Cow::borrowed("this"), 0)?;
    for param in params {
      let slot = self.fun().current_var;
      self.add_name_to_scope(param.clone(), slot)?;
    }
    Ok(())
  }

  /// Finish the current function: trailing return, patch the header, move
  /// the record into the pool, and stamp its relocations with the now
  /// known constant-pool index.
  fn fun_epilogue(&mut self) -> Result<u16> {
    self.emit_op(Opcode::Return)?;
    let mut fun = self.funs.pop().expect("fun_epilogue without fun_alloc");
    let body_len = (fun.code.len() - layout::FUNC_BODY) as u32;
    fun.code[layout::FUNC_LOCALS..layout::FUNC_LOCALS + 2]
      .copy_from_slice(&fun.locals.to_le_bytes());
    fun.code[layout::FUNC_LEN..layout::FUNC_LEN + 4].copy_from_slice(&body_len.to_le_bytes());
    let index = self.pool.push_record(&fun.code)?;
    for mut reloc in fun.relocs {
      reloc.fun = index;
      self.relocs.push(reloc);
    }
    Ok(index)
  }

  /// Resolve every remaining forward reference in one pass keyed by name.
  /// A name no global definition ever matched is defined here, lazily: its
  /// string goes into the pool, the index is registered as a global, and
  /// the runtime value stays null.
  fn final_fixup(&mut self) -> Result<()> {
    let mut relocs = std::mem::take(&mut self.relocs);
    for reloc in &mut relocs {
      let index = match self.globals_by_name.get(reloc.name.as_str()) {
        Some(index) => *index,
        None => {
          let index = self.const_str(&reloc.name)?;
          self.register_global(&reloc.name, index);
          index
        }
      };
      let record = self.pool.addr(reloc.fun)?;
      self.pool.patch_u16(record + reloc.offset, index);
      reloc.fixed = true;
    }
    self.relocs = relocs;
    Ok(())
  }

  fn compile_expr(&mut self, expr: &Expr<'src>) -> Result<()> {
    match expr {
      Expr::Integer(v) => {
        let index = self.const_int(*v)?;
        self.emit_op(Opcode::Constant)?;
        self.emit_u16(index)
      }
      Expr::Boolean(v) => {
        let index = self.const_bool(*v)?;
        self.emit_op(Opcode::Constant)?;
        self.emit_u16(index)
      }
      Expr::Null => {
        let index = self.const_null()?;
        self.emit_op(Opcode::Constant)?;
        self.emit_u16(index)
      }
      Expr::Variable(name) => match self.resolve(name) {
        Some((index, true)) => {
          self.emit_op(Opcode::GetGlobal)?;
          self.emit_u16(index)
        }
        Some((index, false)) => {
          self.emit_op(Opcode::GetLocal)?;
          self.emit_u16(index)
        }
        None => {
          // unbound names denote globals defined later in the program
          self.emit_op(Opcode::GetGlobal)?;
          self.add_reloc(name)?;
          self.emit_u16(0)
        }
      },
      Expr::Let { name, value } => {
        self.compile_expr(value)?;
        let top_level = self.funs.len() == 1 && self.funs[0].scopes.len() == 1;
        if top_level {
          let index = self.const_str(name)?;
          self.emit_op(Opcode::SetGlobal)?;
          self.emit_u16(index)?;
          self.register_global(name, index);
          self.add_name_to_scope(name.clone(), index)
        } else {
          let slot = self.fun().current_var;
          self.emit_op(Opcode::SetLocal)?;
          self.emit_u16(slot)?;
          self.add_name_to_scope(name.clone(), slot)
        }
      }
      Expr::Assign { name, value } => {
        self.compile_expr(value)?;
        match self.resolve(name) {
          Some((index, true)) => {
            self.emit_op(Opcode::SetGlobal)?;
            self.emit_u16(index)
          }
          Some((index, false)) => {
            self.emit_op(Opcode::SetLocal)?;
            self.emit_u16(index)
          }
          None => {
            self.emit_op(Opcode::SetGlobal)?;
            self.add_reloc(name)?;
            self.emit_u16(0)
          }
        }
      }
      Expr::Function(function) => {
        self.fun_alloc(&function.params)?;
        self.compile_expr(&function.body)?;
        let index = self.fun_epilogue()?;
        // emitted after the epilogue, into the enclosing function
        self.emit_op(Opcode::Constant)?;
        self.emit_u16(index)
      }
      Expr::Call { callee, args } => {
        self.compile_expr(callee)?;
        for arg in args {
          self.compile_expr(arg)?;
        }
        self.emit_op(Opcode::CallFunction)?;
        self.emit_argc(args.len())
      }
      Expr::MethodCall { object, name, args } => {
        self.compile_expr(object)?;
        for arg in args {
          self.compile_expr(arg)?;
        }
        let index = self.const_str(name)?;
        self.emit_op(Opcode::CallMethod)?;
        self.emit_u16(index)?;
        // the receiver counts as an argument
        self.emit_argc(args.len() + 1)
      }
      Expr::FieldAccess { object, field } => {
        self.compile_expr(object)?;
        let index = self.const_str(field)?;
        self.emit_op(Opcode::GetField)?;
        self.emit_u16(index)
      }
      Expr::FieldAssign {
        object,
        field,
        value,
      } => {
        self.compile_expr(object)?;
        self.compile_expr(value)?;
        let index = self.const_str(field)?;
        self.emit_op(Opcode::SetField)?;
        self.emit_u16(index)
      }
      Expr::Index { object, index } => {
        self.compile_expr(object)?;
        self.compile_expr(index)?;
        let name = self.const_str("get")?;
        self.emit_op(Opcode::CallMethod)?;
        self.emit_u16(name)?;
        self.emit_argc(2)
      }
      Expr::IndexAssign {
        object,
        index,
        value,
      } => {
        self.compile_expr(object)?;
        self.compile_expr(index)?;
        self.compile_expr(value)?;
        let name = self.const_str("set")?;
        self.emit_op(Opcode::CallMethod)?;
        self.emit_u16(name)?;
        self.emit_argc(3)
      }
      Expr::Array { size, init } => self.compile_array(size, init),
      Expr::Object(object) => {
        self.compile_expr(&object.extends)?;
        for member in &object.members {
          self.compile_expr(&member.value)?;
        }
        let mut members = Vec::with_capacity(object.members.len());
        for member in &object.members {
          members.push(self.const_str(&member.name)?);
        }
        let index = self.pool.push_class(&members)?;
        self.emit_op(Opcode::Object)?;
        self.emit_u16(index)
      }
      Expr::Block(exprs) => {
        if exprs.is_empty() {
          let index = self.const_null()?;
          self.emit_op(Opcode::Constant)?;
          return self.emit_u16(index);
        }
        self.enter_block()?;
        for (i, expr) in exprs.iter().enumerate() {
          self.compile_expr(expr)?;
          if i + 1 < exprs.len() {
            self.emit_op(Opcode::Drop)?;
          }
        }
        self.leave_block();
        Ok(())
      }
      Expr::If {
        condition,
        consequent,
        alternative,
      } => {
        self.compile_expr(condition)?;
        self.emit_op(Opcode::Branch)?;
        self.emit_i16(3)?;
        let to_else = self.emit_jump(Opcode::Jump)?;
        self.enter_block()?;
        self.compile_expr(consequent)?;
        self.leave_block();
        let to_end = self.emit_jump(Opcode::Jump)?;
        self.patch_jump(to_else)?;
        self.enter_block()?;
        self.compile_expr(alternative)?;
        self.leave_block();
        self.patch_jump(to_end)
      }
      Expr::While { condition, body } => {
        // the leading null is the loop's value if the body never runs;
        // each iteration drops the previous value and leaves its own
        let index = self.const_null()?;
        self.emit_op(Opcode::Constant)?;
        self.emit_u16(index)?;
        let header = self.code_len();
        self.compile_expr(condition)?;
        self.emit_op(Opcode::Branch)?;
        self.emit_i16(3)?;
        let to_after = self.emit_jump(Opcode::Jump)?;
        self.emit_op(Opcode::Drop)?;
        self.enter_block()?;
        self.compile_expr(body)?;
        self.leave_block();
        self.emit_jump_back(Opcode::Jump, header)?;
        self.patch_jump(to_after)
      }
      Expr::Print { format, args } => {
        for arg in args {
          self.compile_expr(arg)?;
        }
        let index = self.const_str(format)?;
        self.emit_op(Opcode::Print)?;
        self.emit_u16(index)?;
        self.emit_argc(args.len())
      }
    }
  }

  /// `[size; init]`. A literal or plain-name initializer needs a single
  /// ARRAY instruction. Anything else must be re-evaluated per element, so
  /// the expression lowers to a synthesized fill loop over three hidden
  /// locals (array, iterator, size).
  fn compile_array(&mut self, size: &Expr<'src>, init: &Expr<'src>) -> Result<()> {
    if matches!(
      init,
      Expr::Integer(_) | Expr::Boolean(_) | Expr::Null | Expr::Variable(_)
    ) {
      self.compile_expr(size)?;
      self.compile_expr(init)?;
      return self.emit_op(Opcode::Array);
    }

    let fun = self.fun();
    if fun.current_var as usize + 3 > u16::MAX as usize {
      return Err(CompileError::TooManyVariables.into());
    }
    let s_arr = fun.current_var;
    let s_iter = fun.current_var + 1;
    let s_size = fun.current_var + 2;
    fun.current_var += 3;
    if fun.current_var > fun.locals {
      fun.locals = fun.current_var;
    }

    let null = self.const_null()?;
    let zero = self.const_int(0)?;
    let one = self.const_int(1)?;
    let lt = self.const_str("<")?;
    let set = self.const_str("set")?;
    let add = self.const_str("+")?;

    // array = [size; null], iterator = 0
    self.compile_expr(size)?;
    self.emit_op(Opcode::SetLocal)?;
    self.emit_u16(s_size)?;
    self.emit_op(Opcode::Constant)?;
    self.emit_u16(null)?;
    self.emit_op(Opcode::Array)?;
    self.emit_op(Opcode::SetLocal)?;
    self.emit_u16(s_arr)?;
    self.emit_op(Opcode::Drop)?;
    self.emit_op(Opcode::Constant)?;
    self.emit_u16(zero)?;
    self.emit_op(Opcode::SetLocal)?;
    self.emit_u16(s_iter)?;
    self.emit_op(Opcode::Drop)?;

    // while iterator < size do array[iterator] = init; iterator += 1
    let header = self.code_len();
    self.emit_op(Opcode::GetLocal)?;
    self.emit_u16(s_iter)?;
    self.emit_op(Opcode::GetLocal)?;
    self.emit_u16(s_size)?;
    self.emit_op(Opcode::CallMethod)?;
    self.emit_u16(lt)?;
    self.emit_argc(2)?;
    self.emit_op(Opcode::Branch)?;
    self.emit_i16(3)?;
    let to_after = self.emit_jump(Opcode::Jump)?;
    self.emit_op(Opcode::GetLocal)?;
    self.emit_u16(s_arr)?;
    self.emit_op(Opcode::GetLocal)?;
    self.emit_u16(s_iter)?;
    self.enter_block()?;
    self.compile_expr(init)?;
    self.leave_block();
    self.emit_op(Opcode::CallMethod)?;
    self.emit_u16(set)?;
    self.emit_argc(3)?;
    self.emit_op(Opcode::Drop)?;
    self.emit_op(Opcode::GetLocal)?;
    self.emit_u16(s_iter)?;
    self.emit_op(Opcode::Constant)?;
    self.emit_u16(one)?;
    self.emit_op(Opcode::CallMethod)?;
    self.emit_u16(add)?;
    self.emit_argc(2)?;
    self.emit_op(Opcode::SetLocal)?;
    self.emit_u16(s_iter)?;
    self.emit_op(Opcode::Drop)?;
    self.emit_jump_back(Opcode::Jump, header)?;
    self.patch_jump(to_after)?;

    // the loop's value is the array itself
    self.emit_op(Opcode::GetLocal)?;
    self.emit_u16(s_arr)?;
    self.fun().current_var -= 3;
    Ok(())
  }

  // Name resolution.

  /// Search the current function's scope stack, newest binding first, then
  /// the entry function's outermost scope. A name is a global iff it was
  /// found in that outermost scope.
  fn resolve(&self, name: &str) -> Option<(u16, bool)> {
    let fun = self.funs.last().expect("resolve outside a function");
    for (i, scope) in fun.scopes.iter().enumerate().rev() {
      for var in scope.vars.iter().rev() {
        if var.name.as_ref() == name {
          let is_global = self.funs.len() == 1 && i == 0;
          return Some((var.index, is_global));
        }
      }
    }
    if self.funs.len() > 1 {
      for var in self.funs[0].scopes[0].vars.iter().rev() {
        if var.name.as_ref() == name {
          return Some((var.index, true));
        }
      }
    }
    None
  }

  fn add_name_to_scope(&mut self, name: Cow<'src, str>, index: u16) -> Result<()> {
    let fun = self.fun();
    if fun.current_var == u16::MAX {
      return Err(CompileError::TooManyVariables.into());
    }
    let scope = fun.scopes.last_mut().expect("scope stack is never empty");
    if scope.vars.len() >= MAX_VARS {
      return Err(CompileError::TooManyVariables.into());
    }
    scope.vars.push(Variable { name, index });
    fun.current_var += 1;
    if fun.current_var > fun.locals {
      fun.locals = fun.current_var;
    }
    Ok(())
  }

  fn register_global(&mut self, name: &str, index: u16) {
    if !self.globals.contains(&index) {
      self.globals.push(index);
    }
    self.globals_by_name.insert(name.to_string(), index);
  }

  fn enter_block(&mut self) -> Result<()> {
    let fun = self.fun();
    if fun.scopes.len() >= MAX_SCOPES {
      return Err(CompileError::TooManyScopes.into());
    }
    fun.scopes.push(Scope { vars: vec![] });
    Ok(())
  }

  fn leave_block(&mut self) {
    let fun = self.fun();
    let scope = fun.scopes.pop().expect("leave_block without enter_block");
    // rewind so the next sibling scope reuses the departed slots
    fun.current_var -= scope.vars.len() as u16;
  }

  fn add_reloc(&mut self, name: &str) -> Result<()> {
    let fun = self.fun();
    if fun.relocs.len() >= MAX_FIXUPS_NUM {
      return Err(CompileError::TooManyFixups.into());
    }
    let offset = fun.code.len();
    fun.relocs.push(Reloc {
      fun: 0,
      offset,
      name: name.to_string(),
      fixed: false,
    });
    Ok(())
  }

  // Constant insertion with deduplication.

  fn const_int(&mut self, v: i32) -> Result<u16> {
    if let Some(index) = self.consts.get(&ConstKey::Int(v)) {
      return Ok(*index);
    }
    let index = self.pool.push_int(v)?;
    self.consts.insert(ConstKey::Int(v), index);
    Ok(index)
  }

  fn const_bool(&mut self, v: bool) -> Result<u16> {
    if let Some(index) = self.consts.get(&ConstKey::Bool(v)) {
      return Ok(*index);
    }
    let index = self.pool.push_bool(v)?;
    self.consts.insert(ConstKey::Bool(v), index);
    Ok(index)
  }

  fn const_null(&mut self) -> Result<u16> {
    if let Some(index) = self.consts.get(&ConstKey::Null) {
      return Ok(*index);
    }
    let index = self.pool.push_null()?;
    self.consts.insert(ConstKey::Null, index);
    Ok(index)
  }

  fn const_str(&mut self, s: &str) -> Result<u16> {
    if let Some(index) = self.consts.get(&ConstKey::Str(s.to_string())) {
      return Ok(*index);
    }
    let index = self.pool.push_str(s.as_bytes())?;
    self.consts.insert(ConstKey::Str(s.to_string()), index);
    Ok(index)
  }

  // Emission into the current staging buffer.

  fn fun(&mut self) -> &mut FunBuilder<'src> {
    self.funs.last_mut().expect("emit outside a function")
  }

  fn code_len(&self) -> usize {
    self.funs.last().expect("emit outside a function").code.len()
  }

  fn emit_u8(&mut self, byte: u8) -> Result<()> {
    let fun = self.fun();
    if fun.code.len() + 1 > MAX_FUN_BODY_SZ {
      return Err(CompileError::FunctionTooLarge.into());
    }
    fun.code.push(byte);
    Ok(())
  }

  fn emit_op(&mut self, op: Opcode) -> Result<()> {
    self.emit_u8(op as u8)
  }

  fn emit_u16(&mut self, v: u16) -> Result<()> {
    let fun = self.fun();
    if fun.code.len() + 2 > MAX_FUN_BODY_SZ {
      return Err(CompileError::FunctionTooLarge.into());
    }
    fun.code.extend_from_slice(&v.to_le_bytes());
    Ok(())
  }

  fn emit_i16(&mut self, v: i16) -> Result<()> {
    self.emit_u16(v as u16)
  }

  fn emit_argc(&mut self, argc: usize) -> Result<()> {
    if argc > u8::MAX as usize {
      return Err(CompileError::TooManyParameters.into());
    }
    self.emit_u8(argc as u8)
  }

  /// Emit a jump with a placeholder offset; returns the operand position
  /// for [`Self::patch_jump`].
  fn emit_jump(&mut self, op: Opcode) -> Result<usize> {
    self.emit_op(op)?;
    let at = self.code_len();
    self.emit_i16(0)?;
    Ok(at)
  }

  /// Point the placeholder at `at` to the current end of code. Offsets are
  /// relative to the instruction following the operand.
  fn patch_jump(&mut self, at: usize) -> Result<()> {
    let target = self.code_len();
    let offset = target as isize - (at + 2) as isize;
    let Ok(offset) = i16::try_from(offset) else {
      return Err(CompileError::JumpOutOfRange.into());
    };
    let fun = self.fun();
    fun.code[at..at + 2].copy_from_slice(&offset.to_le_bytes());
    Ok(())
  }

  fn emit_jump_back(&mut self, op: Opcode, target: usize) -> Result<()> {
    self.emit_op(op)?;
    let after = self.code_len() + 2;
    let offset = target as isize - after as isize;
    let Ok(offset) = i16::try_from(offset) else {
      return Err(CompileError::JumpOutOfRange.into());
    };
    self.emit_i16(offset)
  }
}
