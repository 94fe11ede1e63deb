use std::error::Error as StdError;
use std::fmt::Display;
use std::io;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All failures are fatal: the binary reports them on stderr and exits
/// nonzero. There is no recovery path anywhere in the runtime.
#[derive(Debug)]
pub enum Error {
  Syntax(SyntaxError),
  Compile(CompileError),
  Vm(VmError),
  /// No free span could satisfy an allocation, even after a collection.
  HeapExhausted { requested: usize, total: usize },
  /// A serialized program failed validation during deserialization.
  InvalidBytecode(String),
  Io(io::Error),
}

#[derive(Debug)]
pub struct SyntaxError {
  pub message: String,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug)]
pub enum CompileError {
  TooManyFunctions,
  TooManyVariables,
  TooManyScopes,
  TooManyFixups,
  TooManyParameters,
  FunctionTooLarge,
  JumpOutOfRange,
  TooManyConstants,
  ConstantPoolOverflow,
}

#[derive(Debug)]
pub enum VmError {
  IllegalOpcode(u8),
  UnexpectedEnd,
  OperandStackUnderflow,
  OperandStackOverflow,
  FrameStackOverflow,
  FrameUnderflow,
  InvalidConstant(u16),
  InvalidLocal(u16),
  NotAGlobal(u16),
  NotAFunction,
  NotAnObject,
  WrongArity { expected: usize, found: usize },
  FieldNotFound(String),
  UnknownMethod(String),
  TypeMismatch(String),
  DivisionByZero,
  IndexOutOfBounds { index: i32, size: usize },
  NegativeArraySize(i32),
  FormatArgumentCount,
}

impl Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::Syntax(e) => {
        write!(f, "syntax error: {} at line {}:{}", e.message, e.line, e.column)
      }
      Error::Compile(e) => {
        write!(f, "compile error: {e}")
      }
      Error::Vm(e) => {
        write!(f, "runtime error: {e}")
      }
      Error::HeapExhausted { requested, total } => {
        write!(f, "heap is full: requested {requested} bytes out of {total}")
      }
      Error::InvalidBytecode(e) => {
        write!(f, "invalid bytecode: {e}")
      }
      Error::Io(e) => {
        write!(f, "{e}")
      }
    }
  }
}

impl Display for CompileError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CompileError::TooManyFunctions => write!(f, "too many functions"),
      CompileError::TooManyVariables => write!(f, "too many variables in local scope"),
      CompileError::TooManyScopes => write!(f, "too many nested scopes"),
      CompileError::TooManyFixups => write!(f, "too many forward references"),
      CompileError::TooManyParameters => write!(f, "too many parameters"),
      CompileError::FunctionTooLarge => write!(f, "function body exceeds the size limit"),
      CompileError::JumpOutOfRange => write!(f, "jump offset does not fit in 16 bits"),
      CompileError::TooManyConstants => write!(f, "too many constants"),
      CompileError::ConstantPoolOverflow => write!(f, "constant pool exceeds the size limit"),
    }
  }
}

impl Display for VmError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      VmError::IllegalOpcode(op) => write!(f, "unknown instruction: 0x{op:02X}"),
      VmError::UnexpectedEnd => write!(f, "instruction pointer ran past the end of the pool"),
      VmError::OperandStackUnderflow => write!(f, "operand stack underflow"),
      VmError::OperandStackOverflow => write!(f, "operand stack overflow"),
      VmError::FrameStackOverflow => write!(f, "call stack overflow"),
      VmError::FrameUnderflow => write!(f, "call stack underflow"),
      VmError::InvalidConstant(i) => write!(f, "invalid constant pool index {i}"),
      VmError::InvalidLocal(i) => write!(f, "invalid local slot {i}"),
      VmError::NotAGlobal(i) => write!(f, "constant {i} is not a registered global"),
      VmError::NotAFunction => write!(f, "value is not a function"),
      VmError::NotAnObject => write!(f, "value is not an object"),
      VmError::WrongArity { expected, found } => {
        write!(f, "wrong number of arguments: expected {expected}, found {found}")
      }
      VmError::FieldNotFound(name) => write!(f, "field not found: {name}"),
      VmError::UnknownMethod(name) => write!(f, "unknown built-in method: {name}"),
      VmError::TypeMismatch(what) => write!(f, "type mismatch: {what}"),
      VmError::DivisionByZero => write!(f, "division by zero"),
      VmError::IndexOutOfBounds { index, size } => {
        write!(f, "array index {index} out of bounds for size {size}")
      }
      VmError::NegativeArraySize(size) => write!(f, "negative array size {size}"),
      VmError::FormatArgumentCount => {
        write!(f, "format string refers to more arguments than were passed")
      }
    }
  }
}

impl StdError for Error {}

impl From<SyntaxError> for Error {
  fn from(value: SyntaxError) -> Self {
    Error::Syntax(value)
  }
}

impl From<CompileError> for Error {
  fn from(value: CompileError) -> Self {
    Error::Compile(value)
  }
}

impl From<VmError> for Error {
  fn from(value: VmError) -> Self {
    Error::Vm(value)
  }
}

impl From<io::Error> for Error {
  fn from(value: io::Error) -> Self {
    Error::Io(value)
  }
}
