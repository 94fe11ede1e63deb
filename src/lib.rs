//! Runtime for the FML language: a tree-walking reference interpreter and
//! a bytecode backend (compiler + stack VM) over a mark-and-sweep managed
//! heap. Source programs can be run directly, compiled to a serialized
//! bytecode file, or loaded from one.

mod builtins;
pub mod bytecode;
mod error;
pub mod gc;
pub mod heap;
pub mod interp;
mod pool;
pub mod syntax;
mod value;
pub mod vm;

use std::io::Write;

pub use error::{CompileError, Error, Result, SyntaxError, VmError};
pub use heap::{Heap, HeapConfig};
pub use pool::ConstPool;
pub use value::{Value, ValueKind};

/// Parse and directly interpret the AST.
pub fn ast_interpret(src: &str, out: &mut dyn Write) -> Result<()> {
  let top = syntax::parse(src)?;
  let result = interp::Interp::new(Box::new(out)).run(&top);
  result
}

/// Parse, compile in memory, then run on the VM without serialization.
pub fn run(src: &str, config: &HeapConfig, out: &mut dyn Write) -> Result<()> {
  let top = syntax::parse(src)?;
  let program = bytecode::compile(&top)?;
  let heap = Heap::new(config)?;
  vm::Vm::new(program, heap, Box::new(out))?.run()
}

/// Parse, compile, and write the serialized bytecode.
pub fn bc_compile(src: &str, out: &mut dyn Write) -> Result<()> {
  let top = syntax::parse(src)?;
  let program = bytecode::compile(&top)?;
  bytecode::serialize(&program, out)
}

/// Load a serialized bytecode file and run it.
pub fn bc_interpret(bytes: &[u8], config: &HeapConfig, out: &mut dyn Write) -> Result<()> {
  let program = bytecode::deserialize(bytes)?;
  let heap = Heap::new(config)?;
  vm::Vm::new(program, heap, Box::new(out))?.run()
}
