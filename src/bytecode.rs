pub mod compiler;
pub mod disasm;
pub mod opcode;
pub mod serialize;

pub use compiler::compile;
pub use serialize::{deserialize, serialize};

use crate::pool::ConstPool;

/// A compiled program: the populated constant pool, the globals table, and
/// the entry-point index. Produced by the compiler or the deserializer,
/// consumed by the VM and the serializer.
pub struct Program {
  pub pool: ConstPool,
  /// Constant-pool indices of the strings naming each global, in
  /// registration order.
  pub globals: Vec<u16>,
  /// Constant-pool index of the entry-point function.
  pub entry: u16,
}
