use std::fmt::Write;

use super::opcode::Opcode;
use crate::error::Result;
use crate::pool::ConstPool;

/// One-instruction-per-line listing of a function's body. Offsets are
/// relative to the first instruction.
pub fn disassemble(pool: &ConstPool, index: u16) -> Result<String> {
  let offset = pool.addr(index)?;
  let mut out = String::new();
  let _ = writeln!(
    out,
    "function [{index}] params={} locals={} len={}",
    pool.func_params(offset),
    pool.func_locals(offset),
    pool.func_len(offset),
  );
  let base = pool.func_entry(offset);
  let end = base + pool.func_len(offset);
  let mut ip = base;
  while ip < end {
    let pc = ip - base;
    let byte = pool.code_u8(ip)?;
    ip += 1;
    let Ok(op) = Opcode::try_from(byte) else {
      let _ = writeln!(out, "{pc:>4}: .byte 0x{byte:02X}");
      continue;
    };
    let _ = write!(out, "{pc:>4}: {}", op.mnemonic());
    match op {
      Opcode::Drop | Opcode::Array | Opcode::Return => {}
      Opcode::Constant
      | Opcode::Object
      | Opcode::GetField
      | Opcode::SetField
      | Opcode::SetGlobal
      | Opcode::GetGlobal => {
        let _ = write!(out, " [{}]", pool.code_u16(ip)?);
        ip += 2;
      }
      Opcode::SetLocal | Opcode::GetLocal => {
        let _ = write!(out, " {}", pool.code_u16(ip)?);
        ip += 2;
      }
      Opcode::Print | Opcode::CallMethod => {
        let idx = pool.code_u16(ip)?;
        ip += 2;
        let argc = pool.code_u8(ip)?;
        ip += 1;
        let _ = write!(out, " [{idx}] {argc}");
      }
      Opcode::CallFunction => {
        let _ = write!(out, " {}", pool.code_u8(ip)?);
        ip += 1;
      }
      Opcode::Branch | Opcode::Jump => {
        let offset = pool.code_i16(ip)?;
        ip += 2;
        let _ = write!(out, " {offset:+}");
      }
    }
    out.push('\n');
  }
  Ok(out)
}
