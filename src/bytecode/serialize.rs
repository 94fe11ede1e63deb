use std::io::Write;

use super::Program;
use crate::error::{Error, Result};
use crate::pool::ConstPool;
use crate::value::ValueKind;

/// `FML\n`.
pub const MAGIC: [u8; 4] = [0x46, 0x4D, 0x4C, 0x0A];

/// Write a compiled program in the bytecode file format: magic, constant
/// count, typed constant records, globals table, entry point. All counts
/// and offsets are little-endian; the layout is byte-exact.
pub fn serialize(program: &Program, out: &mut dyn Write) -> Result<()> {
  let pool = &program.pool;
  out.write_all(&MAGIC)?;
  out.write_all(&(pool.count() as u16).to_le_bytes())?;
  for i in 0..pool.count() as u16 {
    let offset = pool.addr(i).expect("pool indices are dense");
    match pool.kind_at(offset) {
      ValueKind::Integer => {
        out.write_all(&[ValueKind::Integer as u8])?;
        out.write_all(&pool.int_at(offset).to_le_bytes())?;
      }
      ValueKind::Null => {
        out.write_all(&[ValueKind::Null as u8])?;
      }
      ValueKind::Boolean => {
        out.write_all(&[ValueKind::Boolean as u8, pool.bool_at(offset) as u8])?;
      }
      ValueKind::String => {
        let bytes = pool.str_at(offset);
        out.write_all(&[ValueKind::String as u8])?;
        out.write_all(&(bytes.len() as u32).to_le_bytes())?;
        out.write_all(bytes)?;
      }
      ValueKind::Function => {
        out.write_all(&[ValueKind::Function as u8, pool.func_params(offset)])?;
        out.write_all(&pool.func_locals(offset).to_le_bytes())?;
        out.write_all(&(pool.func_len(offset) as u32).to_le_bytes())?;
        out.write_all(pool.func_body(offset))?;
      }
      ValueKind::Class => {
        let count = pool.class_count(offset);
        out.write_all(&[ValueKind::Class as u8])?;
        out.write_all(&(count as u16).to_le_bytes())?;
        for i in 0..count {
          out.write_all(&pool.class_member(offset, i).to_le_bytes())?;
        }
      }
      ValueKind::Array | ValueKind::Object => {
        unreachable!("mutable kinds never appear in the constant pool")
      }
    }
  }
  out.write_all(&(program.globals.len() as u16).to_le_bytes())?;
  for index in &program.globals {
    out.write_all(&index.to_le_bytes())?;
  }
  out.write_all(&program.entry.to_le_bytes())?;
  Ok(())
}

/// Parse a bytecode file. The format crosses a trust boundary, so
/// everything is validated: the magic, every tag, every index, and the
/// kinds the globals table and entry point refer to.
pub fn deserialize(bytes: &[u8]) -> Result<Program> {
  let mut reader = Reader { bytes, pos: 0 };
  if reader.slice(4)? != MAGIC {
    return Err(Error::InvalidBytecode("bad magic".into()));
  }

  let count = reader.u16()?;
  let mut pool = ConstPool::new();
  for _ in 0..count {
    let tag = reader.u8()?;
    match ValueKind::from_tag(tag)? {
      ValueKind::Integer => {
        let v = reader.u32()? as i32;
        pool.push_int(v)?;
      }
      ValueKind::Null => {
        pool.push_null()?;
      }
      ValueKind::Boolean => {
        let v = reader.u8()?;
        pool.push_bool(v != 0)?;
      }
      ValueKind::String => {
        let len = reader.u32()? as usize;
        let bytes = reader.slice(len)?;
        pool.push_str(bytes)?;
      }
      ValueKind::Function => {
        let params = reader.u8()?;
        let locals = reader.u16()?;
        let len = reader.u32()? as usize;
        let body = reader.slice(len)?;
        pool.push_function(params, locals, body)?;
      }
      ValueKind::Class => {
        let members = reader.u16()?;
        let mut indices = Vec::with_capacity(members as usize);
        for _ in 0..members {
          indices.push(reader.u16()?);
        }
        pool.push_class(&indices)?;
      }
      kind => {
        return Err(Error::InvalidBytecode(format!(
          "constant of kind {kind} is not serializable"
        )));
      }
    }
  }

  let global_count = reader.u16()?;
  let mut globals = Vec::with_capacity(global_count as usize);
  for _ in 0..global_count {
    globals.push(reader.u16()?);
  }
  let entry = reader.u16()?;

  // cross-record validation now that every constant exists
  let string_at = |pool: &ConstPool, index: u16| -> Result<bool> {
    let offset = pool
      .addr(index)
      .map_err(|_| Error::InvalidBytecode(format!("constant index {index} out of range")))?;
    Ok(pool.kind_at(offset) == ValueKind::String)
  };
  for i in 0..count {
    let offset = pool.addr(i)?;
    if pool.kind_at(offset) == ValueKind::Class {
      for m in 0..pool.class_count(offset) {
        let member = pool.class_member(offset, m);
        if !string_at(&pool, member)? {
          return Err(Error::InvalidBytecode(format!(
            "class member {member} is not a string"
          )));
        }
      }
    }
  }
  for index in &globals {
    if !string_at(&pool, *index)? {
      return Err(Error::InvalidBytecode(format!(
        "global {index} is not named by a string"
      )));
    }
  }
  let entry_offset = pool
    .addr(entry)
    .map_err(|_| Error::InvalidBytecode("entry point out of range".into()))?;
  if pool.kind_at(entry_offset) != ValueKind::Function {
    return Err(Error::InvalidBytecode("entry point is not a function".into()));
  }

  Ok(Program {
    pool,
    globals,
    entry,
  })
}

struct Reader<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Reader<'a> {
  fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
    if self.pos + len > self.bytes.len() {
      return Err(Error::InvalidBytecode("unexpected end of file".into()));
    }
    let slice = &self.bytes[self.pos..self.pos + len];
    self.pos += len;
    Ok(slice)
  }

  fn u8(&mut self) -> Result<u8> {
    Ok(self.slice(1)?[0])
  }

  fn u16(&mut self) -> Result<u16> {
    let bytes = self.slice(2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
  }

  fn u32(&mut self) -> Result<u32> {
    let bytes = self.slice(4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::compile;
  use crate::syntax;

  fn compile_src(src: &str) -> Program {
    compile(&syntax::parse(src).unwrap()).unwrap()
  }

  fn to_bytes(program: &Program) -> Vec<u8> {
    let mut bytes = Vec::new();
    serialize(program, &mut bytes).unwrap();
    bytes
  }

  #[test]
  fn byte_exact_output_for_a_minimal_program() {
    let program = compile_src("null");
    #[rustfmt::skip]
    let expected: &[u8] = &[
      // magic
      0x46, 0x4D, 0x4C, 0x0A,
      // two constants
      0x02, 0x00,
      // [0] null
      0x01,
      // [1] the entry function: one (implicit) parameter, one local slot,
      // a four-byte body: CONSTANT [0]; RETURN
      0x03, 0x01, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x0F,
      // no globals
      0x00, 0x00,
      // entry point
      0x01, 0x00,
    ];
    assert_eq!(to_bytes(&program), expected);
  }

  #[test]
  fn roundtrip_is_stable() {
    let program = compile_src(
      r#"let o = object extends null { let v = 5; function get() -> this.v }; print("~\n", o.get())"#,
    );
    let bytes = to_bytes(&program);
    let reloaded = deserialize(&bytes).unwrap();
    assert_eq!(to_bytes(&reloaded), bytes);
    assert_eq!(reloaded.entry, program.entry);
    assert_eq!(reloaded.globals, program.globals);
  }

  #[test]
  fn bad_magic_is_rejected() {
    let mut bytes = to_bytes(&compile_src("null"));
    bytes[0] = 0x47;
    assert!(matches!(
      deserialize(&bytes),
      Err(Error::InvalidBytecode(_))
    ));
  }

  #[test]
  fn truncated_files_are_rejected() {
    let bytes = to_bytes(&compile_src(r#"print("hi\n")"#));
    for len in 0..bytes.len() {
      assert!(
        deserialize(&bytes[..len]).is_err(),
        "accepted a {len}-byte prefix"
      );
    }
  }

  #[test]
  fn invalid_tags_are_rejected() {
    // magic, one constant with tag 0x09
    let bytes = [0x46, 0x4D, 0x4C, 0x0A, 0x01, 0x00, 0x09];
    assert!(matches!(
      deserialize(&bytes),
      Err(Error::InvalidBytecode(_))
    ));
  }

  #[test]
  fn entry_point_must_be_a_function() {
    // magic, one null constant, no globals, entry = 0
    let bytes = [
      0x46, 0x4D, 0x4C, 0x0A, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
    ];
    assert!(matches!(
      deserialize(&bytes),
      Err(Error::InvalidBytecode(_))
    ));
  }
}
