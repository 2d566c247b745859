//! Byte-level ABC decoder: parses the constant pool, classes, methods, and
//! instance/class traits out of a `DoABC` tag's raw bytes.

use super::model::*;
use super::opcode::{self, Op};
use crate::error::{Error, Result};

pub struct Cursor<'a> {
  data: &'a [u8],
  pos: usize,
}

impl<'a> Cursor<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    Cursor { data, pos: 0 }
  }

  pub fn pos(&self) -> usize {
    self.pos
  }

  pub fn remaining(&self) -> usize {
    self.data.len().saturating_sub(self.pos)
  }

  fn need(&self, n: usize) -> Result<()> {
    if self.remaining() < n {
      return Err(Error::InvalidInput(format!(
        "unexpected end of stream at offset {} (need {} more bytes)",
        self.pos, n
      )));
    }
    Ok(())
  }

  pub fn read_u8(&mut self) -> Result<u8> {
    self.need(1)?;
    let b = self.data[self.pos];
    self.pos += 1;
    Ok(b)
  }

  pub fn read_u16(&mut self) -> Result<u16> {
    self.need(2)?;
    let v = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
    self.pos += 2;
    Ok(v)
  }

  pub fn read_s24(&mut self) -> Result<i32> {
    self.need(3)?;
    let b = &self.data[self.pos..self.pos + 3];
    self.pos += 3;
    let raw = (b[0] as i32) | ((b[1] as i32) << 8) | ((b[2] as i32) << 16);
    Ok((raw << 8) >> 8)
  }

  pub fn read_d64(&mut self) -> Result<f64> {
    self.need(8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&self.data[self.pos..self.pos + 8]);
    self.pos += 8;
    Ok(f64::from_le_bytes(buf))
  }

  /// Reads a variable-length base-128 integer (AVM2's `u30`/`u32`).
  pub fn read_varint(&mut self) -> Result<u32> {
    let mut result: u32 = 0;
    for shift in (0..35).step_by(7) {
      let byte = self.read_u8()?;
      result |= ((byte & 0x7F) as u32) << shift;
      if byte & 0x80 == 0 {
        return Ok(result);
      }
    }
    Err(Error::InvalidInput("varint too long".into()))
  }

  pub fn read_s32(&mut self) -> Result<i32> {
    Ok(self.read_varint()? as i32)
  }

  pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
    self.need(n)?;
    let slice = &self.data[self.pos..self.pos + n];
    self.pos += n;
    Ok(slice)
  }

  pub fn read_string(&mut self) -> Result<String> {
    let len = self.read_varint()? as usize;
    let bytes = self.read_bytes(len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
  }
}

pub fn read_abc(data: &[u8]) -> Result<AbcFile> {
  let mut c = Cursor::new(data);
  let minor_version = c.read_u16()?;
  let major_version = c.read_u16()?;

  let pool = read_constant_pool(&mut c)?;

  let method_count = c.read_varint()?;
  let mut method_sigs = Vec::with_capacity(method_count as usize);
  for _ in 0..method_count {
    method_sigs.push(read_method_signature(&mut c, &pool)?);
  }

  let metadata_count = c.read_varint()?;
  for _ in 0..metadata_count {
    let _name = c.read_varint()?;
    let item_count = c.read_varint()?;
    for _ in 0..item_count {
      let _key = c.read_varint()?;
      let _value = c.read_varint()?;
    }
  }

  let class_count = c.read_varint()?;
  let mut classes = Vec::with_capacity(class_count as usize);
  for _ in 0..class_count {
    classes.push(read_instance(&mut c)?);
  }
  for class in classes.iter_mut() {
    let (cinit, ctraits) = read_class_part(&mut c)?;
    class.cinit = cinit;
    class.ctraits = ctraits;
  }

  let script_count = c.read_varint()?;
  let mut scripts = Vec::with_capacity(script_count as usize);
  for _ in 0..script_count {
    let init = c.read_varint()?;
    let traits = read_traits(&mut c)?;
    scripts.push(Script { init, traits });
  }

  let body_count = c.read_varint()?;
  let mut methods: Vec<Method> = method_sigs;
  for _ in 0..body_count {
    let method_idx = c.read_varint()? as usize;
    let max_stack = c.read_varint()?;
    let local_count = c.read_varint()?;
    let init_scope_depth = c.read_varint()?;
    let max_scope_depth = c.read_varint()?;
    let code_len = c.read_varint()? as usize;
    let code_bytes = c.read_bytes(code_len)?;
    let code = decode_instructions(code_bytes)?;

    let exc_count = c.read_varint()?;
    let mut exceptions = Vec::with_capacity(exc_count as usize);
    for _ in 0..exc_count {
      exceptions.push(Exception {
        from: c.read_varint()?,
        to: c.read_varint()?,
        target: c.read_varint()?,
        exc_type: c.read_varint()?,
        var_name: c.read_varint()?,
      });
    }
    let traits = read_traits(&mut c)?;

    if let Some(m) = methods.get_mut(method_idx) {
      m.max_stack = max_stack;
      m.local_count = local_count;
      m.init_scope_depth = init_scope_depth;
      m.max_scope_depth = max_scope_depth;
      m.code = code;
      m.exceptions = exceptions;
      m.traits = traits;
      m.is_native = false;
    }
  }

  Ok(AbcFile {
    minor_version,
    major_version,
    pool,
    methods,
    classes,
    scripts,
    namespace_map: Default::default(),
  })
}

fn read_constant_pool(c: &mut Cursor) -> Result<ConstantPool> {
  let mut pool = ConstantPool::default();

  let int_count = c.read_varint()?;
  pool.ints.push(0);
  for _ in 1..int_count.max(1) {
    pool.ints.push(c.read_s32()?);
  }

  let uint_count = c.read_varint()?;
  pool.uints.push(0);
  for _ in 1..uint_count.max(1) {
    pool.uints.push(c.read_varint()?);
  }

  let double_count = c.read_varint()?;
  pool.doubles.push(f64::NAN);
  for _ in 1..double_count.max(1) {
    pool.doubles.push(c.read_d64()?);
  }

  let string_count = c.read_varint()?;
  pool.strings.push(String::new());
  for _ in 1..string_count.max(1) {
    pool.strings.push(c.read_string()?);
  }

  let ns_count = c.read_varint()?;
  pool.namespaces.push(Namespace {
    kind: NamespaceKind::Public,
    name: 0,
  });
  for _ in 1..ns_count.max(1) {
    let kind_byte = c.read_u8()?;
    let name = c.read_varint()?;
    let kind = match kind_byte {
      0x05 => NamespaceKind::Private,
      0x16 => NamespaceKind::Public,
      0x17 => NamespaceKind::PackageInternal,
      0x18 => NamespaceKind::Protected,
      0x19 => NamespaceKind::Explicit,
      0x1A => NamespaceKind::StaticProtected,
      _ => NamespaceKind::Public,
    };
    pool.namespaces.push(Namespace { kind, name });
  }

  let ns_set_count = c.read_varint()?;
  pool.ns_sets.push(Vec::new());
  for _ in 1..ns_set_count.max(1) {
    let count = c.read_varint()?;
    let mut set = Vec::with_capacity(count as usize);
    for _ in 0..count {
      set.push(c.read_varint()?);
    }
    pool.ns_sets.push(set);
  }

  let multiname_count = c.read_varint()?;
  pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
  for _ in 1..multiname_count.max(1) {
    let kind = c.read_u8()?;
    let mn = match kind {
      0x07 | 0x0D => Multiname::QName {
        ns: c.read_varint()?,
        name: c.read_varint()?,
      },
      0x0F | 0x10 => Multiname::RtqName {
        name: c.read_varint()?,
      },
      0x11 | 0x12 => Multiname::RtqNameLate,
      0x09 | 0x0E => Multiname::Multiname {
        name: c.read_varint()?,
        ns_set: c.read_varint()?,
      },
      0x1B | 0x1C => Multiname::MultinameLate {
        ns_set: c.read_varint()?,
      },
      0x1D => {
        let base = c.read_varint()?;
        let param_count = c.read_varint()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
          params.push(c.read_varint()?);
        }
        Multiname::Typename { base, params }
      }
      other => {
        return Err(Error::InvalidInput(format!(
          "unknown multiname kind 0x{other:02x}"
        )))
      }
    };
    pool.multinames.push(mn);
  }

  Ok(pool)
}

fn read_method_signature(c: &mut Cursor, _pool: &ConstantPool) -> Result<Method> {
  let param_count = c.read_varint()?;
  let return_type = c.read_varint()?;
  let mut param_types = Vec::with_capacity(param_count as usize);
  for _ in 0..param_count {
    param_types.push(c.read_varint()?);
  }
  let name = c.read_varint()?;
  let flag_byte = c.read_u8()?;
  let flags = MethodFlags {
    need_arguments: flag_byte & 0x01 != 0,
    need_activation: flag_byte & 0x02 != 0,
    need_rest: flag_byte & 0x04 != 0,
    has_optional: flag_byte & 0x08 != 0,
    sets_dxns: flag_byte & 0x40 != 0,
    has_param_names: flag_byte & 0x80 != 0,
  };

  let mut optional = Vec::new();
  if flags.has_optional {
    let count = c.read_varint()?;
    for _ in 0..count {
      let index = c.read_varint()?;
      let kind = c.read_u8()?;
      optional.push(default_value(kind, index));
    }
  }

  let mut param_names = Vec::new();
  if flags.has_param_names {
    for _ in 0..param_count {
      param_names.push(c.read_varint()?);
    }
  }

  Ok(Method {
    param_types,
    return_type,
    name,
    flags,
    param_names,
    optional,
    max_stack: 0,
    local_count: 0,
    init_scope_depth: 0,
    max_scope_depth: 0,
    code: Vec::new(),
    exceptions: Vec::new(),
    traits: Vec::new(),
    is_native: true,
  })
}

fn default_value(kind: u8, index: u32) -> DefaultValue {
  match kind {
    0x00 => DefaultValue::Undefined,
    0x01 => DefaultValue::String(index),
    0x03 => DefaultValue::Int(index),
    0x04 => DefaultValue::UInt(index),
    0x06 => DefaultValue::Double(index),
    0x0A => DefaultValue::False,
    0x0B => DefaultValue::True,
    0x0C => DefaultValue::Null,
    0x08 | 0x16 | 0x05 => DefaultValue::Namespace(index),
    _ => DefaultValue::Undefined,
  }
}

fn default_value_kind(v: DefaultValue) -> (u8, u32) {
  match v {
    DefaultValue::Undefined => (0x00, 0),
    DefaultValue::String(i) => (0x01, i),
    DefaultValue::Int(i) => (0x03, i),
    DefaultValue::UInt(i) => (0x04, i),
    DefaultValue::Double(i) => (0x06, i),
    DefaultValue::False => (0x0A, 0),
    DefaultValue::True => (0x0B, 0),
    DefaultValue::Null => (0x0C, 0),
    DefaultValue::Namespace(i) => (0x08, i),
  }
}
pub(super) use default_value_kind as default_value_kind_export;

fn read_traits(c: &mut Cursor) -> Result<Vec<Trait>> {
  let count = c.read_varint()?;
  let mut traits = Vec::with_capacity(count as usize);
  for _ in 0..count {
    let name = c.read_varint()?;
    let kind_byte = c.read_u8()?;
    let kind = kind_byte & 0x0F;
    let attr_bits = (kind_byte >> 4) & 0x0F;
    let attrs = TraitAttrs {
      is_final: attr_bits & 0x01 != 0,
      is_override: attr_bits & 0x02 != 0,
      has_metadata: attr_bits & 0x04 != 0,
    };

    let data = match kind {
      0x00 | 0x06 => {
        let slot_id = c.read_varint()?;
        let type_name = c.read_varint()?;
        let value_index = c.read_varint()?;
        let value = if value_index == 0 {
          DefaultValue::Undefined
        } else {
          let vkind = c.read_u8()?;
          default_value(vkind, value_index)
        };
        if kind == 0x00 {
          TraitData::Slot {
            slot_id,
            type_name,
            value,
          }
        } else {
          TraitData::Const {
            slot_id,
            type_name,
            value,
          }
        }
      }
      0x01 | 0x02 | 0x03 => {
        let disp_id = c.read_varint()?;
        let method = c.read_varint()?;
        match kind {
          0x01 => TraitData::Method { disp_id, method },
          0x02 => TraitData::Getter { disp_id, method },
          _ => TraitData::Setter { disp_id, method },
        }
      }
      0x04 => {
        let slot_id = c.read_varint()?;
        let class = c.read_varint()?;
        TraitData::Class { slot_id, class }
      }
      0x05 => {
        let slot_id = c.read_varint()?;
        let function = c.read_varint()?;
        TraitData::Function { slot_id, function }
      }
      other => {
        return Err(Error::InvalidInput(format!(
          "unknown trait kind 0x{other:02x}"
        )))
      }
    };

    if attrs.has_metadata {
      let meta_count = c.read_varint()?;
      for _ in 0..meta_count {
        let _ = c.read_varint()?;
      }
    }

    traits.push(Trait { name, attrs, data });
  }
  Ok(traits)
}

fn read_instance(c: &mut Cursor) -> Result<Class> {
  let name = c.read_varint()?;
  let super_name = c.read_varint()?;
  let flag_byte = c.read_u8()?;
  let flags = ClassFlags {
    sealed: flag_byte & 0x01 != 0,
    is_final: flag_byte & 0x02 != 0,
    interface: flag_byte & 0x04 != 0,
    has_protected_ns: flag_byte & 0x08 != 0,
  };
  let protected_ns = if flags.has_protected_ns {
    c.read_varint()?
  } else {
    0
  };
  let iface_count = c.read_varint()?;
  for _ in 0..iface_count {
    let _ = c.read_varint()?;
  }
  let iinit = c.read_varint()?;
  let itraits = read_traits(c)?;

  Ok(Class {
    name,
    super_name,
    flags,
    protected_ns,
    iinit,
    cinit: 0,
    itraits,
    ctraits: Vec::new(),
  })
}

fn read_class_part(c: &mut Cursor) -> Result<(u32, Vec<Trait>)> {
  let cinit = c.read_varint()?;
  let ctraits = read_traits(c)?;
  Ok((cinit, ctraits))
}

fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>> {
  let mut c = Cursor::new(code);
  let mut out = Vec::new();
  while c.remaining() > 0 {
    let opcode_byte = c.read_u8()?;
    let op = Op::try_from(opcode_byte).map_err(|_| {
      Error::InvalidInput(format!(
        "unknown opcode 0x{opcode_byte:02x} at offset {}",
        c.pos() - 1
      ))
    })?;

    let mut args = Vec::new();
    let mut branch_offsets = Vec::new();

    if opcode::is_branch(op) {
      branch_offsets.push(c.read_s24()?);
    } else if opcode::is_lookupswitch(op) {
      let default_offset = c.read_s24()?;
      let case_count = c.read_varint()?;
      branch_offsets.push(default_offset);
      args.push(case_count as i64);
      for _ in 0..=case_count {
        branch_offsets.push(c.read_s24()?);
      }
    } else {
      for operand in opcode::operands(op) {
        use opcode::Operand::*;
        let value = match operand {
          U8 => c.read_u8()? as i64,
          I8 => (c.read_u8()? as i8) as i64,
          UInt | Multiname | IntConst | UIntConst | DoubleConst | StringConst | NamespaceConst
          | MethodIdx | ClassIdx | ExceptionIdx => c.read_varint()? as i64,
        };
        args.push(value);
      }
    }

    out.push(Instruction {
      op,
      args,
      branch_offsets,
    });
  }
  Ok(out)
}
