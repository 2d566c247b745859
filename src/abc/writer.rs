//! Inverse of `reader.rs`: serializes an [`AbcFile`] back to bytes.
//!
//! Expects `Instruction::branch_offsets` to already hold correct relative
//! byte deltas; the instruction graph is responsible for recomputing those
//! after a rewrite before handing methods back here.

use super::model::*;
use super::opcode::{self, Operand};
use super::reader::default_value_kind_export as default_value_kind;

#[derive(Default)]
pub struct Writer {
  buf: Vec<u8>,
}

impl Writer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.buf
  }

  pub fn write_u8(&mut self, v: u8) {
    self.buf.push(v);
  }

  pub fn write_u16(&mut self, v: u16) {
    self.buf.extend_from_slice(&v.to_le_bytes());
  }

  pub fn write_s24(&mut self, v: i32) {
    let bytes = v.to_le_bytes();
    self.buf.extend_from_slice(&bytes[0..3]);
  }

  pub fn write_d64(&mut self, v: f64) {
    self.buf.extend_from_slice(&v.to_le_bytes());
  }

  /// Writes a base-128 varint (AVM2's `u30`/`u32`).
  pub fn write_varint(&mut self, mut v: u32) {
    loop {
      let byte = (v & 0x7F) as u8;
      v >>= 7;
      if v == 0 {
        self.buf.push(byte);
        break;
      } else {
        self.buf.push(byte | 0x80);
      }
    }
  }

  pub fn write_s32(&mut self, v: i32) {
    self.write_varint(v as u32);
  }

  pub fn write_bytes(&mut self, bytes: &[u8]) {
    self.buf.extend_from_slice(bytes);
  }

  pub fn write_string(&mut self, s: &str) {
    self.write_varint(s.len() as u32);
    self.buf.extend_from_slice(s.as_bytes());
  }
}

pub fn write_abc(abc: &AbcFile) -> Vec<u8> {
  let mut w = Writer::new();
  w.write_u16(abc.minor_version);
  w.write_u16(abc.major_version);

  write_constant_pool(&mut w, &abc.pool);

  w.write_varint(abc.methods.len() as u32);
  for m in &abc.methods {
    write_method_signature(&mut w, m);
  }

  w.write_varint(0); // metadata_count: recognizers never introduce metadata entries.

  w.write_varint(abc.classes.len() as u32);
  for class in &abc.classes {
    write_instance(&mut w, class);
  }
  for class in &abc.classes {
    w.write_varint(class.cinit);
    write_traits(&mut w, &class.ctraits);
  }

  w.write_varint(abc.scripts.len() as u32);
  for script in &abc.scripts {
    w.write_varint(script.init);
    write_traits(&mut w, &script.traits);
  }

  let bodies: Vec<(usize, &Method)> = abc
    .methods
    .iter()
    .enumerate()
    .filter(|(_, m)| !m.is_native)
    .collect();
  w.write_varint(bodies.len() as u32);
  for (idx, m) in bodies {
    w.write_varint(idx as u32);
    w.write_varint(m.max_stack);
    w.write_varint(m.local_count);
    w.write_varint(m.init_scope_depth);
    w.write_varint(m.max_scope_depth);

    let code = encode_instructions(&m.code);
    w.write_varint(code.len() as u32);
    w.write_bytes(&code);

    w.write_varint(m.exceptions.len() as u32);
    for e in &m.exceptions {
      w.write_varint(e.from);
      w.write_varint(e.to);
      w.write_varint(e.target);
      w.write_varint(e.exc_type);
      w.write_varint(e.var_name);
    }
    write_traits(&mut w, &m.traits);
  }

  w.into_bytes()
}

fn write_constant_pool(w: &mut Writer, pool: &ConstantPool) {
  write_skip_first(w, &pool.ints, |w, v| w.write_s32(*v));
  write_skip_first(w, &pool.uints, |w, v| w.write_varint(*v));
  write_skip_first(w, &pool.doubles, |w, v| w.write_d64(*v));
  write_skip_first(w, &pool.strings, |w, v| w.write_string(v));

  w.write_varint(pool.namespaces.len().max(1) as u32);
  for ns in pool.namespaces.iter().skip(1) {
    let kind_byte = match ns.kind {
      NamespaceKind::Private => 0x05,
      NamespaceKind::Public => 0x16,
      NamespaceKind::PackageInternal => 0x17,
      NamespaceKind::Explicit => 0x19,
      NamespaceKind::StaticProtected => 0x1A,
      NamespaceKind::Protected => 0x18,
    };
    w.write_u8(kind_byte);
    w.write_varint(ns.name);
  }

  w.write_varint(pool.ns_sets.len().max(1) as u32);
  for set in pool.ns_sets.iter().skip(1) {
    w.write_varint(set.len() as u32);
    for ns in set {
      w.write_varint(*ns);
    }
  }

  w.write_varint(pool.multinames.len().max(1) as u32);
  for mn in pool.multinames.iter().skip(1) {
    match mn {
      Multiname::QName { ns, name } => {
        w.write_u8(0x07);
        w.write_varint(*ns);
        w.write_varint(*name);
      }
      Multiname::RtqName { name } => {
        w.write_u8(0x0F);
        w.write_varint(*name);
      }
      Multiname::RtqNameLate => {
        w.write_u8(0x11);
      }
      Multiname::Multiname { name, ns_set } => {
        w.write_u8(0x09);
        w.write_varint(*name);
        w.write_varint(*ns_set);
      }
      Multiname::MultinameLate { ns_set } => {
        w.write_u8(0x1B);
        w.write_varint(*ns_set);
      }
      Multiname::Typename { base, params } => {
        w.write_u8(0x1D);
        w.write_varint(*base);
        w.write_varint(params.len() as u32);
        for p in params {
          w.write_varint(*p);
        }
      }
    }
  }
}

/// The AVM2 pool arrays store a phantom zero-slot that is never emitted;
/// `count` still includes it, so `len()` (not `len() - 1`) is correct.
fn write_skip_first<T>(w: &mut Writer, values: &[T], mut f: impl FnMut(&mut Writer, &T)) {
  w.write_varint(values.len().max(1) as u32);
  for v in values.iter().skip(1) {
    f(w, v);
  }
}

fn write_method_signature(w: &mut Writer, m: &Method) {
  w.write_varint(m.param_types.len() as u32);
  w.write_varint(m.return_type);
  for t in &m.param_types {
    w.write_varint(*t);
  }
  w.write_varint(m.name);

  let flags = &m.flags;
  let mut flag_byte = 0u8;
  if flags.need_arguments {
    flag_byte |= 0x01;
  }
  if flags.need_activation {
    flag_byte |= 0x02;
  }
  if flags.need_rest {
    flag_byte |= 0x04;
  }
  if !m.optional.is_empty() {
    flag_byte |= 0x08;
  }
  if flags.sets_dxns {
    flag_byte |= 0x40;
  }
  if !m.param_names.is_empty() {
    flag_byte |= 0x80;
  }
  w.write_u8(flag_byte);

  if !m.optional.is_empty() {
    w.write_varint(m.optional.len() as u32);
    for v in &m.optional {
      let (kind, index) = default_value_kind(*v);
      w.write_varint(index);
      w.write_u8(kind);
    }
  }
  if !m.param_names.is_empty() {
    for n in &m.param_names {
      w.write_varint(*n);
    }
  }
}

fn write_traits(w: &mut Writer, traits: &[Trait]) {
  w.write_varint(traits.len() as u32);
  for t in traits {
    w.write_varint(t.name);
    let kind = match t.data {
      TraitData::Slot { .. } => 0x00,
      TraitData::Method { .. } => 0x01,
      TraitData::Getter { .. } => 0x02,
      TraitData::Setter { .. } => 0x03,
      TraitData::Class { .. } => 0x04,
      TraitData::Function { .. } => 0x05,
      TraitData::Const { .. } => 0x06,
    };
    let mut attr_bits = 0u8;
    if t.attrs.is_final {
      attr_bits |= 0x01;
    }
    if t.attrs.is_override {
      attr_bits |= 0x02;
    }
    if t.attrs.has_metadata {
      attr_bits |= 0x04;
    }
    w.write_u8(kind | (attr_bits << 4));

    match &t.data {
      TraitData::Slot {
        slot_id,
        type_name,
        value,
      }
      | TraitData::Const {
        slot_id,
        type_name,
        value,
      } => {
        w.write_varint(*slot_id);
        w.write_varint(*type_name);
        let (kind, index) = default_value_kind(*value);
        if matches!(value, DefaultValue::Undefined) {
          w.write_varint(0);
        } else {
          w.write_varint(index);
          w.write_u8(kind);
        }
      }
      TraitData::Method { disp_id, method }
      | TraitData::Getter { disp_id, method }
      | TraitData::Setter { disp_id, method } => {
        w.write_varint(*disp_id);
        w.write_varint(*method);
      }
      TraitData::Class { slot_id, class } => {
        w.write_varint(*slot_id);
        w.write_varint(*class);
      }
      TraitData::Function { slot_id, function } => {
        w.write_varint(*slot_id);
        w.write_varint(*function);
      }
    }

    if t.attrs.has_metadata {
      w.write_varint(0);
    }
  }
}

fn write_instance(w: &mut Writer, class: &Class) {
  w.write_varint(class.name);
  w.write_varint(class.super_name);

  let mut flag_byte = 0u8;
  if class.flags.sealed {
    flag_byte |= 0x01;
  }
  if class.flags.is_final {
    flag_byte |= 0x02;
  }
  if class.flags.interface {
    flag_byte |= 0x04;
  }
  if class.flags.has_protected_ns {
    flag_byte |= 0x08;
  }
  w.write_u8(flag_byte);

  if class.flags.has_protected_ns {
    w.write_varint(class.protected_ns);
  }

  w.write_varint(0); // interface count: recognizers and rewriters never add interfaces.
  w.write_varint(class.iinit);
  write_traits(w, &class.itraits);
}

fn encode_instructions(code: &[Instruction]) -> Vec<u8> {
  let mut w = Writer::new();
  for instr in code {
    w.write_u8(instr.op.into());

    if opcode::is_branch(instr.op) {
      w.write_s24(instr.branch_offsets[0]);
    } else if opcode::is_lookupswitch(instr.op) {
      w.write_s24(instr.branch_offsets[0]);
      let case_count = instr.args[0] as u32;
      w.write_varint(case_count);
      for off in &instr.branch_offsets[1..] {
        w.write_s24(*off);
      }
    } else {
      for (operand, value) in opcode::operands(instr.op).iter().zip(&instr.args) {
        match operand {
          Operand::U8 => w.write_u8(*value as u8),
          Operand::I8 => w.write_u8(*value as u8),
          Operand::UInt
          | Operand::Multiname
          | Operand::IntConst
          | Operand::UIntConst
          | Operand::DoubleConst
          | Operand::StringConst
          | Operand::NamespaceConst
          | Operand::MethodIdx
          | Operand::ClassIdx
          | Operand::ExceptionIdx => w.write_varint(*value as u32),
        }
      }
    }
  }
  w.into_bytes()
}
