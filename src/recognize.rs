//! Structural recognizers for the obfuscator's primitives: the wrapper
//! class, the "constants vault" static classes, and the packet anchors
//! (serverbound/clientbound base, var-int reader, interface proxy, packet
//! handler).

use indexmap::IndexMap;

use crate::abc::{AbcFile, DefaultValue, Multiname, Op, Trait, TraitData};
use crate::eval::{evaluate_constant, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRef(pub usize);

#[derive(Debug, Clone, Copy)]
pub enum SlotValue {
  False,
  True,
  Null,
  String(u32),
  Double(u32),
  Int(u32),
  UInt(u32),
  Namespace(u32),
}

#[derive(Debug, Clone, Copy)]
pub enum VaultValue {
  Slot(SlotValue),
  MethodDouble(f64),
  MethodInt(i32),
}

/// A "constants vault": a class with no instance traits and a large,
/// uniform set of class traits, each either a plain slot or a final
/// numeric-returning method.
#[derive(Debug, Clone)]
pub struct StaticClass {
  pub class: ClassRef,
  pub values: IndexMap<u32, VaultValue>,
}

/// A class whose every method is a single-argument passthrough.
#[derive(Debug, Clone)]
pub struct WrapperClass {
  pub class: ClassRef,
  pub method_names: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct PacketAnchors {
  pub serverbound_base: Option<ClassRef>,
  pub clientbound_base: Option<ClassRef>,
  pub var_int_reader: Option<ClassRef>,
  pub interface_proxy: Option<ClassRef>,
  pub packet_handler: Option<ClassRef>,
}

#[derive(Debug, Default)]
pub struct Recognition {
  pub wrapper: Option<WrapperClass>,
  pub static_classes: Vec<StaticClass>,
  pub anchors: PacketAnchors,
}

/// Runs every recognizer in a single sweep over `abc`'s classes. Recognizers
/// are mutually exclusive: the first predicate a class satisfies wins.
pub fn recognize(abc: &AbcFile) -> Recognition {
  let mut out = Recognition::default();
  let buffer_multiname = find_buffer_multiname(abc);

  for idx in 0..abc.classes.len() {
    let class = &abc.classes[idx];
    let cref = ClassRef(idx);

    if out.wrapper.is_none() {
      if let Some(w) = try_wrapper(abc, cref) {
        out.wrapper = Some(w);
        continue;
      }
    }
    if let Some(buf) = buffer_multiname {
      if out.anchors.serverbound_base.is_none() && is_serverbound_base(abc, cref, buf) {
        out.anchors.serverbound_base = Some(cref);
        continue;
      }
      if out.anchors.clientbound_base.is_none() && is_clientbound_base(abc, cref, buf) {
        out.anchors.clientbound_base = Some(cref);
        continue;
      }
      if out.anchors.var_int_reader.is_none() && is_var_int_reader(abc, cref, buf) {
        out.anchors.var_int_reader = Some(cref);
        continue;
      }
      if out.anchors.packet_handler.is_none() && is_packet_handler(abc, cref, buf) {
        out.anchors.packet_handler = Some(cref);
        continue;
      }
    }
    if out.anchors.interface_proxy.is_none() && is_interface_proxy(abc, cref) {
      out.anchors.interface_proxy = Some(cref);
      continue;
    }
    if let Some(s) = try_static_class(abc, cref) {
      out.static_classes.push(s);
    }
  }

  out
}

/// Finds the multiname referring to the runtime's binary-buffer type (the
/// literal `ByteArray` QName). Exposed for the packet analyzer, which needs
/// it again after recognition to walk packet-base instance traits.
pub fn find_buffer_multiname(abc: &AbcFile) -> Option<u32> {
  abc
    .pool
    .multinames
    .iter()
    .position(|mn| matches!(mn, Multiname::QName { name, .. } if abc.pool.strings.get(*name as usize).map(String::as_str) == Some("ByteArray")))
    .map(|i| i as u32)
}

fn slot_type(t: &Trait) -> Option<u32> {
  match &t.data {
    TraitData::Slot { type_name, .. } | TraitData::Const { type_name, .. } => Some(*type_name),
    _ => None,
  }
}

fn is_serverbound_base(abc: &AbcFile, cref: ClassRef, buffer_mn: u32) -> bool {
  let class = &abc.classes[cref.0];
  if !class.flags.sealed || !class.flags.has_protected_ns {
    return false;
  }
  matches!(class.itraits.first(), Some(t) if slot_type(t) == Some(buffer_mn))
}

fn is_clientbound_base(abc: &AbcFile, cref: ClassRef, buffer_mn: u32) -> bool {
  let class = &abc.classes[cref.0];
  let ctrait_count = class.ctraits.len();
  let itrait_count = class.itraits.len();
  if !(1..=9).contains(&ctrait_count) || !(4..=9).contains(&itrait_count) {
    return false;
  }
  matches!(class.itraits.get(2), Some(t) if slot_type(t) == Some(buffer_mn))
}

fn is_var_int_reader(abc: &AbcFile, cref: ClassRef, buffer_mn: u32) -> bool {
  let class = &abc.classes[cref.0];
  let first_is_buffer = matches!(class.itraits.first(), Some(t) if slot_type(t) == Some(buffer_mn));
  if !first_is_buffer {
    return false;
  }
  let Some(iinit) = abc.methods.get(class.iinit as usize) else {
    return false;
  };
  iinit.param_types.first() == Some(&buffer_mn)
}

fn is_interface_proxy(abc: &AbcFile, cref: ClassRef) -> bool {
  let class = &abc.classes[cref.0];
  if !class.ctraits.is_empty() || !class.itraits.is_empty() || !class.flags.has_protected_ns {
    return false;
  }
  let Some(iinit) = abc.methods.get(class.iinit as usize) else {
    return false;
  };
  let Some(first_class) = abc.classes.first() else {
    return false;
  };
  iinit.param_types.len() == 1 && iinit.param_types[0] == first_class.name
}

fn is_packet_handler(abc: &AbcFile, cref: ClassRef, buffer_mn: u32) -> bool {
  let class = &abc.classes[cref.0];
  if !class.itraits.is_empty() {
    return false;
  }
  class.ctraits.iter().any(|t| {
    let TraitData::Method { method, .. } = &t.data else {
      return false;
    };
    let Some(m) = abc.methods.get(*method as usize) else {
      return false;
    };
    m.param_types.len() == 1
      && m.param_types[0] == buffer_mn
      && m.max_stack >= 30
      && m.local_count >= 200
  })
}

fn try_wrapper(abc: &AbcFile, cref: ClassRef) -> Option<WrapperClass> {
  let class = &abc.classes[cref.0];
  if !class.itraits.is_empty() || class.ctraits.is_empty() {
    return None;
  }
  let mut names = Vec::with_capacity(class.ctraits.len());
  for t in &class.ctraits {
    let TraitData::Method { method, .. } = &t.data else {
      return None;
    };
    let m = abc.methods.get(*method as usize)?;
    if m.param_types.len() != 1 || m.param_types[0] != m.return_type {
      return None;
    }
    names.push(t.name);
  }
  Some(WrapperClass {
    class: cref,
    method_names: names,
  })
}

fn try_static_class(abc: &AbcFile, cref: ClassRef) -> Option<StaticClass> {
  let class = &abc.classes[cref.0];
  if !class.itraits.is_empty() || class.ctraits.len() < 100 {
    return None;
  }

  let mut values = IndexMap::new();
  for (idx, t) in class.ctraits.iter().enumerate() {
    match &t.data {
      TraitData::Slot {
        value: DefaultValue::Undefined,
        ..
      } => {
        // Constructed further below via the cinit scan; record a
        // placeholder so the slot isn't mistaken for a disqualifying trait.
        values.insert(idx as u32, VaultValue::Slot(SlotValue::False));
      }
      TraitData::Slot { value, .. } => {
        let v = slot_value(value)?;
        values.insert(idx as u32, VaultValue::Slot(v));
      }
      TraitData::Method { method, .. } if t.attrs.is_final => {
        let m = abc.methods.get(*method as usize)?;
        let result = evaluate_constant(m, &abc.pool)?;
        match result {
          Value::Double(d) => {
            values.insert(idx as u32, VaultValue::MethodDouble(d));
          }
          Value::Int(i) => {
            values.insert(idx as u32, VaultValue::MethodInt(i));
          }
          // A static-method trait with a non-numeric return means the
          // obfuscator version changed its vault shape; the whole class
          // fails to qualify rather than partially.
          _ => return None,
        }
      }
      _ => return None,
    }
  }

  let cinit = abc.methods.get(class.cinit as usize);
  if let Some(cinit) = cinit {
    apply_cinit_bool_patches(class, cinit, &mut values);
  }

  Some(StaticClass {
    class: cref,
    values,
  })
}

fn slot_value(v: &DefaultValue) -> Option<SlotValue> {
  Some(match *v {
    DefaultValue::False => SlotValue::False,
    DefaultValue::True => SlotValue::True,
    DefaultValue::Null => SlotValue::Null,
    DefaultValue::String(i) => SlotValue::String(i),
    DefaultValue::Double(i) => SlotValue::Double(i),
    DefaultValue::Int(i) => SlotValue::Int(i),
    DefaultValue::UInt(i) => SlotValue::UInt(i),
    DefaultValue::Namespace(i) => SlotValue::Namespace(i),
    DefaultValue::Undefined => return None,
  })
}

/// For each undefined-default Slot, scan `cinit` for
/// `findproperty <trait-name>; {pushtrue|pushfalse}` and patch the slot's
/// kind accordingly; otherwise the slot is dropped from the descriptor.
fn apply_cinit_bool_patches(
  class: &crate::abc::Class,
  cinit: &crate::abc::Method,
  values: &mut IndexMap<u32, VaultValue>,
) {
  let undefined_slots: Vec<(usize, u32)> = class
    .ctraits
    .iter()
    .enumerate()
    .filter(|(_, t)| {
      matches!(
        t.data,
        TraitData::Slot {
          value: DefaultValue::Undefined,
          ..
        }
      )
    })
    .map(|(i, t)| (i, t.name))
    .collect();

  for (slot_idx, trait_name) in undefined_slots {
    let found = cinit.code.windows(2).find_map(|w| {
      if w[0].op == Op::FindProperty && w[0].args.first() == Some(&(trait_name as i64)) {
        match w[1].op {
          Op::PushTrue => Some(SlotValue::True),
          Op::PushFalse => Some(SlotValue::False),
          _ => None,
        }
      } else {
        None
      }
    });
    match found {
      Some(v) => {
        values.insert(slot_idx as u32, VaultValue::Slot(v));
      }
      None => {
        values.shift_remove(&(slot_idx as u32));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slot_value_covers_every_default_kind_but_undefined() {
    assert!(matches!(slot_value(&DefaultValue::False), Some(SlotValue::False)));
    assert!(matches!(slot_value(&DefaultValue::True), Some(SlotValue::True)));
    assert!(matches!(slot_value(&DefaultValue::Null), Some(SlotValue::Null)));
    assert!(matches!(slot_value(&DefaultValue::String(3)), Some(SlotValue::String(3))));
    assert!(matches!(slot_value(&DefaultValue::Int(3)), Some(SlotValue::Int(3))));
    assert!(matches!(slot_value(&DefaultValue::UInt(3)), Some(SlotValue::UInt(3))));
    assert!(matches!(slot_value(&DefaultValue::Double(3)), Some(SlotValue::Double(3))));
    assert!(matches!(slot_value(&DefaultValue::Namespace(3)), Some(SlotValue::Namespace(3))));
    assert_eq!(slot_value(&DefaultValue::Undefined), None);
  }
}
