//! In-memory representation of a parsed ABC file.
//!
//! Every array here is append-only once a file is loaded: rewriters push new
//! constant-pool entries rather than mutating existing ones, and never
//! renumber multiname indices.

use indexmap::IndexMap;

use super::opcode::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
  Private,
  Public,
  PackageInternal,
  Protected,
  Explicit,
  StaticProtected,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
  pub kind: NamespaceKind,
  /// Index into the string pool; 0 means the anonymous/"any" namespace.
  pub name: u32,
}

/// A symbolic reference to a name within a namespace context. `name()`
/// returns `None` for the late-binding kinds, which have no compile-time
/// name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Multiname {
  QName {
    ns: u32,
    name: u32,
  },
  /// Runtime-qualified: the namespace is resolved at runtime, only the name
  /// is known ahead of time.
  RtqName {
    name: u32,
  },
  /// Runtime-qualified, late name: neither namespace nor name is known ahead
  /// of time.
  RtqNameLate,
  /// Candidate namespace set, name known ahead of time.
  Multiname {
    name: u32,
    ns_set: u32,
  },
  /// Candidate namespace set, late name.
  MultinameLate {
    ns_set: u32,
  },
  /// A parametrized type, e.g. `Vector.<int>`.
  Typename {
    base: u32,
    params: Vec<u32>,
  },
}

impl Multiname {
  pub fn name_index(&self) -> Option<u32> {
    match *self {
      Multiname::QName { name, .. } => Some(name),
      Multiname::RtqName { name, .. } => Some(name),
      Multiname::Multiname { name, .. } => Some(name),
      Multiname::RtqNameLate | Multiname::MultinameLate { .. } | Multiname::Typename { .. } => {
        None
      }
    }
  }

  pub fn ns_set_index(&self) -> Option<u32> {
    match *self {
      Multiname::Multiname { ns_set, .. } => Some(ns_set),
      Multiname::MultinameLate { ns_set } => Some(ns_set),
      _ => None,
    }
  }

  /// Rewrites the name component in place, preserving whichever namespace
  /// or namespace-set the multiname already carries. Every instruction or
  /// trait that referenced this multiname by *index* sees the new text
  /// immediately, since pool indices are never renumbered.
  pub fn set_name(&mut self, name: u32) {
    match self {
      Multiname::QName { name: slot, .. } => *slot = name,
      Multiname::RtqName { name: slot } => *slot = name,
      Multiname::Multiname { name: slot, .. } => *slot = name,
      Multiname::RtqNameLate | Multiname::MultinameLate { .. } | Multiname::Typename { .. } => {}
    }
  }

  pub fn set_ns(&mut self, ns: u32) {
    if let Multiname::QName { ns: slot, .. } = self {
      *slot = ns;
    }
  }

  pub fn set_ns_set(&mut self, ns_set: u32) {
    match self {
      Multiname::Multiname { ns_set: slot, .. } => *slot = ns_set,
      Multiname::MultinameLate { ns_set: slot } => *slot = ns_set,
      _ => {}
    }
  }
}

/// Default-value kind for a Slot/Const trait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
  Undefined,
  String(u32),
  Int(u32),
  UInt(u32),
  Double(u32),
  False,
  True,
  Null,
  Namespace(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraitAttrs {
  pub is_final: bool,
  pub is_override: bool,
  pub has_metadata: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraitData {
  Slot {
    slot_id: u32,
    type_name: u32,
    value: DefaultValue,
  },
  Const {
    slot_id: u32,
    type_name: u32,
    value: DefaultValue,
  },
  Method {
    disp_id: u32,
    method: u32,
  },
  Getter {
    disp_id: u32,
    method: u32,
  },
  Setter {
    disp_id: u32,
    method: u32,
  },
  Class {
    slot_id: u32,
    class: u32,
  },
  Function {
    slot_id: u32,
    function: u32,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trait {
  /// Index into the multiname pool.
  pub name: u32,
  pub attrs: TraitAttrs,
  pub data: TraitData,
}

impl Trait {
  pub fn kind_str(&self) -> &'static str {
    match self.data {
      TraitData::Slot { .. } => "slot",
      TraitData::Const { .. } => "const",
      TraitData::Method { .. } => "method",
      TraitData::Getter { .. } => "getter",
      TraitData::Setter { .. } => "setter",
      TraitData::Class { .. } => "class",
      TraitData::Function { .. } => "function",
    }
  }

  pub fn is_method_like(&self) -> bool {
    matches!(
      self.data,
      TraitData::Method { .. } | TraitData::Getter { .. } | TraitData::Setter { .. }
    )
  }

  pub fn method_index(&self) -> Option<u32> {
    match &self.data {
      TraitData::Method { method, .. }
      | TraitData::Getter { method, .. }
      | TraitData::Setter { method, .. } => Some(*method),
      TraitData::Function { function, .. } => Some(*function),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassFlags {
  pub sealed: bool,
  pub is_final: bool,
  pub interface: bool,
  pub has_protected_ns: bool,
}

#[derive(Debug, Clone)]
pub struct Class {
  /// Index into the multiname pool.
  pub name: u32,
  pub super_name: u32,
  pub flags: ClassFlags,
  pub protected_ns: u32,
  pub iinit: u32,
  pub cinit: u32,
  pub itraits: Vec<Trait>,
  pub ctraits: Vec<Trait>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MethodFlags {
  pub need_arguments: bool,
  pub need_activation: bool,
  pub need_rest: bool,
  pub has_optional: bool,
  pub sets_dxns: bool,
  pub has_param_names: bool,
}

#[derive(Debug, Clone)]
pub struct Exception {
  pub from: u32,
  pub to: u32,
  pub target: u32,
  /// Index into the multiname pool; 0 means "any".
  pub exc_type: u32,
  /// Index into the string pool; 0 means no bound variable.
  pub var_name: u32,
}

#[derive(Debug, Clone)]
pub struct Instruction {
  pub op: Op,
  /// Non-branch operands, in the field order `opcode::operands` describes.
  pub args: Vec<i64>,
  /// Raw relative offsets, populated only for branch/lookupswitch opcodes.
  /// For `lookupswitch` this is `[default, case_0, case_1, ...]`.
  pub branch_offsets: Vec<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct Method {
  /// Index into the multiname pool for each parameter; 0 means untyped (`*`).
  pub param_types: Vec<u32>,
  pub return_type: u32,
  /// Index into the string pool; 0 if the method has no debug name.
  pub name: u32,
  pub flags: MethodFlags,
  /// Index into the string pool for each parameter, present only when
  /// `flags.has_param_names` is set.
  pub param_names: Vec<u32>,
  pub optional: Vec<DefaultValue>,
  pub max_stack: u32,
  pub local_count: u32,
  pub init_scope_depth: u32,
  pub max_scope_depth: u32,
  pub code: Vec<Instruction>,
  pub exceptions: Vec<Exception>,
  /// Activation-object traits declared inside the method body.
  pub traits: Vec<Trait>,
  /// True for methods with no body (interface methods, natives).
  pub is_native: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
  pub ints: Vec<i32>,
  pub uints: Vec<u32>,
  pub doubles: Vec<f64>,
  pub strings: Vec<String>,
  pub namespaces: Vec<Namespace>,
  pub ns_sets: Vec<Vec<u32>>,
  pub multinames: Vec<Multiname>,
}

impl ConstantPool {
  pub fn push_int(&mut self, value: i32) -> u32 {
    self.ints.push(value);
    (self.ints.len() - 1) as u32
  }

  pub fn push_double(&mut self, value: f64) -> u32 {
    self.doubles.push(value);
    (self.doubles.len() - 1) as u32
  }

  pub fn push_string(&mut self, value: impl Into<String>) -> u32 {
    self.strings.push(value.into());
    (self.strings.len() - 1) as u32
  }

  /// Finds (or creates, caching by content) a namespace set containing only
  /// `ns`. Used by the namespace assigner when patching a multi-namespace
  /// multiname.
  pub fn intern_ns_set(&mut self, ns: u32) -> u32 {
    if let Some(idx) = self.ns_sets.iter().position(|set| set == &[ns]) {
      return idx as u32;
    }
    self.ns_sets.push(vec![ns]);
    (self.ns_sets.len() - 1) as u32
  }

  pub fn qname_str(&self, multiname_idx: u32) -> Option<&str> {
    match self.multinames.get(multiname_idx as usize)? {
      Multiname::QName { name, .. } | Multiname::RtqName { name, .. } => {
        self.strings.get(*name as usize).map(String::as_str)
      }
      Multiname::Multiname { name, .. } => self.strings.get(*name as usize).map(String::as_str),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct Script {
  pub init: u32,
  pub traits: Vec<Trait>,
}

/// The root of a parsed `DoABC` tag.
#[derive(Debug, Clone, Default)]
pub struct AbcFile {
  pub minor_version: u16,
  pub major_version: u16,
  pub pool: ConstantPool,
  pub methods: Vec<Method>,
  pub classes: Vec<Class>,
  pub scripts: Vec<Script>,
  /// Formatted-name synthesis counters live on the renamer, not here; this
  /// map just tracks which multiname-name indices got assigned to which
  /// synthetic namespace, for the final multiname patch-up pass.
  pub namespace_map: IndexMap<u32, u32>,
}

impl AbcFile {
  pub fn class_by_name(&self, name: &str) -> Option<usize> {
    self
      .classes
      .iter()
      .position(|c| self.pool.qname_str(c.name) == Some(name))
  }

  /// Finds the class whose own QName multiname index is `mn`. Several
  /// rewriters resolve a `getlex`/`findpropstrict` operand this way.
  pub fn class_by_multiname(&self, mn: u32) -> Option<usize> {
    self.classes.iter().position(|c| c.name == mn)
  }

  /// Gives `mn_idx` a new name string, in place. Returns the new string's
  /// pool index (useful as a key into `namespace_map`).
  pub fn rename_multiname(&mut self, mn_idx: u32, new_name: impl Into<String>) -> u32 {
    let name_idx = self.pool.push_string(new_name);
    if let Some(mn) = self.pool.multinames.get_mut(mn_idx as usize) {
      mn.set_name(name_idx);
    }
    name_idx
  }
}
