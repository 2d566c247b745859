//! Namespace assigner: creates the six synthetic packages the packet
//! analyzer and declarative matcher move renamed classes into, and patches
//! every multiname that refers to a moved identifier so runtime property
//! lookups keep resolving.

use indexmap::IndexMap;

use crate::abc::{AbcFile, Multiname, Namespace, NamespaceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticNs {
  ComObfuscate,
  Packets,
  PacketsServerbound,
  PacketsClientbound,
  PacketsTribulle,
  PacketsTribulleServerbound,
  PacketsTribulleClientbound,
}

impl SyntheticNs {
  fn path(self) -> &'static str {
    match self {
      SyntheticNs::ComObfuscate => "com.obfuscate",
      SyntheticNs::Packets => "packets",
      SyntheticNs::PacketsServerbound => "packets.serverbound",
      SyntheticNs::PacketsClientbound => "packets.clientbound",
      SyntheticNs::PacketsTribulle => "packets.tribulle",
      SyntheticNs::PacketsTribulleServerbound => "packets.tribulle.serverbound",
      SyntheticNs::PacketsTribulleClientbound => "packets.tribulle.clientbound",
    }
  }
}

/// Lazily creates the synthetic package namespaces and records which
/// identifier (by name-pool index) was moved to which one.
pub struct NamespaceAssigner {
  ns_index: IndexMap<SyntheticNs, u32>,
  /// `name-index -> namespace-index`, mirrored onto `AbcFile::namespace_map`
  /// as entries are added so a resumed run can inspect it.
  assignments: IndexMap<u32, u32>,
}

impl NamespaceAssigner {
  pub fn new() -> Self {
    NamespaceAssigner {
      ns_index: IndexMap::new(),
      assignments: IndexMap::new(),
    }
  }

  fn namespace_index(&mut self, abc: &mut AbcFile, ns: SyntheticNs) -> u32 {
    if let Some(&idx) = self.ns_index.get(&ns) {
      return idx;
    }
    let name_idx = abc.pool.push_string(ns.path());
    abc.pool.namespaces.push(Namespace {
      kind: NamespaceKind::Public,
      name: name_idx,
    });
    let ns_idx = (abc.pool.namespaces.len() - 1) as u32;
    self.ns_index.insert(ns, ns_idx);
    ns_idx
  }

  /// Assigns the class whose (already renamed) multiname is `mn_idx` to
  /// `ns`, recording the move so [`Self::patch_multinames`] can fix up
  /// every other reference to the same name.
  pub fn assign_class(&mut self, abc: &mut AbcFile, mn_idx: u32, ns: SyntheticNs) {
    let ns_idx = self.namespace_index(abc, ns);
    let Some(name_idx) = abc.pool.multinames.get(mn_idx as usize).and_then(|m| m.name_index()) else {
      return;
    };
    if let Some(mn) = abc.pool.multinames.get_mut(mn_idx as usize) {
      mn.set_ns(ns_idx);
    }
    self.assignments.insert(name_idx, ns_idx);
    abc.namespace_map.insert(name_idx, ns_idx);
  }

  /// Sweeps every multiname in the pool; any whose name-index was moved
  /// gets its namespace (QName) or namespace-set (multi-namespace kinds)
  /// patched to the assigned package. Idempotent.
  pub fn patch_multinames(&self, abc: &mut AbcFile) {
    if self.assignments.is_empty() {
      return;
    }
    let mut ns_set_cache: IndexMap<u32, u32> = IndexMap::new();

    for idx in 0..abc.pool.multinames.len() {
      let Some(name_idx) = abc.pool.multinames[idx].name_index() else {
        continue;
      };
      let Some(&ns_idx) = self.assignments.get(&name_idx) else {
        continue;
      };
      match &abc.pool.multinames[idx] {
        Multiname::QName { .. } | Multiname::RtqName { .. } => {
          abc.pool.multinames[idx].set_ns(ns_idx);
        }
        Multiname::Multiname { .. } => {
          let set_idx = *ns_set_cache
            .entry(ns_idx)
            .or_insert_with(|| abc.pool.intern_ns_set(ns_idx));
          abc.pool.multinames[idx].set_ns_set(set_idx);
        }
        _ => {}
      }
    }
  }
}

impl Default for NamespaceAssigner {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abc::ConstantPool;

  #[test]
  fn assigns_and_patches_a_second_reference_sharing_the_name() {
    let mut pool = ConstantPool::default();
    pool.strings.push(String::new());
    let name = pool.push_string("CPacket0507Foo");
    pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
    let own_mn = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name });
    let other_mn = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::Multiname { name, ns_set: 0 });
    pool.ns_sets.push(vec![]);

    let mut abc = AbcFile {
      minor_version: 16,
      major_version: 46,
      pool,
      methods: vec![],
      classes: vec![],
      scripts: vec![],
      namespace_map: Default::default(),
    };

    let mut assigner = NamespaceAssigner::new();
    assigner.assign_class(&mut abc, own_mn, SyntheticNs::PacketsClientbound);
    assigner.patch_multinames(&mut abc);

    let Multiname::QName { ns, .. } = &abc.pool.multinames[own_mn as usize] else {
      panic!()
    };
    let ns = *ns;
    let ns_name = abc.pool.strings[abc.pool.namespaces[ns as usize].name as usize].clone();
    assert_eq!(ns_name, "packets.clientbound");

    let Multiname::Multiname { ns_set, .. } = &abc.pool.multinames[other_mn as usize] else {
      panic!()
    };
    assert_eq!(abc.pool.ns_sets[*ns_set as usize], vec![ns]);
  }
}
