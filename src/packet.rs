//! Packet analyzer: mines the packet handler's dispatch code to recover
//! per-class semantic names, and the nested "tribulle" sub-protocol carried
//! under category `0x3c` code `0x03`.
//!
//! Every sub-walk here is best-effort: a step that can't
//! find its expected anchor just stops, leaving whatever placeholder name
//! the invalid-name renamer already assigned.

use indexmap::IndexMap;

use crate::abc::{AbcFile, Instruction, Op, Trait, TraitData};
use crate::config::{format_counter, format_multi, FormatArg, Formats};
use crate::graph::{Graph, NodeId};
use crate::namespace::{NamespaceAssigner, SyntheticNs};
use crate::recognize::PacketAnchors;

/// Runs every packet-naming sub-pass anchored on the recognized primitives.
/// Returns human-readable warnings for anchors that were missing or whose
/// expected shape wasn't found — callers surface these, they never abort
/// the run.
pub fn analyze_and_rename_packets(
  abc: &mut AbcFile,
  anchors: &PacketAnchors,
  formats: &Formats,
  ns: &mut NamespaceAssigner,
) -> Vec<String> {
  let mut warnings = Vec::new();

  if let Some(sb) = anchors.serverbound_base {
    let mn = abc.classes[sb.0].name;
    abc.rename_multiname(mn, "SPacketBase");
    ns.assign_class(abc, mn, SyntheticNs::Packets);
    rename_packet_writers(abc, sb.0);
    rename_serverbound_concrete(abc, sb.0, formats, ns);
  } else {
    warnings.push("serverbound packet base not recognized; serverbound packets left unnamed".into());
  }

  if let Some(cb) = anchors.clientbound_base {
    let mn = abc.classes[cb.0].name;
    abc.rename_multiname(mn, "RPacketBase");
    ns.assign_class(abc, mn, SyntheticNs::Packets);
    rename_unknown_clientbound_concrete(abc, cb.0, formats, ns);
  } else {
    warnings.push("clientbound packet base not recognized; clientbound packets left unnamed".into());
  }

  if let Some(vir) = anchors.var_int_reader {
    rename_var_int_reader(abc, vir.0);
  }

  if let Some(proxy) = anchors.interface_proxy {
    rename_interface_proxy_strings(abc, proxy.0);
  }

  if let Some(handler) = anchors.packet_handler {
    match crate::recognize::find_buffer_multiname(abc)
      .and_then(|buf| find_handler_dispatch_method(abc, handler.0, buf))
    {
      Some((trait_mn, method_idx)) => {
        let mn = abc.classes[handler.0].name;
        abc.rename_multiname(mn, "PacketHandler");
        ns.assign_class(abc, mn, SyntheticNs::Packets);
        abc.rename_multiname(trait_mn, "handle_packet");
        analyze_packet_dispatch(abc, handler.0, trait_mn, method_idx, formats, ns);
      }
      None => warnings.push("packet handler's dense dispatch method not found".into()),
    }
  } else {
    warnings.push("packet handler not recognized; clientbound packets left unnamed".into());
  }

  warnings
}

fn find_handler_dispatch_method(abc: &AbcFile, class_idx: usize, buffer_mn: u32) -> Option<(u32, u32)> {
  abc.classes[class_idx].ctraits.iter().find_map(|t| {
    let TraitData::Method { method, .. } = &t.data else {
      return None;
    };
    let method = *method;
    let m = abc.methods.get(method as usize)?;
    if m.param_types.len() == 1 && m.param_types[0] == buffer_mn && m.max_stack >= 30 && m.local_count >= 200 {
      Some((t.name, method))
    } else {
      None
    }
  })
}

fn find_ctrait_method(abc: &AbcFile, class_idx: usize, name_mn: u32) -> Option<u32> {
  abc.classes[class_idx]
    .ctraits
    .iter()
    .find(|t| t.name == name_mn)
    .and_then(Trait::method_index)
}

fn find_itrait_method(abc: &AbcFile, class_idx: usize, name_mn: u32) -> Option<u32> {
  abc.classes[class_idx]
    .itraits
    .iter()
    .find(|t| t.name == name_mn)
    .and_then(Trait::method_index)
}

fn find_slot_type(abc: &AbcFile, class_idx: usize, name_mn: u32) -> Option<u32> {
  let class = &abc.classes[class_idx];
  class.itraits.iter().chain(class.ctraits.iter()).find_map(|t| {
    if t.name != name_mn {
      return None;
    }
    match &t.data {
      TraitData::Slot { type_name, .. } | TraitData::Const { type_name, .. } if *type_name != 0 => {
        Some(*type_name)
      }
      _ => None,
    }
  })
}

/// Every class whose `super_name` is the serverbound base: combines the
/// `pushdouble` bytes its instance-init pushes before `constructsuper` into
/// a `(category, code)` pair and renames accordingly. The dispatcher-walking
/// recipe below covers clientbound packets; the producer encodes a
/// concrete serverbound packet's identity
/// directly in its constructor instead, which is why `serverbound_packet`
/// is a three-arity format key with no corresponding dispatcher walk.
fn rename_serverbound_concrete(abc: &mut AbcFile, base_idx: usize, formats: &Formats, ns: &mut NamespaceAssigner) {
  let base_mn = abc.classes[base_idx].name;
  let candidates: Vec<usize> = abc
    .classes
    .iter()
    .enumerate()
    .filter(|(_, c)| c.super_name == base_mn)
    .map(|(i, _)| i)
    .collect();

  for idx in candidates {
    let iinit = abc.classes[idx].iinit;
    let Some(method) = abc.methods.get(iinit as usize) else {
      continue;
    };
    let mut pcode: u32 = 0;
    for instr in &method.code {
      if instr.op == Op::ConstructSuper {
        break;
      }
      if instr.op == Op::PushDouble {
        let didx = instr.args.first().copied().unwrap_or(0) as usize;
        let byte = *abc.pool.doubles.get(didx).unwrap_or(&0.0) as u32 & 0xFF;
        pcode = (pcode << 8) | byte;
      }
    }
    let category = (pcode >> 8) & 0xFF;
    let code = pcode & 0xFF;
    let suffix = known_packet_suffix(category as u8, code as u8);
    let name = format_multi(
      &formats.serverbound_packet,
      &[FormatArg::UInt(category), FormatArg::UInt(code), FormatArg::Str(suffix)],
    );
    let mn = abc.classes[idx].name;
    abc.rename_multiname(mn, name);
    ns.assign_class(abc, mn, SyntheticNs::PacketsServerbound);
  }
}

/// Baseline sweep over every concrete clientbound class (by `super_name`),
/// run before the dispatcher walk below gets a chance to find real names.
/// Assigns each one a counted placeholder name and the clientbound
/// namespace so a class the walk never reaches (dead branch, walk failure)
/// still ends up renamed and namespaced instead of kept at whatever
/// placeholder the invalid-name renamer assigned. The dispatcher walk
/// overwrites this with the real name when it finds one.
fn rename_unknown_clientbound_concrete(abc: &mut AbcFile, base_idx: usize, formats: &Formats, ns: &mut NamespaceAssigner) {
  let base_mn = abc.classes[base_idx].name;
  let candidates: Vec<usize> = abc
    .classes
    .iter()
    .enumerate()
    .filter(|(_, c)| c.super_name == base_mn)
    .map(|(i, _)| i)
    .collect();

  let mut counter = 0u32;
  for idx in candidates {
    counter += 1;
    let name = format_counter(&formats.unknown_clientbound_packet, counter);
    let mn = abc.classes[idx].name;
    abc.rename_multiname(mn, name);
    ns.assign_class(abc, mn, SyntheticNs::PacketsClientbound);
  }
}

fn match_dispatch_idiom(
  code: &[Instruction],
  graph: &Graph,
  pos: usize,
  subject_mn: u32,
  pool: &crate::abc::ConstantPool,
) -> Option<(u8, usize)> {
  let a = code.get(pos)?;
  let b = code.get(pos + 1)?;
  let c = code.get(pos + 2)?;
  let d = code.get(pos + 3)?;
  if a.op != Op::GetLex || a.args.first().copied() != Some(subject_mn as i64) {
    return None;
  }
  if b.op != Op::GetProperty || c.op != Op::PushDouble || d.op != Op::IfNe {
    return None;
  }
  let idx = *c.args.first()? as usize;
  let value = *pool.doubles.get(idx)? as u8;
  let target = graph.get(NodeId::from_index(pos + 3)).targets.first()?.index();
  Some((value, target))
}

fn find_new_class_seq(code: &[Instruction], start: usize) -> Option<u32> {
  let mut i = start;
  while i + 2 < code.len() {
    if code[i].op == Op::ReturnVoid {
      return None;
    }
    if code[i].op == Op::FindPropStrict && code[i + 1].op == Op::GetLocal1 && code[i + 2].op == Op::ConstructProp {
      return code[i].args.first().map(|&v| v as u32);
    }
    i += 1;
  }
  None
}

/// A clientbound rung that returns a cached singleton instead of
/// constructing one: `getlex <class>; returnvalue` with no intervening
/// `constructprop`. Named via `unknown_clientbound_packet` rather than
/// `clientbound_packet`, since the category/code pair is known but the
/// usual construction idiom isn't present to confirm the class's role.
fn find_bare_class_ref(code: &[Instruction], start: usize) -> Option<u32> {
  let mut i = start;
  while i + 1 < code.len() {
    match code[i].op {
      Op::ReturnVoid | Op::ConstructProp => return None,
      Op::GetLex if code[i + 1].op == Op::ReturnValue => return code[i].args.first().map(|&v| v as u32),
      _ => {}
    }
    i += 1;
  }
  None
}

fn match_subhandler_fingerprint(code: &[Instruction], pos: usize, handler_mn: u32) -> Option<u32> {
  const SEQ: [Op; 6] = [
    Op::GetLex,
    Op::GetLocal1,
    Op::GetLex,
    Op::GetProperty,
    Op::CallPropVoid,
    Op::ReturnVoid,
  ];
  if pos + SEQ.len() > code.len() {
    return None;
  }
  for (k, op) in SEQ.iter().enumerate() {
    if code[pos + k].op != *op {
      return None;
    }
  }
  if code[pos + 2].args.first().copied() != Some(handler_mn as i64) {
    return None;
  }
  code[pos].args.first().map(|&v| v as u32)
}

/// The main dispatcher walk. A category idiom opens a ladder of nested code
/// idioms; each rung either constructs a concrete clientbound class,
/// recurses into a sub-handler, or — for `(0x3c, 0x03)` — hands off to the
/// tribulle sub-protocol.
fn analyze_packet_dispatch(
  abc: &mut AbcFile,
  handler_class_idx: usize,
  handler_trait_mn: u32,
  method_idx: u32,
  formats: &Formats,
  ns: &mut NamespaceAssigner,
) {
  let handler_mn = abc.classes[handler_class_idx].name;
  let code = abc.methods[method_idx as usize].code.clone();
  let graph = Graph::from_method(&abc.methods[method_idx as usize]);

  let mut i = 0usize;
  while i < code.len() {
    let Some((category, target)) = match_dispatch_idiom(&code, &graph, i, handler_mn, &abc.pool) else {
      i += 1;
      continue;
    };

    let mut j = i + 4;
    if code.get(j).map(|x| x.op) == Some(Op::PushDouble) {
      j += 1;
    }
    let mut found = false;

    loop {
      let Some((code_value, codetarget)) = match_dispatch_idiom(&code, &graph, j, handler_mn, &abc.pool) else {
        break;
      };

      if category == 0x3c && code_value == 0x03 {
        handle_tribulle(abc, &code, j + 4, formats, ns);
        found = true;
        break;
      }

      if let Some(class_mn) = find_new_class_seq(&code, j + 4) {
        if let Some(class_idx) = abc.class_by_multiname(class_mn) {
          let suffix = known_packet_suffix(category, code_value);
          let name = format_multi(
            &formats.clientbound_packet,
            &[
              FormatArg::UInt(category as u32),
              FormatArg::UInt(code_value as u32),
              FormatArg::Str(suffix),
            ],
          );
          let mn = abc.classes[class_idx].name;
          abc.rename_multiname(mn, name);
          ns.assign_class(abc, mn, SyntheticNs::PacketsClientbound);
        }
      } else if let Some(class_mn) = find_bare_class_ref(&code, j + 4) {
        if let Some(class_idx) = abc.class_by_multiname(class_mn) {
          let name = format_counter(&formats.unknown_clientbound_packet, code_value as u32);
          let mn = abc.classes[class_idx].name;
          abc.rename_multiname(mn, name);
          ns.assign_class(abc, mn, SyntheticNs::PacketsClientbound);
        }
      }

      found = true;
      j = codetarget;
      if j == target {
        break;
      }
      if code.get(j).map(|x| x.op) == Some(Op::PushDouble) {
        j += 1;
      }
    }

    if !found {
      if let Some(sub_mn) = match_subhandler_fingerprint(&code, j, handler_mn) {
        if let Some(sub_idx) = abc.class_by_multiname(sub_mn) {
          let name = format_counter(&formats.packet_subhandler, category as u32);
          let sub_name_mn = abc.classes[sub_idx].name;
          abc.rename_multiname(sub_name_mn, name);
          ns.assign_class(abc, sub_name_mn, SyntheticNs::Packets);

          if let Some(sub_method) = find_ctrait_method(abc, sub_idx, handler_trait_mn) {
            analyze_subhandler_dispatch(abc, sub_method, category, formats, ns);
          }
        }
      }
    }

    i = target;
  }
}

/// A sub-handler's own dispatch ladder: same idea as the top-level one, but
/// keyed on `getlocal2` (the incoming code byte) rather than a `getlex` on
/// the main handler.
fn analyze_subhandler_dispatch(
  abc: &mut AbcFile,
  method_idx: u32,
  category: u8,
  formats: &Formats,
  ns: &mut NamespaceAssigner,
) {
  let code = abc.methods[method_idx as usize].code.clone();
  let graph = Graph::from_method(&abc.methods[method_idx as usize]);

  let mut i = 0usize;
  while i < code.len() {
    if code[i].op != Op::GetLocal2 {
      i += 1;
      continue;
    }
    let (double_pos, ifne_pos) = if code.get(i + 1).map(|x| x.op) == Some(Op::PushDouble) {
      (i + 1, i + 2)
    } else if i > 0 && code[i - 1].op == Op::PushDouble {
      (i - 1, i + 1)
    } else {
      i += 1;
      continue;
    };

    if code.get(ifne_pos).map(|x| x.op) != Some(Op::IfNe) {
      i += 1;
      continue;
    }

    let didx = code[double_pos].args.first().copied().unwrap_or(0) as usize;
    let code_value = *abc.pool.doubles.get(didx).unwrap_or(&0.0) as u8;
    let Some(target) = graph.get(NodeId::from_index(ifne_pos)).targets.first().map(|t| t.index()) else {
      i += 1;
      continue;
    };

    if let Some(class_mn) = find_new_class_seq(&code, ifne_pos + 2) {
      if let Some(class_idx) = abc.class_by_multiname(class_mn) {
        let suffix = known_packet_suffix(category, code_value);
        let name = format_multi(
          &formats.clientbound_packet,
          &[
            FormatArg::UInt(category as u32),
            FormatArg::UInt(code_value as u32),
            FormatArg::Str(suffix),
          ],
        );
        let mn = abc.classes[class_idx].name;
        abc.rename_multiname(mn, name);
        ns.assign_class(abc, mn, SyntheticNs::PacketsClientbound);
      }
    }

    i = target;
  }
}

/// The nested "tribulle" sub-protocol carried by `(category=0x3c,
/// code=0x03)` packets.
fn handle_tribulle(abc: &mut AbcFile, outer_code: &[Instruction], start: usize, formats: &Formats, ns: &mut NamespaceAssigner) -> Option<()> {
  const GETTER_SEQ: [Op; 5] = [Op::GetLex, Op::GetLex, Op::GetProperty, Op::CallProperty, Op::Coerce];

  let mut pos = start;
  while pos < outer_code.len() && outer_code[pos].op != Op::ReturnVoid {
    if pos + GETTER_SEQ.len() <= outer_code.len() && (0..GETTER_SEQ.len()).all(|k| outer_code[pos + k].op == GETTER_SEQ[k]) {
      break;
    }
    pos += 1;
  }
  if pos >= outer_code.len() || outer_code[pos].op == Op::ReturnVoid {
    return None;
  }

  let first_class_mn = outer_code[pos].args.first().copied()? as u32;
  let first_class_idx = abc.class_by_multiname(first_class_mn)?;
  let callprop = outer_code.get(pos + 3)?;
  if callprop.op != Op::CallProperty {
    return None;
  }
  let trait_mn = callprop.args.first().copied()? as u32;
  let trait_method = find_ctrait_method(abc, first_class_idx, trait_mn)?;

  let inner_code = abc.methods[trait_method as usize].code.clone();
  let mut ip = 0usize;
  while ip < inner_code.len() && inner_code[ip].op != Op::GetLex {
    ip += 1;
  }
  if ip >= inner_code.len() {
    return None;
  }
  let mut chain_class_idx = abc.class_by_multiname(inner_code[ip].args.first().copied()? as u32)?;
  ip += 1;
  while ip < inner_code.len() && inner_code[ip].op == Op::GetProperty {
    let slot_mn = inner_code[ip].args.first().copied()? as u32;
    let type_mn = find_slot_type(abc, chain_class_idx, slot_mn)?;
    chain_class_idx = abc.class_by_multiname(type_mn)?;
    ip += 1;
  }
  while ip < inner_code.len() && inner_code[ip].op != Op::CallProperty {
    ip += 1;
  }
  let method_name_mn = inner_code.get(ip)?.args.first().copied()? as u32;

  let mut walk = Some(chain_class_idx);
  let mut resolved = None;
  while let Some(ci) = walk {
    if let Some(m) = find_itrait_method(abc, ci, method_name_mn) {
      resolved = Some((ci, m));
      break;
    }
    let super_mn = abc.classes[ci].super_name;
    walk = if super_mn != 0 { abc.class_by_multiname(super_mn) } else { None };
  }
  let (base_class_idx, base_method) = resolved?;

  find_sent_tribulle(abc, base_class_idx, formats, ns);

  let return_type = abc.methods[base_method as usize].return_type;
  if let Some(base_pkt_idx) = abc.class_by_multiname(return_type) {
    let mn = abc.classes[base_pkt_idx].name;
    abc.rename_multiname(mn, "TRPacketBase");
    ns.assign_class(abc, mn, SyntheticNs::PacketsTribulle);
  }

  let id_code = abc.methods[base_method as usize].code.clone();
  for k in 0..id_code.len() {
    if id_code[k].op != Op::PushDouble {
      continue;
    }
    let idx = id_code[k].args.first().copied().unwrap_or(0) as usize;
    let code_value = *abc.pool.doubles.get(idx).unwrap_or(&0.0) as u32;

    let mut m = k;
    while m < id_code.len() && id_code[m].op != Op::FindPropStrict {
      m += 1;
    }
    let Some(class_mn_raw) = id_code.get(m).and_then(|i| i.args.first().copied()) else {
      continue;
    };
    if let Some(class_idx) = abc.class_by_multiname(class_mn_raw as u32) {
      let suffix = known_tribulle_suffix(code_value);
      let name = format_multi(
        &formats.tribulle_clientbound_packet,
        &[FormatArg::UInt(code_value), FormatArg::Str(suffix)],
      );
      let mn = abc.classes[class_idx].name;
      abc.rename_multiname(mn, name);
      ns.assign_class(abc, mn, SyntheticNs::PacketsTribulleClientbound);
    }
  }

  Some(())
}

/// The tribulle serverbound id resolver: finds `getPacketId`, mines its
/// `(address → id)` and
/// `(switch-index → class)` tables, and renames each resolved class.
fn find_sent_tribulle(abc: &mut AbcFile, class_idx: usize, formats: &Formats, ns: &mut NamespaceAssigner) -> Option<()> {
  let itraits = abc.classes[class_idx].itraits.clone();
  let (method_idx, trait_name) = itraits.iter().find_map(|t| {
    let TraitData::Method { method, .. } = &t.data else {
      return None;
    };
    let method = *method;
    let m = abc.methods.get(method as usize)?;
    if m.param_types.len() == 1 && abc.pool.qname_str(m.return_type) == Some("int") {
      Some((method, t.name))
    } else {
      None
    }
  })?;
  abc.rename_multiname(trait_name, "getPacketId");

  let code = abc.methods[method_idx as usize].code.clone();
  let graph = Graph::from_method(&abc.methods[method_idx as usize]);

  let mut addr_to_id: IndexMap<usize, u32> = IndexMap::new();
  let mut i = 0;
  while i + 2 < code.len() {
    if code[i].op == Op::Label && code[i + 1].op == Op::PushDouble && code[i + 2].op == Op::ReturnValue {
      let idx = code[i + 1].args.first().copied().unwrap_or(0) as usize;
      let id = *abc.pool.doubles.get(idx).unwrap_or(&0.0) as u32;
      addr_to_id.insert(i, id);
    }
    i += 1;
  }

  let mut index_to_name: IndexMap<u32, u32> = IndexMap::new();
  let mut last_getlex: Option<u32> = None;
  let mut switch_pos = None;
  for (pos, instr) in code.iter().enumerate() {
    match instr.op {
      Op::GetLex => last_getlex = instr.args.first().map(|&v| v as u32),
      Op::PushByte => {
        if let Some(name) = last_getlex {
          let idx = instr.args.first().copied().unwrap_or(0) as u32;
          index_to_name.insert(idx, name);
        }
      }
      Op::LookupSwitch => {
        switch_pos = Some(pos);
        break;
      }
      _ => {}
    }
  }
  let switch_pos = switch_pos?;
  let targets = graph.get(NodeId::from_index(switch_pos)).targets.clone();

  for (&switch_index, &class_mn) in index_to_name.iter() {
    let Some(target_node) = targets.get(switch_index as usize + 1) else {
      continue;
    };
    let Some(&id) = addr_to_id.get(&target_node.index()) else {
      continue;
    };
    let Some(class_idx) = abc.class_by_multiname(class_mn) else {
      continue;
    };
    let suffix = known_tribulle_suffix(id);
    let name = format_multi(
      &formats.tribulle_serverbound_packet,
      &[FormatArg::UInt(id), FormatArg::Str(suffix)],
    );
    let mn = abc.classes[class_idx].name;
    abc.rename_multiname(mn, name);
    ns.assign_class(abc, mn, SyntheticNs::PacketsTribulleServerbound);
  }

  Some(())
}

/// §4.7d "writer rename": each zero/one-arg instance method on the
/// serverbound base that does nothing but load the buffer slot and call a
/// single method on it adopts that method's name.
fn rename_packet_writers(abc: &mut AbcFile, base_idx: usize) {
  let class = abc.classes[base_idx].clone();
  for t in &class.itraits {
    let TraitData::Method { method, .. } = &t.data else {
      continue;
    };
    let method = *method;
    let Some(m) = abc.methods.get(method as usize).cloned() else {
      continue;
    };
    if m.max_stack != m.local_count || m.local_count > 2 {
      continue;
    }
    if m.init_scope_depth + 1 != m.max_scope_depth {
      continue;
    }
    if m.return_type != class.name {
      continue;
    }

    let mut seen_getproperty = false;
    let mut callpropvoid_name = None;
    let mut shape_ok = true;
    for instr in &m.code {
      match instr.op {
        Op::GetLocal0 | Op::GetLocal1 | Op::PushScope | Op::ReturnValue => {}
        Op::GetProperty if !seen_getproperty => seen_getproperty = true,
        Op::CallPropVoid if callpropvoid_name.is_none() => {
          callpropvoid_name = instr.args.first().copied();
        }
        _ => {
          shape_ok = false;
          break;
        }
      }
    }

    if shape_ok {
      if let Some(discovered) = callpropvoid_name.and_then(|mn| discovered_name(abc, mn as u32)) {
        abc.rename_multiname(t.name, discovered);
      }
    }
  }
}

/// §4.7d "reader rename": each zero-parameter, ≤2-stack, single-local
/// method on the var-int reader that calls a single buffer method adopts
/// that method's name; boolean-returning ones are `readBoolean`; the first
/// unnamed one is `readVarInt`.
fn rename_var_int_reader(abc: &mut AbcFile, reader_idx: usize) {
  let class = abc.classes[reader_idx].clone();
  let mut varint_assigned = false;
  for t in &class.itraits {
    let TraitData::Method { method, .. } = &t.data else {
      continue;
    };
    let method = *method;
    let Some(m) = abc.methods.get(method as usize).cloned() else {
      continue;
    };
    if !m.param_types.is_empty() || m.local_count > 1 || m.max_stack > 2 {
      continue;
    }

    if abc.pool.qname_str(m.return_type) == Some("Boolean") {
      abc.rename_multiname(t.name, "readBoolean");
      continue;
    }

    let called = m.code.iter().find_map(|i| {
      matches!(i.op, Op::CallProperty | Op::CallPropVoid)
        .then(|| i.args.first().copied())
        .flatten()
    });

    if let Some(discovered) = called.and_then(|mn| discovered_name(abc, mn as u32)) {
      abc.rename_multiname(t.name, discovered);
    } else if !varint_assigned {
      abc.rename_multiname(t.name, "readVarInt");
      varint_assigned = true;
    }
  }
}

fn discovered_name(abc: &AbcFile, mn_idx: u32) -> Option<String> {
  let name_idx = abc.pool.multinames.get(mn_idx as usize)?.name_index()?;
  abc.pool.strings.get(name_idx as usize).cloned()
}

/// §4.7e: un-mangles the interface proxy's own property names using the
/// string-keyed property accesses in its instance-init.
fn rename_interface_proxy_strings(abc: &mut AbcFile, proxy_idx: usize) {
  const PLACEHOLDER_PREFIXES: [&str; 3] = ["method_", "name_", "const_"];
  let iinit = abc.classes[proxy_idx].iinit;
  let Some(code) = abc.methods.get(iinit as usize).map(|m| m.code.clone()) else {
    return;
  };

  let mut i = 0;
  while i + 1 < code.len() {
    if code[i].op == Op::PushString && code[i + 1].op == Op::GetProperty {
      let key_idx = code[i].args.first().copied().unwrap_or(0) as usize;
      if let Some(key) = abc.pool.strings.get(key_idx).cloned() {
        if let Some(mn_idx) = code[i + 1].args.first().copied() {
          if mn_idx >= 0 {
            if let Some(current) = discovered_name(abc, mn_idx as u32) {
              if PLACEHOLDER_PREFIXES.iter().any(|p| current.starts_with(p)) {
                abc.rename_multiname(mn_idx as u32, key);
              }
            }
          }
        }
      }
    }
    i += 1;
  }
}

/// §4.7c: normalizes a raw descriptor string into a name fragment —
/// prepend `_`, drop non-letters, capitalize after any separator.
fn normalize_descriptor(raw: &str) -> String {
  let mut out = String::from("_");
  let mut capitalize_next = true;
  for c in raw.chars() {
    if !c.is_ascii_alphabetic() {
      if c == '_' || c == ' ' {
        capitalize_next = true;
      }
      continue;
    }
    out.push(if capitalize_next { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() });
    capitalize_next = false;
  }
  out
}

/// Producer-specific known-name tables. No canonical packet list ships
/// with this crate — entries are added as they're confirmed against a
/// real movie — so both lookups currently fall through to an empty
/// suffix, which is a no-op for the name formats.
fn known_packet_suffix(category: u8, code: u8) -> String {
  KNOWN_PACKETS
    .iter()
    .find(|(c, k, _)| *c == category && *k == code)
    .map(|(_, _, name)| normalize_descriptor(name))
    .unwrap_or_default()
}

fn known_tribulle_suffix(code: u32) -> String {
  KNOWN_TRIBULLE
    .iter()
    .find(|(c, _)| *c == code)
    .map(|(_, name)| normalize_descriptor(name))
    .unwrap_or_default()
}

const KNOWN_PACKETS: &[(u8, u8, &str)] = &[];
const KNOWN_TRIBULLE: &[(u32, &str)] = &[];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unconditional_sweep_renames_and_namespaces_unreached_clientbound_class() {
    use crate::abc::{AbcFile, Class, ClassFlags, ConstantPool, Multiname};

    let mut pool = ConstantPool::default();
    pool.strings.push(String::new());
    let base_name = pool.push_string("RPacketBase");
    pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
    let base_mn = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name: base_name });

    let concrete_name = pool.push_string("class_001");
    let concrete_mn = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name: concrete_name });

    let base_class = Class {
      name: base_mn,
      super_name: 0,
      flags: ClassFlags::default(),
      protected_ns: 0,
      iinit: 0,
      cinit: 0,
      itraits: vec![],
      ctraits: vec![],
    };
    let concrete_class = Class {
      name: concrete_mn,
      super_name: base_mn,
      flags: ClassFlags::default(),
      protected_ns: 0,
      iinit: 0,
      cinit: 0,
      itraits: vec![],
      ctraits: vec![],
    };

    let mut abc = AbcFile {
      minor_version: 16,
      major_version: 46,
      pool,
      methods: vec![Default::default()],
      classes: vec![base_class, concrete_class],
      scripts: vec![],
      namespace_map: Default::default(),
    };

    let mut ns = NamespaceAssigner::new();
    let formats = Formats::default();
    // No dispatcher walk runs here; the baseline sweep alone must still
    // rename and namespace the concrete class.
    rename_unknown_clientbound_concrete(&mut abc, 0, &formats, &mut ns);

    assert_ne!(abc.pool.multinames[concrete_mn as usize], Multiname::QName { ns: 0, name: concrete_name });
    let patched = abc.pool.qname_str(concrete_mn).unwrap();
    assert_ne!(patched, "class_001");
  }

  #[test]
  fn normalizes_a_snake_case_descriptor() {
    assert_eq!(normalize_descriptor("tribulle_message"), "_TribulleMessage");
  }

  #[test]
  fn normalizes_a_space_separated_descriptor() {
    assert_eq!(normalize_descriptor("room password"), "_RoomPassword");
  }

  #[test]
  fn unknown_codes_produce_an_empty_suffix() {
    assert_eq!(known_packet_suffix(0x05, 0x07), "");
    assert_eq!(known_tribulle_suffix(0x0042), "");
  }

  #[test]
  fn dispatch_idiom_matches_the_documented_four_opcode_window() {
    let mut pool = crate::abc::ConstantPool::default();
    pool.strings.push(String::new());
    pool.multinames.push(crate::abc::Multiname::QName { ns: 0, name: 0 });
    let didx = pool.push_double(5.0);

    let code = vec![
      Instruction {
        op: Op::GetLex,
        args: vec![0],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::GetProperty,
        args: vec![0],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::PushDouble,
        args: vec![didx as i64],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::IfNe,
        args: vec![],
        branch_offsets: vec![4],
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ];
    let method = crate::abc::Method {
      code: code.clone(),
      ..Default::default()
    };
    let graph = Graph::from_method(&method);
    let result = match_dispatch_idiom(&code, &graph, 0, 0, &pool);
    assert_eq!(result.map(|(v, _)| v), Some(5));
  }
}
