//! Arena-based instruction graph for a single method body. Nodes are
//! addressed by stable integer handles rather than by vector index, so a
//! rewrite pass can detach nodes
//! without invalidating handles held by other passes.

use indexmap::IndexMap;

use crate::abc::{Instruction, Method, Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
  /// Builds a handle from a position in the method's *original* code order.
  /// Only valid against a freshly built, never-detached graph — callers that
  /// only read a graph (never call `detach`/`push_after`) can treat node
  /// positions as plain indices this way instead of walking `next` links.
  pub fn from_index(index: usize) -> NodeId {
    NodeId(index as u32)
  }

  /// The node's position in the method's original (pre-rewrite) code
  /// order. Stable for the lifetime of the graph even after detaches,
  /// since handles are never reused or renumbered.
  pub fn index(&self) -> usize {
    self.0 as usize
  }
}

#[derive(Debug, Clone)]
pub struct Node {
  pub instr: Instruction,
  pub prev: Option<NodeId>,
  pub next: Option<NodeId>,
  /// Populated only for branch/lookupswitch instructions.
  pub targets: Vec<NodeId>,
  live: bool,
}

/// A method's instruction stream rebuilt as a doubly-linked arena. Detaching
/// a node (see [`Graph::detach`]) relinks its neighbors and redirects any
/// jump or exception record that pointed at it to its successor; it does not
/// remove the slot, so existing `NodeId`s referring to later instructions
/// stay valid — a handle is never reused or invalidated by a detach.
pub struct Graph {
  nodes: Vec<Node>,
  pub head: Option<NodeId>,
  pub exceptions: Vec<ExceptionEdge>,
}

#[derive(Debug, Clone)]
pub struct ExceptionEdge {
  pub from: NodeId,
  pub to: NodeId,
  pub target: NodeId,
  pub exc_type: u32,
  pub var_name: u32,
}

impl Graph {
  /// Builds a graph from a decoded method body, resolving each branch's
  /// relative byte offset into a handle of the instruction it lands on.
  pub fn from_method(method: &Method) -> Graph {
    let mut addr_of = Vec::with_capacity(method.code.len());
    let mut addr = 0i64;
    for instr in &method.code {
      addr_of.push(addr);
      addr += instruction_len(instr);
    }
    let end_addr = addr;

    let mut addr_to_index: IndexMap<i64, usize> = IndexMap::new();
    for (i, &a) in addr_of.iter().enumerate() {
      addr_to_index.insert(a, i);
    }

    // Invalid-jump policy: an offset landing mid-instruction or past the end
    // of the method retargets to the branch's textual successor rather than
    // failing the build.
    let resolve = |from_addr: i64, offset: i32, owner: usize| -> usize {
      let target = from_addr + offset as i64;
      if target == end_addr {
        return method.code.len(); // falls through to end-of-method; caller handles.
      }
      match addr_to_index.get(&target) {
        Some(&idx) => idx,
        None => (owner + 1).min(method.code.len()),
      }
    };

    let mut nodes = Vec::with_capacity(method.code.len());
    for (i, instr) in method.code.iter().enumerate() {
      let from_addr = addr_of[i] + branch_base_offset(instr);
      let targets: Vec<NodeId> = instr
        .branch_offsets
        .iter()
        .filter_map(|&off| {
          let idx = resolve(from_addr, off, i);
          if idx < method.code.len() {
            Some(NodeId(idx as u32))
          } else {
            None
          }
        })
        .collect();

      nodes.push(Node {
        instr: instr.clone(),
        prev: if i == 0 { None } else { Some(NodeId((i - 1) as u32)) },
        next: if i + 1 < method.code.len() {
          Some(NodeId((i + 1) as u32))
        } else {
          None
        },
        targets,
        live: true,
      });
    }

    let exceptions = method
      .exceptions
      .iter()
      .map(|e| ExceptionEdge {
        from: nearest_node_at_or_before(&addr_of, e.from as i64),
        to: nearest_node_at_or_before(&addr_of, e.to as i64),
        target: nearest_node_at_or_before(&addr_of, e.target as i64),
        exc_type: e.exc_type,
        var_name: e.var_name,
      })
      .collect();

    Graph {
      head: if nodes.is_empty() { None } else { Some(NodeId(0)) },
      nodes,
      exceptions,
    }
  }

  pub fn get(&self, id: NodeId) -> &Node {
    &self.nodes[id.0 as usize]
  }

  pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
    &mut self.nodes[id.0 as usize]
  }

  pub fn is_live(&self, id: NodeId) -> bool {
    self.nodes[id.0 as usize].live
  }

  /// Iterates live nodes in program order starting at `head`.
  pub fn iter_live(&self) -> impl Iterator<Item = NodeId> + '_ {
    let mut cur = self.head;
    std::iter::from_fn(move || {
      let id = cur?;
      cur = self.get(id).next;
      Some(id)
    })
  }

  pub fn push_after(&mut self, after: NodeId, instr: Instruction) -> NodeId {
    let new_id = NodeId(self.nodes.len() as u32);
    let next = self.get(after).next;
    self.nodes.push(Node {
      instr,
      prev: Some(after),
      next,
      targets: Vec::new(),
      live: true,
    });
    if let Some(next_id) = next {
      self.get_mut(next_id).prev = Some(new_id);
    }
    self.get_mut(after).next = Some(new_id);
    new_id
  }

  /// Removes `id` from the live chain, relinking its neighbors and
  /// redirecting any jump or exception edge that targeted it to whatever
  /// follows it (the unscrambler relies on this when deleting wrapper calls
  /// and passthrough methods).
  pub fn detach(&mut self, id: NodeId) {
    let (prev, next) = {
      let node = self.get(id);
      (node.prev, node.next)
    };

    match (prev, next) {
      (Some(p), _) => self.get_mut(p).next = next,
      (None, _) => self.head = next,
    }
    if let Some(n) = next {
      self.get_mut(n).prev = prev;
    }

    let replacement = next.or(prev);
    if let Some(replacement) = replacement {
      for node in self.nodes.iter_mut() {
        for t in node.targets.iter_mut() {
          if *t == id {
            *t = replacement;
          }
        }
      }
      for edge in self.exceptions.iter_mut() {
        for field in [&mut edge.from, &mut edge.to, &mut edge.target] {
          if *field == id {
            *field = replacement;
          }
        }
      }
    }

    self.get_mut(id).live = false;
  }

  /// Serializes the live chain back into a flat instruction list with
  /// recomputed relative branch offsets, ready for [`crate::abc::write_abc`].
  pub fn finish(&self) -> (Vec<Instruction>, Vec<crate::abc::Exception>) {
    let order: Vec<NodeId> = self.iter_live().collect();
    let mut index_of: IndexMap<NodeId, usize> = IndexMap::new();
    for (i, id) in order.iter().enumerate() {
      index_of.insert(*id, i);
    }

    let mut addr_of = Vec::with_capacity(order.len());
    let mut addr = 0i64;
    for id in &order {
      addr_of.push(addr);
      addr += instruction_len(&self.get(*id).instr);
    }
    let end_addr = addr;

    let mut out = Vec::with_capacity(order.len());
    for (i, id) in order.iter().enumerate() {
      let node = self.get(*id);
      let mut instr = node.instr.clone();
      if !node.targets.is_empty() {
        let from_addr = addr_of[i] + branch_base_offset(&instr);
        instr.branch_offsets = node
          .targets
          .iter()
          .map(|t| {
            let target_addr = index_of
              .get(t)
              .map(|&idx| addr_of[idx])
              .unwrap_or(end_addr);
            (target_addr - from_addr) as i32
          })
          .collect();
      }
      out.push(instr);
    }

    let exceptions = self
      .exceptions
      .iter()
      .map(|e| crate::abc::Exception {
        from: index_of.get(&e.from).copied().unwrap_or(0) as u32,
        to: index_of.get(&e.to).copied().unwrap_or(0) as u32,
        target: index_of.get(&e.target).copied().unwrap_or(0) as u32,
        exc_type: e.exc_type,
        var_name: e.var_name,
      })
      .collect();

    (out, exceptions)
  }
}

fn nearest_node_at_or_before(addr_of: &[i64], addr: i64) -> NodeId {
  let idx = addr_of
    .iter()
    .rposition(|&a| a <= addr)
    .unwrap_or(0);
  NodeId(idx as u32)
}

/// Size in bytes of one encoded instruction, used to rebuild the byte-offset
/// table branch targets are expressed in. Must track `writer::encode_instructions`.
fn instruction_len(instr: &Instruction) -> i64 {
  use crate::abc::opcode::{is_branch, is_lookupswitch, operands, Operand};
  let mut len = 1i64; // opcode byte

  if is_branch(instr.op) {
    len += 3;
  } else if is_lookupswitch(instr.op) {
    len += 3; // default offset
    len += varint_len(instr.args[0] as u32) as i64;
    len += 3 * (instr.branch_offsets.len().saturating_sub(1)) as i64;
  } else {
    for (operand, value) in operands(instr.op).iter().zip(&instr.args) {
      len += match operand {
        Operand::U8 | Operand::I8 => 1,
        _ => varint_len(*value as u32) as i64,
      };
    }
  }
  len
}

/// Byte offset (from the instruction's own address) that a branch offset is
/// measured from. `jump`/`if*` offsets are relative to the first byte of the
/// *next* instruction (opcode + 3-byte offset field = 4); `lookupswitch`
/// offsets are the one AVM2 exception, measured from the switch opcode's own
/// address (0).
fn branch_base_offset(instr: &Instruction) -> i64 {
  use crate::abc::opcode::{is_branch, is_lookupswitch};
  if is_branch(instr.op) {
    4
  } else if is_lookupswitch(instr.op) {
    0
  } else {
    0
  }
}

fn varint_len(mut v: u32) -> usize {
  let mut n = 1;
  while v >= 0x80 {
    v >>= 7;
    n += 1;
  }
  n
}

#[cfg(test)]
mod tests {
  use super::*;

  fn method_with(code: Vec<Instruction>) -> Method {
    Method {
      code,
      ..Default::default()
    }
  }

  #[test]
  fn resolves_a_forward_branch_target() {
    let m = method_with(vec![
      Instruction {
        op: Op::PushTrue,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::IfTrue,
        args: vec![],
        branch_offsets: vec![4], // skip the pushfalse, land on returnvoid
      },
      Instruction {
        op: Op::PushFalse,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);

    let graph = Graph::from_method(&m);
    let if_node = graph.head.unwrap();
    let if_node = graph.get(if_node).next.unwrap();
    assert_eq!(graph.get(if_node).targets.len(), 1);
    let target = graph.get(if_node).targets[0];
    assert_eq!(graph.get(target).instr.op, Op::ReturnVoid);
  }

  #[test]
  fn detach_relinks_neighbors_and_redirects_targets() {
    let m = method_with(vec![
      Instruction {
        op: Op::PushTrue,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::Pop,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);

    let mut graph = Graph::from_method(&m);
    let first = graph.head.unwrap();
    let second = graph.get(first).next.unwrap();
    graph.detach(second);

    assert_eq!(graph.get(first).next, graph.get(second).next);
    let remaining: Vec<Op> = graph.iter_live().map(|id| graph.get(id).instr.op).collect();
    assert_eq!(remaining, vec![Op::PushTrue, Op::ReturnVoid]);
  }

  #[test]
  fn malformed_branch_target_retargets_to_textual_successor() {
    let m = method_with(vec![
      Instruction {
        op: Op::IfTrue,
        args: vec![],
        branch_offsets: vec![9999], // does not land on any instruction boundary
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);

    let graph = Graph::from_method(&m);
    let if_node = graph.head.unwrap();
    assert_eq!(graph.get(if_node).targets.len(), 1);
    let target = graph.get(if_node).targets[0];
    assert_eq!(Some(target), graph.get(if_node).next);
  }

  #[test]
  fn finish_round_trips_addresses_after_no_op_rebuild() {
    let m = method_with(vec![
      Instruction {
        op: Op::Jump,
        args: vec![],
        branch_offsets: vec![0],
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);

    let graph = Graph::from_method(&m);
    let (code, _) = graph.finish();
    assert_eq!(code[0].branch_offsets, vec![0]);
  }
}
