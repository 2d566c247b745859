//! The unscrambler: the per-method pass that deletes wrapper-class lookups
//! and calls, and rewrites `getlex <static-class>` sequences into direct
//! pushes of the constant they were hiding.
//!
//! This is the one stage the orchestrator runs across a worker pool; the
//! only shared mutable state it touches is the constant pool's append
//! primitive, guarded by a mutex the caller holds for us.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::abc::{Instruction, Method, Op};
use crate::graph::{Graph, NodeId};
use crate::recognize::{SlotValue, StaticClass, VaultValue, WrapperClass};

pub struct PoolAppender<'a> {
  pub pool: &'a Mutex<crate::abc::ConstantPool>,
}

impl<'a> PoolAppender<'a> {
  pub fn append_double(&self, value: f64) -> u32 {
    self.pool.lock().unwrap().push_double(value)
  }

  pub fn append_int(&self, value: i32) -> u32 {
    self.pool.lock().unwrap().push_int(value)
  }
}

/// Everything a worker needs to rewrite one method, keyed the way
/// `getlex`/`getproperty`/`callproperty` instructions reference it: by
/// multiname index, not by class-array index.
pub struct UnscrambleContext<'a> {
  pub wrapper_multiname: Option<u32>,
  pub wrapper: Option<&'a WrapperClass>,
  pub static_by_multiname: IndexMap<u32, &'a StaticClass>,
}

impl<'a> UnscrambleContext<'a> {
  pub fn build(
    abc: &crate::abc::AbcFile,
    wrapper: Option<&'a WrapperClass>,
    static_classes: &'a [StaticClass],
  ) -> Self {
    let wrapper_multiname = wrapper.map(|w| abc.classes[w.class.0].name);
    let static_by_multiname = static_classes
      .iter()
      .map(|sc| (abc.classes[sc.class.0].name, sc))
      .collect();
    UnscrambleContext {
      wrapper_multiname,
      wrapper,
      static_by_multiname,
    }
  }
}

/// Returns `true` if the method was modified (caller should treat its code
/// as freshly re-serialized).
pub fn unscramble_method(method: &mut Method, ctx: &UnscrambleContext, appender: &PoolAppender) -> bool {
  if method.code.is_empty() {
    return false;
  }

  let mut graph = Graph::from_method(method);
  let mut drop_next_call: u32 = 0;
  let mut changed = false;

  let order: Vec<NodeId> = graph.iter_live().collect();
  let mut i = 0;
  while i < order.len() {
    let id = order[i];
    i += 1;
    if !graph.is_live(id) {
      continue;
    }
    let instr = graph.get(id).instr.clone();

    // Rule 1: wrapper lookup.
    if let Some(w) = ctx.wrapper {
      if matches!(instr.op, Op::GetProperty | Op::CallProperty)
        && instr
          .args
          .first()
          .map(|&n| w.method_names.contains(&(n as u32)))
          .unwrap_or(false)
      {
        graph.detach(id);
        changed = true;
        if instr.op == Op::GetProperty {
          drop_next_call += 1;
        }
        continue;
      }
    }

    // Rule 2: pending call suppression.
    if drop_next_call > 0 && matches!(instr.op, Op::Call | Op::GetGlobalScope) {
      graph.detach(id);
      changed = true;
      if instr.op == Op::Call {
        drop_next_call -= 1;
      }
      continue;
    }

    // Rule 4: bare reference to the wrapper class (its method already
    // consumed the preceding call via rule 1, so this lookup is now dead).
    if ctx.wrapper_multiname.is_some()
      && instr.op == Op::GetLex
      && instr.args.first().copied() == ctx.wrapper_multiname.map(|m| m as i64)
    {
      graph.detach(id);
      changed = true;
      continue;
    }

    // Rule 3: static-class load.
    if instr.op == Op::GetLex {
      let multiname = instr.args.first().copied().unwrap_or(-1) as u32;
      if let Some(sc) = ctx.static_by_multiname.get(&multiname) {
        if i < order.len() {
          let next_id = order[i];
          if graph.is_live(next_id) {
            let next = graph.get(next_id).instr.clone();
            let trait_idx = next.args.first().copied();
            match (next.op, trait_idx.and_then(|t| sc.values.get(&(t as u32)))) {
              (Op::GetProperty, Some(VaultValue::Slot(slot))) => {
                graph.get_mut(next_id).instr = push_for_slot(*slot);
                graph.detach(id);
                changed = true;
                continue;
              }
              (Op::CallProperty, Some(VaultValue::MethodDouble(v))) => {
                let idx = appender.append_double(*v);
                graph.get_mut(next_id).instr = Instruction {
                  op: Op::PushDouble,
                  args: vec![idx as i64],
                  branch_offsets: vec![],
                };
                graph.detach(id);
                changed = true;
                continue;
              }
              (Op::CallProperty, Some(VaultValue::MethodInt(v))) => {
                let idx = appender.append_int(*v);
                graph.get_mut(next_id).instr = Instruction {
                  op: Op::PushInt,
                  args: vec![idx as i64],
                  branch_offsets: vec![],
                };
                graph.detach(id);
                changed = true;
                continue;
              }
              // Neither slot nor known method: leave the stream untouched
              // and advance.
              _ => {}
            }
          }
        }
      }
    }
  }

  if changed {
    let (code, exceptions) = graph.finish();
    method.code = code;
    method.exceptions = exceptions;
  }
  changed
}

fn push_for_slot(slot: SlotValue) -> Instruction {
  match slot {
    SlotValue::False => Instruction {
      op: Op::PushFalse,
      args: vec![],
      branch_offsets: vec![],
    },
    SlotValue::True => Instruction {
      op: Op::PushTrue,
      args: vec![],
      branch_offsets: vec![],
    },
    SlotValue::Null => Instruction {
      op: Op::PushNull,
      args: vec![],
      branch_offsets: vec![],
    },
    SlotValue::String(idx) => Instruction {
      op: Op::PushString,
      args: vec![idx as i64],
      branch_offsets: vec![],
    },
    SlotValue::Double(idx) => Instruction {
      op: Op::PushDouble,
      args: vec![idx as i64],
      branch_offsets: vec![],
    },
    SlotValue::Int(idx) => Instruction {
      op: Op::PushInt,
      args: vec![idx as i64],
      branch_offsets: vec![],
    },
    SlotValue::UInt(idx) => Instruction {
      op: Op::PushUint,
      args: vec![idx as i64],
      branch_offsets: vec![],
    },
    SlotValue::Namespace(idx) => Instruction {
      op: Op::PushNamespace,
      args: vec![idx as i64],
      branch_offsets: vec![],
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abc::{AbcFile, Class, ClassFlags, ConstantPool, Multiname};
  use crate::recognize::ClassRef;

  fn wrap_abc() -> (AbcFile, WrapperClass) {
    let mut pool = ConstantPool::default();
    pool.strings.push(String::new());
    let name = pool.push_string("Wrap");
    pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
    let mn_idx = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name });

    let wrap_method_name = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name: 0 });

    let class = Class {
      name: mn_idx,
      super_name: 0,
      flags: ClassFlags::default(),
      protected_ns: 0,
      iinit: 0,
      cinit: 0,
      itraits: vec![],
      ctraits: vec![],
    };

    let abc = AbcFile {
      minor_version: 16,
      major_version: 46,
      pool,
      methods: vec![Default::default()],
      classes: vec![class],
      scripts: vec![],
      namespace_map: Default::default(),
    };

    let wrapper = WrapperClass {
      class: ClassRef(0),
      method_names: vec![wrap_method_name],
    };
    (abc, wrapper)
  }

  #[test]
  fn eliminates_wrapper_call_sequence() {
    let (abc, wrapper) = wrap_abc();
    let pool_mutex = Mutex::new(abc.pool.clone());
    let ctx = UnscrambleContext::build(&abc, Some(&wrapper), &[]);
    let appender = PoolAppender { pool: &pool_mutex };

    let mut m = Method {
      code: vec![
        Instruction {
          op: Op::GetLex,
          args: vec![abc.classes[0].name as i64],
          branch_offsets: vec![],
        },
        Instruction {
          op: Op::GetProperty,
          args: vec![wrapper.method_names[0] as i64],
          branch_offsets: vec![],
        },
        Instruction {
          op: Op::GetLocal0,
          args: vec![],
          branch_offsets: vec![],
        },
        Instruction {
          op: Op::Call,
          args: vec![1],
          branch_offsets: vec![],
        },
        Instruction {
          op: Op::ReturnValue,
          args: vec![],
          branch_offsets: vec![],
        },
      ],
      ..Default::default()
    };

    let changed = unscramble_method(&mut m, &ctx, &appender);
    assert!(changed);
    let ops: Vec<Op> = m.code.iter().map(|i| i.op).collect();
    assert_eq!(ops, vec![Op::GetLocal0, Op::ReturnValue]);
  }

  #[test]
  fn is_a_no_op_on_empty_method() {
    let (abc, wrapper) = wrap_abc();
    let pool_mutex = Mutex::new(abc.pool.clone());
    let ctx = UnscrambleContext::build(&abc, Some(&wrapper), &[]);
    let appender = PoolAppender { pool: &pool_mutex };
    let mut m = Method::default();
    assert!(!unscramble_method(&mut m, &ctx, &appender));
  }
}
