//! Constant-folding pass over `cinit` methods. Rewrites chains of constant
//! pushes and arithmetic into a single compact push, so later passes (the
//! static-class recognizer, the unscrambler) see literal operands instead of
//! computed ones.

use crate::abc::{ConstantPool, Instruction, Method, Op};
use crate::graph::{Graph, NodeId};

#[derive(Debug, Clone, PartialEq)]
enum Tagged {
  Unknown,
  Bool(bool),
  Double(f64),
  String(String),
}

#[derive(Debug)]
pub struct SimplifyError {
  pub opcode: Op,
}

/// Folds constant arithmetic/concatenation in `method`'s code in place.
/// Returns `Ok(true)` if any rewrite happened (caller should re-serialize),
/// `Ok(false)` if the method was already maximally folded, or `Err` if an
/// opcode outside the net-effect table was hit, which aborts simplification
/// of this method only; the method is left untouched.
pub fn simplify_cinit(method: &mut Method, pool: &mut ConstantPool) -> Result<bool, SimplifyError> {
  if method.code.is_empty() {
    return Ok(false);
  }

  let mut graph = Graph::from_method(method);
  let mut stack: Vec<(NodeId, Tagged)> = Vec::new();
  let mut changed = false;

  let order: Vec<NodeId> = graph.iter_live().collect();
  for id in order {
    if !graph.is_live(id) {
      continue;
    }
    let op = graph.get(id).instr.op;

    match op {
      Op::PushByte => {
        let v = graph.get(id).instr.args[0] as f64;
        stack.push((id, Tagged::Double(v)));
      }
      Op::PushShort => {
        let v = graph.get(id).instr.args[0] as f64;
        stack.push((id, Tagged::Double(v)));
      }
      Op::PushInt => {
        let idx = graph.get(id).instr.args[0] as usize;
        let v = *pool.ints.get(idx).unwrap_or(&0) as f64;
        stack.push((id, Tagged::Double(v)));
      }
      Op::PushDouble => {
        let idx = graph.get(id).instr.args[0] as usize;
        let v = *pool.doubles.get(idx).unwrap_or(&f64::NAN);
        stack.push((id, Tagged::Double(v)));
      }
      Op::PushString => {
        let idx = graph.get(id).instr.args[0] as usize;
        let v = pool.strings.get(idx).cloned().unwrap_or_default();
        stack.push((id, Tagged::String(v)));
      }
      Op::PushTrue => stack.push((id, Tagged::Bool(true))),
      Op::PushFalse => stack.push((id, Tagged::Bool(false))),
      Op::Dup => {
        let top = stack.last().cloned().unwrap_or((id, Tagged::Unknown));
        stack.push((id, top.1));
      }
      Op::Swap => {
        let len = stack.len();
        if len >= 2 {
          stack.swap(len - 1, len - 2);
        }
      }
      Op::Negate => {
        if let Some((producer, Tagged::Double(v))) = stack.pop() {
          let new_value = -v;
          rewrite_double(&mut graph, id, new_value, pool);
          graph.detach(producer);
          stack.push((id, Tagged::Double(new_value)));
          changed = true;
        } else {
          stack.push((id, Tagged::Unknown));
        }
      }
      Op::Add | Op::Subtract | Op::Multiply | Op::Divide => {
        let rhs = stack.pop();
        let lhs = stack.pop();
        match (lhs, rhs) {
          (Some((lp, Tagged::Double(a))), Some((rp, Tagged::Double(b)))) => {
            let folded = match op {
              Op::Add => a + b,
              Op::Subtract => a - b,
              Op::Multiply => a * b,
              Op::Divide => a / b,
              _ => unreachable!(),
            };
            rewrite_double(&mut graph, id, folded, pool);
            graph.detach(lp);
            graph.detach(rp);
            stack.push((id, Tagged::Double(folded)));
            changed = true;
          }
          (Some((lp, Tagged::String(a))), Some((rp, Tagged::String(b)))) if op == Op::Add => {
            let folded = format!("{a}{b}");
            rewrite_string(&mut graph, id, &folded, pool);
            graph.detach(lp);
            graph.detach(rp);
            stack.push((id, Tagged::String(folded)));
            changed = true;
          }
          _ => stack.push((id, Tagged::Unknown)),
        }
      }
      _ => {
        let effect = net_stack_effect(&graph.get(id).instr).ok_or(SimplifyError { opcode: op })?;
        drain(&mut stack, effect, id);
      }
    }
  }

  if changed {
    let (code, exceptions) = graph.finish();
    method.code = code;
    method.exceptions = exceptions;
  }
  Ok(changed)
}

fn drain(stack: &mut Vec<(NodeId, Tagged)>, effect: (i32, i32), id: NodeId) {
  let (pops, pushes) = effect;
  for _ in 0..pops {
    stack.pop();
  }
  for _ in 0..pushes {
    stack.push((id, Tagged::Unknown));
  }
}

fn rewrite_double(graph: &mut Graph, id: NodeId, value: f64, pool: &mut ConstantPool) {
  let node = graph.get_mut(id);
  node.instr = if value.fract() == 0.0 && value.abs() < 0x80 as f64 {
    Instruction {
      op: Op::PushByte,
      args: vec![value as i64],
      branch_offsets: vec![],
    }
  } else if value.fract() == 0.0 && value.abs() < 0x8000 as f64 {
    Instruction {
      op: Op::PushShort,
      args: vec![value as i64],
      branch_offsets: vec![],
    }
  } else {
    let idx = pool.push_double(value);
    Instruction {
      op: Op::PushDouble,
      args: vec![idx as i64],
      branch_offsets: vec![],
    }
  };
}

fn rewrite_string(graph: &mut Graph, id: NodeId, value: &str, pool: &mut ConstantPool) {
  let idx = pool.push_string(value);
  graph.get_mut(id).instr = Instruction {
    op: Op::PushString,
    args: vec![idx as i64],
    branch_offsets: vec![],
  };
}

/// `(pops, pushes)` for opcodes not handled as constant-producers above.
/// Opcodes whose arity depends on an immediate (`construct`, `newarray`,
/// `callproperty`, ...) read that immediate from `instr.args`.
fn net_stack_effect(instr: &Instruction) -> Option<(i32, i32)> {
  use Op::*;
  Some(match instr.op {
    Nop | Label | DebugLine | DebugFile | Debug | Bkpt | BkptLine => (0, 0),
    PushNull | PushUndefined | PushNan | GetLocal0 | GetLocal1 | GetLocal2 | GetLocal3
    | GetGlobalScope | NewActivation | PushScope => (0, 1),
    Pop | SetLocal0 | SetLocal1 | SetLocal2 | SetLocal3 | PopScope | Throw | ReturnValue => {
      (1, 0)
    }
    ReturnVoid => (0, 0),
    ConvertS | ConvertI | ConvertU | ConvertD | ConvertB | ConvertO | CoerceA | CoerceS
    | Coerce | TypeOf | Not | BitNot | Increment | Decrement | IncrementI | DecrementI
    | NegateI | EscXElem | EscXAttr | CheckFilter | AsType | IsType => (1, 1),
    Equals | StrictEquals | LessThan | LessEquals | GreaterThan | GreaterEquals | InstanceOf
    | IsTypeLate | In | BitAnd | BitOr | BitXor | LShift | RShift | URShift | AddI
    | SubtractI | MultiplyI => (2, 1),
    GetLocal | IncLocal | DecLocal => (0, 0),
    SetLocal => (1, 0),
    GetLex | FindPropStrict | FindProperty | FindDef | NewCatch | GetGlobalSlot => (0, 1),
    SetGlobalSlot => (1, 0),
    GetSlot => (1, 1),
    SetSlot => (2, 0),
    GetProperty | DeleteProperty | GetDescendants => (1, 1),
    SetProperty | InitProperty => (2, 0),
    GetSuper => (1, 1),
    SetSuper => (2, 0),
    NewObject => {
      let n = instr.args.first().copied().unwrap_or(0) as i32;
      (n * 2, 1)
    }
    NewArray => {
      let n = instr.args.first().copied().unwrap_or(0) as i32;
      (n, 1)
    }
    Construct => {
      let n = instr.args.first().copied().unwrap_or(0) as i32;
      (n + 1, 1)
    }
    ConstructSuper => {
      let n = instr.args.first().copied().unwrap_or(0) as i32;
      (n + 1, 0)
    }
    ConstructProp => {
      let n = instr.args.last().copied().unwrap_or(0) as i32;
      (n + 1, 1)
    }
    CallProperty | CallPropLex => {
      let n = instr.args.last().copied().unwrap_or(0) as i32;
      (n + 1, 1)
    }
    CallPropVoid => {
      let n = instr.args.last().copied().unwrap_or(0) as i32;
      (n + 1, 0)
    }
    CallSuper => {
      let n = instr.args.last().copied().unwrap_or(0) as i32;
      (n + 1, 1)
    }
    CallSuperVoid => {
      let n = instr.args.last().copied().unwrap_or(0) as i32;
      (n + 1, 0)
    }
    Call => {
      let n = instr.args.first().copied().unwrap_or(0) as i32;
      (n + 2, 1)
    }
    CallMethod | CallStatic => {
      let n = instr.args.get(1).copied().unwrap_or(0) as i32;
      (n + 1, 1)
    }
    ApplyType => {
      let n = instr.args.first().copied().unwrap_or(0) as i32;
      (n + 1, 1)
    }
    NewFunction => (0, 1),
    NewClass => (1, 1),
    PushWith => (1, 0),
    NextName | NextValue => (2, 1),
    HasNext => (2, 1),
    HasNext2 => (0, 2),
    Kill => (0, 0),
    GetScopeObject | GetOuterScope => (0, 1),
    Dxns | DxnsLate => (0, 0),
    PushNamespace => (0, 1),
    AsTypeLate => (2, 1),
    Timestamp => (0, 0),
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abc::Instruction;

  fn method_with(code: Vec<Instruction>) -> Method {
    Method {
      code,
      ..Default::default()
    }
  }

  #[test]
  fn folds_two_constant_pushes_into_one() {
    let mut pool = ConstantPool::default();
    let mut m = method_with(vec![
      Instruction {
        op: Op::PushByte,
        args: vec![3],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::PushByte,
        args: vec![4],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::Add,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);

    let changed = simplify_cinit(&mut m, &mut pool).unwrap();
    assert!(changed);
    assert_eq!(m.code.len(), 2);
    assert_eq!(m.code[0].op, Op::PushByte);
    assert_eq!(m.code[0].args, vec![7]);
    assert_eq!(m.code[1].op, Op::ReturnVoid);
  }

  #[test]
  fn leaves_empty_method_untouched() {
    let mut pool = ConstantPool::default();
    let mut m = method_with(vec![]);
    assert_eq!(simplify_cinit(&mut m, &mut pool).unwrap(), false);
  }

  #[test]
  fn folds_string_concatenation() {
    let mut pool = ConstantPool::default();
    let a = pool.push_string("foo");
    let b = pool.push_string("bar");
    let mut m = method_with(vec![
      Instruction {
        op: Op::PushString,
        args: vec![a as i64],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::PushString,
        args: vec![b as i64],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::Add,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::ReturnVoid,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);

    simplify_cinit(&mut m, &mut pool).unwrap();
    let idx = m.code[0].args[0] as usize;
    assert_eq!(pool.strings[idx], "foobar");
  }
}
