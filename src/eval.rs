//! A tiny, side-effect-free interpreter over a closed subset of AVM2
//! opcodes, used to decide whether a getter or `cinit` method always
//! returns the same constant value.
//!
//! This is deliberately not a general AVM2 evaluator: any instruction
//! outside the subset below aborts evaluation rather than being
//! approximated.

use crate::abc::{ConstantPool, Instruction, Method, Op};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Int(i32),
  UInt(u32),
  Double(f64),
  String(String),
}

impl Value {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::UInt(u) => Some(*u as f64),
      Value::Double(d) => Some(*d),
      Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
      _ => None,
    }
  }
}

/// Evaluates `method` as a pure expression, returning the single value left
/// on the stack when it hits `returnvalue`/`returnvoid`, or `None` if it
/// does anything outside the supported subset (property access with side
/// effects, branches, calls to anything but a handful of coercions, etc).
pub fn evaluate_constant(method: &Method, pool: &ConstantPool) -> Option<Value> {
  let mut stack: Vec<Value> = Vec::new();

  for instr in &method.code {
    if !step(instr, pool, &mut stack)? {
      return match stack.pop() {
        Some(v) => Some(v),
        None => Some(Value::Undefined),
      };
    }
  }
  None
}

/// Returns `Some(true)` to continue, `Some(false)` to stop (a return was
/// hit), or `None` if `instr` isn't in the supported subset.
fn step(instr: &Instruction, pool: &ConstantPool, stack: &mut Vec<Value>) -> Option<bool> {
  match instr.op {
    Op::GetLocal0 | Op::PushScope => {}
    Op::ReturnValue => return Some(false),
    Op::ReturnVoid => {
      stack.clear();
      stack.push(Value::Undefined);
      return Some(false);
    }
    Op::PushByte => stack.push(Value::Int(instr.args[0] as i8 as i32)),
    Op::PushShort => stack.push(Value::Int(instr.args[0] as i32)),
    Op::PushInt => stack.push(Value::Int(*pool.ints.get(instr.args[0] as usize)?)),
    Op::PushUint => stack.push(Value::UInt(*pool.uints.get(instr.args[0] as usize)?)),
    Op::PushDouble => stack.push(Value::Double(*pool.doubles.get(instr.args[0] as usize)?)),
    Op::PushString => stack.push(Value::String(
      pool.strings.get(instr.args[0] as usize)?.clone(),
    )),
    Op::PushTrue => stack.push(Value::Bool(true)),
    Op::PushFalse => stack.push(Value::Bool(false)),
    Op::PushNull => stack.push(Value::Null),
    Op::PushUndefined | Op::PushNan => stack.push(Value::Undefined),
    Op::Dup => {
      let top = stack.last()?.clone();
      stack.push(top);
    }
    Op::Pop => {
      stack.pop()?;
    }
    Op::ConvertI => {
      let v = stack.pop()?;
      stack.push(Value::Int(v.as_f64()? as i32));
    }
    Op::ConvertU => {
      let v = stack.pop()?;
      stack.push(Value::UInt(v.as_f64()? as u32));
    }
    Op::ConvertD => {
      let v = stack.pop()?;
      stack.push(Value::Double(v.as_f64()?));
    }
    Op::ConvertB => {
      let v = stack.pop()?;
      stack.push(Value::Bool(is_truthy(&v)?));
    }
    Op::Negate => {
      let v = stack.pop()?;
      stack.push(Value::Double(-v.as_f64()?));
    }
    Op::Add | Op::Subtract | Op::Multiply | Op::Divide | Op::Modulo => {
      let rhs = stack.pop()?.as_f64()?;
      let lhs = stack.pop()?.as_f64()?;
      let result = match instr.op {
        Op::Add => lhs + rhs,
        Op::Subtract => lhs - rhs,
        Op::Multiply => lhs * rhs,
        Op::Divide => lhs / rhs,
        Op::Modulo => lhs % rhs,
        _ => unreachable!(),
      };
      stack.push(Value::Double(result));
    }
    Op::BitAnd | Op::BitOr | Op::BitXor | Op::LShift | Op::RShift => {
      let rhs = stack.pop()?.as_f64()? as i32;
      let lhs = stack.pop()?.as_f64()? as i32;
      let result = match instr.op {
        Op::BitAnd => lhs & rhs,
        Op::BitOr => lhs | rhs,
        Op::BitXor => lhs ^ rhs,
        Op::LShift => lhs << (rhs & 0x1F),
        Op::RShift => lhs >> (rhs & 0x1F),
        _ => unreachable!(),
      };
      stack.push(Value::Int(result));
    }
    // Anything reading scope/properties/globals can observe state this
    // evaluator doesn't model; bail out rather than guess.
    _ => return None,
  }
  Some(true)
}

fn is_truthy(v: &Value) -> Option<bool> {
  Some(match v {
    Value::Bool(b) => *b,
    Value::Undefined | Value::Null => false,
    Value::Int(i) => *i != 0,
    Value::UInt(u) => *u != 0,
    Value::Double(d) => *d != 0.0 && !d.is_nan(),
    Value::String(s) => !s.is_empty(),
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
  fn evaluates_a_pushed_int_constant() {
    let pool = ConstantPool::default();
    let m = method_with(vec![
      Instruction {
        op: Op::PushByte,
        args: vec![7],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::ReturnValue,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);
    assert_eq!(evaluate_constant(&m, &pool), Some(Value::Int(7)));
  }

  #[test]
  fn folds_simple_arithmetic() {
    let pool = ConstantPool::default();
    let m = method_with(vec![
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
        op: Op::ReturnValue,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);
    assert_eq!(evaluate_constant(&m, &pool), Some(Value::Double(7.0)));
  }

  #[test]
  fn bails_out_on_property_access() {
    let pool = ConstantPool::default();
    let m = method_with(vec![
      Instruction {
        op: Op::GetLocal0,
        args: vec![],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::GetProperty,
        args: vec![0],
        branch_offsets: vec![],
      },
      Instruction {
        op: Op::ReturnValue,
        args: vec![],
        branch_offsets: vec![],
      },
    ]);
    assert_eq!(evaluate_constant(&m, &pool), None);
  }
}
