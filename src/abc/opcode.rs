//! The AVM2 instruction set, as decoded from a method's code blob.
//!
//! This module only describes the *shape* of each opcode (how many operands
//! it has and what they index into); it has no opinion on control flow or
//! stack effect — that lives in [`crate::graph`] and [`crate::simplify`]
//! respectively.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum Op {
  Bkpt = 0x01,
  Nop = 0x02,
  Throw = 0x03,
  GetSuper = 0x04,
  SetSuper = 0x05,
  Dxns = 0x06,
  DxnsLate = 0x07,
  Kill = 0x08,
  Label = 0x09,
  IfNlt = 0x0C,
  IfNle = 0x0D,
  IfNgt = 0x0E,
  IfNge = 0x0F,
  Jump = 0x10,
  IfTrue = 0x11,
  IfFalse = 0x12,
  IfEq = 0x13,
  IfNe = 0x14,
  IfLt = 0x15,
  IfLe = 0x16,
  IfGt = 0x17,
  IfGe = 0x18,
  IfStrictEq = 0x19,
  IfStrictNe = 0x1A,
  LookupSwitch = 0x1B,
  PushWith = 0x1C,
  PopScope = 0x1D,
  NextName = 0x1E,
  HasNext = 0x1F,
  PushNull = 0x20,
  PushUndefined = 0x21,
  NextValue = 0x23,
  PushByte = 0x24,
  PushShort = 0x25,
  PushTrue = 0x26,
  PushFalse = 0x27,
  PushNan = 0x28,
  Pop = 0x29,
  Dup = 0x2A,
  Swap = 0x2B,
  PushString = 0x2C,
  PushInt = 0x2D,
  PushUint = 0x2E,
  PushDouble = 0x2F,
  PushScope = 0x30,
  PushNamespace = 0x31,
  HasNext2 = 0x32,
  NewFunction = 0x40,
  Call = 0x41,
  Construct = 0x42,
  CallMethod = 0x43,
  CallStatic = 0x44,
  CallSuper = 0x45,
  CallProperty = 0x46,
  ReturnVoid = 0x47,
  ReturnValue = 0x48,
  ConstructSuper = 0x49,
  ConstructProp = 0x4A,
  CallPropLex = 0x4C,
  CallSuperVoid = 0x4E,
  CallPropVoid = 0x4F,
  ApplyType = 0x53,
  NewObject = 0x55,
  NewArray = 0x56,
  NewActivation = 0x57,
  NewClass = 0x58,
  GetDescendants = 0x59,
  NewCatch = 0x5A,
  FindPropStrict = 0x5D,
  FindProperty = 0x5E,
  FindDef = 0x5F,
  GetLex = 0x60,
  SetProperty = 0x61,
  GetLocal = 0x62,
  SetLocal = 0x63,
  GetGlobalScope = 0x64,
  GetScopeObject = 0x65,
  GetProperty = 0x66,
  GetOuterScope = 0x67,
  InitProperty = 0x68,
  DeleteProperty = 0x6A,
  GetSlot = 0x6C,
  SetSlot = 0x6D,
  GetGlobalSlot = 0x6E,
  SetGlobalSlot = 0x6F,
  ConvertS = 0x70,
  EscXElem = 0x71,
  EscXAttr = 0x72,
  ConvertI = 0x73,
  ConvertU = 0x74,
  ConvertD = 0x75,
  ConvertB = 0x76,
  ConvertO = 0x77,
  CheckFilter = 0x78,
  Coerce = 0x80,
  CoerceA = 0x82,
  CoerceS = 0x85,
  AsType = 0x86,
  AsTypeLate = 0x87,
  Negate = 0x90,
  Increment = 0x91,
  IncLocal = 0x92,
  Decrement = 0x93,
  DecLocal = 0x94,
  TypeOf = 0x95,
  Not = 0x96,
  BitNot = 0x97,
  Add = 0xA0,
  Subtract = 0xA1,
  Multiply = 0xA2,
  Divide = 0xA3,
  Modulo = 0xA4,
  LShift = 0xA5,
  RShift = 0xA6,
  URShift = 0xA7,
  BitAnd = 0xA8,
  BitOr = 0xA9,
  BitXor = 0xAA,
  Equals = 0xAB,
  StrictEquals = 0xAC,
  LessThan = 0xAD,
  LessEquals = 0xAE,
  GreaterThan = 0xAF,
  GreaterEquals = 0xB0,
  InstanceOf = 0xB1,
  IsType = 0xB2,
  IsTypeLate = 0xB3,
  In = 0xB4,
  IncrementI = 0xC0,
  DecrementI = 0xC1,
  NegateI = 0xC2,
  AddI = 0xC3,
  SubtractI = 0xC4,
  MultiplyI = 0xC5,
  GetLocal0 = 0xD0,
  GetLocal1 = 0xD1,
  GetLocal2 = 0xD2,
  GetLocal3 = 0xD3,
  SetLocal0 = 0xD4,
  SetLocal1 = 0xD5,
  SetLocal2 = 0xD6,
  SetLocal3 = 0xD7,
  Debug = 0xEF,
  DebugLine = 0xF0,
  DebugFile = 0xF1,
  BkptLine = 0xF2,
  Timestamp = 0xF3,
}

/// How an opcode's operand stream is shaped. The reader/writer use this to
/// know how many fields to decode/encode; rewriters use `is_branch`/
/// `is_lookupswitch` to tell a plain operand apart from a jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
  /// A u30 varint with no particular referent (register index, slot index,
  /// argument count, line number, ...).
  UInt,
  /// A single unsigned byte.
  U8,
  /// A signed byte (the literal pushed by `pushbyte`).
  I8,
  /// u30 index into the constant pool's multiname array.
  Multiname,
  /// u30 index into the constant pool's integer array.
  IntConst,
  /// u30 index into the constant pool's unsigned-integer array.
  UIntConst,
  /// u30 index into the constant pool's double array.
  DoubleConst,
  /// u30 index into the constant pool's string array.
  StringConst,
  /// u30 index into the constant pool's namespace array.
  NamespaceConst,
  /// u30 index into the method array.
  MethodIdx,
  /// u30 index into the class array.
  ClassIdx,
  /// u30 index into a method body's exception table.
  ExceptionIdx,
}

pub fn operands(op: Op) -> &'static [Operand] {
  use Operand::*;
  match op {
    Op::Bkpt
    | Op::Nop
    | Op::Throw
    | Op::PushWith
    | Op::PopScope
    | Op::NextName
    | Op::HasNext
    | Op::PushNull
    | Op::PushUndefined
    | Op::NextValue
    | Op::PushTrue
    | Op::PushFalse
    | Op::PushNan
    | Op::Pop
    | Op::Dup
    | Op::Swap
    | Op::PushScope
    | Op::ReturnVoid
    | Op::ReturnValue
    | Op::ConstructSuper
    | Op::GetGlobalScope
    | Op::ConvertS
    | Op::EscXElem
    | Op::EscXAttr
    | Op::ConvertI
    | Op::ConvertU
    | Op::ConvertD
    | Op::ConvertB
    | Op::ConvertO
    | Op::CheckFilter
    | Op::CoerceA
    | Op::CoerceS
    | Op::Negate
    | Op::Increment
    | Op::Decrement
    | Op::TypeOf
    | Op::Not
    | Op::BitNot
    | Op::Add
    | Op::Subtract
    | Op::Multiply
    | Op::Divide
    | Op::Modulo
    | Op::LShift
    | Op::RShift
    | Op::URShift
    | Op::BitAnd
    | Op::BitOr
    | Op::BitXor
    | Op::Equals
    | Op::StrictEquals
    | Op::LessThan
    | Op::LessEquals
    | Op::GreaterThan
    | Op::GreaterEquals
    | Op::InstanceOf
    | Op::In
    | Op::IncrementI
    | Op::DecrementI
    | Op::NegateI
    | Op::AddI
    | Op::SubtractI
    | Op::MultiplyI
    | Op::GetLocal0
    | Op::GetLocal1
    | Op::GetLocal2
    | Op::GetLocal3
    | Op::SetLocal0
    | Op::SetLocal1
    | Op::SetLocal2
    | Op::SetLocal3
    | Op::Label
    | Op::NewActivation => &[],

    Op::Kill | Op::IncLocal | Op::DecLocal | Op::GetLocal | Op::SetLocal => &[UInt],
    Op::GetScopeObject | Op::GetOuterScope => &[U8],
    Op::PushByte => &[I8],
    Op::PushShort => &[UInt],
    Op::PushInt => &[IntConst],
    Op::PushUint => &[UIntConst],
    Op::PushDouble => &[DoubleConst],
    Op::PushString => &[StringConst],
    Op::PushNamespace | Op::Dxns => &[NamespaceConst],
    Op::DxnsLate => &[],

    Op::NewFunction => &[MethodIdx],
    Op::Call | Op::Construct | Op::ApplyType | Op::NewObject | Op::NewArray => &[UInt],
    Op::CallMethod | Op::CallStatic => &[UInt, UInt],
    Op::CallSuper
    | Op::CallProperty
    | Op::ConstructProp
    | Op::CallPropLex
    | Op::CallSuperVoid
    | Op::CallPropVoid => &[Multiname, UInt],

    Op::NewClass => &[ClassIdx],
    Op::GetDescendants | Op::FindPropStrict | Op::FindProperty | Op::FindDef | Op::GetLex
    | Op::SetProperty | Op::GetProperty | Op::InitProperty | Op::DeleteProperty | Op::Coerce
    | Op::AsType | Op::IsType | Op::GetSuper | Op::SetSuper => &[Multiname],

    Op::GetSlot | Op::SetSlot | Op::GetGlobalSlot | Op::SetGlobalSlot => &[UInt],
    Op::NewCatch => &[ExceptionIdx],
    Op::HasNext2 => &[UInt, UInt],
    Op::AsTypeLate | Op::IsTypeLate => &[],

    Op::DebugLine => &[UInt],
    Op::DebugFile => &[StringConst],
    Op::Debug => &[U8, StringConst, U8, UInt],
    Op::BkptLine => &[UInt],
    Op::Timestamp => &[UInt, UInt],

    // branches handled separately via `is_branch`/`is_lookupswitch`
    Op::IfNlt | Op::IfNle | Op::IfNgt | Op::IfNge | Op::Jump | Op::IfTrue | Op::IfFalse
    | Op::IfEq | Op::IfNe | Op::IfLt | Op::IfLe | Op::IfGt | Op::IfGe | Op::IfStrictEq
    | Op::IfStrictNe => &[],
    Op::LookupSwitch => &[],
  }
}

/// True for every opcode whose sole special operand is a single relative
/// branch target (everything except `lookupswitch`, which has a variable
/// number of targets and is handled separately).
pub fn is_branch(op: Op) -> bool {
  matches!(
    op,
    Op::IfNlt
      | Op::IfNle
      | Op::IfNgt
      | Op::IfNge
      | Op::Jump
      | Op::IfTrue
      | Op::IfFalse
      | Op::IfEq
      | Op::IfNe
      | Op::IfLt
      | Op::IfLe
      | Op::IfGt
      | Op::IfGe
      | Op::IfStrictEq
      | Op::IfStrictNe
  )
}

pub fn is_lookupswitch(op: Op) -> bool {
  matches!(op, Op::LookupSwitch)
}

pub fn name(op: Op) -> &'static str {
  match op {
    Op::Bkpt => "bkpt",
    Op::Nop => "nop",
    Op::Throw => "throw",
    Op::GetSuper => "getsuper",
    Op::SetSuper => "setsuper",
    Op::Dxns => "dxns",
    Op::DxnsLate => "dxnslate",
    Op::Kill => "kill",
    Op::Label => "label",
    Op::IfNlt => "ifnlt",
    Op::IfNle => "ifnle",
    Op::IfNgt => "ifngt",
    Op::IfNge => "ifnge",
    Op::Jump => "jump",
    Op::IfTrue => "iftrue",
    Op::IfFalse => "iffalse",
    Op::IfEq => "ifeq",
    Op::IfNe => "ifne",
    Op::IfLt => "iflt",
    Op::IfLe => "ifle",
    Op::IfGt => "ifgt",
    Op::IfGe => "ifge",
    Op::IfStrictEq => "ifstricteq",
    Op::IfStrictNe => "ifstrictne",
    Op::LookupSwitch => "lookupswitch",
    Op::PushWith => "pushwith",
    Op::PopScope => "popscope",
    Op::NextName => "nextname",
    Op::HasNext => "hasnext",
    Op::PushNull => "pushnull",
    Op::PushUndefined => "pushundefined",
    Op::NextValue => "nextvalue",
    Op::PushByte => "pushbyte",
    Op::PushShort => "pushshort",
    Op::PushTrue => "pushtrue",
    Op::PushFalse => "pushfalse",
    Op::PushNan => "pushnan",
    Op::Pop => "pop",
    Op::Dup => "dup",
    Op::Swap => "swap",
    Op::PushString => "pushstring",
    Op::PushInt => "pushint",
    Op::PushUint => "pushuint",
    Op::PushDouble => "pushdouble",
    Op::PushScope => "pushscope",
    Op::PushNamespace => "pushnamespace",
    Op::HasNext2 => "hasnext2",
    Op::NewFunction => "newfunction",
    Op::Call => "call",
    Op::Construct => "construct",
    Op::CallMethod => "callmethod",
    Op::CallStatic => "callstatic",
    Op::CallSuper => "callsuper",
    Op::CallProperty => "callproperty",
    Op::ReturnVoid => "returnvoid",
    Op::ReturnValue => "returnvalue",
    Op::ConstructSuper => "constructsuper",
    Op::ConstructProp => "constructprop",
    Op::CallPropLex => "callproplex",
    Op::CallSuperVoid => "callsupervoid",
    Op::CallPropVoid => "callpropvoid",
    Op::ApplyType => "applytype",
    Op::NewObject => "newobject",
    Op::NewArray => "newarray",
    Op::NewActivation => "newactivation",
    Op::NewClass => "newclass",
    Op::GetDescendants => "getdescendants",
    Op::NewCatch => "newcatch",
    Op::FindPropStrict => "findpropstrict",
    Op::FindProperty => "findproperty",
    Op::FindDef => "finddef",
    Op::GetLex => "getlex",
    Op::SetProperty => "setproperty",
    Op::GetLocal => "getlocal",
    Op::SetLocal => "setlocal",
    Op::GetGlobalScope => "getglobalscope",
    Op::GetScopeObject => "getscopeobject",
    Op::GetProperty => "getproperty",
    Op::GetOuterScope => "getouterscope",
    Op::InitProperty => "initproperty",
    Op::DeleteProperty => "deleteproperty",
    Op::GetSlot => "getslot",
    Op::SetSlot => "setslot",
    Op::GetGlobalSlot => "getglobalslot",
    Op::SetGlobalSlot => "setglobalslot",
    Op::ConvertS => "convert_s",
    Op::EscXElem => "esc_xelem",
    Op::EscXAttr => "esc_xattr",
    Op::ConvertI => "convert_i",
    Op::ConvertU => "convert_u",
    Op::ConvertD => "convert_d",
    Op::ConvertB => "convert_b",
    Op::ConvertO => "convert_o",
    Op::CheckFilter => "checkfilter",
    Op::Coerce => "coerce",
    Op::CoerceA => "coerce_a",
    Op::CoerceS => "coerce_s",
    Op::AsType => "astype",
    Op::AsTypeLate => "astypelate",
    Op::Negate => "negate",
    Op::Increment => "increment",
    Op::IncLocal => "inclocal",
    Op::Decrement => "decrement",
    Op::DecLocal => "declocal",
    Op::TypeOf => "typeof",
    Op::Not => "not",
    Op::BitNot => "bitnot",
    Op::Add => "add",
    Op::Subtract => "subtract",
    Op::Multiply => "multiply",
    Op::Divide => "divide",
    Op::Modulo => "modulo",
    Op::LShift => "lshift",
    Op::RShift => "rshift",
    Op::URShift => "urshift",
    Op::BitAnd => "bitand",
    Op::BitOr => "bitor",
    Op::BitXor => "bitxor",
    Op::Equals => "equals",
    Op::StrictEquals => "strictequals",
    Op::LessThan => "lessthan",
    Op::LessEquals => "lessequals",
    Op::GreaterThan => "greaterthan",
    Op::GreaterEquals => "greaterequals",
    Op::InstanceOf => "instanceof",
    Op::IsType => "istype",
    Op::IsTypeLate => "istypelate",
    Op::In => "in",
    Op::IncrementI => "increment_i",
    Op::DecrementI => "decrement_i",
    Op::NegateI => "negate_i",
    Op::AddI => "add_i",
    Op::SubtractI => "subtract_i",
    Op::MultiplyI => "multiply_i",
    Op::GetLocal0 => "getlocal0",
    Op::GetLocal1 => "getlocal1",
    Op::GetLocal2 => "getlocal2",
    Op::GetLocal3 => "getlocal3",
    Op::SetLocal0 => "setlocal0",
    Op::SetLocal1 => "setlocal1",
    Op::SetLocal2 => "setlocal2",
    Op::SetLocal3 => "setlocal3",
    Op::Debug => "debug",
    Op::DebugLine => "debugline",
    Op::DebugFile => "debugfile",
    Op::BkptLine => "bkptline",
    Op::Timestamp => "timestamp",
  }
}
