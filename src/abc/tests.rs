use super::model::*;
use super::opcode::Op;
use super::reader::read_abc;
use super::writer::write_abc;

fn minimal_abc() -> AbcFile {
  let mut pool = ConstantPool::default();
  pool.strings.push(String::new());
  let name_idx = pool.push_string("Main");
  pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
  let qname_idx = pool.multinames.len() as u32;
  pool.multinames.push(Multiname::QName {
    ns: 0,
    name: name_idx,
  });
  let _ = qname_idx;

  let method = Method {
    code: vec![Instruction {
      op: Op::ReturnVoid,
      args: vec![],
      branch_offsets: vec![],
    }],
    is_native: false,
    ..Default::default()
  };

  AbcFile {
    minor_version: 16,
    major_version: 46,
    pool,
    methods: vec![method],
    classes: vec![],
    scripts: vec![Script {
      init: 0,
      traits: vec![],
    }],
    namespace_map: Default::default(),
  }
}

#[test]
fn round_trips_a_minimal_method() {
  let abc = minimal_abc();
  let bytes = write_abc(&abc);
  let decoded = read_abc(&bytes).expect("decode");

  assert_eq!(decoded.minor_version, 16);
  assert_eq!(decoded.major_version, 46);
  assert_eq!(decoded.methods.len(), 1);
  assert_eq!(decoded.methods[0].code.len(), 1);
  assert_eq!(decoded.methods[0].code[0].op, Op::ReturnVoid);
}

#[test]
fn decodes_pushbyte_and_branch_operands() {
  let mut abc = minimal_abc();
  abc.methods[0].code = vec![
    Instruction {
      op: Op::PushByte,
      args: vec![42],
      branch_offsets: vec![],
    },
    Instruction {
      op: Op::IfTrue,
      args: vec![],
      branch_offsets: vec![3],
    },
    Instruction {
      op: Op::ReturnVoid,
      args: vec![],
      branch_offsets: vec![],
    },
  ];

  let bytes = write_abc(&abc);
  let decoded = read_abc(&bytes).expect("decode");
  let code = &decoded.methods[0].code;

  assert_eq!(code[0].op, Op::PushByte);
  assert_eq!(code[0].args, vec![42]);
  assert_eq!(code[1].op, Op::IfTrue);
  assert_eq!(code[1].branch_offsets, vec![3]);
}

#[test]
fn decodes_lookupswitch_with_multiple_targets() {
  let mut abc = minimal_abc();
  abc.methods[0].code = vec![Instruction {
    op: Op::LookupSwitch,
    args: vec![2],
    branch_offsets: vec![10, 20, 30, 40],
  }];

  let bytes = write_abc(&abc);
  let decoded = read_abc(&bytes).expect("decode");
  let instr = &decoded.methods[0].code[0];

  assert_eq!(instr.op, Op::LookupSwitch);
  assert_eq!(instr.branch_offsets, vec![10, 20, 30, 40]);
}

#[test]
fn round_trips_constant_pool_entries() {
  let mut abc = minimal_abc();
  abc.pool.push_int(-7);
  abc.pool.push_double(3.5);
  let str_idx = abc.pool.push_string("hello");
  abc.methods[0].code = vec![
    Instruction {
      op: Op::PushString,
      args: vec![str_idx as i64],
      branch_offsets: vec![],
    },
    Instruction {
      op: Op::ReturnValue,
      args: vec![],
      branch_offsets: vec![],
    },
  ];

  let bytes = write_abc(&abc);
  let decoded = read_abc(&bytes).expect("decode");

  assert_eq!(decoded.pool.strings[str_idx as usize], "hello");
  assert!(decoded.pool.ints.contains(&-7));
  assert!(decoded.pool.doubles.contains(&3.5));
}

#[test]
fn rejects_truncated_input() {
  let abc = minimal_abc();
  let mut bytes = write_abc(&abc);
  bytes.truncate(bytes.len() - 1);
  assert!(read_abc(&bytes).is_err());
}
