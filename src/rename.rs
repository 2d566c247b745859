//! The invalid-name renamer: replaces any non-printable identifier in
//! classes, traits, methods and exception variables with a formatted
//! placeholder. Runs once, before analysis, so every later pass sees only
//! printable names.

use crate::abc::{AbcFile, TraitData};
use crate::config::{format_counter, Formats};

#[derive(Default)]
struct Counters {
  classes: u32,
  consts: u32,
  vars: u32,
  methods: u32,
  functions: u32,
  names: u32,
  errors: u32,
}

/// A name is invalid iff any of its characters is not printable: a control
/// character, or the Unicode replacement character produced by decoding
/// garbage bytes as UTF-8.
fn is_invalid(s: &str) -> bool {
  s.is_empty() || s.chars().any(|c| c.is_control() || c == '\u{FFFD}')
}

fn name_of<'a>(abc: &'a AbcFile, mn_idx: u32) -> Option<&'a str> {
  let name_idx = abc.pool.multinames.get(mn_idx as usize)?.name_index()?;
  abc.pool.strings.get(name_idx as usize).map(String::as_str)
}

/// Renames `mn_idx`'s identifier to `template` formatted with the next
/// value of `counter`, if (and only if) its current name is invalid.
/// Returns whether a rename happened.
fn rename_if_invalid(abc: &mut AbcFile, mn_idx: u32, counter: &mut u32, template: &str) -> bool {
  let Some(current) = name_of(abc, mn_idx) else {
    return false;
  };
  if !is_invalid(current) {
    return false;
  }
  *counter += 1;
  let new_name = format_counter(template, *counter);
  abc.rename_multiname(mn_idx, new_name);
  true
}

pub fn rename_invalid_identifiers(abc: &mut AbcFile, formats: &Formats) {
  let mut counters = Counters::default();

  for idx in 0..abc.classes.len() {
    let (name, super_name) = {
      let class = &abc.classes[idx];
      (class.name, class.super_name)
    };
    rename_if_invalid(abc, name, &mut counters.classes, &formats.classes);
    rename_if_invalid(abc, super_name, &mut counters.classes, &formats.classes);

    rename_traits(abc, idx, true, &mut counters, formats);
    rename_traits(abc, idx, false, &mut counters, formats);

    rename_method_locals(abc, idx, &mut counters, formats);
  }
}

fn rename_traits(abc: &mut AbcFile, class_idx: usize, instance: bool, counters: &mut Counters, formats: &Formats) {
  let names: Vec<u32> = {
    let class = &abc.classes[class_idx];
    let traits = if instance { &class.itraits } else { &class.ctraits };
    traits.iter().map(|t| t.name).collect()
  };
  let kinds: Vec<&'static str> = {
    let class = &abc.classes[class_idx];
    let traits = if instance { &class.itraits } else { &class.ctraits };
    traits
      .iter()
      .map(|t| match t.data {
        TraitData::Slot { .. } => "var",
        TraitData::Const { .. } => "const",
        TraitData::Method { .. } | TraitData::Getter { .. } | TraitData::Setter { .. } => "method",
        TraitData::Class { .. } => "class",
        TraitData::Function { .. } => "function",
      })
      .collect()
  };

  for (name_mn, kind) in names.into_iter().zip(kinds) {
    let (counter, template): (&mut u32, &str) = match kind {
      "var" => (&mut counters.vars, &formats.vars),
      "const" => (&mut counters.consts, &formats.consts),
      "method" => (&mut counters.methods, &formats.methods),
      "class" => (&mut counters.classes, &formats.classes),
      "function" => (&mut counters.functions, &formats.functions),
      _ => (&mut counters.names, &formats.names),
    };
    rename_if_invalid(abc, name_mn, counter, template);
  }
}

/// Exception-bound catch variables. A method with a single invalid-name
/// exception variable gets the literal `error`; one
/// with several gets `errorN` per the configured format, one counter value
/// per method (not shared globally) since the producer numbers them that
/// way within the dispatching try/catch ladder.
fn rename_method_locals(abc: &mut AbcFile, class_idx: usize, counters: &mut Counters, formats: &Formats) {
  let method_indices: Vec<u32> = {
    let class = &abc.classes[class_idx];
    class
      .itraits
      .iter()
      .chain(class.ctraits.iter())
      .filter_map(|t| t.method_index())
      .chain([class.iinit, class.cinit])
      .collect()
  };

  for m_idx in method_indices {
    let Some(method) = abc.methods.get(m_idx as usize) else {
      continue;
    };
    let invalid: Vec<usize> = method
      .exceptions
      .iter()
      .enumerate()
      .filter(|(_, e)| {
        e.var_name != 0
          && abc
            .pool
            .strings
            .get(e.var_name as usize)
            .map(|s| is_invalid(s))
            .unwrap_or(false)
      })
      .map(|(i, _)| i)
      .collect();

    if invalid.is_empty() {
      continue;
    }

    if invalid.len() == 1 {
      let new_idx = abc.pool.push_string("error");
      abc.methods[m_idx as usize].exceptions[invalid[0]].var_name = new_idx;
    } else {
      for i in invalid {
        counters.errors += 1;
        let name = format_counter(&formats.errors, counters.errors);
        let new_idx = abc.pool.push_string(name);
        abc.methods[m_idx as usize].exceptions[i].var_name = new_idx;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abc::{Class, ClassFlags, ConstantPool, Exception, Method, Multiname, Trait, TraitAttrs};

  fn invalid_name_abc() -> AbcFile {
    let mut pool = ConstantPool::default();
    pool.strings.push(String::new());
    let junk = pool.push_string("\u{0001}\u{0002}");
    pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
    let class_mn = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name: junk });

    let class = Class {
      name: class_mn,
      super_name: 0,
      flags: ClassFlags::default(),
      protected_ns: 0,
      iinit: 0,
      cinit: 0,
      itraits: vec![],
      ctraits: vec![],
    };

    AbcFile {
      minor_version: 16,
      major_version: 46,
      pool,
      methods: vec![Method::default()],
      classes: vec![class],
      scripts: vec![],
      namespace_map: Default::default(),
    }
  }

  #[test]
  fn renames_an_invalid_class_name() {
    let mut abc = invalid_name_abc();
    rename_invalid_identifiers(&mut abc, &Formats::default());
    assert_eq!(abc.pool.qname_str(abc.classes[0].name), Some("class_001"));
  }

  #[test]
  fn leaves_a_printable_name_untouched() {
    let mut pool = ConstantPool::default();
    pool.strings.push(String::new());
    let good = pool.push_string("Foo");
    pool.multinames.push(Multiname::QName { ns: 0, name: good });
    let class = Class {
      name: 0,
      super_name: 0,
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
      methods: vec![],
      classes: vec![class],
      scripts: vec![],
      namespace_map: Default::default(),
    };
    rename_invalid_identifiers(&mut abc, &Formats::default());
    assert_eq!(abc.pool.qname_str(abc.classes[0].name), Some("Foo"));
  }

  #[test]
  fn single_invalid_exception_var_becomes_literal_error() {
    let mut abc = invalid_name_abc();
    let junk = abc.pool.push_string("\u{0003}");
    abc.methods.push(Method {
      exceptions: vec![Exception {
        from: 0,
        to: 0,
        target: 0,
        exc_type: 0,
        var_name: junk,
      }],
      ..Default::default()
    });
    let method_idx = (abc.methods.len() - 1) as u32;
    abc.classes[0].itraits.push(Trait {
      name: 0,
      attrs: TraitAttrs::default(),
      data: TraitData::Method {
        disp_id: 0,
        method: method_idx,
      },
    });
    rename_invalid_identifiers(&mut abc, &Formats::default());
    let name_idx = abc.methods[method_idx as usize].exceptions[0].var_name;
    assert_eq!(abc.pool.strings[name_idx as usize], "error");
  }
}
