//! Declarative matcher: applies user-authored class/trait rename rules
//! without requiring a dedicated structural recognizer for every producer
//! variant, loaded via `--classdef`.
//!
//! Every predicate resolves to one of three outcomes rather than a plain
//! bool: a class can definitely match, definitely not match, or be
//! inconclusive (`Skip`) — e.g. a regex that fails to compile, or a
//! condition the document author marked for debugging. `Skip` poisons a
//! conjunction the same way `NoMatch` would (a rule is only ever applied
//! when every condition is definitely satisfied) but is reported
//! separately so a rule author can tell "ruled out" from "couldn't tell".

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::abc::{AbcFile, TraitData};
use crate::error::{Error, Result};
use crate::namespace::{NamespaceAssigner, SyntheticNs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
  Match,
  NoMatch,
  Skip,
}

impl MatchResult {
  fn and(self, other: MatchResult) -> MatchResult {
    match (self, other) {
      (MatchResult::NoMatch, _) | (_, MatchResult::NoMatch) => MatchResult::NoMatch,
      (MatchResult::Skip, _) => other,
      (_, MatchResult::Skip) => self,
      (MatchResult::Match, MatchResult::Match) => MatchResult::Match,
    }
  }

  fn negate(self) -> MatchResult {
    match self {
      MatchResult::Match => MatchResult::NoMatch,
      MatchResult::NoMatch => MatchResult::Match,
      MatchResult::Skip => MatchResult::Skip,
    }
  }

  fn is_match(self) -> bool {
    matches!(self, MatchResult::Match)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
  NameMatches(String),
  SuperNameMatches(String),
  Sealed(bool),
  Final(bool),
  Interface(bool),
  InstanceTraitCount {
    #[serde(default)]
    min: Option<usize>,
    #[serde(default)]
    max: Option<usize>,
  },
  ClassTraitCount {
    #[serde(default)]
    min: Option<usize>,
    #[serde(default)]
    max: Option<usize>,
  },
  Not(Box<Condition>),
  AllOf(Vec<Condition>),
  AnyOf(Vec<Condition>),
  /// Always inconclusive. A placeholder for a predicate the rule author
  /// wants to flag rather than evaluate — e.g. while drafting a rule
  /// incrementally with `debug: true`.
  Unknown,
}

fn eval_condition(abc: &AbcFile, class_idx: usize, cond: &Condition) -> MatchResult {
  let class = &abc.classes[class_idx];
  match cond {
    Condition::NameMatches(pat) => regex_match(pat, abc.pool.qname_str(class.name).unwrap_or("")),
    Condition::SuperNameMatches(pat) => regex_match(pat, abc.pool.qname_str(class.super_name).unwrap_or("")),
    Condition::Sealed(want) => bool_result(class.flags.sealed == *want),
    Condition::Final(want) => bool_result(class.flags.is_final == *want),
    Condition::Interface(want) => bool_result(class.flags.interface == *want),
    Condition::InstanceTraitCount { min, max } => count_result(class.itraits.len(), *min, *max),
    Condition::ClassTraitCount { min, max } => count_result(class.ctraits.len(), *min, *max),
    Condition::Not(inner) => eval_condition(abc, class_idx, inner).negate(),
    Condition::AllOf(conds) => conds
      .iter()
      .fold(MatchResult::Match, |acc, c| acc.and(eval_condition(abc, class_idx, c))),
    Condition::AnyOf(conds) => {
      let results: Vec<MatchResult> = conds.iter().map(|c| eval_condition(abc, class_idx, c)).collect();
      if results.iter().any(|r| r.is_match()) {
        MatchResult::Match
      } else if results.iter().all(|r| *r == MatchResult::NoMatch) {
        MatchResult::NoMatch
      } else {
        MatchResult::Skip
      }
    }
    Condition::Unknown => MatchResult::Skip,
  }
}

fn regex_match(pat: &str, text: &str) -> MatchResult {
  match regex::Regex::new(pat) {
    Ok(re) => bool_result(re.is_match(text)),
    Err(_) => MatchResult::Skip,
  }
}

fn bool_result(b: bool) -> MatchResult {
  if b {
    MatchResult::Match
  } else {
    MatchResult::NoMatch
  }
}

fn count_result(n: usize, min: Option<usize>, max: Option<usize>) -> MatchResult {
  let ok = min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m);
  bool_result(ok)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
  Slot,
  Const,
  Method,
  Getter,
  Setter,
  Class,
  Function,
  Any,
}

fn trait_kind_matches(kind: TraitKind, data: &TraitData) -> bool {
  matches!(
    (kind, data),
    (TraitKind::Any, _)
      | (TraitKind::Slot, TraitData::Slot { .. })
      | (TraitKind::Const, TraitData::Const { .. })
      | (TraitKind::Method, TraitData::Method { .. })
      | (TraitKind::Getter, TraitData::Getter { .. })
      | (TraitKind::Setter, TraitData::Setter { .. })
      | (TraitKind::Class, TraitData::Class { .. })
      | (TraitKind::Function, TraitData::Function { .. })
  )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitRule {
  pub kind: TraitKind,
  #[serde(default)]
  pub name_matches: Option<String>,
  #[serde(default)]
  pub rename_to: Option<String>,
}

/// One rule: a class-level predicate, an optional rename/namespace move,
/// and a greedy, order-dependent sweep over its instance traits.
///
/// `strict` requires every instance trait to be claimed by some
/// `TraitRule` — the rule describes the class's *entire* trait partition,
/// not just the traits it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRule {
  #[serde(default)]
  pub conditions: Vec<Condition>,
  #[serde(default)]
  pub strict: bool,
  #[serde(default)]
  pub debug: bool,
  #[serde(default)]
  pub rename_to: Option<String>,
  #[serde(default)]
  pub namespace: Option<String>,
  #[serde(default)]
  pub traits: Vec<TraitRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatcherDocument {
  #[serde(default)]
  pub rules: Vec<ClassRule>,
}

impl MatcherDocument {
  pub fn load(path: &Path) -> Result<MatcherDocument> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let doc: MatcherDocument = if path.extension().and_then(|e| e.to_str()) == Some("json") {
      serde_json::from_str(&text).map_err(|e| Error::Config(format!("{path:?}: {e}")))?
    } else {
      serde_yaml::from_str(&text).map_err(|e| Error::Config(format!("{path:?}: {e}")))?
    };
    Ok(doc)
  }

  /// Loads and concatenates every `.yaml`/`.yml`/`.json` file in `dir`, in
  /// sorted filename order — the directory form of `--classdef`.
  pub fn load_dir(dir: &Path) -> Result<MatcherDocument> {
    let mut combined = MatcherDocument::default();
    let entries = std::fs::read_dir(dir).map_err(|source| Error::Io {
      path: dir.to_path_buf(),
      source,
    })?;
    let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
      if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml") | Some("json")) {
        combined.rules.append(&mut Self::load(&path)?.rules);
      }
    }
    Ok(combined)
  }
}

#[derive(Debug, Default)]
pub struct MatchReport {
  pub classes_matched: usize,
  pub traits_matched: usize,
  pub debug_log: Vec<String>,
}

/// Applies every rule in `doc` to every class, in document order. A class
/// can be matched by more than one rule (later rules see the earlier
/// rules' renames), mirroring the way the structural recognizers and the
/// declarative matcher layer on top of each other in the pipeline.
pub fn apply_matchers(abc: &mut AbcFile, doc: &MatcherDocument, ns: &mut NamespaceAssigner) -> MatchReport {
  let mut report = MatchReport::default();

  for rule in &doc.rules {
    for idx in 0..abc.classes.len() {
      let verdict = rule
        .conditions
        .iter()
        .fold(MatchResult::Match, |acc, c| acc.and(eval_condition(abc, idx, c)));

      if rule.debug {
        report.debug_log.push(format!("class {idx}: {verdict:?}"));
      }
      if !verdict.is_match() {
        continue;
      }
      if rule.strict && abc.classes[idx].itraits.len() != rule.traits.len() {
        continue;
      }

      report.traits_matched += apply_trait_rules(abc, idx, &rule.traits);

      if let Some(new_name) = &rule.rename_to {
        let mn = abc.classes[idx].name;
        abc.rename_multiname(mn, new_name.clone());
        report.classes_matched += 1;

        if let Some(ns_path) = rule.namespace.as_deref().and_then(synthetic_ns_for) {
          ns.assign_class(abc, mn, ns_path);
        }
      }
    }
  }

  report
}

fn apply_trait_rules(abc: &mut AbcFile, class_idx: usize, rules: &[TraitRule]) -> usize {
  let mut claimed = vec![false; abc.classes[class_idx].itraits.len()];
  let mut count = 0;

  for rule in rules {
    for pos in 0..claimed.len() {
      if claimed[pos] {
        continue;
      }
      let (data, name_mn) = {
        let t = &abc.classes[class_idx].itraits[pos];
        (t.data.clone(), t.name)
      };
      if !trait_kind_matches(rule.kind, &data) {
        continue;
      }
      if let Some(pat) = &rule.name_matches {
        let current = abc.pool.qname_str(name_mn).unwrap_or("");
        let hit = regex::Regex::new(pat).map(|re| re.is_match(current)).unwrap_or(false);
        if !hit {
          continue;
        }
      }
      if let Some(new_name) = &rule.rename_to {
        abc.rename_multiname(name_mn, new_name.clone());
      }
      claimed[pos] = true;
      count += 1;
      break;
    }
  }

  count
}

fn synthetic_ns_for(path: &str) -> Option<SyntheticNs> {
  Some(match path {
    "com.obfuscate" => SyntheticNs::ComObfuscate,
    "packets" => SyntheticNs::Packets,
    "packets.serverbound" => SyntheticNs::PacketsServerbound,
    "packets.clientbound" => SyntheticNs::PacketsClientbound,
    "packets.tribulle" => SyntheticNs::PacketsTribulle,
    "packets.tribulle.serverbound" => SyntheticNs::PacketsTribulleServerbound,
    "packets.tribulle.clientbound" => SyntheticNs::PacketsTribulleClientbound,
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abc::{Class, ClassFlags, ConstantPool, DefaultValue, Multiname, Trait, TraitAttrs};

  fn one_class_abc() -> AbcFile {
    let mut pool = ConstantPool::default();
    pool.strings.push(String::new());
    let name = pool.push_string("class_001");
    pool.multinames.push(Multiname::QName { ns: 0, name: 0 });
    let mn = pool.multinames.len() as u32;
    pool.multinames.push(Multiname::QName { ns: 0, name });

    let slot_name = pool.push_string("a0");
    pool.multinames.push(Multiname::QName { ns: 0, name: slot_name });
    let slot_mn = (pool.multinames.len() - 1) as u32;

    let class = Class {
      name: mn,
      super_name: 0,
      flags: ClassFlags {
        sealed: true,
        ..ClassFlags::default()
      },
      protected_ns: 0,
      iinit: 0,
      cinit: 0,
      itraits: vec![Trait {
        name: slot_mn,
        attrs: TraitAttrs::default(),
        data: TraitData::Slot {
          slot_id: 1,
          type_name: 0,
          value: DefaultValue::Undefined,
        },
      }],
      ctraits: vec![],
    };

    AbcFile {
      minor_version: 16,
      major_version: 46,
      pool,
      methods: vec![Default::default()],
      classes: vec![class],
      scripts: vec![],
      namespace_map: Default::default(),
    }
  }

  #[test]
  fn skip_is_the_identity_element_of_and() {
    use MatchResult::{Match, NoMatch, Skip};
    assert_eq!(Match.and(Skip), Match);
    assert_eq!(Skip.and(Match), Match);
    assert_eq!(Skip.and(Skip), Skip);
    assert_eq!(NoMatch.and(Skip), NoMatch);
    assert_eq!(Skip.and(NoMatch), NoMatch);
    assert_eq!(Match.and(Match), Match);
    assert_eq!(Match.and(NoMatch), NoMatch);
  }

  #[test]
  fn all_of_skip_and_match_conditions_matches() {
    let abc = one_class_abc();
    let cond = Condition::AllOf(vec![Condition::Unknown, Condition::Sealed(true)]);
    assert_eq!(eval_condition(&abc, 0, &cond), MatchResult::Match);
  }

  #[test]
  fn matches_sealed_class_and_renames_it_and_its_slot() {
    let mut abc = one_class_abc();
    let mut ns = NamespaceAssigner::new();
    let doc = MatcherDocument {
      rules: vec![ClassRule {
        conditions: vec![Condition::Sealed(true), Condition::InstanceTraitCount { min: Some(1), max: Some(1) }],
        strict: true,
        debug: false,
        rename_to: Some("Position".into()),
        namespace: Some("com.obfuscate".into()),
        traits: vec![TraitRule {
          kind: TraitKind::Slot,
          name_matches: None,
          rename_to: Some("x".into()),
        }],
      }],
    };

    let report = apply_matchers(&mut abc, &doc, &mut ns);
    assert_eq!(report.classes_matched, 1);
    assert_eq!(report.traits_matched, 1);
    assert_eq!(abc.pool.qname_str(abc.classes[0].name), Some("Position"));
    assert_eq!(abc.pool.qname_str(abc.classes[0].itraits[0].name), Some("x"));
  }

  #[test]
  fn a_negated_condition_skips_non_sealed_classes() {
    let mut abc = one_class_abc();
    abc.classes[0].flags.sealed = false;
    let mut ns = NamespaceAssigner::new();
    let doc = MatcherDocument {
      rules: vec![ClassRule {
        conditions: vec![Condition::Not(Box::new(Condition::Sealed(false)))],
        strict: false,
        debug: false,
        rename_to: Some("ShouldNotApply".into()),
        namespace: None,
        traits: vec![],
      }],
    };
    apply_matchers(&mut abc, &doc, &mut ns);
    assert_ne!(abc.pool.qname_str(abc.classes[0].name), Some("ShouldNotApply"));
  }

  #[test]
  fn an_unparseable_regex_is_inconclusive_not_a_match() {
    assert_eq!(regex_match("(", "anything"), MatchResult::Skip);
  }
}
