//! The deobfuscation pipeline: parse, strip invalid names, fold constant
//! initializers, recognize the obfuscation primitives, unscramble every
//! method, rename packets/namespaces, apply user rules, re-serialize.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::abc::{read_abc, write_abc, AbcFile};
use crate::config::Config;
use crate::error::{Error, MissingPrimitive, Result};
use crate::matcher::{apply_matchers, MatcherDocument};
use crate::namespace::{NamespaceAssigner, SyntheticNs};
use crate::packet::analyze_and_rename_packets;
use crate::recognize::{recognize, Recognition};
use crate::rename::rename_invalid_identifiers;
use crate::simplify::simplify_cinit;
use crate::swf::Swf;
use crate::unscramble::{unscramble_method, PoolAppender, UnscrambleContext};

pub struct Options {
  pub jobs: usize,
  pub ignore_missing: bool,
  pub config: Config,
  pub matcher: Option<MatcherDocument>,
  pub proxy_port: Option<u16>,
  pub report_timing: bool,
}

impl Default for Options {
  fn default() -> Self {
    Options {
      jobs: default_job_count(),
      ignore_missing: false,
      config: Config::default(),
      matcher: None,
      proxy_port: None,
      report_timing: false,
    }
  }
}

/// Default worker count for the unscrambling phase: the host's hardware
/// concurrency plus two.
pub fn default_job_count() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) + 2
}

#[derive(Debug, Default)]
pub struct Report {
  pub warnings: Vec<String>,
  pub timings: Vec<(&'static str, Duration)>,
}

/// Runs the full pipeline over a raw SWF file's bytes, returning the
/// rewritten movie and a report of anything worth telling the user about.
pub fn run(input: &[u8], opts: &Options) -> Result<(Vec<u8>, Report)> {
  let mut report = Report::default();

  let t0 = Instant::now();
  let swf = Swf::parse(input)?;
  let mut abc = read_abc(swf.abc_bytes())?;
  mark(&mut report, opts, "parse", t0);

  let t1 = Instant::now();
  rename_invalid_identifiers(&mut abc, &opts.config.formats);
  mark(&mut report, opts, "rename_invalid_identifiers", t1);

  let t2 = Instant::now();
  for idx in 0..abc.classes.len() {
    let cinit = abc.classes[idx].cinit;
    if let Some(method) = abc.methods.get_mut(cinit as usize) {
      if let Err(e) = simplify_cinit(method, &mut abc.pool) {
        report
          .warnings
          .push(format!("class {idx}: constant simplifier stopped early ({e})"));
      }
    }
  }
  mark(&mut report, opts, "simplify_cinit", t2);

  let t3 = Instant::now();
  let recognition = recognize(&abc);
  mark(&mut report, opts, "recognize", t3);

  check_primitives(&abc, &recognition, opts, &mut report)?;

  let t4 = Instant::now();
  unscramble_all(&mut abc, &recognition, opts.jobs);
  mark(&mut report, opts, "unscramble", t4);

  let t5 = Instant::now();
  let mut ns = NamespaceAssigner::new();
  let pkt_warnings = analyze_and_rename_packets(&mut abc, &recognition.anchors, &opts.config.formats, &mut ns);
  report.warnings.extend(pkt_warnings);

  if let Some(wrapper) = &recognition.wrapper {
    let mn = abc.classes[wrapper.class.0].name;
    abc.rename_multiname(mn, "Wrapper");
    ns.assign_class(&mut abc, mn, SyntheticNs::ComObfuscate);
  }
  for (counter, sc) in recognition.static_classes.iter().enumerate() {
    let mn = abc.classes[sc.class.0].name;
    abc.rename_multiname(mn, format!("StaticClass_{:02}", counter + 1));
    ns.assign_class(&mut abc, mn, SyntheticNs::ComObfuscate);
  }
  ns.patch_multinames(&mut abc);
  mark(&mut report, opts, "namespace_and_packet_rename", t5);

  let t6 = Instant::now();
  if let Some(doc) = &opts.matcher {
    let match_report = apply_matchers(&mut abc, doc, &mut ns);
    ns.patch_multinames(&mut abc);
    debug!(
      classes = match_report.classes_matched,
      traits = match_report.traits_matched,
      "declarative matcher finished"
    );
    report.warnings.extend(match_report.debug_log);
  }
  mark(&mut report, opts, "declarative_matcher", t6);

  if let Some(port) = opts.proxy_port {
    if !crate::proxy::rewrite_endpoint(&mut abc.pool, port) {
      report.warnings.push("no endpoint string found to rewrite".into());
    }
  }

  let t7 = Instant::now();
  let new_abc_bytes = write_abc(&abc);
  let output = swf.with_abc_bytes(&new_abc_bytes);
  mark(&mut report, opts, "serialize", t7);

  info!(warnings = report.warnings.len(), "deobfuscation finished");
  Ok((output, report))
}

fn check_primitives(abc: &AbcFile, recognition: &Recognition, opts: &Options, report: &mut Report) -> Result<()> {
  let mut missing = Vec::new();
  if crate::recognize::find_buffer_multiname(abc).is_none() {
    missing.push(MissingPrimitive::BinaryBufferType);
  }
  if recognition.wrapper.is_none() {
    missing.push(MissingPrimitive::WrapperClass);
  }
  if recognition.static_classes.is_empty() {
    missing.push(MissingPrimitive::StaticClasses);
  }
  if recognition.anchors.serverbound_base.is_none() {
    missing.push(MissingPrimitive::ServerboundBase);
  }
  if recognition.anchors.clientbound_base.is_none() {
    missing.push(MissingPrimitive::ClientboundBase);
  }
  if recognition.anchors.packet_handler.is_none() {
    missing.push(MissingPrimitive::PacketHandler);
  }
  if recognition.anchors.var_int_reader.is_none() {
    missing.push(MissingPrimitive::VarIntReader);
  }
  if missing.is_empty() {
    return Ok(());
  }
  if !opts.ignore_missing {
    return Err(Error::MissingPrimitives(missing));
  }
  for m in &missing {
    warn!(primitive = %m, "obfuscation primitive not recognized; continuing");
    report.warnings.push(format!("{m} not recognized"));
  }
  Ok(())
}

fn mark(report: &mut Report, opts: &Options, label: &'static str, start: Instant) {
  if opts.report_timing {
    report.timings.push((label, start.elapsed()));
  }
}

/// Runs the unscrambler over every method. `jobs <= 1` takes the plain
/// sequential path; otherwise the method vector is split into `jobs`
/// disjoint, independently-mutable chunks, one per worker thread — the
/// only cross-thread state is the constant pool's append-only int/double
/// vectors, guarded by a single mutex the whole run shares.
fn unscramble_all(abc: &mut AbcFile, recognition: &Recognition, jobs: usize) {
  let ctx = UnscrambleContext::build(abc, recognition.wrapper.as_ref(), &recognition.static_classes);
  let pool_mutex = Mutex::new(std::mem::take(&mut abc.pool));
  let appender = PoolAppender { pool: &pool_mutex };

  if jobs <= 1 || abc.methods.len() <= 1 {
    for method in abc.methods.iter_mut() {
      unscramble_method(method, &ctx, &appender);
    }
  } else {
    let chunk_size = (abc.methods.len() + jobs - 1) / jobs;
    std::thread::scope(|scope| {
      for chunk in abc.methods.chunks_mut(chunk_size.max(1)) {
        let ctx = &ctx;
        let appender = &appender;
        scope.spawn(move || {
          for method in chunk.iter_mut() {
            unscramble_method(method, ctx, appender);
          }
        });
      }
    });
  }

  abc.pool = pool_mutex.into_inner().unwrap();
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abc::{ConstantPool, Method};

  fn abc_with_methods(n: usize) -> AbcFile {
    AbcFile {
      minor_version: 16,
      major_version: 46,
      pool: ConstantPool::default(),
      methods: (0..n).map(|_| Method::default()).collect(),
      classes: vec![],
      scripts: vec![],
      namespace_map: Default::default(),
    }
  }

  #[test]
  fn default_job_count_leaves_headroom_above_one_core() {
    assert!(default_job_count() >= 2);
  }

  #[test]
  fn unscramble_all_runs_over_every_method_regardless_of_job_count() {
    let recognition = Recognition::default();

    let mut sequential = abc_with_methods(5);
    unscramble_all(&mut sequential, &recognition, 1);
    assert_eq!(sequential.methods.len(), 5);

    let mut parallel = abc_with_methods(5);
    unscramble_all(&mut parallel, &recognition, 4);
    assert_eq!(parallel.methods.len(), 5);
  }
}
