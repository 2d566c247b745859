//! Endpoint rewrite: the `--proxy <port>` operation that redirects the
//! embedded server address to localhost.

use regex::Regex;

use crate::abc::ConstantPool;

/// Scans the string pool for the first entry that looks like a
/// `host:port`-shaped endpoint (digits, dots, colons, dashes only, length
/// >= 11, at least one digit) and replaces it with `127.0.0.1:<port>`.
/// Replaces at most one entry; returns whether a replacement happened.
pub fn rewrite_endpoint(pool: &mut ConstantPool, port: u16) -> bool {
  let candidate = Regex::new(r"^[0-9.:\-]{11,}$").expect("static pattern");
  for s in pool.strings.iter_mut() {
    if candidate.is_match(s) && s.chars().any(|c| c.is_ascii_digit()) {
      *s = format!("127.0.0.1:{port}");
      return true;
    }
  }
  false
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn replaces_the_first_matching_endpoint_string() {
    let mut pool = ConstantPool::default();
    pool.strings.push("hello world".into());
    pool.strings.push("192.168.100.200".into());
    pool.strings.push("192.168.100.201".into());

    assert!(rewrite_endpoint(&mut pool, 4444));
    assert_eq!(pool.strings[1], "127.0.0.1:4444");
    assert_eq!(pool.strings[2], "192.168.100.201");
  }

  #[test]
  fn ignores_strings_too_short_or_with_no_digit() {
    let mut pool = ConstantPool::default();
    pool.strings.push("a.b.c.d.e.f".into());
    pool.strings.push("1.2.3".into());
    assert!(!rewrite_endpoint(&mut pool, 4444));
  }

  #[test]
  fn repeated_invocation_after_a_match_is_a_no_op() {
    let mut pool = ConstantPool::default();
    pool.strings.push("127.0.0.1:4444".into());
    assert!(rewrite_endpoint(&mut pool, 4444));
    assert_eq!(pool.strings[0], "127.0.0.1:4444");
  }
}
