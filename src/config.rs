//! Name-format configuration: the `formats` section of the YAML/JSON config
//! document. Each format string is validated at load time by
//! formatting it against sentinel arguments — a format with no substitution
//! point is rejected outright, since it would collide every placeholder
//! name into one.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Formats {
  pub classes: String,
  pub consts: String,
  pub functions: String,
  pub names: String,
  pub vars: String,
  pub methods: String,
  pub errors: String,
  pub packet_subhandler: String,
  pub unknown_clientbound_packet: String,
  pub tribulle_clientbound_packet: String,
  pub tribulle_serverbound_packet: String,
  pub clientbound_packet: String,
  pub serverbound_packet: String,
}

impl Default for Formats {
  fn default() -> Self {
    Formats {
      classes: "class_{:03d}".into(),
      consts: "const_{:03d}".into(),
      functions: "function_{:03d}".into(),
      names: "name_{:03d}".into(),
      vars: "var_{:03d}".into(),
      methods: "method_{:03d}".into(),
      errors: "error{:03d}".into(),
      packet_subhandler: "PacketSubHandler_{:02x}".into(),
      unknown_clientbound_packet: "CPacket{:02x}{:02x}".into(),
      tribulle_clientbound_packet: "TCPacket_{:04x}{}".into(),
      tribulle_serverbound_packet: "TSPacket_{:04x}{}".into(),
      clientbound_packet: "CPacket{:02x}{:02x}{}".into(),
      serverbound_packet: "SPacket{:02x}{:02x}{}".into(),
    }
  }
}

/// Minimal `{}`/`{:0Nd}`/`{:0Nx}` formatter sufficient for the seven
/// single-counter keys and the multi-argument packet keys. Anything richer
/// than zero-padded decimal/hex width specifiers is out of scope — the
/// config format is meant to be tweaked, not a general template language.
pub fn format_counter(template: &str, counter: u32) -> String {
  format_one(template, &FormatArg::UInt(counter))
}

pub fn format_hex(template: &str, code: u32) -> String {
  format_one(template, &FormatArg::UInt(code))
}

pub enum FormatArg {
  UInt(u32),
  Str(String),
}

fn format_one(template: &str, arg: &FormatArg) -> String {
  format_multi(template, std::slice::from_ref(arg))
}

/// Applies positional `{}`/`{:02x}`/`{:03}` placeholders in `template` with
/// `args`, in order. Extra `{}` beyond `args.len()` are replaced with an
/// empty string (used by the packet keys' optional trailing name suffix).
pub fn format_multi(template: &str, args: &[FormatArg]) -> String {
  let mut out = String::with_capacity(template.len());
  let mut chars = template.char_indices().peekable();
  let mut arg_idx = 0;

  while let Some((i, c)) = chars.next() {
    if c == '{' {
      let rest = &template[i..];
      if let Some(end) = rest.find('}') {
        let spec = &rest[1..end];
        for _ in 0..end {
          chars.next();
        }
        let value = args.get(arg_idx);
        out.push_str(&render(spec, value));
        arg_idx += 1;
        continue;
      }
    }
    out.push(c);
  }
  out
}

fn render(spec: &str, value: Option<&FormatArg>) -> String {
  let Some(value) = value else {
    return String::new();
  };
  match value {
    FormatArg::Str(s) => s.clone(),
    FormatArg::UInt(n) => {
      if let Some(spec) = spec.strip_prefix(':') {
        if let Some(width) = spec.strip_prefix('0').and_then(|s| s.strip_suffix('x')) {
          let width: usize = width.parse().unwrap_or(2);
          return format!("{n:0width$x}");
        }
        if let Some(width) = spec.strip_suffix('d').and_then(|s| s.strip_prefix('0')) {
          let width: usize = width.parse().unwrap_or(3);
          return format!("{n:0width$}");
        }
        if let Ok(width) = spec.trim_start_matches('0').parse::<usize>() {
          return format!("{n:0width$}");
        }
      }
      n.to_string()
    }
  }
}

/// Validates that `template` actually contains at least one substitution
/// point by checking that formatting it differs from the literal template
/// text itself.
fn validate(key: &str, template: &str) -> Result<()> {
  let rendered = format_multi(template, &[FormatArg::UInt(1), FormatArg::UInt(2), FormatArg::Str("x".into())]);
  if rendered == template {
    return Err(Error::Config(format!(
      "format `{key}` (\"{template}\") has no substitution point"
    )));
  }
  Ok(())
}

impl Formats {
  pub fn validate_all(&self) -> Result<()> {
    validate("classes", &self.classes)?;
    validate("consts", &self.consts)?;
    validate("functions", &self.functions)?;
    validate("names", &self.names)?;
    validate("vars", &self.vars)?;
    validate("methods", &self.methods)?;
    validate("errors", &self.errors)?;
    validate("packet_subhandler", &self.packet_subhandler)?;
    validate("unknown_clientbound_packet", &self.unknown_clientbound_packet)?;
    validate("tribulle_clientbound_packet", &self.tribulle_clientbound_packet)?;
    validate("tribulle_serverbound_packet", &self.tribulle_serverbound_packet)?;
    validate("clientbound_packet", &self.clientbound_packet)?;
    validate("serverbound_packet", &self.serverbound_packet)?;
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
  pub formats: Formats,
}

impl Config {
  pub fn load(path: &std::path::Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let config: Config = if path.extension().and_then(|e| e.to_str()) == Some("json") {
      serde_json::from_str(&text).map_err(|e| Error::Config(format!("{path:?}: {e}")))?
    } else {
      serde_yaml::from_str(&text).map_err(|e| Error::Config(format!("{path:?}: {e}")))?
    };
    config.formats.validate_all()?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_formats_all_validate() {
    Formats::default().validate_all().unwrap();
  }

  #[test]
  fn rejects_a_format_with_no_placeholder() {
    assert!(validate("classes", "literally_static").is_err());
  }

  #[test]
  fn formats_zero_padded_hex() {
    assert_eq!(format_hex("CPacket{:02x}", 0x5), "CPacket05");
  }

  #[test]
  fn formats_counter_with_width() {
    assert_eq!(format_counter("class_{:03}", 7), "class_007");
  }
}
