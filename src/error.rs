use std::fmt;
use std::path::PathBuf;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors the engine can report to the user. The variant determines the
/// process exit code assigned by [`Error::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("{0}")]
  Config(String),

  #[error("could not read `{path}`: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid SWF: {0}")]
  InvalidInput(String),

  #[error("missing obfuscation primitives:\n{}", format_missing(.0))]
  MissingPrimitives(Vec<MissingPrimitive>),
}

fn format_missing(missing: &[MissingPrimitive]) -> String {
  missing
    .iter()
    .map(|m| format!("  - {m}"))
    .collect::<Vec<_>>()
    .join("\n")
}

/// One obfuscation anchor the analyzer failed to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPrimitive {
  BinaryBufferType,
  WrapperClass,
  StaticClasses,
  ServerboundBase,
  ClientboundBase,
  PacketHandler,
  VarIntReader,
}

impl fmt::Display for MissingPrimitive {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MissingPrimitive::BinaryBufferType => "binary buffer type (ByteArray)",
      MissingPrimitive::WrapperClass => "wrapper class",
      MissingPrimitive::StaticClasses => "static constant classes",
      MissingPrimitive::ServerboundBase => "serverbound packet base",
      MissingPrimitive::ClientboundBase => "clientbound packet base",
      MissingPrimitive::PacketHandler => "packet handler",
      MissingPrimitive::VarIntReader => "var-int reader",
    };
    f.write_str(name)
  }
}

impl Error {
  pub fn exit_code(&self) -> i32 {
    match self {
      Error::Config(_) => 1,
      Error::Io { .. } | Error::InvalidInput(_) => 2,
      Error::MissingPrimitives(_) => 3,
    }
  }
}
