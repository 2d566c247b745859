//! ABC deobfuscation engine: recognizes and reverses a family of
//! ActionScript bytecode obfuscation primitives embedded in a Flash movie,
//! and recovers semantic names for its network-packet classes.

pub mod abc;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod matcher;
pub mod namespace;
pub mod orchestrator;
pub mod packet;
pub mod proxy;
pub mod recognize;
pub mod rename;
pub mod simplify;
pub mod swf;
pub mod unscramble;

pub use error::{Error, Result};
