//! Bootstrap script assembly.

pub mod blocks;
pub mod generator;
pub mod writer;

pub use blocks::{BlockKind, ScriptBlock};
pub use generator::{GeneratedScript, GeneratorError, ScriptAssembler};
pub use writer::{write_companion, write_script};
