//! Pilot Bootstrap - bootstrap script generator and runtime protocol
//!
//! This crate compiles a bootstrap request into a plan, renders the plan into
//! a self-contained bash script for a compute node, and can execute the same
//! plan natively.

pub mod cli;
pub mod codec;
pub mod plan;
pub mod resolver;
pub mod runtime;
pub mod template;
pub mod types;

pub use plan::BootstrapPlan;
pub use resolver::LocationResolver;
pub use runtime::{BootstrapError, BootstrapProtocol, BootstrapReport, Logger};
pub use template::{write_script, GeneratedScript, ScriptAssembler};
pub use types::*;
