pub mod config;
pub mod location;
pub mod settings;

pub use config::*;
pub use location::*;
pub use settings::*;
