pub mod error;
pub mod extract;
pub mod fetch;
pub mod launch;
pub mod logger;
pub mod payload;
pub mod protocol;
pub mod verify;
pub mod workdir;

pub use error::*;
pub use extract::*;
pub use fetch::*;
pub use launch::*;
pub use logger::*;
pub use protocol::*;
pub use verify::*;
pub use workdir::*;
