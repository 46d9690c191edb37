pub mod command;
pub mod discover;
pub mod error;
pub mod freshness;
pub mod runner;

pub use command::*;
pub use discover::*;
pub use error::*;
pub use freshness::*;
pub use runner::*;
