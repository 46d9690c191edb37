pub mod config;
pub mod project;
pub mod store;
pub mod types;
pub mod validation;

pub use config::*;
pub use project::*;
pub use store::*;
pub use types::*;
pub use validation::*;
