//! Minimal git plumbing for project creation and result provenance.

pub mod command;
pub mod error;
pub mod repo;

pub use command::*;
pub use error::*;
pub use repo::*;
