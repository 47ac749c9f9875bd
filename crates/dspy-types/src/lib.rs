//! # dspy-types
//!
//! Core types and collaborator contracts shared by the optimizer crates:
//! examples, signatures, the module/program traits, traces and the error
//! taxonomy.

pub mod errors;
pub mod example;
pub mod module;
pub mod signature;
pub mod trace;

pub use errors::*;
pub use example::*;
pub use module::*;
pub use signature::*;
pub use trace::*;
