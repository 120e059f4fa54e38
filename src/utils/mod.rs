//! Pure utility functions.
//!
//! Stateless helpers shared by the library and the binaries.

pub mod bootstrap;
pub mod env;
pub mod retry;
