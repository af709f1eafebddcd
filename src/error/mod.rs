//! Error handling module for connfactory
//!
//! Every factory either returns a usable client or fails with one of these kinds,
//! so callers never need to match on a wrapped driver's own error types.

mod error;

pub use error::{FactoryError, Result};
