//! Observability for cbio
//!
//! Structured, synchronous JSON logging. Logging is read-only: it never
//! changes the outcome of the operation that emits it.

mod logger;

pub use logger::{Logger, Severity};
