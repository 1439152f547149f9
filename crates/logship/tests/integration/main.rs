//! Integration tests for the logship runtime
//!
//! Builds complete runtimes on temporary directories and checks the
//! behavior a host application sees: start order, session stamping, module
//! enablement, crash delivery and restart durability.

mod common;

mod test_http;
mod test_lifecycle;
mod test_restart;
