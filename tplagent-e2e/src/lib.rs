//! End-to-end test support for the tplagent supervisor.

pub mod harness;
