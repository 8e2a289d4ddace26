//! Utility library for the OPC-UA testbed orchestration tools.

pub mod fs;
pub mod process;
