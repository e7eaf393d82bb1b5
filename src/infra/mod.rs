//! Infrastructure layer
//!
//! Handles all I/O operations: filesystem locations and external processes.
//! This module is the only place where side effects occur.

pub mod dirs;
pub mod filesystem;
pub mod process;
pub mod toolchain;
