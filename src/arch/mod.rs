//! # Architecture Abstraction Layer
//!
//! Provides the execution-context boundary for the scheduler. The rest of the
//! crate only sees [`ExecutionContext`] (capture / switch / resume) and
//! [`Stack`]; register layout and stack-pointer handling stay behind this
//! module. Currently implements the System V `ucontext` port for Linux/glibc.

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub mod ucontext;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub use ucontext::{live_stacks, ExecutionContext, Stack};

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
compile_error!("uthreads only has an execution-context port for Linux/glibc");
