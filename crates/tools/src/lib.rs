//! `ck-tools` — the Tool Bridge and its concrete tool implementations.
//!
//! `bridge` exposes the uniform `{discover, invoke}` surface the
//! orchestrator calls through; `exec`/`process`/`file_ops` are the local,
//! always-available primitives currently registered behind it.

pub mod bridge;
pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod process;

pub use bridge::{ConnectionStateReader, ToolBridge, ToolDescriptor};
pub use manager::ProcessManager;
