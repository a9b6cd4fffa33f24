//! Core runtime — the orchestrator that ties sessions, prompt building, LLM
//! streaming, tool dispatch, and persistence into one deterministic loop.
//!
//! Entry point: [`run_turn`] takes a session + user message and returns a
//! stream of [`TurnEvent`]s suitable for SSE or non-streaming aggregation.

pub mod cancel;
pub mod event_filter;
pub mod session_lock;
pub mod turn;

pub use turn::{run_turn, TurnEvent, TurnInput};
