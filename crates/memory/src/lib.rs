//! `ck-memory` — the Memory Store.
//!
//! Derives durable per-user facts from turns (identity, emotional state,
//! preferences, goals, patterns) and assembles them into the `USER_FACTS`
//! prompt section. Derivation is idempotent on `(owner_id, source_turn_id)`:
//! deriving from the same turn twice never produces a duplicate memory.

pub mod store;
pub mod user_facts;

pub use store::MemoryStore;
pub use user_facts::UserFactsBuilder;
