//! `ck-specialists` — the Specialist Registry.
//!
//! Loads the specialist catalogue once at start-up from a directory of
//! `specialist.toml` manifests and holds it as a process-wide read-only
//! handle. Routing ranks specialists against an incoming message by
//! embedding-centroid cosine similarity, after filtering out specialists
//! whose tool requirements or connection precondition the caller can't
//! currently satisfy.

pub mod loader;
pub mod manifest;
pub mod registry;

pub use registry::SpecialistRegistry;
