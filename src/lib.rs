//! NDL Bridge, a deterministic event-to-narration bridge for text games.
//!
//! Game logic decides what happened and emits it as NDL (Natural Description
//! Language), a small structured markup. The bridge validates that markup
//! against the world, asks a language model to narrate it, verifies the
//! prose never contradicts or extends the recorded facts, and falls back to
//! a seeded template grammar when the model cannot be trusted.

pub mod core;
pub mod ndl;
pub mod schema;
