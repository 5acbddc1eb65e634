//! Game-side data model: entities, events, and the world view the bridge borrows.

pub mod entity;
pub mod event;
pub mod narrative_fn;
pub mod world;
