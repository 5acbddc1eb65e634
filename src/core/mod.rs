pub mod bridge;
pub mod config;
pub mod context;
pub mod emit;
pub mod grammar;
pub mod guard;
pub mod model;
pub mod prompt;
pub mod render;
pub mod voice;
