//! Application services: rendering and tool discovery.

pub mod discovery;
pub mod error;
pub mod render;
