//! Application layer: rendering, transformation, image resolution and the commands
//! built on them.

pub mod commands;
pub mod convert;
pub mod copy;
pub mod error;
pub mod images;
pub mod render;
pub mod session;
pub mod template;
pub mod transform;
pub mod upload;
