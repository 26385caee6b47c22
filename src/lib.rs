//! Render vault notes into self-contained HTML and publish them to ShowDoc.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
