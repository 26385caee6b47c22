//! Markdown rendering into a detached document.
//!
//! A [`MarkdownRenderer`] appends blocks to a shared container, possibly after its
//! `render` call returns. [`DocumentRenderer`] waits for the render to settle, loads
//! the components it contributed and hands back a working copy.

pub mod comrak;
pub mod components;
pub mod document;
pub mod markdown;
pub mod mermaid;
pub mod settle;
pub mod state;

pub use self::comrak::ComrakRenderer;
pub use components::{ComponentAllowList, RenderComponent, RenderLifecycle};
pub use document::DocumentRenderer;
pub use markdown::{MarkdownRenderer, MarkdownRequest, RenderError, RenderHandle};
pub use mermaid::{MermaidError, MermaidRenderer};
pub use settle::{SettleTiming, Settled};
pub use state::{BlockHooks, RenderState};
