//! Components contributed during rendering and their deferred loading.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::markdown::RenderError;

/// Signatures whose `on_load` is invoked after rendering settles.
pub const DEFAULT_LOADABLE_SIGNATURES: [&str; 1] = ["SheetElement"];

/// A piece of rendered content that finishes its work when loaded.
#[async_trait]
pub trait RenderComponent: Send + Sync {
    /// Stable name identifying the kind of component.
    fn signature(&self) -> &str;

    fn children(&self) -> Vec<Arc<dyn RenderComponent>> {
        Vec::new()
    }

    async fn on_load(&self) -> Result<(), RenderError>;
}

/// Explicit list of component signatures that are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentAllowList {
    signatures: Vec<String>,
}

impl ComponentAllowList {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signatures: signatures.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, signature: &str) -> bool {
        self.signatures.iter().any(|allowed| allowed == signature)
    }
}

impl Default for ComponentAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_LOADABLE_SIGNATURES)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub visited: usize,
    pub loaded: usize,
    pub failed: usize,
}

/// Owner of the components created by one render.
#[derive(Default)]
pub struct RenderLifecycle {
    children: Mutex<Vec<Arc<dyn RenderComponent>>>,
}

impl RenderLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&self, component: Arc<dyn RenderComponent>) {
        if let Ok(mut children) = self.children.lock() {
            children.push(component);
        }
    }

    pub fn children(&self) -> Vec<Arc<dyn RenderComponent>> {
        self.children
            .lock()
            .map(|children| children.clone())
            .unwrap_or_default()
    }

    /// Depth-first walk over the component tree, loading allowed components once each.
    ///
    /// Unknown signatures are skipped; load failures are logged and do not stop the walk.
    pub async fn load_components(&self, allow: &ComponentAllowList) -> LoadSummary {
        let mut summary = LoadSummary::default();
        let mut visited = HashSet::new();
        let mut stack: Vec<Arc<dyn RenderComponent>> = self.children().into_iter().rev().collect();

        while let Some(component) = stack.pop() {
            if !visited.insert(Arc::as_ptr(&component) as *const () as usize) {
                continue;
            }
            summary.visited += 1;

            if allow.allows(component.signature()) {
                match component.on_load().await {
                    Ok(()) => summary.loaded += 1,
                    Err(err) => {
                        summary.failed += 1;
                        warn!(
                            target = "application::render::components",
                            op = "components::load",
                            result = "error",
                            signature = component.signature(),
                            error = %err,
                            "component failed to load"
                        );
                    }
                }
            }

            stack.extend(component.children().into_iter().rev());
        }

        debug!(
            target = "application::render::components",
            op = "components::load",
            result = "ok",
            visited = summary.visited,
            loaded = summary.loaded,
            failed = summary.failed,
            "components loaded"
        );
        summary
    }
}
