//! Capability registry
//!
//! The application injects one handler per tool it supports. Handlers receive the
//! validated [`ToolAction`] and report a human-readable outcome.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::catalogue::{FunctionDeclaration, ToolAction, ToolDeclarations, ToolName};

/// Future returned by a capability
pub type ToolFuture = BoxFuture<'static, anyhow::Result<String>>;

/// An application capability invoked by the assistant
pub trait ToolHandler: Send + Sync {
    /// Run the capability
    fn call(&self, action: ToolAction) -> ToolFuture;
}

impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolAction) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    fn call(&self, action: ToolAction) -> ToolFuture {
        Box::pin(self(action))
    }
}

/// Mapping from tool name to the capability that implements it
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<ToolName, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous handler for the tool
    pub fn register(&mut self, name: ToolName, handler: impl ToolHandler + 'static) -> &mut Self {
        if self.handlers.insert(name, Arc::new(handler)).is_some() {
            tracing::debug!(tool = %name, "replaced tool handler");
        }
        self
    }

    /// Builder form of [`Self::register`]
    #[must_use]
    pub fn with(mut self, name: ToolName, handler: impl ToolHandler + 'static) -> Self {
        self.register(name, handler);
        self
    }

    /// Handler for a tool, if registered
    #[must_use]
    pub fn get(&self, name: ToolName) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(&name).cloned()
    }

    /// Whether a tool has a handler
    #[must_use]
    pub fn contains(&self, name: ToolName) -> bool {
        self.handlers.contains_key(&name)
    }

    /// Registered tools, in catalogue order
    pub fn names(&self) -> impl Iterator<Item = ToolName> + '_ {
        self.handlers.keys().copied()
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Declarations for the registered tools; `None` when nothing is registered
    #[must_use]
    pub fn declarations(&self) -> Option<Vec<ToolDeclarations>> {
        if self.handlers.is_empty() {
            return None;
        }
        Some(vec![ToolDeclarations {
            function_declarations: self.names().map(FunctionDeclaration::from).collect(),
        }])
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok(_: ToolAction) -> anyhow::Result<String> {
        Ok("done".to_string())
    }

    #[test]
    fn empty_registry_declares_nothing() {
        assert!(ToolRegistry::new().declarations().is_none());
    }

    #[test]
    fn declarations_follow_catalogue_order() {
        let registry = ToolRegistry::new()
            .with(ToolName::DeleteSupplier, ok)
            .with(ToolName::NavigateToView, ok);

        let groups = registry.declarations().unwrap();
        assert_eq!(groups.len(), 1);
        let names: Vec<&str> = groups[0]
            .function_declarations
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, ["navigateToView", "deleteSupplier"]);
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolName::ViewJob, ok);
        registry.register(ToolName::ViewJob, ok);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ToolName::ViewJob));
        assert!(!registry.contains(ToolName::DeleteJob));
    }
}
