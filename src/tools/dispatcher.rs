//! Sequential tool dispatch
//!
//! Calls run strictly one after another in the order the backend issued them. A failing
//! or panicking capability only affects its own result line.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::catalogue::{ToolAction, ToolName};
use super::registry::ToolRegistry;

/// A function call issued by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned call id (may be empty)
    #[serde(default)]
    pub id: String,

    /// Tool name as sent by the backend
    pub name: String,

    /// Named arguments
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    /// Create a call with the given arguments
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Why a call produced no outcome
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolFailure {
    /// Name is outside the catalogue or has no registered capability
    #[error("Unhandled tool: {name}")]
    Unhandled { name: String },

    /// Arguments failed validation
    #[error("Error executing tool '{name}'. Invalid arguments: {message}")]
    InvalidArguments { name: String, message: String },

    /// The capability returned an error or panicked
    #[error("Error executing tool '{name}'. {message}")]
    Failed { name: String, message: String },
}

/// Outcome of one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub output: Result<String, ToolFailure>,
}

impl ToolResult {
    /// Feedback line for this call, newlines collapsed so each call is exactly one line
    ///
    /// A blank success becomes `<name>: done` so the line is never empty.
    #[must_use]
    pub fn feedback_line(&self) -> String {
        let text = match &self.output {
            Ok(text) => text.clone(),
            Err(failure) => failure.to_string(),
        };
        let line = text
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if line.is_empty() {
            format!("{}: done", self.name)
        } else {
            line
        }
    }

    /// Whether the capability reported success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.output.is_ok()
    }
}

/// Results of dispatching one response's calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub results: Vec<ToolResult>,
}

impl DispatchReport {
    /// One line per call, in call order
    #[must_use]
    pub fn feedback(&self) -> String {
        self.results
            .iter()
            .map(ToolResult::feedback_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether any call was dispatched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Executes backend tool calls against a [`ToolRegistry`]
#[derive(Debug, Clone, Default)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    /// Create a dispatcher over the injected registry
    #[must_use]
    pub const fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Registry backing this dispatcher
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call in order, awaiting each before starting the next
    pub async fn dispatch(&self, calls: &[ToolCall]) -> DispatchReport {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let output = self.run(call).await;
            match &output {
                Ok(_) => tracing::debug!(tool = %call.name, id = %call.id, "tool call complete"),
                Err(failure) => {
                    tracing::warn!(tool = %call.name, id = %call.id, error = %failure, "tool call failed");
                }
            }
            results.push(ToolResult {
                id: call.id.clone(),
                name: call.name.clone(),
                output,
            });
        }
        DispatchReport { results }
    }

    async fn run(&self, call: &ToolCall) -> Result<String, ToolFailure> {
        let unhandled = || ToolFailure::Unhandled {
            name: call.name.clone(),
        };

        let name: ToolName = call.name.parse().map_err(|_| unhandled())?;
        let handler = self.registry.get(name).ok_or_else(unhandled)?;

        let action = ToolAction::parse(name, call.args.clone()).map_err(|e| {
            ToolFailure::InvalidArguments {
                name: call.name.clone(),
                message: e.to_string(),
            }
        })?;

        // Call inside the guard so a panic before the future exists is caught too
        let guarded = future::lazy(move |_| handler.call(action)).flatten();
        match AssertUnwindSafe(guarded).catch_unwind().await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ToolFailure::Failed {
                name: call.name.clone(),
                message: e.to_string(),
            }),
            Err(panic) => Err(ToolFailure::Failed {
                name: call.name.clone(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "capability panicked".to_string())
}
