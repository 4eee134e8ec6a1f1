//! Per-operation context.
//!
//! Created when an operation starts, threaded through every core call of
//! that operation and dropped at its end. Nothing in here is shared between
//! operations.

use crate::directives::{DirectiveKind, Directives};

#[derive(Debug, Default)]
pub struct OpContext {
    operation: String,
    directives: Directives,
}

impl OpContext {
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            directives: Directives::new(),
        }
    }

    /// Name of the running operation, for logs.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn add_directive(&mut self, kind: DirectiveKind, arg: serde_json::Value) {
        self.directives.add(kind, arg);
    }

    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    pub(crate) fn into_directives(mut self) -> Vec<crate::directives::Directive> {
        self.directives.flush()
    }
}
