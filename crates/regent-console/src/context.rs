//! Execution contexts that scoped commands run against.
//!
//! The objects themselves (scenes, regions, ...) belong to the embedding
//! application; the console only needs a name to show in the prompt and a way
//! for handlers to downcast back to the concrete type.

use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

use regent_types::error::{RegentError, Result};

/// An object a scoped command is invoked against.
pub trait ExecutionContext: Send + Sync {
    /// Name shown in the prompt and used by `change context`.
    fn name(&self) -> &str;

    /// Access to the concrete type for handlers that need it.
    fn as_any(&self) -> &dyn Any;
}

/// Supplies the contexts a scoped command should currently fire against.
pub trait ContextProvider: Send + Sync {
    /// Contexts selected for the next invocation. Empty means none active.
    fn selected(&self) -> Vec<Arc<dyn ExecutionContext>>;

    /// Label for the prompt, e.g. `root` or the selected context's name.
    fn prompt_label(&self) -> String;
}

/// A context that carries nothing but its name.
#[derive(Debug, Clone)]
pub struct NamedContext {
    name: String,
}

impl NamedContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ExecutionContext for NamedContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ContextSetInner {
    contexts: Vec<Arc<dyn ExecutionContext>>,
    /// Index into `contexts`; `None` selects all of them (the root).
    current: Option<usize>,
}

/// Named contexts plus the operator's current selection.
pub struct ContextSet {
    inner: RwLock<ContextSetInner>,
}

impl ContextSet {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ContextSetInner {
                contexts: Vec::new(),
                current: None,
            }),
        }
    }

    /// Add a context. A context with the same name is replaced.
    pub fn add(&self, ctx: Arc<dyn ExecutionContext>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = inner.contexts.iter().position(|c| c.name() == ctx.name()) {
            inner.contexts[pos] = ctx;
        } else {
            inner.contexts.push(ctx);
        }
    }

    /// Remove a context by name. Removing the selected context resets the
    /// selection to the root.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = inner.contexts.iter().position(|c| c.name() == name) else {
            return false;
        };
        inner.contexts.remove(pos);
        inner.current = match inner.current {
            Some(cur) if cur == pos => None,
            Some(cur) if cur > pos => Some(cur - 1),
            other => other,
        };
        true
    }

    /// Select a context by name (case-insensitive), or the root with `None`
    /// or `"root"`.
    pub fn select(&self, name: Option<&str>) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match name {
            None => inner.current = None,
            Some(n) if n.eq_ignore_ascii_case("root") => inner.current = None,
            Some(n) => {
                let pos = inner
                    .contexts
                    .iter()
                    .position(|c| c.name().eq_ignore_ascii_case(n))
                    .ok_or_else(|| RegentError::Command(format!("no such context: {n}")))?;
                inner.current = Some(pos);
            },
        }
        Ok(())
    }

    /// Names of all contexts in insertion order.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.contexts.iter().map(|c| c.name().to_string()).collect()
    }

    /// Name of the selected context, if one is selected.
    pub fn current_name(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .current
            .and_then(|i| inner.contexts.get(i))
            .map(|c| c.name().to_string())
    }
}

impl Default for ContextSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProvider for ContextSet {
    fn selected(&self) -> Vec<Arc<dyn ExecutionContext>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.current.and_then(|i| inner.contexts.get(i)) {
            Some(ctx) => vec![Arc::clone(ctx)],
            None => inner.contexts.clone(),
        }
    }

    fn prompt_label(&self) -> String {
        self.current_name().unwrap_or_else(|| "root".to_string())
    }
}
