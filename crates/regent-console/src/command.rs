//! Command handler trait, registration spec, and the environment passed to
//! every handler.

use std::fmt;
use std::sync::Arc;

use regent_types::error::Result;

use crate::console::ConsoleOutput;
use crate::context::ExecutionContext;
use crate::registry::CommandRegistry;

/// Shared environment passed to every handler invocation.
pub struct Environment<'a> {
    /// Context the handler fires against, if the command is scoped and a
    /// context is active.
    pub context: Option<&'a dyn ExecutionContext>,
    /// Where the handler writes its output.
    pub console: &'a dyn ConsoleOutput,
    /// The registry that dispatched the command (for `help`, scripts, ...).
    pub registry: &'a CommandRegistry,
}

/// A callback bound to a command path.
///
/// `tokens` is the full canonical command line: the matched command keys
/// followed by any arguments.
pub trait CommandHandler: Send + Sync {
    fn invoke(&self, env: &Environment<'_>, tokens: &[String]) -> Result<()>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Environment<'_>, &[String]) -> Result<()> + Send + Sync,
{
    fn invoke(&self, env: &Environment<'_>, tokens: &[String]) -> Result<()> {
        self(env, tokens)
    }
}

/// How many times, and against what, a command's handlers fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Fire once, with no context.
    #[default]
    Global,
    /// Fire once per selected context.
    PerContext {
        /// With no context active, fire once without one instead of
        /// refusing with a warning.
        fire_once_without_context: bool,
    },
}

/// Everything about a command except its handler.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub module: String,
    pub path: Vec<String>,
    pub short_help: String,
    pub long_help: String,
    pub descriptive_help: String,
    pub scope: Scope,
}

impl CommandSpec {
    /// Start a spec for `path`, given as space-separated words.
    pub fn new(module: &str, path: &str) -> Self {
        Self {
            module: module.to_string(),
            path: path.split_whitespace().map(str::to_string).collect(),
            short_help: path.trim().to_string(),
            long_help: String::new(),
            descriptive_help: String::new(),
            scope: Scope::Global,
        }
    }

    /// Usage line and one-line description.
    pub fn help(mut self, short_help: &str, long_help: &str) -> Self {
        self.short_help = short_help.to_string();
        self.long_help = long_help.to_string();
        self
    }

    /// Free-form paragraph shown by `help <command>`.
    pub fn descriptive(mut self, text: &str) -> Self {
        self.descriptive_help = text.to_string();
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Shorthand for `Scope::PerContext`.
    pub fn per_context(self, fire_once_without_context: bool) -> Self {
        self.scope(Scope::PerContext {
            fire_once_without_context,
        })
    }
}

/// A registered command: a terminal node of the command tree.
#[derive(Clone)]
pub struct CommandEntry {
    pub spec: CommandSpec,
    pub handlers: Vec<Arc<dyn CommandHandler>>,
}

impl CommandEntry {
    pub fn path_string(&self) -> String {
        self.spec.path.join(" ")
    }

    /// Line used by `help all` and module listings.
    pub fn help_line(&self) -> String {
        if self.spec.long_help.is_empty() {
            self.spec.short_help.clone()
        } else {
            format!("{} - {}", self.spec.short_help, self.spec.long_help)
        }
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("spec", &self.spec)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
