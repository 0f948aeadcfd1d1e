//! The command registry: registration, resolution, dispatch, completion and
//! help over one shared [`CommandTree`].

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regent_types::config::DEFAULT_PROMPT;
use regent_types::error::Result;

use crate::command::{CommandEntry, CommandHandler, CommandSpec, Environment, Scope};
use crate::console::{self, ConsoleOutput};
use crate::context::{ContextProvider, ExecutionContext};
use crate::tokenizer;
use crate::tree::{CommandTree, HelpTarget, Resolution};

/// What happened to a dispatched line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was typed.
    Empty,
    /// The command ran. `failures` counts handlers that returned an error.
    Executed {
        path: String,
        invocations: usize,
        failures: usize,
    },
    /// A per-context command was refused because no context is active.
    NeedsContext { path: String },
    Incomplete {
        matched: Vec<String>,
        options: Vec<String>,
    },
    NoMatch {
        matched: Vec<String>,
        token: String,
    },
    Ambiguous {
        matched: Vec<String>,
        token: String,
        candidates: Vec<String>,
    },
}

/// Commands registered by every module of the host application.
///
/// Registration and lookup may happen from any thread. Handlers run with no
/// registry lock held, so a handler may register commands or dispatch other
/// lines (`command-script`).
pub struct CommandRegistry {
    tree: RwLock<CommandTree>,
    contexts: RwLock<Option<Arc<dyn ContextProvider>>>,
    prompt_label: RwLock<String>,
}

impl CommandRegistry {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            tree: RwLock::new(CommandTree::new(case_sensitive)),
            contexts: RwLock::new(None),
            prompt_label: RwLock::new(DEFAULT_PROMPT.to_string()),
        }
    }

    pub fn with_prompt(self, label: &str) -> Self {
        self.set_prompt_label(label);
        self
    }

    pub fn set_prompt_label(&self, label: &str) {
        *self
            .prompt_label
            .write()
            .unwrap_or_else(PoisonError::into_inner) = label.to_string();
    }

    /// Install the source of execution contexts for scoped commands.
    pub fn set_context_provider(&self, provider: Arc<dyn ContextProvider>) {
        *self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, CommandTree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, CommandTree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn provider(&self) -> Option<Arc<dyn ContextProvider>> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Prompt text, e.g. `Regent (root) # ` with a context provider or
    /// `Regent # ` without one.
    pub fn prompt(&self) -> String {
        let label = self
            .prompt_label
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match self.provider() {
            Some(provider) => format!("{label} ({}) # ", provider.prompt_label()),
            None => format!("{label} # "),
        }
    }

    /// Register a closure for `spec.path`.
    pub fn add_command<F>(&self, spec: CommandSpec, handler: F) -> Result<()>
    where
        F: Fn(&Environment<'_>, &[String]) -> Result<()> + Send + Sync + 'static,
    {
        self.add_handler(spec, Arc::new(handler))
    }

    /// Register a handler for `spec.path`. Registering an existing path adds
    /// another handler to it; all of them fire, in registration order.
    pub fn add_handler(&self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let path = spec.path.join(" ");
        let module = spec.module.clone();
        self.write_tree().insert(spec, handler)?;
        log::debug!("registered '{path}' for module {module}");
        Ok(())
    }

    /// Number of distinct commands.
    pub fn len(&self) -> usize {
        self.read_tree().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_tree().is_empty()
    }

    pub fn case_sensitive(&self) -> bool {
        self.read_tree().case_sensitive()
    }

    pub fn resolve(&self, tokens: &[String]) -> Resolution {
        self.read_tree().resolve(tokens)
    }

    /// Resolve `tokens` and run the command's handlers according to its
    /// scope.
    pub fn dispatch(&self, tokens: &[String], console: &dyn ConsoleOutput) -> DispatchOutcome {
        match self.resolve(tokens) {
            Resolution::Empty => DispatchOutcome::Empty,
            Resolution::Command { entry, tokens } => self.invoke(&entry, &tokens, console),
            Resolution::Incomplete { matched, options } => {
                DispatchOutcome::Incomplete { matched, options }
            },
            Resolution::NoMatch { matched, token } => DispatchOutcome::NoMatch { matched, token },
            Resolution::Ambiguous {
                matched,
                token,
                candidates,
            } => DispatchOutcome::Ambiguous {
                matched,
                token,
                candidates,
            },
        }
    }

    fn invoke(&self, entry: &CommandEntry, tokens: &[String], console: &dyn ConsoleOutput) -> DispatchOutcome {
        let path = entry.path_string();
        let targets: Vec<Option<Arc<dyn ExecutionContext>>> = match entry.spec.scope {
            Scope::Global => vec![None],
            Scope::PerContext {
                fire_once_without_context,
            } => {
                let selected = self.provider().map(|p| p.selected()).unwrap_or_default();
                if !selected.is_empty() {
                    selected.into_iter().map(Some).collect()
                } else if fire_once_without_context {
                    vec![None]
                } else {
                    return DispatchOutcome::NeedsContext { path };
                }
            },
        };

        let mut invocations = 0;
        let mut failures = 0;
        for target in &targets {
            let env = Environment {
                context: target.as_deref(),
                console,
                registry: self,
            };
            for handler in &entry.handlers {
                invocations += 1;
                if let Err(e) = handler.invoke(&env, tokens) {
                    failures += 1;
                    match target {
                        Some(ctx) => log::error!(
                            "[{}] '{path}' failed in context {}: {e}",
                            entry.spec.module,
                            ctx.name()
                        ),
                        None => log::error!("[{}] '{path}' failed: {e}", entry.spec.module),
                    }
                }
            }
        }
        DispatchOutcome::Executed {
            path,
            invocations,
            failures,
        }
    }

    /// Parse, dispatch, and report anything that did not execute.
    pub fn run_line(&self, line: &str, out: &dyn ConsoleOutput) -> DispatchOutcome {
        let tokens = tokenizer::parse(line);
        let outcome = self.dispatch(&tokens, out);
        console::report(&outcome, self, out);
        outcome
    }

    /// Keys that may follow `tokens`; `<cr>` when `tokens` is runnable.
    pub fn find_next_option(&self, tokens: &[String]) -> Vec<String> {
        self.read_tree().find_next_option(tokens)
    }

    /// Completion candidates for a raw, partially typed line.
    pub fn complete(&self, line: &str) -> Vec<String> {
        let tokens = tokenizer::parse(line);
        if tokenizer::ends_with_separator(line) {
            return self.find_next_option(&tokens);
        }
        match tokens.split_last() {
            Some((partial, complete)) => self.read_tree().complete_partial(complete, partial),
            None => self.find_next_option(&tokens),
        }
    }

    /// Sorted names of every module with at least one command.
    pub fn modules(&self) -> Vec<String> {
        let tree = self.read_tree();
        let names: BTreeSet<&str> = tree
            .entries()
            .into_iter()
            .map(|e| e.spec.module.as_str())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Help text for `help <tokens>`.
    pub fn get_help(&self, tokens: &[String]) -> Vec<String> {
        let tree = self.read_tree();

        if tokens.is_empty() {
            let mut out = vec![
                "Usage:".to_string(),
                "  help all         - every command".to_string(),
                "  help <module>    - commands of one module".to_string(),
                "  help <command>   - details of one command".to_string(),
                String::new(),
                "Modules:".to_string(),
            ];
            let modules: BTreeSet<&str> = tree
                .entries()
                .into_iter()
                .map(|e| e.spec.module.as_str())
                .collect();
            out.extend(modules.into_iter().map(|m| format!("  {m}")));
            return out;
        }

        if tokens.len() == 1 && tokens[0].eq_ignore_ascii_case("all") {
            let mut lines: Vec<String> = tree.entries().iter().map(|e| e.help_line()).collect();
            lines.sort();
            return lines;
        }

        if tokens.len() == 1 {
            let mut lines: Vec<String> = tree
                .entries()
                .iter()
                .filter(|e| e.spec.module.eq_ignore_ascii_case(&tokens[0]))
                .map(|e| e.help_line())
                .collect();
            if !lines.is_empty() {
                lines.sort();
                return lines;
            }
        }

        match tree.help_target(tokens) {
            Some(HelpTarget::Command(entry)) => {
                let mut out = vec![format!("Usage: {}", entry.spec.short_help)];
                if !entry.spec.long_help.is_empty() {
                    out.push(entry.spec.long_help.clone());
                }
                if !entry.spec.descriptive_help.is_empty() {
                    out.push(String::new());
                    out.extend(entry.spec.descriptive_help.lines().map(str::to_string));
                }
                out
            },
            Some(HelpTarget::Group(entries)) => entries.iter().map(|e| e.help_line()).collect(),
            None => vec![format!("No help is available for {}", tokens.join(" "))],
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}
