//! Command console core.
//!
//! Modules register commands as space-separated paths (`show info`,
//! `set log level`) in a shared [`CommandRegistry`]. Typed lines are
//! tokenized, resolved by unambiguous prefix against the command tree, and
//! dispatched to every handler bound to the path. Front-ends (local terminal,
//! remote sessions) implement [`Console`] and drive [`run`].

pub mod builtins;
pub mod command;
pub mod console;
pub mod context;
pub mod history;
pub mod logging;
pub mod registry;
pub mod shutdown;
pub mod tokenizer;
pub mod tree;
pub mod watchdog;

/// Register `help`, `quit`, `show ...` and the other built-in commands.
pub use builtins::{Builtins, ServerInfo, register_builtins};
/// Handler trait, registration spec, and the environment handlers receive.
pub use command::{CommandEntry, CommandHandler, CommandSpec, Environment, Scope};
/// Front-end traits and the read-dispatch loop.
pub use console::{BufferConsole, Console, ConsoleOutput, run};
/// Execution contexts for scoped commands.
pub use context::{ContextProvider, ContextSet, ExecutionContext, NamedContext};
/// Bounded line history.
pub use history::History;
/// Registry of every command with dispatch, completion, and help.
pub use registry::{CommandRegistry, DispatchOutcome};
/// Orderly shutdown signal.
pub use shutdown::Shutdown;
/// Result of resolving tokens against the command tree.
pub use tree::{RUNNABLE_MARKER, Resolution};
/// Tracked background threads.
pub use watchdog::{ThreadInfo, Watchdog, WorkerHandle};
