//! Commands every Regent console offers regardless of the host application.

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regent_types::error::{RegentError, Result};

use crate::command::{CommandSpec, Environment};
use crate::console::ConsoleOutput;
use crate::context::ContextSet;
use crate::logging;
use crate::registry::CommandRegistry;
use crate::shutdown::Shutdown;
use crate::watchdog::Watchdog;

/// Deepest allowed `command-script` nesting.
pub const MAX_SCRIPT_DEPTH: usize = 8;

thread_local! {
    static SCRIPT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Identity of the hosting process, shown by `show info` and `show version`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub started: Instant,
}

impl ServerInfo {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            started: Instant::now(),
        }
    }
}

/// Shared state the built-in commands act on.
pub struct Builtins {
    pub info: ServerInfo,
    pub shutdown: Arc<Shutdown>,
    pub watchdog: Arc<Watchdog>,
    /// Enables `change context` and `show contexts` when present.
    pub contexts: Option<Arc<ContextSet>>,
}

/// Register the built-in commands on `registry`.
pub fn register_builtins(registry: &CommandRegistry, deps: Builtins) -> Result<()> {
    let Builtins {
        info,
        shutdown,
        watchdog,
        contexts,
    } = deps;

    registry.add_command(
        CommandSpec::new("General", "help")
            .help("help [all|<module>|<command>]", "Show help")
            .descriptive("Without arguments lists the modules. 'help all' lists every command."),
        |env, tokens| {
            for line in env.registry.get_help(&tokens[1..]) {
                env.console.print(&line);
            }
            Ok(())
        },
    )?;

    let sd = Arc::clone(&shutdown);
    registry.add_command(
        CommandSpec::new("General", "quit").help("quit", "Quit the application"),
        move |env, _| {
            env.console.print("Bye.");
            sd.request("quit");
            Ok(())
        },
    )?;

    let sd = Arc::clone(&shutdown);
    registry.add_command(
        CommandSpec::new("General", "shutdown").help("shutdown", "Shut the server down"),
        move |env, _| {
            env.console.print("Shutting down...");
            sd.request("shutdown");
            Ok(())
        },
    )?;

    let version_info = info.clone();
    registry.add_command(
        CommandSpec::new("General", "show version").help("show version", "Show the server version"),
        move |env, _| {
            env.console
                .print(&format!("{} {}", version_info.name, version_info.version));
            Ok(())
        },
    )?;

    let uptime_info = info.clone();
    registry.add_command(
        CommandSpec::new("General", "show uptime").help("show uptime", "Show how long the server has run"),
        move |env, _| {
            env.console.print(&format!(
                "Uptime: {}",
                format_uptime(uptime_info.started.elapsed())
            ));
            Ok(())
        },
    )?;

    let dog = Arc::clone(&watchdog);
    registry.add_command(
        CommandSpec::new("General", "show info").help("show info", "Show server information"),
        move |env, _| {
            let out = env.console;
            out.print(&format!("{} {}", info.name, info.version));
            out.print(&format!("Uptime:   {}", format_uptime(info.started.elapsed())));
            out.print(&format!("Commands: {}", env.registry.len()));
            out.print(&format!("Modules:  {}", env.registry.modules().join(", ")));
            out.print(&format!("Threads:  {}", dog.len()));
            Ok(())
        },
    )?;

    let dog = Arc::clone(&watchdog);
    registry.add_command(
        CommandSpec::new("General", "show threads").help("show threads", "List tracked background threads"),
        move |env, _| {
            show_threads(&dog, env.console);
            Ok(())
        },
    )?;

    registry.add_command(
        CommandSpec::new("General", "threads abort")
            .help("threads abort <id>", "Ask a background thread to stop")
            .descriptive("The thread stops the next time it checks for an abort request."),
        move |env, tokens| {
            let arg = tokens
                .get(2)
                .ok_or_else(|| RegentError::Command("usage: threads abort <id>".to_string()))?;
            let id: u64 = arg
                .parse()
                .map_err(|_| RegentError::Command(format!("invalid thread id: {arg}")))?;
            if !watchdog.abort(id) {
                return Err(RegentError::Command(format!("no thread with id {id}")));
            }
            env.console.print(&format!("Abort requested for thread {id}"));
            Ok(())
        },
    )?;

    registry.add_command(
        CommandSpec::new("General", "command-script")
            .help("command-script <path>", "Run commands from a file")
            .descriptive(
                "Each non-blank line not starting with '#', ';' or '//' runs as if typed. \
                 Scripts may call other scripts up to 8 levels deep.",
            ),
        |env, tokens| {
            let path = tokens
                .get(1)
                .ok_or_else(|| RegentError::Command("usage: command-script <path>".to_string()))?;
            run_script(env, Path::new(path))
        },
    )?;

    registry.add_command(
        CommandSpec::new("General", "set log level")
            .help("set log level <level>", "Change the log level")
            .descriptive("Levels: off, error, warn, info, debug, trace."),
        |env, tokens| {
            let name = tokens
                .get(3)
                .ok_or_else(|| RegentError::Command("usage: set log level <level>".to_string()))?;
            let level = logging::parse_level(name)?;
            logging::set_level(level);
            env.console.print(&format!("Log level set to {level}"));
            Ok(())
        },
    )?;

    if let Some(contexts) = contexts {
        register_context_commands(registry, contexts)?;
    }
    Ok(())
}

fn register_context_commands(registry: &CommandRegistry, contexts: Arc<ContextSet>) -> Result<()> {
    let set = Arc::clone(&contexts);
    registry.add_command(
        CommandSpec::new("Contexts", "change context")
            .help("change context <name|root>", "Select the context scoped commands act on"),
        move |env, tokens| {
            let name = tokens
                .get(2)
                .ok_or_else(|| RegentError::Command("usage: change context <name|root>".to_string()))?;
            set.select(Some(name))?;
            let label = set.current_name().unwrap_or_else(|| "root".to_string());
            env.console.print(&format!("Changing context to {label}"));
            Ok(())
        },
    )?;

    registry.add_command(
        CommandSpec::new("Contexts", "show contexts").help("show contexts", "List execution contexts"),
        move |env, _| {
            let current = contexts.current_name();
            let marker = |selected: bool| if selected { "*" } else { " " };
            env.console
                .print(&format!("{} root", marker(current.is_none())));
            for name in contexts.names() {
                let selected = current.as_deref() == Some(name.as_str());
                env.console.print(&format!("{} {name}", marker(selected)));
            }
            Ok(())
        },
    )
}

fn show_threads(watchdog: &Watchdog, out: &dyn ConsoleOutput) {
    let threads = watchdog.list();
    if threads.is_empty() {
        out.print("No tracked threads.");
        return;
    }
    out.print(&format!("{:>4}  {:20} {:>16} {:>10}", "ID", "NAME", "RUNNING", "HEARTBEAT"));
    for t in threads {
        let flag = if t.abort_requested { " (aborting)" } else { "" };
        out.print(&format!(
            "{:>4}  {:20} {:>16} {:>9}s{flag}",
            t.id,
            t.name,
            format_uptime(t.running_for),
            t.since_heartbeat.as_secs()
        ));
    }
}

/// Restores the script depth when a script finishes or fails.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self> {
        let depth = SCRIPT_DEPTH.get();
        if depth >= MAX_SCRIPT_DEPTH {
            return Err(RegentError::Command(format!(
                "command scripts nested deeper than {MAX_SCRIPT_DEPTH} levels"
            )));
        }
        SCRIPT_DEPTH.set(depth + 1);
        Ok(Self)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        SCRIPT_DEPTH.set(SCRIPT_DEPTH.get().saturating_sub(1));
    }
}

fn is_script_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';') || line.starts_with("//")
}

fn run_script(env: &Environment<'_>, path: &Path) -> Result<()> {
    let _depth = DepthGuard::enter()?;
    let text = std::fs::read_to_string(path).map_err(|e| {
        RegentError::Command(format!("cannot read script {}: {e}", path.display()))
    })?;
    log::info!("running command script {}", path.display());
    for line in text.lines().map(str::trim) {
        if line.is_empty() || is_script_comment(line) {
            continue;
        }
        log::debug!("script: {line}");
        env.registry.run_line(line, env.console);
    }
    Ok(())
}

/// `3d 04:05:06` style uptime.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{mins:02}:{secs:02}")
    } else {
        format!("{hours:02}:{mins:02}:{secs:02}")
    }
}
