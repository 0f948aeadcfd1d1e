//! Sample commands that exercise scoping and arguments.

use std::sync::Arc;

use regent_console::{CommandRegistry, CommandSpec, ContextProvider, ContextSet, NamedContext};
use regent_types::error::{RegentError, Result};

/// Build the context set named in the config file. `None` when the list is
/// empty.
pub fn contexts(names: &[String]) -> Option<Arc<ContextSet>> {
    if names.is_empty() {
        return None;
    }
    let set = Arc::new(ContextSet::new());
    for name in names {
        set.add(Arc::new(NamedContext::new(name.as_str())));
    }
    Some(set)
}

/// Register the demo module. `contexts` enables the scoped commands.
pub fn register(registry: &CommandRegistry, contexts: Option<&Arc<ContextSet>>) -> Result<()> {
    registry.add_command(
        CommandSpec::new("Demo", "echo")
            .help("echo <text>", "Print the arguments back")
            .descriptive("Arguments are printed joined by single spaces. Quote to keep spacing."),
        |env, tokens| {
            env.console.print(&tokens[1..].join(" "));
            Ok(())
        },
    )?;

    registry.add_command(
        CommandSpec::new("Demo", "fail").help("fail", "Run a handler that always errors"),
        |_, _| Err(RegentError::Command("deliberate failure".to_string())),
    )?;

    let Some(set) = contexts else {
        return Ok(());
    };
    registry.set_context_provider(Arc::clone(set) as Arc<dyn ContextProvider>);

    registry.add_command(
        CommandSpec::new("Demo", "context ping")
            .help("context ping", "Answer once from every selected context")
            .per_context(false),
        |env, _| {
            if let Some(ctx) = env.context {
                env.console.print(&format!("pong from {}", ctx.name()));
            }
            Ok(())
        },
    )?;

    registry.add_command(
        CommandSpec::new("Demo", "context where")
            .help("context where", "Print the name of each selected context")
            .per_context(true),
        |env, _| {
            let name = env.context.map_or("root", |c| c.name());
            env.console.print(name);
            Ok(())
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use regent_console::{BufferConsole, DispatchOutcome};

    use super::*;

    fn setup(names: &[&str]) -> (CommandRegistry, Option<Arc<ContextSet>>) {
        let registry = CommandRegistry::default();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let set = contexts(&names);
        register(&registry, set.as_ref()).unwrap();
        (registry, set)
    }

    #[test]
    fn echo_joins_arguments() {
        let (registry, _) = setup(&[]);
        let out = BufferConsole::new();
        registry.run_line(r#"echo "a  b" c"#, &out);
        assert_eq!(out.text(), "a  b c");
    }

    #[test]
    fn failure_is_counted_not_printed() {
        let (registry, _) = setup(&[]);
        let out = BufferConsole::new();
        match registry.run_line("fail", &out) {
            DispatchOutcome::Executed { failures, .. } => assert_eq!(failures, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_contexts_means_no_scoped_commands() {
        let (registry, set) = setup(&[]);
        assert!(set.is_none());
        assert!(!registry.modules().is_empty());
        let out = BufferConsole::new();
        registry.run_line("context ping", &out);
        assert_eq!(out.text(), "Sorry.. missed that.");
    }

    #[test]
    fn ping_fires_per_context() {
        let (registry, set) = setup(&["alpha", "beta"]);
        let out = BufferConsole::new();
        registry.run_line("context ping", &out);
        assert_eq!(out.text(), "pong from alpha\npong from beta");

        set.unwrap().select(Some("beta")).unwrap();
        out.clear();
        registry.run_line("context ping", &out);
        assert_eq!(out.text(), "pong from beta");
        assert_eq!(registry.prompt(), "Regent (beta) # ");
    }

    #[test]
    fn where_names_the_selection() {
        let (registry, set) = setup(&["alpha"]);
        let set = set.unwrap();
        set.select(Some("alpha")).unwrap();
        let out = BufferConsole::new();
        registry.run_line("context where", &out);
        assert_eq!(out.text(), "alpha");
    }
}
