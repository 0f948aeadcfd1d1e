//! Regent console host.
//!
//! `regent [config.toml]` runs the console on this terminal, or as a remote
//! console when `[console] frontend = "remote"`. `regent connect <host:port>`
//! attaches to a remote console. The config path may also come from
//! `REGENT_CONFIG`; with neither, defaults apply.

mod connect;
mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use regent_console::{
    Builtins, CommandRegistry, ConsoleOutput, ServerInfo, Shutdown, Watchdog, logging,
    register_builtins,
};
use regent_local::LocalConsole;
use regent_remote::{RemoteConsole, RemoteServer, spawn_sweeper};
use regent_types::config::{Frontend, RegentConfig};

/// Everything a front-end needs to run the console loop.
struct Host {
    registry: Arc<CommandRegistry>,
    shutdown: Arc<Shutdown>,
    watchdog: Arc<Watchdog>,
}

fn main() -> Result<()> {
    logging::init()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("connect") {
        return connect::run(&args[1..]);
    }

    let config = load_config(args.first().cloned())?;
    log::info!(
        "Starting Regent {} ({:?} console)",
        env!("CARGO_PKG_VERSION"),
        config.console.frontend
    );
    let host = build_host(&config)?;

    match config.console.frontend {
        Frontend::Local => run_local(&host, &config)?,
        Frontend::Remote => run_remote(&host, &config)?,
    }

    host.shutdown.request("console closed");
    host.watchdog.abort_all();
    log::info!(
        "Regent stopped: {}",
        host.shutdown.reason().unwrap_or_default()
    );
    Ok(())
}

fn load_config(arg: Option<String>) -> Result<RegentConfig> {
    let path = arg
        .or_else(|| std::env::var("REGENT_CONFIG").ok())
        .map(PathBuf::from);
    match path {
        Some(path) => RegentConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => {
            log::debug!("no config file given; using defaults");
            Ok(RegentConfig::default())
        },
    }
}

fn build_host(config: &RegentConfig) -> Result<Host> {
    let registry = Arc::new(
        CommandRegistry::new(config.console.case_sensitive).with_prompt(&config.console.prompt),
    );
    let shutdown = Arc::new(Shutdown::new());
    let watchdog = Arc::new(Watchdog::new());
    let contexts = demo::contexts(&config.contexts);

    register_builtins(
        &registry,
        Builtins {
            info: ServerInfo::new("Regent", env!("CARGO_PKG_VERSION")),
            shutdown: Arc::clone(&shutdown),
            watchdog: Arc::clone(&watchdog),
            contexts: contexts.as_ref().map(Arc::clone),
        },
    )?;
    demo::register(&registry, contexts.as_ref())?;
    log::debug!("{} commands registered", registry.len());

    Ok(Host {
        registry,
        shutdown,
        watchdog,
    })
}

fn run_local(host: &Host, config: &RegentConfig) -> Result<()> {
    let console = Arc::new(
        LocalConsole::stdio(Arc::clone(&host.registry), config.console.history_size)
            .context("opening terminal")?,
    );
    logging::attach(Arc::clone(&console) as Arc<dyn ConsoleOutput>);
    regent_console::run(console.as_ref(), &host.registry, &host.shutdown);
    logging::detach();
    Ok(())
}

fn run_remote(host: &Host, config: &RegentConfig) -> Result<()> {
    if !config.remote.is_enabled() {
        bail!("the remote console needs [remote] user and password");
    }
    let console = Arc::new(RemoteConsole::new(&config.remote));
    let mut server = RemoteServer::start(
        &config.remote,
        Arc::clone(&console),
        Arc::clone(&host.watchdog),
    )?;
    spawn_sweeper(Arc::clone(&console), &host.watchdog)?;

    let stopper = server.stopper();
    let hooked = Arc::clone(&console);
    host.shutdown.on_shutdown(move || {
        hooked.shutdown();
        stopper.stop();
    });

    logging::attach(Arc::clone(&console) as Arc<dyn ConsoleOutput>);
    regent_console::run(console.as_ref(), &host.registry, &host.shutdown);
    logging::detach();

    console.shutdown();
    server.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use regent_console::BufferConsole;

    use super::*;

    #[test]
    fn explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "contexts = [\"alpha\"]\n[console]\nprompt = \"Sim\"").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.console.prompt, "Sim");
        assert_eq!(config.contexts, vec!["alpha"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Some("/nonexistent/regent.toml".to_string())).unwrap_err();
        assert!(err.to_string().contains("loading config"));
    }

    #[test]
    fn host_wires_builtins_contexts_and_demo() {
        let config =
            RegentConfig::from_toml_str("contexts = [\"alpha\", \"beta\"]\n[console]\nprompt = \"Sim\"")
                .unwrap();
        let host = build_host(&config).unwrap();
        assert_eq!(host.registry.prompt(), "Sim (root) # ");

        let out = BufferConsole::new();
        host.registry.run_line("change context beta", &out);
        host.registry.run_line("context ping", &out);
        assert!(out.text().ends_with("pong from beta"));
        assert_eq!(host.registry.prompt(), "Sim (beta) # ");

        host.registry.run_line("quit", &out);
        assert!(host.shutdown.is_requested());
    }

    #[test]
    fn remote_frontend_requires_credentials() {
        let config = RegentConfig::from_toml_str("[console]\nfrontend = \"remote\"").unwrap();
        let host = build_host(&config).unwrap();
        assert!(run_remote(&host, &config).is_err());
    }
}
