//! End-to-end tests over real sockets.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use regent_console::{Builtins, CommandRegistry, Shutdown, ServerInfo, Watchdog, register_builtins, run};
use regent_types::config::RemoteConfig;
use regent_types::error::RegentError;

use super::*;

fn config() -> RemoteConfig {
    RemoteConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        user: "admin".to_string(),
        password: "secret".to_string(),
        echo_to_stdout: false,
        max_long_poll_ms: 5_000,
        ..RemoteConfig::default()
    }
}

/// Remote console with the built-in commands, a running console loop, and a
/// server on a free port.
struct Harness {
    console: Arc<RemoteConsole>,
    shutdown: Arc<Shutdown>,
    watchdog: Arc<Watchdog>,
    server: RemoteServer,
    loop_thread: Option<JoinHandle<()>>,
}

impl Harness {
    fn start(config: RemoteConfig) -> Self {
        let console = Arc::new(RemoteConsole::new(&config));
        let watchdog = Arc::new(Watchdog::new());
        let shutdown = Arc::new(Shutdown::new());
        let registry = Arc::new(CommandRegistry::default());
        register_builtins(
            &registry,
            Builtins {
                info: ServerInfo::new("regent-test", "0.0.1"),
                shutdown: Arc::clone(&shutdown),
                watchdog: Arc::clone(&watchdog),
                contexts: None,
            },
        )
        .unwrap();

        let server =
            RemoteServer::start(&config, Arc::clone(&console), Arc::clone(&watchdog)).unwrap();
        let loop_thread = {
            let console = Arc::clone(&console);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || run(console.as_ref(), &registry, &shutdown))
        };
        Self {
            console,
            shutdown,
            watchdog,
            server,
            loop_thread: Some(loop_thread),
        }
    }

    fn client(&self) -> RemoteClient {
        RemoteClient::connect(self.server.local_addr()).unwrap()
    }

    fn join_loop(&mut self) {
        if let Some(handle) = self.loop_thread.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.console.shutdown();
        self.server.stop();
        self.join_loop();
    }
}

/// Poll until a line containing `needle` arrives, returning everything seen.
fn poll_until(client: &mut RemoteClient, needle: &str) -> Vec<ScrollbackLine> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        seen.extend(client.poll(Duration::from_millis(500)).unwrap());
        if seen.iter().any(|l| l.text.contains(needle)) {
            return seen;
        }
    }
    panic!("never saw '{needle}' in {seen:?}");
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[test]
fn first_poll_carries_the_prompt() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    let session = client.login("admin", "secret").unwrap();
    assert!(!session.is_empty());
    assert_eq!(client.prompt(), "Regent # ");

    let lines = client.poll(Duration::ZERO).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].number, 0);
    assert_eq!(lines[0].text, "Regent # ");
}

#[test]
fn command_output_is_delivered_once() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    client.login("admin", "secret").unwrap();
    client.poll(Duration::ZERO).unwrap();

    client.submit("show info").unwrap();
    let lines = poll_until(&mut client, "Threads:");
    assert!(lines[0].text.ends_with("show info"));
    assert!(lines.iter().any(|l| l.text == "regent-test 0.0.1"));
    assert!(lines.windows(2).all(|w| w[0].number < w[1].number));

    assert!(client.poll(Duration::ZERO).unwrap().is_empty());
}

#[test]
fn prefix_command_runs_over_the_wire() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    client.login("admin", "secret").unwrap();
    client.submit("show vers").unwrap();
    poll_until(&mut client, "regent-test 0.0.1");
}

#[test]
fn bad_password_then_rate_limited() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    for _ in 0..3 {
        assert!(matches!(
            client.login("admin", "guess"),
            Err(RegentError::Unauthorized)
        ));
    }
    assert!(matches!(
        client.login("admin", "secret"),
        Err(RegentError::RateLimited)
    ));
    assert_eq!(harness.console.session_count(), 0);
}

#[test]
fn session_limit_is_reported() {
    let harness = Harness::start(RemoteConfig {
        max_sessions: 1,
        ..config()
    });
    let mut first = harness.client();
    first.login("admin", "secret").unwrap();
    let mut second = harness.client();
    match second.login("admin", "secret") {
        Err(RegentError::Protocol(msg)) => assert!(msg.starts_with("session_limit")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_session_is_not_found() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    let response = client
        .request(&Request::SubmitCommand {
            session: "not-a-session".to_string(),
            command: "quit".to_string(),
        })
        .unwrap();
    match response {
        Response::Error { code, .. } => assert_eq!(code, "not_found"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!harness.shutdown.is_requested());
}

#[test]
fn expired_session_is_gone() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    let session = client.login("admin", "secret").unwrap();
    assert_eq!(harness.server.routes().len(), 1);

    let later = Instant::now() + Duration::from_secs(301);
    assert_eq!(harness.console.sweep_expired_at(later), vec![session]);
    assert!(harness.server.routes().is_empty());
    assert!(matches!(
        client.poll(Duration::ZERO),
        Err(RegentError::SessionNotFound(_))
    ));
}

#[test]
fn logout_then_poll_fails() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    let session = client.login("admin", "secret").unwrap();
    client.logout().unwrap();
    assert_eq!(harness.console.session_count(), 0);
    let response = client
        .request(&Request::PollEvents {
            session,
            wait_ms: 0,
        })
        .unwrap();
    assert!(matches!(response, Response::Error { code, .. } if code == "not_found"));
}

#[test]
fn quit_ends_the_console_loop() {
    let mut harness = Harness::start(config());
    let mut client = harness.client();
    client.login("admin", "secret").unwrap();
    client.submit("quit").unwrap();
    harness.join_loop();
    assert!(harness.shutdown.is_requested());
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[test]
fn disabled_console_does_not_listen() {
    let config = RemoteConfig {
        password: String::new(),
        ..config()
    };
    let console = Arc::new(RemoteConsole::new(&config));
    let result = RemoteServer::start(&config, console, Arc::new(Watchdog::new()));
    assert!(matches!(result, Err(RegentError::RemoteDisabled(_))));
}

#[test]
fn malformed_request_keeps_connection() {
    let harness = Harness::start(config());
    let mut stream = TcpStream::connect(harness.server.local_addr()).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    stream.write_all(b"{\"op\":\"reboot\"}\n").unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let response: Response = serde_json::from_str(line.trim_end()).unwrap();
    assert!(matches!(response, Response::Error { code, .. } if code == "bad_request"));

    stream
        .write_all(b"{\"op\":\"start_session\",\"user\":\"admin\",\"password\":\"secret\"}\n")
        .unwrap();
    line.clear();
    reader.read_line(&mut line).unwrap();
    let response: Response = serde_json::from_str(line.trim_end()).unwrap();
    assert!(matches!(response, Response::Session { .. }));
}

#[test]
fn oversized_line_is_rejected() {
    let harness = Harness::start(config());
    let mut stream = TcpStream::connect(harness.server.local_addr()).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    stream.write_all(&vec![b'a'; MAX_LINE_LEN + 1]).unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let response: Response = serde_json::from_str(line.trim_end()).unwrap();
    assert!(matches!(response, Response::Error { code, .. } if code == "line_too_long"));

    line.clear();
    assert_eq!(reader.read_line(&mut line).unwrap(), 0);
}

#[test]
fn extra_connections_are_busy() {
    let harness = Harness::start(RemoteConfig {
        max_connections: 1,
        ..config()
    });
    let mut first = harness.client();
    first.login("admin", "secret").unwrap();
    assert_eq!(harness.server.connection_count(), 1);

    let mut second = harness.client();
    match second.read_response().unwrap() {
        Response::Error { code, .. } => assert_eq!(code, "busy"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn aborted_connection_thread_closes_the_socket() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    client.login("admin", "secret").unwrap();

    let conn = harness
        .watchdog
        .list()
        .into_iter()
        .find(|t| t.name.starts_with("remote-conn-"))
        .unwrap();
    assert!(harness.watchdog.abort(conn.id));
    assert!(matches!(client.read_response(), Err(RegentError::Closed)));

    let deadline = Instant::now() + Duration::from_secs(5);
    while harness.server.connection_count() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(harness.server.connection_count(), 0);
}

#[test]
fn idle_connection_is_closed() {
    let harness = Harness::start(RemoteConfig {
        connection_timeout_secs: 1,
        ..config()
    });
    let mut client = harness.client();
    client.login("admin", "secret").unwrap();
    let started = Instant::now();
    assert!(matches!(client.read_response(), Err(RegentError::Closed)));
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[test]
fn long_poll_wakes_on_output() {
    let harness = Harness::start(config());
    let mut client = harness.client();
    client.login("admin", "secret").unwrap();
    client.poll(Duration::ZERO).unwrap();

    let console = Arc::clone(&harness.console);
    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        regent_console::ConsoleOutput::warn(console.as_ref(), "disk almost full");
    });
    let started = Instant::now();
    let lines = client.poll(Duration::from_secs(5)).unwrap();
    writer.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "disk almost full");
}
