//! TCP transport for the remote console.
//!
//! A background thread accepts connections; each connection gets its own
//! thread that reads JSON-lines requests and answers them against the shared
//! [`RemoteConsole`].

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown as NetShutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use regent_console::{Watchdog, WorkerHandle};
use regent_types::config::RemoteConfig;
use regent_types::error::{RegentError, Result};

use crate::protocol::{Request, Response};
use crate::remote::RemoteConsole;
use crate::session::{CloseReason, SessionObserver};

/// Maximum bytes in a single request line.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Sleep between accept attempts when nothing is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Socket read timeout on connections; abort requests and the idle limit are
/// checked this often.
const READ_TICK: Duration = Duration::from_millis(100);

type Connections = Arc<Mutex<HashMap<u64, TcpStream>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remembers which connection opened each session.
#[derive(Default)]
pub struct SessionRoutes {
    routes: Mutex<HashMap<String, u64>>,
}

impl SessionRoutes {
    fn register(&self, session: &str, connection: u64) {
        lock(&self.routes).insert(session.to_string(), connection);
    }

    pub fn len(&self) -> usize {
        lock(&self.routes).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.routes).is_empty()
    }
}

impl SessionObserver for SessionRoutes {
    fn session_closed(&self, id: &str, reason: CloseReason) {
        if let Some(connection) = lock(&self.routes).remove(id) {
            log::debug!("session {id} from connection {connection} {reason}");
        }
    }
}

/// Running transport. Dropping it stops the accept loop.
pub struct RemoteServer {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    connections: Connections,
    routes: Arc<SessionRoutes>,
    accept_thread: Option<JoinHandle<()>>,
}

impl RemoteServer {
    /// Bind the configured address and start accepting.
    pub fn start(
        config: &RemoteConfig,
        console: Arc<RemoteConsole>,
        watchdog: Arc<Watchdog>,
    ) -> Result<Self> {
        if !console.is_enabled() {
            return Err(RegentError::RemoteDisabled(
                "no remote credentials configured".to_string(),
            ));
        }
        let listener = TcpListener::bind((config.bind.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let routes = Arc::new(SessionRoutes::default());
        console.add_observer(Arc::clone(&routes) as Arc<dyn SessionObserver>);

        let stop = Arc::new(AtomicBool::new(false));
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let acceptor = Acceptor {
            listener,
            console,
            routes: Arc::clone(&routes),
            connections: Arc::clone(&connections),
            stop: Arc::clone(&stop),
            watchdog: Arc::clone(&watchdog),
            max_connections: config.max_connections.max(1),
            read_timeout: match config.connection_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        };
        let accept_thread = watchdog.spawn("remote-accept", move |worker| {
            acceptor.run(|| worker.should_stop());
        })?;

        log::info!("remote console listening on {local_addr}");
        Ok(Self {
            local_addr,
            stop,
            connections,
            routes,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently being served.
    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn routes(&self) -> &SessionRoutes {
        &self.routes
    }

    /// A handle that stops the server from another thread, for shutdown
    /// hooks.
    pub fn stopper(&self) -> ServerStopper {
        ServerStopper {
            stop: Arc::clone(&self.stop),
            connections: Arc::clone(&self.connections),
        }
    }

    /// Stop accepting, drop open connections, and wait for the accept thread.
    pub fn stop(&mut self) {
        self.stopper().stop();
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RemoteServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable stop switch for a [`RemoteServer`].
#[derive(Clone)]
pub struct ServerStopper {
    stop: Arc<AtomicBool>,
    connections: Connections,
}

impl ServerStopper {
    pub fn stop(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        for stream in lock(&self.connections).values() {
            let _ = stream.shutdown(NetShutdown::Both);
        }
        log::info!("remote console transport stopped");
    }
}

struct Acceptor {
    listener: TcpListener,
    console: Arc<RemoteConsole>,
    routes: Arc<SessionRoutes>,
    connections: Connections,
    stop: Arc<AtomicBool>,
    watchdog: Arc<Watchdog>,
    max_connections: usize,
    read_timeout: Option<Duration>,
}

impl Acceptor {
    fn run(&self, aborted: impl Fn() -> bool) {
        let mut next_id = 0u64;
        while !self.stop.load(Ordering::SeqCst) && !aborted() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    next_id += 1;
                    self.admit(next_id, stream, peer);
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                },
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    std::thread::sleep(ACCEPT_POLL);
                },
            }
        }
        log::debug!("accept loop stopped");
    }

    fn admit(&self, id: u64, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = self.try_admit(id, stream, peer) {
            log::warn!("connection {id} from {peer} not served: {e}");
            lock(&self.connections).remove(&id);
        }
    }

    fn try_admit(&self, id: u64, mut stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        if lock(&self.connections).len() >= self.max_connections {
            log::warn!("refusing connection from {peer}: too many connections");
            write_response(
                &mut stream,
                &Response::error("busy", "too many connections"),
            )?;
            return Ok(());
        }
        stream.set_read_timeout(Some(READ_TICK))?;
        lock(&self.connections).insert(id, stream.try_clone()?);
        log::info!("remote connection {id} from {peer}");

        let connection = Connection {
            id,
            stream,
            idle_limit: self.read_timeout,
            console: Arc::clone(&self.console),
            routes: Arc::clone(&self.routes),
            connections: Arc::clone(&self.connections),
        };
        self.watchdog
            .spawn(&format!("remote-conn-{id}"), move |worker| {
                connection.serve(&worker);
            })?;
        Ok(())
    }
}

struct Connection {
    id: u64,
    stream: TcpStream,
    /// Close after this long without a complete request.
    idle_limit: Option<Duration>,
    console: Arc<RemoteConsole>,
    routes: Arc<SessionRoutes>,
    connections: Connections,
}

impl Connection {
    fn serve(mut self, worker: &WorkerHandle) {
        match self.serve_lines(worker) {
            Ok(()) => log::info!("remote connection {} closed", self.id),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                log::info!("remote connection {} idle, closing", self.id);
            },
            Err(e) => log::warn!("remote connection {} failed: {e}", self.id),
        }
        let _ = self.stream.shutdown(NetShutdown::Both);
        lock(&self.connections).remove(&self.id);
    }

    fn serve_lines(&mut self, worker: &WorkerHandle) -> io::Result<()> {
        let mut reader = BufReader::new(self.stream.try_clone()?);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.read_request(&mut reader, &mut buf, worker)? == 0 {
                return Ok(());
            }
            worker.heartbeat();
            if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_LEN {
                write_response(
                    &mut self.stream,
                    &Response::error("line_too_long", format!("limit is {MAX_LINE_LEN} bytes")),
                )?;
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(line) {
                Ok(request) => self.handle(request),
                Err(e) => Response::from_error(&RegentError::from(e)),
            };
            write_response(&mut self.stream, &response)?;
        }
    }

    /// Read one request line into `buf`, waking every [`READ_TICK`] to
    /// honor aborts. Returns 0 at end of stream or on abort.
    fn read_request(
        &self,
        reader: &mut BufReader<TcpStream>,
        buf: &mut Vec<u8>,
        worker: &WorkerHandle,
    ) -> io::Result<usize> {
        let mut idle = Duration::ZERO;
        loop {
            if worker.should_stop() {
                log::info!("remote connection {} aborted", self.id);
                return Ok(0);
            }
            // Partial reads from earlier ticks stay in `buf`.
            let limit = (MAX_LINE_LEN + 1).saturating_sub(buf.len()) as u64;
            match (&mut *reader).take(limit).read_until(b'\n', buf) {
                Ok(0) => return Ok(0),
                Ok(_) => return Ok(buf.len()),
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    idle += READ_TICK;
                    if self.idle_limit.is_some_and(|limit| idle >= limit) {
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::StartSession { user, password } => {
                self.console.start_session(&user, &password).map(|start| {
                    self.routes.register(&start.session_id, self.id);
                    Response::from(start)
                })
            },
            Request::CloseSession { session } => {
                self.console.close_session(&session);
                Ok(Response::Ok)
            },
            Request::SubmitCommand { session, command } => self
                .console
                .submit_command(&session, &command)
                .map(|()| Response::Ok),
            Request::PollEvents { session, wait_ms: 0 } => {
                self.console.poll_events(&session).map(Response::from)
            },
            Request::PollEvents { session, wait_ms } => self
                .console
                .wait_for_events(&session, Duration::from_millis(wait_ms))
                .map(Response::from),
        };
        result.unwrap_or_else(|e| Response::from_error(&e))
    }
}

fn write_response(stream: &mut TcpStream, response: &Response) -> io::Result<()> {
    let mut line = serde_json::to_vec(response).map_err(io::Error::other)?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()
}
