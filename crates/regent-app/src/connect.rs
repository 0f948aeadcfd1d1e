//! `regent connect <host:port> [user]`: drive a remote console from this
//! terminal.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use regent_local::render;
use regent_remote::{RemoteClient, ScrollbackLine};
use regent_types::error::RegentError;

/// How long each poll waits for output before checking for typed lines.
const POLL_WAIT: Duration = Duration::from_millis(250);

pub fn run(args: &[String]) -> Result<()> {
    let addr = args
        .first()
        .context("usage: regent connect <host:port> [user]")?;
    let user = args
        .get(1)
        .cloned()
        .or_else(|| std::env::var("REGENT_USER").ok())
        .unwrap_or_else(|| "admin".to_string());
    let password = match std::env::var("REGENT_PASSWORD") {
        Ok(p) => p,
        Err(_) => read_password()?,
    };

    let mut client =
        RemoteClient::connect(addr.as_str()).with_context(|| format!("connecting to {addr}"))?;
    client.login(&user, &password).context("login failed")?;
    log::info!("connected to {addr} as {user}");

    let lines = spawn_stdin_reader()?;
    let color = io::stdout().is_terminal();
    loop {
        loop {
            match lines.try_recv() {
                Ok(line) => client.submit(&line)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    client.logout()?;
                    return Ok(());
                },
            }
        }
        match client.poll(POLL_WAIT) {
            Ok(batch) => print_lines(&batch, color)?,
            Err(RegentError::SessionNotFound(_) | RegentError::Closed) => {
                println!("Session ended.");
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Print everything but the synthetic prompt line, which only matters to
/// clients that render their own prompt.
fn print_lines(lines: &[ScrollbackLine], color: bool) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for line in lines.iter().filter(|l| l.number != 0) {
        render::queue_line(&mut out, &line.text, line.level, color)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
