//! Remote console for Regent.
//!
//! [`RemoteConsole`] is a [`Console`](regent_console::Console) whose input
//! comes from authenticated sessions and whose output lands in a shared
//! numbered scrollback that each session polls. [`RemoteServer`] exposes it
//! over a JSON-lines TCP transport; [`RemoteClient`] is the matching blocking
//! client.

pub mod auth;
pub mod client;
pub mod input_queue;
pub mod protocol;
pub mod remote;
pub mod scrollback;
pub mod server;
pub mod session;

#[cfg(test)]
mod tests;

pub use client::RemoteClient;
pub use input_queue::InputQueue;
pub use protocol::{Request, Response};
pub use remote::{EventBatch, RemoteConsole, SessionStart, spawn_sweeper};
pub use scrollback::{Scrollback, ScrollbackLine};
pub use server::{MAX_LINE_LEN, RemoteServer, ServerStopper, SessionRoutes};
pub use session::{CloseReason, Session, SessionObserver};
