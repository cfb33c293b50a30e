//! WebSocket server for the classroom polling engine.
//!
//! The `gateway` task owns the [`classpoll_engine::PollEngine`] and is
//! the only writer; `ws_server` accepts clients and forwards their
//! JSON-RPC requests into the gateway's command queue. Engine events
//! fan out to clients over a broadcast channel, each carrying a scope
//! so directed frames reach exactly one connection.

pub mod gateway;
pub mod protocol;
pub mod timer;
pub mod ws_server;

pub use gateway::{Command, Gateway, Push, QueryKind};
pub use ws_server::WsServer;
