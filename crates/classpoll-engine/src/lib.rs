//! classpoll-engine: the poll session state machine.
//!
//! Owns the single active poll, the connection registry, the chat log,
//! poll history, and session analytics. Every mutating operation returns
//! an explicit list of scoped domain events; the server's gateway is the
//! only component that turns those into outbound frames. The engine is
//! synchronous and single-writer; concurrency discipline lives in the
//! caller.

pub mod clock;
pub mod engine;
pub mod events;
pub mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::PollEngine;
pub use events::{Outbound, RoomEvent, Scope};
pub use registry::ConnectionRegistry;
