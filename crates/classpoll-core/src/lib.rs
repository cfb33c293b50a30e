//! classpoll-core: domain model for the poll session engine.
//!
//! Pure library shared by the engine and the server: poll/participant/chat
//! types, result aggregation, answer grading, and the command error
//! taxonomy. No async, no I/O.

pub mod error;
pub mod grading;
pub mod results;
pub mod types;

pub use error::CommandError;
pub use results::{PollResult, Tally, TextResponse, compute_results};
