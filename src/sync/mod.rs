//! Synchronous round engine.
//!
//! Drives lockstep broadcast rounds across a fixed committee sharing a
//! common wall-clock start time and round duration. See [`SyncServer`].

mod error;
mod server;

pub use error::RoundError;
pub use server::{RoundPayload, SyncServer};
