//! Thin adapter over the Docker Engine API.
//!
//! Everything Podium knows about the container runtime goes through the
//! [`Runtime`] trait. [`RuntimeClient`] is the Docker Engine implementation;
//! [`MockRuntime`] is an in-memory one for engine tests. The adapter maps
//! "object is gone" responses to `Option`/idempotent results and every other
//! runtime failure to `PodiumError::RuntimeUnavailable`, so the orchestration
//! layer never has to look at transport errors.

pub mod client;
pub mod mock;
pub mod stream;

pub use client::{ExecSession, LogChunkStream, Runtime, RuntimeClient};
pub use mock::MockRuntime;
pub use stream::{collect_chunks, line_events, LineDemux, LogLine, StdStream};
