//! Foundation types for the Podium workspace orchestrator.
//!
//! This crate carries the error taxonomy shared by every layer, the verified
//! identity record handed over by the external SSO bridge, and the input
//! validation rules applied before any runtime call is issued.

pub mod error;
pub mod identity;
pub mod validate;

pub use error::{PodiumError, Result};
pub use identity::Identity;
