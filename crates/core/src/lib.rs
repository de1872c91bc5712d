//! `solburn-core`: domain primitives for the asset transfer queue.
//!
//! This crate contains **pure domain** types (no runtime or I/O concerns).

pub mod address;
pub mod error;
pub mod id;

pub use address::Address;
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, JobId};
