//! Infrastructure layer: the transfer queue, the transfer executor and the
//! external service adapters it drives.

pub mod indexer;
pub mod queue;
pub mod transfer;
