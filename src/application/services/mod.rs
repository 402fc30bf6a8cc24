//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem) but are themselves
//! concrete structs, not traits.

mod batch;
mod diagnose;

pub use batch::{BatchService, BatchSummary, CheckOutcome, FitOutcome};
pub use diagnose::DiagnosticService;
