//! Astra Runtime
//!
//! Runs one investigation end to end:
//! Dispatch → Collect → Merge → Score → Assemble
//!
//! - The orchestrator fans out to every applicable adapter at once
//! - Each adapter races its own timeout; the request races an overall deadline
//! - Whatever arrived by the deadline is merged and scored
//! - Scan history is a caller-owned, bounded log

pub mod config;
pub mod orchestrator;
pub mod engine;
pub mod scan_log;

pub use config::*;
pub use orchestrator::*;
pub use engine::*;
pub use scan_log::*;
