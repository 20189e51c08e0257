//! Astra Core - Domain model for evidence aggregation and risk scoring
//!
//! This crate provides the request-scoped primitives, none of which perform I/O:
//! - Subjects (email, domain, URL, extracted image metadata)
//! - Provider-agnostic signals and per-source outcomes
//! - Evidence merging with explicit source precedence
//! - A deterministic composite risk scorer
//! - The subject report handed back to callers

pub mod subject;
pub mod metadata;
pub mod signals;
pub mod outcome;
pub mod sources;
pub mod evidence;
pub mod scoring;
pub mod report;

pub use subject::*;
pub use metadata::*;
pub use signals::*;
pub use outcome::*;
pub use sources::*;
pub use evidence::*;
pub use scoring::*;
pub use report::*;

/// Confidence assigned to signals from deterministic sources
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Number of hex characters kept from a payload digest
pub const FINGERPRINT_LEN: usize = 16;

/// Highest possible composite score
pub const MAX_SCORE: u8 = 100;
