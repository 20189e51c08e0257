//! Astra Sources
//!
//! Adapters translating external providers into provider-agnostic signals:
//! - Have I Been Pwned (breaches, pastes)
//! - RDAP and WhoisJsonApi (registration data)
//! - crt.sh (certificate transparency)
//! - Google Public DNS
//! - AbuseIPDB (reputation)
//! - URLhaus and PhishTank (threat lists)
//! - Extracted image metadata (local, no network)
//!
//! Each adapter splits into a transport step and a pure `decode` step.

pub mod traits;
pub mod config;
pub mod dates;
pub mod hibp;
pub mod rdap;
pub mod whoisjsonapi;
pub mod crtsh;
pub mod dns;
pub mod abuseipdb;
pub mod urlhaus;
pub mod phishtank;
pub mod exif;
pub mod retry;
pub mod registry;

pub use traits::*;
pub use config::*;
pub use hibp::*;
pub use rdap::*;
pub use whoisjsonapi::*;
pub use crtsh::*;
pub use dns::*;
pub use abuseipdb::*;
pub use urlhaus::*;
pub use phishtank::*;
pub use exif::*;
pub use retry::*;
pub use registry::*;
