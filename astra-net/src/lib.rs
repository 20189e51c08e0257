//! Astra Net
//!
//! Thin HTTP layer shared by the source adapters:
//! - Client construction (timeout, optional proxy, user agent)
//! - Response and transport classification into failure kinds
//! - Body fetching and typed JSON decoding

pub mod client;
pub mod classify;

pub use client::*;
pub use classify::*;
