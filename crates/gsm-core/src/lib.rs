//! Core utilities for the GSM span gateway
//!
//! This crate provides fundamental types and utilities used across the gateway:
//! - SpanId for validated span addressing
//! - Availability bitmask describing modem/link health
//! - Q.850 release cause values
//! - Logging setup and debug macros

pub mod availability;
pub mod cause;
pub mod debug;
pub mod span_id;

// Re-export commonly used items
pub use availability::Availability;
pub use span_id::{MAX_SPANS, SpanId, SpanIdErr};

/// Version string reported by the gateway, including the git revision when available
pub const STACK_VERSION: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"),
    "-",
    git_version::git_version!(fallback = "unknown")
);

/// Channel number within a span. GSM spans normally carry a single bearer channel.
pub type ChannelId = u32;

/// Identifier the protocol engine assigns to a call
pub type CallRef = u32;
