//! Per-span signalling control plane of the GSM gateway
//!
//! - span registry, control block and worker loop
//! - call lifecycle with release cause mapping
//! - request/response correlator for USSD, operator scans and raw commands
//! - SMS segmentation, delivery tracking and spool persistence
//! - alarm handling and the idle channel reset sweep

pub mod alarm;
pub mod call;
pub mod correlator;
pub mod dispatch;
pub mod engines;
pub mod error;
pub mod gateway;
pub mod sms;
pub mod span;

// Re-export commonly used items
pub use dispatch::{Effect, LegAction};
pub use error::GatewayErr;
pub use gateway::Gateway;
pub use span::control::{SpanControl, SpanStatus};
pub use span::span_state::SpanState;
