use core::fmt;

use gsm_core::{SpanId, SpanIdErr};

use crate::correlator::CorrelatorErr;

/// Errors returned by the framework-facing gateway entry points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayErr {
    InvalidSpan(u32),
    SpanNotConfigured(SpanId),
    /// Span exists but its worker is not running
    SpanNotStarted(SpanId),
    SpanDown(SpanId),
    SpanResetting(SpanId),
    CallInProgress(SpanId),
    NoCall(SpanId),
    /// A request of the same kind is already outstanding on this span
    Busy,
    Timeout,
    Failed(String),
    WorkerGone,
    Io(String),
}

impl fmt::Display for GatewayErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErr::InvalidSpan(n) => write!(f, "invalid span number {}", n),
            GatewayErr::SpanNotConfigured(s) => write!(f, "span {} is not configured", s),
            GatewayErr::SpanNotStarted(s) => write!(f, "span {} is not running", s),
            GatewayErr::SpanDown(s) => write!(f, "span {} is down", s),
            GatewayErr::SpanResetting(s) => write!(f, "span {} is resetting", s),
            GatewayErr::CallInProgress(s) => write!(f, "span {} already has a call", s),
            GatewayErr::NoCall(s) => write!(f, "span {} has no call", s),
            GatewayErr::Busy => write!(f, "request already in progress"),
            GatewayErr::Timeout => write!(f, "request timed out"),
            GatewayErr::Failed(reason) => write!(f, "request failed: {}", reason),
            GatewayErr::WorkerGone => write!(f, "span worker is gone"),
            GatewayErr::Io(reason) => write!(f, "i/o error: {}", reason),
        }
    }
}

impl std::error::Error for GatewayErr {}

impl From<SpanIdErr> for GatewayErr {
    fn from(e: SpanIdErr) -> Self {
        match e {
            SpanIdErr::OutOfRange { found } => GatewayErr::InvalidSpan(found),
        }
    }
}

impl From<CorrelatorErr> for GatewayErr {
    fn from(e: CorrelatorErr) -> Self {
        match e {
            CorrelatorErr::Busy => GatewayErr::Busy,
            CorrelatorErr::Timeout => GatewayErr::Timeout,
            CorrelatorErr::Failed(reason) => GatewayErr::Failed(reason),
            CorrelatorErr::WorkerGone => GatewayErr::WorkerGone,
        }
    }
}
