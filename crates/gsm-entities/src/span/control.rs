use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use gsm_config::{CfgLoopPolicy, CfgSpan};
use gsm_core::{Availability, SpanId};
use gsm_saps::{CallLeg, LegState};

use super::span_state::SpanState;
use crate::correlator::Correlators;

/// Snapshot of a span as reported to the framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanStatus {
    pub span: SpanId,
    pub availability: Availability,
    pub description: String,
    pub resetting: bool,
    pub call_active: bool,
    pub module_alive: bool,
    pub rssi: Option<u8>,
}

/// Span control block: state behind the span lock, plus the correlator slots which
/// have their own locks and are never taken while holding the span lock.
pub struct SpanControl {
    pub span: SpanId,
    state: Mutex<SpanState>,
    pub correlators: Correlators,
    enabled: AtomicBool,
}

impl SpanControl {
    pub fn new(cfg: CfgSpan, policy: CfgLoopPolicy) -> Arc<Self> {
        Arc::new(Self {
            span: cfg.span,
            state: Mutex::new(SpanState::new(cfg, policy, Instant::now())),
            correlators: Correlators::new(),
            enabled: AtomicBool::new(true),
        })
    }

    /// Takes the span lock. A panicking holder leaves the state usable, so poison is ignored.
    pub fn lock(&self) -> MutexGuard<'_, SpanState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Makes the span worker leave its loop after the current iteration
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Runs `f` with both the span lock and the leg lock held.
    ///
    /// The leg lock is only ever tried after the span lock. If the framework holds the
    /// leg, the span lock is released and the whole acquisition retried, so a framework
    /// thread waiting for the span lock while holding its leg can make progress.
    pub fn with_leg<R>(&self, leg: &CallLeg, mut f: impl FnMut(&mut SpanState, &mut LegState) -> R) -> R {
        let mut attempts: u32 = 0;
        loop {
            let mut state = self.lock();
            if let Some(mut leg_state) = leg.try_lock() {
                return f(&mut state, &mut leg_state);
            }
            drop(state);
            attempts += 1;
            if attempts % 10_000 == 0 {
                tracing::warn!(span = self.span.number(), "leg {} still locked after {} attempts", leg.id, attempts);
            }
            std::thread::yield_now();
        }
    }

    pub fn status(&self) -> SpanStatus {
        let state = self.lock();
        SpanStatus {
            span: self.span,
            availability: state.availability,
            description: state.availability.describe(),
            resetting: state.resetting,
            call_active: state.call.is_some(),
            module_alive: state.module_alive,
            rssi: state.rssi,
        }
    }
}
