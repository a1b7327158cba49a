//! Synchronous request/response over the asynchronous event stream.
//!
//! Each span has three slots (USSD, operator list, raw command). A slot admits one
//! in-flight request: a second caller gets `Busy` immediately. The caller hands its
//! command to the span worker, which submits it and binds the engine transaction id
//! to the request generation. Result events complete the request only if their
//! transaction id matches the bound one, so late answers to abandoned requests are
//! dropped instead of leaking into the next request on the slot.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use gsm_saps::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Ussd,
    OperatorList,
    RawCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelatorErr {
    /// Another request is outstanding on this slot
    Busy,
    /// No answer before the deadline
    Timeout,
    /// The modem answered with an error
    Failed(String),
    /// The span worker could not take the request
    WorkerGone,
}

impl fmt::Display for CorrelatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelatorErr::Busy => write!(f, "request already in progress"),
            CorrelatorErr::Timeout => write!(f, "timed out"),
            CorrelatorErr::Failed(reason) => write!(f, "failed: {}", reason),
            CorrelatorErr::WorkerGone => write!(f, "span worker gone"),
        }
    }
}

impl std::error::Error for CorrelatorErr {}

/// Outcome delivered by the span worker: answer text, or the modem's failure text
pub type Completion = Result<String, String>;

struct Pending {
    generation: u64,
    tid: Option<TransactionId>,
    reply: Sender<Completion>,
}

pub struct CorrelatorSlot {
    kind: SlotKind,
    /// Held by the caller for the whole lifetime of a request
    gate: Mutex<()>,
    pending: Mutex<Option<Pending>>,
    generation: AtomicU64,
}

impl CorrelatorSlot {
    pub fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            gate: Mutex::new(()),
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    fn pending(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Runs one request on this slot. `submit` receives the request generation and must
    /// hand the command to the span worker; it must not block on the worker's reply.
    /// Blocks until the result arrives or `timeout` elapses.
    pub fn invoke<F>(&self, timeout: Duration, submit: F) -> Result<String, CorrelatorErr>
    where
        F: FnOnce(u64) -> Result<(), CorrelatorErr>,
    {
        let _gate = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("{:?}: request already in progress", self.kind);
                return Err(CorrelatorErr::Busy);
            }
        };

        let deadline = Instant::now() + timeout;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = bounded(1);
        *self.pending() = Some(Pending {
            generation,
            tid: None,
            reply: tx,
        });

        let result = match submit(generation) {
            Err(e) => Err(e),
            Ok(()) => match rx.recv_deadline(deadline) {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(reason)) => Err(CorrelatorErr::Failed(reason)),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::info!("{:?}: no answer within {:?}", self.kind, timeout);
                    Err(CorrelatorErr::Timeout)
                }
                Err(RecvTimeoutError::Disconnected) => Err(CorrelatorErr::WorkerGone),
            },
        };

        self.disarm(generation);
        result
    }

    /// Binds the engine transaction of the request `generation`.
    /// Returns false if that request is no longer waiting.
    pub fn bind(&self, generation: u64, tid: TransactionId) -> bool {
        let mut pending = self.pending();
        match pending.as_mut() {
            Some(p) if p.generation == generation => {
                p.tid = Some(tid);
                true
            }
            _ => false,
        }
    }

    /// Delivers a result event. Completes the waiting request if `tid` is the one it is
    /// bound to, otherwise discards the result and returns false.
    pub fn complete(&self, tid: TransactionId, result: Completion) -> bool {
        let mut pending = self.pending();
        let matches = pending.as_ref().is_some_and(|p| p.tid == Some(tid));
        if !matches {
            tracing::debug!("{:?}: discarding stale result for tid {}", self.kind, tid);
            return false;
        }
        match pending.take() {
            Some(p) => {
                // Capacity one and a single send per request, cannot be full
                let _ = p.reply.try_send(result);
                true
            }
            None => false,
        }
    }

    /// Fails the request `generation` without it ever reaching the engine
    pub fn reject(&self, generation: u64, reason: String) -> bool {
        let mut pending = self.pending();
        if !pending.as_ref().is_some_and(|p| p.generation == generation) {
            return false;
        }
        match pending.take() {
            Some(p) => {
                let _ = p.reply.try_send(Err(reason));
                true
            }
            None => false,
        }
    }

    fn disarm(&self, generation: u64) {
        let mut pending = self.pending();
        if pending.as_ref().is_some_and(|p| p.generation == generation) {
            *pending = None;
        }
    }

    /// True while a request holds the slot
    pub fn is_busy(&self) -> bool {
        matches!(self.gate.try_lock(), Err(TryLockError::WouldBlock))
    }
}

/// The three correlated request slots of a span
pub struct Correlators {
    ussd: CorrelatorSlot,
    operators: CorrelatorSlot,
    raw: CorrelatorSlot,
}

impl Correlators {
    pub fn new() -> Self {
        Self {
            ussd: CorrelatorSlot::new(SlotKind::Ussd),
            operators: CorrelatorSlot::new(SlotKind::OperatorList),
            raw: CorrelatorSlot::new(SlotKind::RawCommand),
        }
    }

    pub fn slot(&self, kind: SlotKind) -> &CorrelatorSlot {
        match kind {
            SlotKind::Ussd => &self.ussd,
            SlotKind::OperatorList => &self.operators,
            SlotKind::RawCommand => &self.raw,
        }
    }
}

impl Default for Correlators {
    fn default() -> Self {
        Self::new()
    }
}
