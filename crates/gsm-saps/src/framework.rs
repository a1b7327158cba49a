use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chrono::{DateTime, Local};
use gsm_core::{CallRef, SpanId};
use uuid::Uuid;

use crate::CallerId;

/// Control indications queued on a call leg for the framework to act upon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegControl {
    Ringing,
    Proceeding,
    Progress,
    Answer,
    Busy,
    Congestion,
}

/// Framework-owned state of a call leg. Guarded by the leg's own lock,
/// which is only ever taken after the span lock.
#[derive(Debug, Default)]
pub struct LegState {
    pub controls: Vec<LegControl>,
    pub hangup_cause: Option<u8>,
    /// Leg must be torn down by the framework as soon as possible
    pub soft_hangup: bool,
    pub answered: bool,
}

/// One call leg of the host telephony framework
#[derive(Debug)]
pub struct CallLeg {
    pub id: Uuid,
    pub span: SpanId,
    state: Mutex<LegState>,
}

impl CallLeg {
    pub fn new(span: SpanId) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            span,
            state: Mutex::new(LegState::default()),
        })
    }

    /// Non-blocking lock attempt. Returns None if the framework currently holds the leg.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, LegState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Blocking lock, for the framework side only
    pub fn lock(&self) -> MutexGuard<'_, LegState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Details handed to the framework when the network offers a call
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub span: SpanId,
    pub call: CallRef,
    pub caller: CallerId,
    pub exten: String,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    SpanUp,
    SpanDown,
    SpanAlarm,
    SpanNoAlarm,
    SimMissing,
    PinError,
    NoSignal,
    PowerOn,
    PowerOff,
    CallIncoming,
    CallAnswered,
    CallHangup,
    SmsReceived,
    SmsJobResult,
    EventTrace,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::SpanUp => "span_up",
            NotificationKind::SpanDown => "span_down",
            NotificationKind::SpanAlarm => "span_alarm",
            NotificationKind::SpanNoAlarm => "span_no_alarm",
            NotificationKind::SimMissing => "sim_missing",
            NotificationKind::PinError => "pin_error",
            NotificationKind::NoSignal => "no_signal",
            NotificationKind::PowerOn => "power_on",
            NotificationKind::PowerOff => "power_off",
            NotificationKind::CallIncoming => "call_incoming",
            NotificationKind::CallAnswered => "call_answered",
            NotificationKind::CallHangup => "call_hangup",
            NotificationKind::SmsReceived => "sms_received",
            NotificationKind::SmsJobResult => "sms_job_result",
            NotificationKind::EventTrace => "event_trace",
        }
    }
}

/// {event-name, span, timestamp, payload} record delivered to the framework's event sink
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub span: SpanId,
    pub timestamp: DateTime<Local>,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(kind: NotificationKind, span: SpanId, payload: serde_json::Value) -> Self {
        Self {
            kind,
            span,
            timestamp: Local::now(),
            payload,
        }
    }

    pub fn bare(kind: NotificationKind, span: SpanId) -> Self {
        Self::new(kind, span, serde_json::Value::Null)
    }
}

/// Host telephony framework as seen from the control plane
pub trait TelephonyFramework: Send + Sync {
    /// Creates a call leg for an incoming call. None means the framework declined it.
    fn create_leg(&self, call: &InboundCall) -> Option<Arc<CallLeg>>;

    /// Called after new controls or a hangup were queued on a leg
    fn leg_updated(&self, _leg: &Arc<CallLeg>) {}

    /// Event sink for alarms, SMS arrival and call state changes
    fn notify(&self, notification: Notification);
}
