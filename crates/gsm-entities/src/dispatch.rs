//! Event dispatch table.
//!
//! Every protocol event kind maps to one handler. Handlers run under the span lock,
//! mutate the span state and return the effects the worker applies afterwards:
//! engine commands, framework notifications and leg updates.

use std::sync::Arc;
use std::time::Instant;

use gsm_core::ChannelId;
use gsm_saps::{CallLeg, EventKind, GsmCommand, GsmEvent, InboundCall, LegControl, Notification, NotificationKind, TransactionId};

use crate::alarm::reset_mgr;
use crate::call::call_fsm;
use crate::call::cause_map::HangupOutcome;
use crate::correlator::{Completion, SlotKind};
use crate::sms::delivery::{self, InboundSms, SmsFailure};
use crate::span::span_state::SpanState;

/// Update applied to a framework call leg, under span lock then leg lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegAction {
    Control(LegControl),
    /// Network released the call
    Hangup { cause: u8, outcome: HangupOutcome },
    /// Link or module lost, the leg must go away regardless of its state
    ForceHangup { cause: u8 },
}

#[derive(Debug)]
pub enum Effect {
    Engine(GsmCommand),
    EngineReset(ChannelId),
    /// Restart the module detection sequence
    ModuleStart,
    Notify(Notification),
    /// Ask the framework for a leg for the call in the slot
    CreateLeg(InboundCall),
    Leg { leg: Arc<CallLeg>, action: LegAction },
    Complete { slot: SlotKind, tid: TransactionId, result: Completion },
    BackupSms(InboundSms),
    PersistSmsFailure(SmsFailure),
}

pub type EventHandler = fn(&mut SpanState, &GsmEvent, Instant) -> Vec<Effect>;

pub fn handler_for(kind: EventKind) -> EventHandler {
    match kind {
        EventKind::LinkUp => reset_mgr::on_link_up,
        EventKind::LinkDown => reset_mgr::on_link_down,
        EventKind::Alarm => reset_mgr::on_alarm,
        EventKind::NoAlarm => reset_mgr::on_no_alarm,
        EventKind::SimMissing | EventKind::PinError | EventKind::NoSignal => reset_mgr::on_fault,
        EventKind::SignalLevel => reset_mgr::on_signal_level,
        EventKind::PowerOn => reset_mgr::on_power_on,
        EventKind::PowerOff => reset_mgr::on_power_off,
        EventKind::DetectTimeout => reset_mgr::on_detect_timeout,
        EventKind::RestartAck => reset_mgr::on_restart_ack,

        EventKind::Ring => call_fsm::on_ring,
        EventKind::Ringing | EventKind::Proceeding | EventKind::Progress | EventKind::Answer => call_fsm::on_call_progress,
        EventKind::Hangup | EventKind::HangupReq => call_fsm::on_hangup,
        EventKind::HangupAck => call_fsm::on_hangup_ack,

        EventKind::SmsReceived => delivery::on_sms_received,
        EventKind::SmsSendOk | EventKind::SmsSendFailed => delivery::on_sms_result,

        EventKind::UssdResult | EventKind::OperatorList | EventKind::RawResult => on_correlated_result,
    }
}

/// Routes one event to its handler
pub fn dispatch(state: &mut SpanState, event: &GsmEvent, now: Instant) -> Vec<Effect> {
    handler_for(event.kind())(state, event, now)
}

fn on_correlated_result(_state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let (slot, tid, ok, text) = match event {
        GsmEvent::UssdResult { tid, ok, text } => (SlotKind::Ussd, tid, ok, text),
        GsmEvent::OperatorList { tid, ok, text } => (SlotKind::OperatorList, tid, ok, text),
        GsmEvent::RawResult { tid, ok, text } => (SlotKind::RawCommand, tid, ok, text),
        _ => return Vec::new(),
    };
    let result = if *ok { Ok(text.clone()) } else { Err(text.clone()) };
    vec![Effect::Complete { slot, tid: *tid, result }]
}

/// Copy of an event for the framework's event sink
pub fn trace_notification(state: &SpanState, event: &GsmEvent) -> Notification {
    Notification::new(
        NotificationKind::EventTrace,
        state.span,
        serde_json::json!({ "event": format!("{:?}", event.kind()), "detail": format!("{:?}", event) }),
    )
}
