//! Lifecycle of the single call a span carries.
//!
//! Idle -> Setup -> Proceeding/Alerting -> Active -> HungUp (ack pending) -> Idle
//!
//! The `already_hungup` flag on the span makes teardown idempotent: the first release
//! notifies the framework, any repeat only retries the protocol release.

use std::sync::Arc;
use std::time::Instant;

use gsm_core::{CallRef, cause};
use gsm_saps::{CallLeg, GsmCommand, GsmEvent, InboundCall, LegControl, LegState, Notification, NotificationKind};

use super::cause_map::{HangupOutcome, forces_channel_reset, map_cause};
use crate::dispatch::{Effect, LegAction};
use crate::error::GatewayErr;
use crate::span::span_state::{ActiveCall, CallDirection, CallPhase, SpanState};

// ─── Network side ────────────────────────────────────────────────

pub fn on_ring(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let GsmEvent::Ring {
        call,
        channel,
        caller,
        called,
    } = event
    else {
        return Vec::new();
    };
    let (call, channel) = (*call, *channel);

    if let Some(active) = &state.call {
        if active.call == call {
            tracing::warn!(span = state.span.number(), "duplicate ring for call {}, rejecting", call);
            return vec![Effect::Engine(GsmCommand::Reject {
                call,
                cause: cause::CALL_REJECTED,
            })];
        }
        tracing::info!(span = state.span.number(), "ring for call {} while call {} is up, busy", call, active.call);
        return vec![Effect::Engine(GsmCommand::Reject {
            call,
            cause: cause::USER_BUSY,
        })];
    }

    if !state.availability.is_up() {
        tracing::warn!(span = state.span.number(), "ring for call {} while span is down", call);
        return vec![Effect::Engine(GsmCommand::Reject {
            call,
            cause: cause::NETWORK_OUT_OF_ORDER,
        })];
    }

    if caller.anonymous && !state.cfg.allow_anonymous {
        tracing::info!(span = state.span.number(), "rejecting anonymous call {}", call);
        return vec![Effect::Engine(GsmCommand::Reject {
            call,
            cause: cause::CALL_REJECTED,
        })];
    }

    if channel >= state.num_channels() {
        tracing::warn!(span = state.span.number(), "ring on unknown channel {}", channel);
        return vec![Effect::Engine(GsmCommand::Reject {
            call,
            cause: cause::REQUESTED_CHAN_UNAVAIL,
        })];
    }

    let exten = resolve_exten(state, called.as_deref());
    tracing::info!(
        span = state.span.number(),
        "incoming call {} from '{}' to {}@{}",
        call,
        caller.number,
        exten,
        state.cfg.context
    );

    state.already_hungup = false;
    state.call = Some(ActiveCall::inbound(call, channel, caller.clone(), exten.clone()));

    let offer = InboundCall {
        span: state.span,
        call,
        caller: caller.clone(),
        exten: exten.clone(),
        context: state.cfg.context.clone(),
    };
    let caller_number = if caller.anonymous { "" } else { caller.number.as_str() };
    vec![
        Effect::Notify(Notification::new(
            NotificationKind::CallIncoming,
            state.span,
            serde_json::json!({
                "call": call,
                "caller": caller_number,
                "caller_name": caller.name,
                "exten": exten,
            }),
        )),
        Effect::CreateLeg(offer),
    ]
}

/// Explicit digits win, then the immediate "s" extension, then the configured default
fn resolve_exten(state: &SpanState, called: Option<&str>) -> String {
    match called {
        Some(digits) if !digits.is_empty() => digits.to_string(),
        _ if state.cfg.immediate => "s".to_string(),
        _ => state.cfg.default_exten.clone(),
    }
}

/// Ringing, proceeding, progress and answer. Each phase flag is set once; repeats are ignored.
pub fn on_call_progress(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let span = state.span;
    let call_ref = match event {
        GsmEvent::Ringing { call } | GsmEvent::Proceeding { call } | GsmEvent::Answer { call } => *call,
        GsmEvent::Progress { call, .. } => *call,
        _ => return Vec::new(),
    };
    let Some(active) = state.call_mut(call_ref) else {
        tracing::warn!(span = span.number(), "{:?} for unknown call {}", event.kind(), call_ref);
        return Vec::new();
    };
    if active.is_torn_down() {
        tracing::debug!(span = span.number(), "{:?} for call {} in teardown, ignored", event.kind(), call_ref);
        return Vec::new();
    }

    let (flag, control, phase) = match event {
        GsmEvent::Ringing { .. } => (&mut active.alerting, LegControl::Ringing, CallPhase::Alerting),
        GsmEvent::Proceeding { .. } => (&mut active.proceeding, LegControl::Proceeding, CallPhase::Proceeding),
        GsmEvent::Progress { .. } => (&mut active.progress, LegControl::Progress, active.phase),
        _ => (&mut active.answered, LegControl::Answer, CallPhase::Active),
    };
    if *flag {
        tracing::trace!(span = span.number(), "{:?} repeated for call {}", control, call_ref);
        return Vec::new();
    }
    *flag = true;
    // Never step back from Active
    if active.phase != CallPhase::Active {
        active.phase = phase;
    }
    // The network confirmed the phase, stop relying on what local dialing assumed
    active.dsp_hint = false;

    let mut effects = Vec::new();
    if let Some(leg) = &active.leg {
        effects.push(Effect::Leg {
            leg: leg.clone(),
            action: LegAction::Control(control),
        });
    }
    if control == LegControl::Answer {
        tracing::info!(span = span.number(), "call {} answered", call_ref);
        effects.push(Effect::Notify(Notification::new(
            NotificationKind::CallAnswered,
            span,
            serde_json::json!({ "call": call_ref }),
        )));
    }
    effects
}

/// Network hangup and hangup request share one path
pub fn on_hangup(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let (call, cause_value) = match event {
        GsmEvent::Hangup { call, cause } | GsmEvent::HangupReq { call, cause } => (*call, *cause),
        _ => return Vec::new(),
    };
    release_call(state, call, cause_value, false)
}

pub fn on_hangup_ack(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let GsmEvent::HangupAck { call } = event else {
        return Vec::new();
    };
    if let Some(active) = &state.call {
        if active.call != *call {
            // Late ack for a call released earlier; the slot belongs to a newer call
            tracing::debug!(span = state.span.number(), "stale hangup ack for call {}, slot holds {}", call, active.call);
            return Vec::new();
        }
    }
    tracing::debug!(span = state.span.number(), "hangup ack for call {}", call);
    state.call = None;
    clear_resetting(state);
    Vec::new()
}

/// Tears the call down after the link, SIM or module went away.
/// The leg is forced down in addition to the regular cause mapping.
pub fn teardown_for_link_loss(state: &mut SpanState, cause_value: u8) -> Vec<Effect> {
    let Some(active) = &state.call else {
        return Vec::new();
    };
    let call = active.call;
    let leg = active.leg.clone();

    if state.already_hungup {
        // Release already went out; the ack will not come over a dead link
        tracing::debug!(span = state.span.number(), "dropping call {} in teardown", call);
        state.call = None;
        clear_resetting(state);
        return Vec::new();
    }

    let mut effects = release_call(state, call, cause_value, true);
    if let Some(leg) = leg {
        effects.push(Effect::Leg {
            leg,
            action: LegAction::ForceHangup { cause: cause_value },
        });
    }
    effects
}

fn release_call(state: &mut SpanState, call: CallRef, cause_value: u8, link_lost: bool) -> Vec<Effect> {
    let span = state.span;
    if state.already_hungup {
        tracing::debug!(span = span.number(), "duplicate hangup for call {}, retrying release only", call);
        // Network cleared a call we released locally; no ack is owed for it any more
        if state.call.take_if(|c| c.call == call && c.is_torn_down()).is_some() {
            clear_resetting(state);
        }
        return vec![Effect::Engine(GsmCommand::Hangup { call, cause: cause_value })];
    }
    let Some(active) = state.call.take_if(|c| c.call == call) else {
        tracing::warn!(span = span.number(), "hangup for unknown call {}", call);
        return vec![Effect::Engine(GsmCommand::Hangup { call, cause: cause_value })];
    };

    let outcome = map_cause(cause_value);
    tracing::info!(
        span = span.number(),
        "call {} released, cause {} ({}), {}",
        call,
        cause_value,
        cause::cause_name(cause_value),
        outcome.as_str()
    );

    state.already_hungup = true;
    clear_resetting(state);

    let mut effects = Vec::new();
    if let Some(leg) = active.leg {
        // The forced variant follows for lost links
        if !link_lost {
            effects.push(Effect::Leg {
                leg,
                action: LegAction::Hangup {
                    cause: cause_value,
                    outcome,
                },
            });
        }
    }
    effects.push(Effect::Notify(Notification::new(
        NotificationKind::CallHangup,
        span,
        serde_json::json!({
            "call": call,
            "cause": cause_value,
            "cause_name": cause::cause_name(cause_value),
            "outcome": outcome.as_str(),
        }),
    )));
    effects.push(Effect::Engine(GsmCommand::Hangup { call, cause: cause_value }));
    if forces_channel_reset(cause_value) {
        tracing::info!(span = span.number(), "resetting channel {} after {}", active.channel, cause_value);
        effects.push(Effect::EngineReset(active.channel));
    }
    effects
}

fn clear_resetting(state: &mut SpanState) {
    state.resetting = false;
    state.reset_cursor = -1;
}

// ─── Framework side ──────────────────────────────────────────────

/// Queues a leg update for the framework. Caller holds the span lock and the leg lock.
pub fn apply_leg_action(leg: &mut LegState, action: &LegAction) {
    match action {
        LegAction::Control(control) => {
            if *control == LegControl::Answer {
                leg.answered = true;
            }
            leg.controls.push(*control);
        }
        LegAction::Hangup { cause, outcome } => {
            leg.hangup_cause = Some(*cause);
            match outcome {
                HangupOutcome::Busy => leg.controls.push(LegControl::Busy),
                HangupOutcome::Congestion => leg.controls.push(LegControl::Congestion),
                HangupOutcome::Failure => leg.soft_hangup = true,
            }
        }
        LegAction::ForceHangup { cause } => {
            leg.hangup_cause.get_or_insert(*cause);
            leg.soft_hangup = true;
        }
    }
}

/// Binds the leg the framework created for the offered call.
/// Returns false if the call vanished in the meantime.
pub fn attach_leg(state: &mut SpanState, call: CallRef, leg: Arc<CallLeg>) -> bool {
    match state.call_mut(call) {
        Some(active) if !active.is_torn_down() && active.leg.is_none() => {
            active.leg = Some(leg);
            true
        }
        _ => false,
    }
}

/// Framework declined the offered call: free the slot and decline towards the network
pub fn abandon_inbound(state: &mut SpanState, call: CallRef) -> Vec<Effect> {
    if state.call_mut(call).is_none() {
        return Vec::new();
    }
    tracing::warn!(span = state.span.number(), "no leg for call {}, declining", call);
    state.call = None;
    vec![Effect::Engine(GsmCommand::Reject {
        call,
        cause: cause::SWITCH_CONGESTION,
    })]
}

/// Checks an outbound dial request is acceptable on this span
pub fn check_dial(state: &SpanState) -> Result<(), GatewayErr> {
    if !state.availability.is_up() {
        return Err(GatewayErr::SpanDown(state.span));
    }
    if state.resetting {
        return Err(GatewayErr::SpanResetting(state.span));
    }
    if state.call.is_some() {
        return Err(GatewayErr::CallInProgress(state.span));
    }
    Ok(())
}

/// Occupies the slot with a dialed call. `call` is the reference the engine returned.
pub fn start_outbound(state: &mut SpanState, call: CallRef, leg: Arc<CallLeg>, number: String) {
    tracing::info!(span = state.span.number(), "dialing {} as call {}", number, call);
    state.already_hungup = false;
    state.call = Some(ActiveCall::outbound(call, 0, leg, number));
}

/// Answers the offered call. Returns the command to submit.
pub fn answer_local(state: &mut SpanState) -> Result<GsmCommand, GatewayErr> {
    let span = state.span;
    let Some(active) = state.call.as_mut() else {
        return Err(GatewayErr::NoCall(span));
    };
    if active.direction != CallDirection::Inbound || active.is_torn_down() {
        return Err(GatewayErr::Failed(format!("call {} cannot be answered", active.call)));
    }
    if active.answered {
        return Err(GatewayErr::Failed(format!("call {} already answered", active.call)));
    }
    active.answered = true;
    active.phase = CallPhase::Active;
    Ok(GsmCommand::Answer { call: active.call })
}

/// Framework hangs up. The release goes out once; a repeat only retries it.
/// Returns the command to submit, None if the call is already gone.
pub fn hangup_local(state: &mut SpanState, cause_value: u8) -> Result<Option<GsmCommand>, GatewayErr> {
    let span = state.span;
    let already = state.already_hungup;
    let Some(active) = state.call.as_mut() else {
        if already {
            // Network released first; the leg teardown that follows is expected
            tracing::debug!(span = span.number(), "local hangup after release, nothing to do");
            return Ok(None);
        }
        return Err(GatewayErr::NoCall(span));
    };
    if already || active.is_torn_down() {
        tracing::debug!(span = span.number(), "repeat hangup for call {}", active.call);
    } else {
        tracing::info!(span = span.number(), "local hangup of call {}, cause {}", active.call, cause_value);
        active.phase = CallPhase::HungUp;
        // The framework tore its leg down itself
        active.leg = None;
        state.already_hungup = true;
    }
    Ok(Some(GsmCommand::Hangup {
        call: active.call,
        cause: cause_value,
    }))
}
