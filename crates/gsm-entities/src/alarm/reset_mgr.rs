//! Link state transitions, module health events and the periodic idle channel reset sweep

use std::time::Instant;

use gsm_core::{Availability, cause};
use gsm_saps::{GsmEvent, Notification, NotificationKind};

use crate::call::call_fsm;
use crate::dispatch::Effect;
use crate::sms::delivery;
use crate::span::span_state::SpanState;

pub fn on_link_up(state: &mut SpanState, _event: &GsmEvent, now: Instant) -> Vec<Effect> {
    if !state.availability.mark_up() {
        tracing::warn!(span = state.span.number(), "link up on unprovisioned span ignored");
        return Vec::new();
    }
    // Registered on the network, so the module is evidently alive
    state.module_alive = true;
    state.detect.reset();
    // Push the sweep baseline out a bit, no reset right after recovery
    state.last_reset = now + state.policy.link_up_grace;
    tracing::info!(span = state.span.number(), "link up: {}", state.availability.describe());
    vec![Effect::Notify(Notification::bare(NotificationKind::SpanUp, state.span))]
}

pub fn on_link_down(state: &mut SpanState, _event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    state.availability.mark_down();
    tracing::warn!(span = state.span.number(), "link down");
    let mut effects = call_fsm::teardown_for_link_loss(state, cause::NETWORK_OUT_OF_ORDER);
    effects.extend(delivery::fail_pending_jobs(state, "link down"));
    effects.push(Effect::Notify(Notification::bare(NotificationKind::SpanDown, state.span)));
    effects
}

pub fn on_alarm(state: &mut SpanState, _event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    state.availability.enter_alarm();
    tracing::warn!(span = state.span.number(), "span in alarm");
    let mut effects = vec![Effect::Notify(Notification::bare(NotificationKind::SpanAlarm, state.span))];
    if state.cfg.t309_enabled {
        if state.call.is_some() {
            tracing::info!(span = state.span.number(), "T309 enabled, keeping call across alarm");
        }
    } else {
        // Alarm handling continues into the on-hook path
        effects.extend(call_fsm::teardown_for_link_loss(state, cause::NETWORK_OUT_OF_ORDER));
    }
    effects
}

pub fn on_no_alarm(state: &mut SpanState, _event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    state.availability.leave_alarm();
    tracing::info!(span = state.span.number(), "alarm cleared");
    vec![Effect::Notify(Notification::bare(NotificationKind::SpanNoAlarm, state.span))]
}

/// SIM missing, PIN rejected, coverage lost
pub fn on_fault(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let (bit, kind) = match event {
        GsmEvent::SimMissing => (Availability::NO_SIM, NotificationKind::SimMissing),
        GsmEvent::PinError => (Availability::PIN_ERROR, NotificationKind::PinError),
        GsmEvent::NoSignal => (Availability::NO_SIGNAL, NotificationKind::NoSignal),
        _ => return Vec::new(),
    };
    raise_fault(state, bit, kind)
}

fn raise_fault(state: &mut SpanState, bit: u8, kind: NotificationKind) -> Vec<Effect> {
    state.availability.raise_fault(bit);
    tracing::warn!(span = state.span.number(), "{}: {}", kind.as_str(), state.availability.describe());
    let mut effects = call_fsm::teardown_for_link_loss(state, cause::NETWORK_OUT_OF_ORDER);
    effects.extend(delivery::fail_pending_jobs(state, kind.as_str()));
    effects.push(Effect::Notify(Notification::bare(kind, state.span)));
    effects
}

/// rssi 0 and 99 (unknown) count as no signal, anything else clears the condition
pub fn on_signal_level(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let GsmEvent::SignalLevel { rssi } = event else {
        return Vec::new();
    };
    state.rssi = Some(*rssi);
    let no_signal = matches!(*rssi, 0 | 99);
    let flagged = state.availability.contains(Availability::NO_SIGNAL);
    if no_signal && !flagged {
        return raise_fault(state, Availability::NO_SIGNAL, NotificationKind::NoSignal);
    }
    if !no_signal && flagged {
        tracing::info!(span = state.span.number(), "signal back, rssi {}", rssi);
        state.availability.remove(Availability::NO_SIGNAL);
    }
    Vec::new()
}

pub fn on_power_on(state: &mut SpanState, _event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    state.availability.insert(Availability::POWERED);
    state.module_alive = true;
    state.detect.reset();
    tracing::info!(span = state.span.number(), "module powered on");
    vec![Effect::Notify(Notification::bare(NotificationKind::PowerOn, state.span))]
}

pub fn on_power_off(state: &mut SpanState, _event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    state.availability.remove(Availability::POWERED);
    state.availability.mark_down();
    state.module_alive = false;
    tracing::warn!(span = state.span.number(), "module powered off");
    let mut effects = call_fsm::teardown_for_link_loss(state, cause::NETWORK_OUT_OF_ORDER);
    effects.extend(delivery::fail_pending_jobs(state, "module powered off"));
    effects.push(Effect::Notify(Notification::bare(NotificationKind::PowerOff, state.span)));
    effects
}

/// Engine's detection timer expired without an answer from the module
pub fn on_detect_timeout(state: &mut SpanState, _event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    if state.module_alive || state.detect.gave_up {
        return Vec::new();
    }
    tracing::debug!(span = state.span.number(), "module detection timed out, restarting detection");
    vec![Effect::ModuleStart]
}

pub fn on_restart_ack(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let GsmEvent::RestartAck { channel } = event else {
        return Vec::new();
    };
    if state.resetting && state.reset_cursor == *channel as i32 {
        tracing::debug!(span = state.span.number(), "sweep reset of channel {} confirmed", channel);
    } else {
        tracing::debug!(span = state.span.number(), "restart ack for channel {}", channel);
    }
    Vec::new()
}

/// Runs once per worker loop iteration and advances the idle channel reset sweep.
///
/// The sweep starts once `reset_interval` has elapsed since the last one while the link is
/// up. The iteration that starts it only arms the cursor; each following iteration resets the
/// next channel without a call, until none is left.
pub fn poll_sweep(state: &mut SpanState, now: Instant) -> Vec<Effect> {
    let Some(interval) = state.reset_interval else {
        return Vec::new();
    };

    if !state.availability.is_up() {
        if state.resetting {
            tracing::debug!(span = state.span.number(), "link lost, sweep aborted");
            state.resetting = false;
            state.reset_cursor = -1;
        }
        return Vec::new();
    }

    if !state.resetting {
        if now.saturating_duration_since(state.last_reset) >= interval {
            tracing::info!(span = state.span.number(), "starting idle channel reset sweep");
            state.resetting = true;
            state.reset_cursor = -1;
        }
        return Vec::new();
    }

    let channels = state.num_channels() as i32;
    let mut next = state.reset_cursor + 1;
    while next < channels && !state.channel_idle(next as u32) {
        next += 1;
    }
    if next < channels {
        state.reset_cursor = next;
        tracing::debug!(span = state.span.number(), "sweep resetting channel {}", next);
        return vec![Effect::EngineReset(next as u32)];
    }

    state.resetting = false;
    state.reset_cursor = -1;
    state.last_reset = now;
    tracing::info!(span = state.span.number(), "idle channel reset sweep done");
    Vec::new()
}
