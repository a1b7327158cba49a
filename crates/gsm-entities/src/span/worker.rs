//! Per-span worker thread.
//!
//! Waits for transport readiness, framework requests or the next protocol timer, whichever
//! comes first. A ready transport yields exactly one event, which is dispatched under the
//! span lock. Resulting effects are applied with the span lock released, except leg updates
//! which take the span lock and then the leg lock. The reset sweep runs after every wakeup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select};
use gsm_core::{CallRef, SpanId, assert_warn, cause};
use gsm_saps::{CallLeg, GsmCommand, GsmEvent, InboundCall, ProtocolEngine, Readiness, TelephonyFramework};

use super::control::SpanControl;
use super::detect::DetectAction;
use crate::alarm::reset_mgr;
use crate::call::call_fsm;
use crate::correlator::SlotKind;
use crate::dispatch::{self, Effect, LegAction};
use crate::error::GatewayErr;
use crate::sms::delivery::{self, SmsJob};
use crate::sms::spool::Spool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
    Reset,
}

/// Requests from the framework-facing API to the span worker
#[derive(Debug)]
pub enum SpanRequest {
    Dial {
        number: String,
        hide_caller: bool,
        leg: Arc<CallLeg>,
        reply: Sender<Result<CallRef, GatewayErr>>,
    },
    Answer {
        reply: Sender<Result<(), GatewayErr>>,
    },
    Hangup {
        cause: u8,
        reply: Sender<Result<(), GatewayErr>>,
    },
    SendSms {
        job: SmsJob,
        reply: Sender<Result<usize, GatewayErr>>,
    },
    /// Correlated query; the caller waits on the correlator slot, not on a reply channel
    Correlated {
        slot: SlotKind,
        generation: u64,
        command: GsmCommand,
    },
    Power {
        action: PowerAction,
        reply: Sender<Result<(), GatewayErr>>,
    },
    /// Only wakes the loop, e.g. to notice shutdown
    Wake,
}

pub struct SpanWorker {
    span: SpanId,
    ctl: Arc<SpanControl>,
    engine: Box<dyn ProtocolEngine>,
    ready: Readiness,
    requests: Receiver<SpanRequest>,
    framework: Arc<dyn TelephonyFramework>,
    spool: Spool,
    /// Operator powered the module off; no detection escalation
    operator_off: bool,
}

impl SpanWorker {
    pub fn new(
        ctl: Arc<SpanControl>,
        engine: Box<dyn ProtocolEngine>,
        ready: Readiness,
        requests: Receiver<SpanRequest>,
        framework: Arc<dyn TelephonyFramework>,
        spool: Spool,
    ) -> Self {
        let span = ctl.span;
        let operator_off = spool.is_powered_off(span);
        Self {
            span,
            ctl,
            engine,
            ready,
            requests,
            framework,
            spool,
            operator_off,
        }
    }

    /// Worker thread body. Returns once the span is disabled.
    pub fn run(mut self) {
        tracing::info!(span = self.span.number(), "span worker started");
        self.start_module();
        while self.ctl.is_enabled() {
            self.iterate();
        }
        tracing::info!(span = self.span.number(), "span worker stopped");
    }

    fn start_module(&mut self) {
        if self.operator_off {
            tracing::info!(span = self.span.number(), "power-off sentinel present, leaving module off");
            return;
        }
        self.engine.module_start();
    }

    /// One loop iteration: a single wait, then the reset sweep
    pub fn iterate(&mut self) {
        let timeout = self.wait_timeout();
        let ready = self.ready.clone();
        let requests = self.requests.clone();

        select! {
            recv(ready) -> msg => match msg {
                Ok(()) => {
                    if let Some(event) = self.engine.next_event() {
                        self.handle_event(event);
                    }
                }
                Err(_) => {
                    tracing::error!(span = self.span.number(), "transport closed, stopping span");
                    self.ctl.disable();
                }
            },
            recv(requests) -> msg => match msg {
                Ok(request) => self.handle_request(request),
                Err(_) => {
                    tracing::debug!(span = self.span.number(), "request channel closed");
                    self.ctl.disable();
                }
            },
            default(timeout) => self.on_timeout(),
        }

        let effects = reset_mgr::poll_sweep(&mut self.ctl.lock(), Instant::now());
        self.apply(effects);
    }

    /// Next protocol timer, capped by the loop ceiling (tighter while sweeping)
    fn wait_timeout(&self) -> Duration {
        let ceiling = self.ctl.lock().wait_ceiling();
        self.engine.next_timer_deadline().map_or(ceiling, |d| d.min(ceiling))
    }

    fn on_timeout(&mut self) {
        if !self.operator_off {
            let action = {
                let mut guard = self.ctl.lock();
                let state = &mut *guard;
                if state.module_alive {
                    DetectAction::Wait
                } else {
                    state.detect.on_timeout(&state.policy)
                }
            };
            match action {
                DetectAction::Wait => {}
                DetectAction::Probe => {
                    tracing::debug!(span = self.span.number(), "module silent, probing");
                    self.engine.submit(GsmCommand::DetectProbe);
                }
                DetectAction::PowerCycle => {
                    tracing::warn!(span = self.span.number(), "module silent, power cycling");
                    self.engine.submit(GsmCommand::PowerReset);
                    self.engine.module_start();
                }
                DetectAction::GiveUp => {
                    tracing::error!(span = self.span.number(), "module not detected, giving up");
                }
            }
        }

        if let Some(event) = self.engine.run_timers() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: GsmEvent) {
        tracing::debug!(span = self.span.number(), "<- {:?}", event);
        let effects = {
            let mut state = self.ctl.lock();
            let mut effects = Vec::new();
            if state.cfg.mirror_events {
                effects.push(Effect::Notify(dispatch::trace_notification(&state, &event)));
            }
            effects.extend(dispatch::dispatch(&mut state, &event, Instant::now()));
            assert_warn!(state.is_consistent(), "span {} after {:?}: {:?}", self.span, event.kind(), *state);
            effects
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Engine(command) => {
                    tracing::debug!(span = self.span.number(), "-> {:?}", command);
                    self.engine.submit(command);
                }
                Effect::EngineReset(channel) => self.engine.reset(channel),
                Effect::ModuleStart => {
                    if !self.operator_off {
                        self.engine.module_start();
                    }
                }
                Effect::Notify(notification) => self.framework.notify(notification),
                Effect::CreateLeg(offer) => self.offer_call(offer),
                Effect::Leg { leg, action } => self.update_leg(&leg, action),
                Effect::Complete { slot, tid, result } => {
                    if !self.ctl.correlators.slot(slot).complete(tid, result) {
                        tracing::debug!(span = self.span.number(), "{:?} result for tid {} had no taker", slot, tid);
                    }
                }
                Effect::BackupSms(record) => match self.spool.backup_inbound(&record) {
                    Ok(path) => tracing::debug!(span = self.span.number(), "sms backed up to {}", path.display()),
                    Err(e) => tracing::error!(span = self.span.number(), "sms backup failed: {}", e),
                },
                Effect::PersistSmsFailure(failure) => match self.spool.record_failure(&failure) {
                    Ok(count) => tracing::info!(span = self.span.number(), "sms {} failure #{} recorded", failure.id, count),
                    Err(e) => tracing::error!(span = self.span.number(), "failed to record sms failure: {}", e),
                },
            }
        }
    }

    /// Asks the framework for a leg. Runs without the span lock, so the call may be gone
    /// by the time the leg exists.
    fn offer_call(&mut self, offer: InboundCall) {
        let call = offer.call;
        match self.framework.create_leg(&offer) {
            Some(leg) => {
                let attached = call_fsm::attach_leg(&mut self.ctl.lock(), call, leg.clone());
                if !attached {
                    tracing::debug!(span = self.span.number(), "call {} ended before its leg was attached", call);
                    self.update_leg(&leg, LegAction::ForceHangup {
                        cause: cause::NORMAL_CLEARING,
                    });
                }
            }
            None => {
                let effects = call_fsm::abandon_inbound(&mut self.ctl.lock(), call);
                self.apply(effects);
            }
        }
    }

    fn update_leg(&self, leg: &Arc<CallLeg>, action: LegAction) {
        self.ctl.with_leg(leg, |_state, leg_state| call_fsm::apply_leg_action(leg_state, &action));
        self.framework.leg_updated(leg);
    }

    fn handle_request(&mut self, request: SpanRequest) {
        match request {
            SpanRequest::Dial {
                number,
                hide_caller,
                leg,
                reply,
            } => {
                let _ = reply.send(self.dial(number, hide_caller, leg));
            }
            SpanRequest::Answer { reply } => {
                let result = call_fsm::answer_local(&mut self.ctl.lock());
                let result = result.map(|command| {
                    self.engine.submit(command);
                });
                let _ = reply.send(result);
            }
            SpanRequest::Hangup { cause, reply } => {
                let result = call_fsm::hangup_local(&mut self.ctl.lock(), cause);
                let result = result.map(|command| {
                    if let Some(command) = command {
                        self.engine.submit(command);
                    }
                });
                let _ = reply.send(result);
            }
            SpanRequest::SendSms { job, reply } => {
                let submitted = {
                    let mut state = self.ctl.lock();
                    if state.availability.is_up() {
                        Ok(delivery::submit_job(&mut state, job))
                    } else {
                        Err(GatewayErr::SpanDown(self.span))
                    }
                };
                match submitted {
                    Ok((parts, effects)) => {
                        self.apply(effects);
                        let _ = reply.send(Ok(parts));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            SpanRequest::Correlated {
                slot,
                generation,
                command,
            } => self.submit_correlated(slot, generation, command),
            SpanRequest::Power { action, reply } => {
                let _ = reply.send(self.power(action));
            }
            SpanRequest::Wake => {}
        }
    }

    fn dial(&mut self, number: String, hide_caller: bool, leg: Arc<CallLeg>) -> Result<CallRef, GatewayErr> {
        let mut state = self.ctl.lock();
        call_fsm::check_dial(&state)?;
        let call = self.engine.submit(GsmCommand::Dial {
            number: number.clone(),
            hide_caller,
        });
        call_fsm::start_outbound(&mut state, call, leg, number);
        Ok(call)
    }

    fn submit_correlated(&mut self, slot: SlotKind, generation: u64, command: GsmCommand) {
        let correlator = self.ctl.correlators.slot(slot);
        if slot == SlotKind::RawCommand && self.ctl.lock().has_call() {
            tracing::info!(span = self.span.number(), "raw command refused, call in progress");
            correlator.reject(generation, "call in progress".to_string());
            return;
        }
        tracing::debug!(span = self.span.number(), "-> {:?}", command);
        let tid = self.engine.submit(command);
        if !correlator.bind(generation, tid) {
            tracing::debug!(span = self.span.number(), "{:?} request {} abandoned before submission", slot, generation);
        }
    }

    fn power(&mut self, action: PowerAction) -> Result<(), GatewayErr> {
        tracing::info!(span = self.span.number(), "power {:?}", action);
        match action {
            PowerAction::On => {
                self.spool
                    .set_powered_off(self.span, false)
                    .map_err(|e| GatewayErr::Io(e.to_string()))?;
                self.operator_off = false;
                self.ctl.lock().detect.reset();
                self.engine.submit(GsmCommand::PowerOn);
                self.engine.module_start();
            }
            PowerAction::Off => {
                self.spool
                    .set_powered_off(self.span, true)
                    .map_err(|e| GatewayErr::Io(e.to_string()))?;
                self.operator_off = true;
                self.engine.submit(GsmCommand::PowerOff);
            }
            PowerAction::Reset => {
                {
                    let mut state = self.ctl.lock();
                    state.detect.reset();
                    state.module_alive = false;
                }
                self.operator_off = false;
                self.engine.submit(GsmCommand::PowerReset);
                self.engine.module_start();
            }
        }
        Ok(())
    }
}
