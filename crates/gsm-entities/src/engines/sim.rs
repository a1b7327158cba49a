//! Scripted in-process protocol engine.
//!
//! Events are injected through a `SimHandle`, each one signalling readiness once.
//! Submitted commands are recorded; an optional responder turns commands into the
//! events a real modem would answer with.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};
use gsm_core::ChannelId;
use gsm_saps::{GsmCommand, GsmEvent, ProtocolEngine, Readiness, TransactionId};

pub type Responder = Box<dyn FnMut(&GsmCommand, TransactionId) -> Vec<GsmEvent> + Send>;

#[derive(Default)]
struct SimShared {
    inbox: VecDeque<GsmEvent>,
    /// Events released by the timer tick once due
    timers: Vec<(Instant, GsmEvent)>,
    commands: Vec<(TransactionId, GsmCommand)>,
    resets: Vec<ChannelId>,
    module_starts: u32,
    /// Module answers the start sequence
    responsive: bool,
    responder: Option<Responder>,
}

fn lock(shared: &Mutex<SimShared>) -> MutexGuard<'_, SimShared> {
    shared.lock().unwrap_or_else(|p| p.into_inner())
}

/// Test and operator side of a `SimEngine`
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<Mutex<SimShared>>,
    ready: Sender<()>,
}

impl SimHandle {
    /// Queues an event for the span worker
    pub fn inject(&self, event: GsmEvent) {
        lock(&self.shared).inbox.push_back(event);
        let _ = self.ready.send(());
    }

    /// Queues an event released by the engine's timer tick after `after`
    pub fn schedule(&self, after: Duration, event: GsmEvent) {
        lock(&self.shared).timers.push((Instant::now() + after, event));
    }

    pub fn set_responder(&self, responder: Responder) {
        lock(&self.shared).responder = Some(responder);
    }

    /// Whether the module answers `module_start` with power-on and link-up
    pub fn set_responsive(&self, responsive: bool) {
        lock(&self.shared).responsive = responsive;
    }

    pub fn commands(&self) -> Vec<GsmCommand> {
        lock(&self.shared).commands.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn resets(&self) -> Vec<ChannelId> {
        lock(&self.shared).resets.clone()
    }

    pub fn module_starts(&self) -> u32 {
        lock(&self.shared).module_starts
    }
}

pub struct SimEngine {
    shared: Arc<Mutex<SimShared>>,
    ready: Sender<()>,
    next_tid: TransactionId,
}

impl SimEngine {
    /// Creates an engine, the handle driving it and its readiness signal
    pub fn new() -> (SimEngine, SimHandle, Readiness) {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Mutex::new(SimShared {
            responsive: true,
            ..Default::default()
        }));
        let engine = SimEngine {
            shared: shared.clone(),
            ready: tx.clone(),
            next_tid: 1,
        };
        (engine, SimHandle { shared, ready: tx }, rx)
    }

    fn push_events(&self, events: Vec<GsmEvent>) {
        if events.is_empty() {
            return;
        }
        let n = events.len();
        lock(&self.shared).inbox.extend(events);
        for _ in 0..n {
            let _ = self.ready.send(());
        }
    }
}

impl ProtocolEngine for SimEngine {
    fn next_event(&mut self) -> Option<GsmEvent> {
        lock(&self.shared).inbox.pop_front()
    }

    fn next_timer_deadline(&self) -> Option<Duration> {
        let now = Instant::now();
        lock(&self.shared)
            .timers
            .iter()
            .map(|(at, _)| at.saturating_duration_since(now))
            .min()
    }

    fn run_timers(&mut self) -> Option<GsmEvent> {
        let now = Instant::now();
        let mut shared = lock(&self.shared);
        let due = shared
            .timers
            .iter()
            .enumerate()
            .filter(|(_, (at, _))| *at <= now)
            .min_by_key(|(_, (at, _))| *at)
            .map(|(i, _)| i)?;
        Some(shared.timers.remove(due).1)
    }

    fn submit(&mut self, command: GsmCommand) -> TransactionId {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1).max(1);
        tracing::trace!("sim: -> {:?} (tid {})", command, tid);

        let answers = {
            let mut shared = lock(&self.shared);
            let answers = match shared.responder.as_mut() {
                Some(responder) => responder(&command, tid),
                None => Vec::new(),
            };
            shared.commands.push((tid, command));
            answers
        };
        self.push_events(answers);
        tid
    }

    fn reset(&mut self, channel: ChannelId) {
        lock(&self.shared).resets.push(channel);
        self.push_events(vec![GsmEvent::RestartAck { channel }]);
    }

    fn module_start(&mut self) {
        let responsive = {
            let mut shared = lock(&self.shared);
            shared.module_starts += 1;
            shared.responsive
        };
        if responsive {
            self.push_events(vec![GsmEvent::PowerOn, GsmEvent::LinkUp]);
        }
    }
}

/// Answers like a well-behaved modem: every SMS part is accepted, USSD and operator
/// queries get canned replies, raw commands answer OK.
pub fn default_responder() -> Responder {
    Box::new(|command: &GsmCommand, tid: TransactionId| match command {
        GsmCommand::SendSms { id, part, .. } => vec![GsmEvent::SmsSendOk {
            id: id.clone(),
            part: *part,
        }],
        GsmCommand::SendPdu { id, .. } => vec![GsmEvent::SmsSendOk { id: id.clone(), part: 1 }],
        GsmCommand::SendUssd { code } => vec![GsmEvent::UssdResult {
            tid,
            ok: true,
            text: format!("USSD {} accepted", code),
        }],
        GsmCommand::QueryOperators => vec![GsmEvent::OperatorList {
            tid,
            ok: true,
            text: "(2,\"SIM-NET\",\"SIM\",\"00101\",0)".to_string(),
        }],
        GsmCommand::Raw { .. } => vec![GsmEvent::RawResult {
            tid,
            ok: true,
            text: "OK".to_string(),
        }],
        GsmCommand::Dial { .. } => vec![GsmEvent::Proceeding { call: tid }],
        GsmCommand::Hangup { call, .. } => vec![GsmEvent::HangupAck { call: *call }],
        GsmCommand::PowerOff => vec![GsmEvent::PowerOff],
        _ => Vec::new(),
    })
}
