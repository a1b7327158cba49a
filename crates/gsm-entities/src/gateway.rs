//! Framework-facing entry points. Every span runs its own worker thread; requests travel
//! to it over a channel and the caller blocks on a short reply, except correlated queries
//! which block on their correlator slot for the caller-given timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};
use gsm_config::SharedConfig;
use gsm_core::{CallRef, SpanId};
use gsm_saps::{CallLeg, GsmCommand, ProtocolEngine, Readiness, TelephonyFramework};

use crate::correlator::{CorrelatorErr, SlotKind};
use crate::error::GatewayErr;
use crate::sms::delivery::{SmsBody, SmsJob};
use crate::sms::spool::Spool;
use crate::span::control::{SpanControl, SpanStatus};
use crate::span::registry::SpanRegistry;
use crate::span::worker::{PowerAction, SpanRequest, SpanWorker};

/// Upper bound for a worker to pick up and answer a plain request
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

struct WorkerHandle {
    requests: Sender<SpanRequest>,
    thread: Option<JoinHandle<()>>,
}

pub struct Gateway {
    config: SharedConfig,
    registry: SpanRegistry,
    workers: HashMap<SpanId, WorkerHandle>,
    framework: Arc<dyn TelephonyFramework>,
}

impl Gateway {
    /// Registers a control block for every configured span. No worker runs yet.
    pub fn new(config: SharedConfig, framework: Arc<dyn TelephonyFramework>) -> Result<Self, GatewayErr> {
        let cfg = config.config();
        let mut registry = SpanRegistry::new();
        for span_cfg in &cfg.spans {
            registry.insert(SpanControl::new(span_cfg.clone(), cfg.policy.clone()))?;
        }
        tracing::info!("gateway with {} span(s)", registry.len());
        Ok(Self {
            config,
            registry,
            workers: HashMap::new(),
            framework,
        })
    }

    /// Starts the worker thread of a configured span, driving the given engine
    pub fn start_span(&mut self, span: SpanId, engine: Box<dyn ProtocolEngine>, ready: Readiness) -> Result<(), GatewayErr> {
        let ctl = self.registry.get(span).cloned().ok_or(GatewayErr::SpanNotConfigured(span))?;
        if self.workers.contains_key(&span) {
            return Err(GatewayErr::Failed(format!("span {} already running", span)));
        }

        let (tx, rx) = unbounded();
        let spool = Spool::new(self.config.config().spool.clone());
        let worker = SpanWorker::new(ctl, engine, ready, rx, self.framework.clone(), spool);
        let thread = thread::Builder::new()
            .name(format!("span-{}", span.number()))
            .spawn(move || worker.run())
            .map_err(|e| GatewayErr::Io(e.to_string()))?;

        self.workers.insert(
            span,
            WorkerHandle {
                requests: tx,
                thread: Some(thread),
            },
        );
        Ok(())
    }

    pub fn span_control(&self, span: u32) -> Result<&Arc<SpanControl>, GatewayErr> {
        self.registry.lookup(span)
    }

    pub fn status(&self, span: u32) -> Result<SpanStatus, GatewayErr> {
        Ok(self.registry.lookup(span)?.status())
    }

    /// Status of all configured spans, in span order
    pub fn statuses(&self) -> Vec<SpanStatus> {
        self.registry.iter().map(|ctl| ctl.status()).collect()
    }

    fn running(&self, span: u32) -> Result<(&Arc<SpanControl>, &Sender<SpanRequest>), GatewayErr> {
        let ctl = self.registry.lookup(span)?;
        let handle = self.workers.get(&ctl.span).ok_or(GatewayErr::SpanNotStarted(ctl.span))?;
        Ok((ctl, &handle.requests))
    }

    fn request<T>(&self, span: u32, build: impl FnOnce(Sender<Result<T, GatewayErr>>) -> SpanRequest) -> Result<T, GatewayErr> {
        let (_, requests) = self.running(span)?;
        let (tx, rx) = bounded(1);
        requests.send(build(tx)).map_err(|_| GatewayErr::WorkerGone)?;
        match rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(GatewayErr::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(GatewayErr::WorkerGone),
        }
    }

    fn correlated(&self, span: u32, slot: SlotKind, command: GsmCommand, timeout: Duration) -> Result<String, GatewayErr> {
        let (ctl, requests) = self.running(span)?;
        let result = ctl.correlators.slot(slot).invoke(timeout, |generation| {
            requests
                .send(SpanRequest::Correlated {
                    slot,
                    generation,
                    command,
                })
                .map_err(|_| CorrelatorErr::WorkerGone)
        });
        Ok(result?)
    }

    // ─── Calls ───────────────────────────────────────────────────

    /// Places an outgoing call on behalf of `leg`. Returns the call reference.
    pub fn dial(&self, span: u32, number: &str, hide_caller: bool, leg: Arc<CallLeg>) -> Result<CallRef, GatewayErr> {
        let ctl = self.registry.lookup(span)?;
        if ctl.lock().resetting {
            return Err(GatewayErr::SpanResetting(ctl.span));
        }
        let number = number.to_string();
        self.request(span, |reply| SpanRequest::Dial {
            number,
            hide_caller,
            leg,
            reply,
        })
    }

    pub fn answer(&self, span: u32) -> Result<(), GatewayErr> {
        let ctl = self.registry.lookup(span)?;
        if ctl.lock().resetting {
            return Err(GatewayErr::SpanResetting(ctl.span));
        }
        self.request(span, |reply| SpanRequest::Answer { reply })
    }

    pub fn hangup(&self, span: u32, cause: u8) -> Result<(), GatewayErr> {
        self.request(span, |reply| SpanRequest::Hangup { cause, reply })
    }

    // ─── SMS ─────────────────────────────────────────────────────

    /// Queues a text message. Returns the number of parts submitted.
    pub fn send_sms(&self, span: u32, dest: &str, body: &str, id: Option<&str>) -> Result<usize, GatewayErr> {
        let job = SmsJob {
            dest: dest.to_string(),
            body: SmsBody::Text(body.to_string()),
            id: id.map(str::to_string),
        };
        self.request(span, |reply| SpanRequest::SendSms { job, reply })
    }

    /// Queues a pre-encoded PDU
    pub fn send_pdu(&self, span: u32, dest: &str, pdu: &str, id: Option<&str>) -> Result<(), GatewayErr> {
        let job = SmsJob {
            dest: dest.to_string(),
            body: SmsBody::Pdu(pdu.to_string()),
            id: id.map(str::to_string),
        };
        self.request(span, |reply| SpanRequest::SendSms { job, reply }).map(|_| ())
    }

    // ─── Correlated queries ──────────────────────────────────────

    pub fn send_ussd(&self, span: u32, code: &str, timeout: Duration) -> Result<String, GatewayErr> {
        self.correlated(
            span,
            SlotKind::Ussd,
            GsmCommand::SendUssd { code: code.to_string() },
            timeout,
        )
    }

    pub fn query_operators(&self, span: u32, timeout: Duration) -> Result<String, GatewayErr> {
        self.correlated(span, SlotKind::OperatorList, GsmCommand::QueryOperators, timeout)
    }

    /// Sends a raw modem command. Refused while a call is up on the span.
    pub fn send_raw_command(&self, span: u32, command: &str, timeout: Duration) -> Result<String, GatewayErr> {
        let ctl = self.registry.lookup(span)?;
        if ctl.lock().has_call() {
            return Err(GatewayErr::CallInProgress(ctl.span));
        }
        self.correlated(
            span,
            SlotKind::RawCommand,
            GsmCommand::Raw {
                command: command.to_string(),
            },
            timeout,
        )
    }

    // ─── Power ───────────────────────────────────────────────────

    pub fn power_on(&self, span: u32) -> Result<(), GatewayErr> {
        self.request(span, |reply| SpanRequest::Power {
            action: PowerAction::On,
            reply,
        })
    }

    pub fn power_off(&self, span: u32) -> Result<(), GatewayErr> {
        self.request(span, |reply| SpanRequest::Power {
            action: PowerAction::Off,
            reply,
        })
    }

    pub fn power_reset(&self, span: u32) -> Result<(), GatewayErr> {
        self.request(span, |reply| SpanRequest::Power {
            action: PowerAction::Reset,
            reply,
        })
    }

    /// Stops all span workers and waits for them to exit
    pub fn shutdown(&mut self) {
        for ctl in self.registry.iter() {
            ctl.disable();
        }
        for handle in self.workers.values() {
            let _ = handle.requests.send(SpanRequest::Wake);
        }
        for (span, mut handle) in self.workers.drain() {
            if let Some(thread) = handle.thread.take() {
                if thread.join().is_err() {
                    tracing::error!(span = span.number(), "span worker panicked");
                }
            }
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}
