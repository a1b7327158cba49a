//! Outbound SMS jobs and inbound SMS handling.
//!
//! A job is split into parts which are submitted back to back. Results arrive later as
//! send-ok / send-failed events carrying the job's correlation id. Failed parts of jobs
//! with an id are persisted; nothing is retried here.

use std::time::Instant;

use chrono::Local;
use serde::Serialize;

use gsm_saps::{GsmCommand, GsmEvent, Notification, NotificationKind};

use super::pdu;
use super::segment::segment;
use crate::dispatch::Effect;
use crate::span::span_state::SpanState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsBody {
    Text(String),
    /// Pre-encoded hex PDU, submitted as-is
    Pdu(String),
}

#[derive(Debug, Clone)]
pub struct SmsJob {
    pub dest: String,
    pub body: SmsBody,
    pub id: Option<String>,
}

/// Part results seen so far for a job with a correlation id
#[derive(Debug, Clone)]
pub struct JobProgress {
    pub dest: String,
    pub body: String,
    pub total: u16,
    pub ok: u16,
    pub failed: u16,
}

impl JobProgress {
    fn is_done(&self) -> bool {
        self.ok + self.failed >= self.total
    }
}

/// Backup record of a received message
#[derive(Debug, Clone, Serialize)]
pub struct InboundSms {
    pub span: u32,
    pub sender: String,
    pub date: String,
    pub pdu: Option<String>,
    pub text: String,
    /// Local arrival time, RFC 3339
    pub received: String,
}

/// Failure record of one outbound part
#[derive(Debug, Clone, Serialize)]
pub struct SmsFailure {
    pub span: u32,
    pub id: String,
    pub dest: String,
    pub body: String,
    pub part: u16,
    pub reason: String,
    pub timestamp: String,
}

/// Splits and submits a job. Returns the number of parts and the effects to apply.
pub fn submit_job(state: &mut SpanState, job: SmsJob) -> (usize, Vec<Effect>) {
    let span = state.span;
    let (commands, body_text): (Vec<GsmCommand>, String) = match job.body {
        SmsBody::Text(text) => {
            let (alphabet, parts) = segment(&text);
            tracing::debug!(
                span = span.number(),
                "sms to {}: {} chars, {:?}, {} part(s)",
                job.dest,
                text.chars().count(),
                alphabet,
                parts.len()
            );
            let commands = parts
                .into_iter()
                .map(|p| GsmCommand::SendSms {
                    dest: job.dest.clone(),
                    text: p.text,
                    id: job.id.clone(),
                    part: p.index,
                    total: p.total,
                })
                .collect();
            (commands, text)
        }
        SmsBody::Pdu(pdu) => {
            tracing::debug!(span = span.number(), "pdu to {}: {} octets", job.dest, pdu.len() / 2);
            let command = GsmCommand::SendPdu {
                pdu: pdu.clone(),
                id: job.id.clone(),
            };
            (vec![command], pdu)
        }
    };

    let parts = commands.len();
    let mut effects = Vec::new();
    if let Some(id) = &job.id {
        let progress = JobProgress {
            dest: job.dest.clone(),
            body: body_text,
            total: parts as u16,
            ok: 0,
            failed: 0,
        };
        if let Some(earlier) = state.sms_jobs.insert(id.clone(), progress) {
            tracing::warn!(span = span.number(), "sms id {} reused while still pending", id);
            effects.extend(abandon_job(state, id, earlier, "id reused by a newer job"));
        }
    }
    effects.extend(commands.into_iter().map(Effect::Engine));
    (parts, effects)
}

/// Fails every job still waiting for part results. Used when the link or module goes
/// away, since the outstanding results will never arrive.
pub fn fail_pending_jobs(state: &mut SpanState, reason: &str) -> Vec<Effect> {
    let mut jobs: Vec<(String, JobProgress)> = state.sms_jobs.drain().collect();
    jobs.sort_by(|a, b| a.0.cmp(&b.0));
    jobs.into_iter()
        .flat_map(|(id, progress)| abandon_job(state, &id, progress, reason))
        .collect()
}

/// Persists one failure record for the unreported parts (part 0 stands for the job as a
/// whole) and reports the job as failed.
fn abandon_job(state: &SpanState, id: &str, mut progress: JobProgress, reason: &str) -> Vec<Effect> {
    let span = state.span;
    let unreported = progress.total.saturating_sub(progress.ok + progress.failed);
    tracing::warn!(span = span.number(), "sms {} abandoned with {} part(s) unreported: {}", id, unreported, reason);
    progress.failed += unreported;
    vec![
        Effect::PersistSmsFailure(SmsFailure {
            span: span.number(),
            id: id.to_string(),
            dest: progress.dest.clone(),
            body: progress.body.clone(),
            part: 0,
            reason: reason.to_string(),
            timestamp: Local::now().to_rfc3339(),
        }),
        job_result(state, id, &progress),
    ]
}

fn job_result(state: &SpanState, id: &str, done: &JobProgress) -> Effect {
    let success = done.failed == 0;
    tracing::info!(
        span = state.span.number(),
        "sms {} to {} {}",
        id,
        done.dest,
        if success { "delivered" } else { "failed" }
    );
    Effect::Notify(Notification::new(
        NotificationKind::SmsJobResult,
        state.span,
        serde_json::json!({
            "id": id,
            "dest": done.dest,
            "parts": done.total,
            "failed": done.failed,
            "success": success,
        }),
    ))
}

pub fn on_sms_result(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let span = state.span;
    let (id, part, failure) = match event {
        GsmEvent::SmsSendOk { id, part } => (id, *part, None),
        GsmEvent::SmsSendFailed { id, part, reason } => (id, *part, Some(reason)),
        _ => return Vec::new(),
    };

    let Some(id) = id else {
        match failure {
            Some(reason) => tracing::warn!(span = span.number(), "sms part {} failed: {}", part, reason),
            None => tracing::debug!(span = span.number(), "sms part {} sent", part),
        }
        return Vec::new();
    };

    let mut effects = Vec::new();
    let progress = state.sms_jobs.get_mut(id);
    match failure {
        None => {
            tracing::debug!(span = span.number(), "sms {} part {} sent", id, part);
            if let Some(p) = progress {
                p.ok += 1;
            }
        }
        Some(reason) => {
            tracing::warn!(span = span.number(), "sms {} part {} failed: {}", id, part, reason);
            let (dest, body) = match progress {
                Some(p) => {
                    p.failed += 1;
                    (p.dest.clone(), p.body.clone())
                }
                None => (String::new(), String::new()),
            };
            effects.push(Effect::PersistSmsFailure(SmsFailure {
                span: span.number(),
                id: id.clone(),
                dest,
                body,
                part,
                reason: reason.clone(),
                timestamp: Local::now().to_rfc3339(),
            }));
        }
    }

    if state.sms_jobs.get(id).is_some_and(JobProgress::is_done) {
        if let Some(done) = state.sms_jobs.remove(id) {
            effects.push(job_result(state, id, &done));
        }
    }
    effects
}

pub fn on_sms_received(state: &mut SpanState, event: &GsmEvent, _now: Instant) -> Vec<Effect> {
    let GsmEvent::SmsReceived { sender, date, pdu, text } = event else {
        return Vec::new();
    };
    let span = state.span;

    let text = match (text, pdu) {
        (Some(text), _) => text.clone(),
        (None, Some(hex)) => match pdu::decode_deliver(hex) {
            Ok(decoded) => decoded.text,
            Err(e) => {
                tracing::warn!(span = span.number(), "undecodable sms pdu from {}: {}", sender, e);
                String::new()
            }
        },
        (None, None) => String::new(),
    };
    tracing::info!(span = span.number(), "sms from {}: {} chars", sender, text.chars().count());

    let record = InboundSms {
        span: span.number(),
        sender: sender.clone(),
        date: date.clone(),
        pdu: pdu.clone(),
        text,
        received: Local::now().to_rfc3339(),
    };
    let payload = serde_json::json!({
        "sender": record.sender,
        "date": record.date,
        "text": record.text,
        "pdu": record.pdu,
    });
    vec![
        Effect::BackupSms(record),
        Effect::Notify(Notification::new(NotificationKind::SmsReceived, span, payload)),
        // Best effort, keeps the module's own store from filling up
        Effect::Engine(GsmCommand::CleanupSmsStore),
    ]
}
