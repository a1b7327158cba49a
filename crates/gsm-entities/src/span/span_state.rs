use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gsm_config::{CfgLoopPolicy, CfgSpan};
use gsm_core::{Availability, CallRef, ChannelId, SpanId};
use gsm_saps::{CallLeg, CallerId};

use super::detect::DetectState;
use crate::sms::delivery::JobProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Offered or dialed, nothing confirmed by the network yet
    Setup,
    Proceeding,
    Alerting,
    Active,
    /// Release sent, waiting for the acknowledgement
    HungUp,
}

/// The single call a span can carry
#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub call: CallRef,
    pub channel: ChannelId,
    pub direction: CallDirection,
    pub phase: CallPhase,
    /// Framework leg. None while the framework is still being asked to create one
    pub leg: Option<Arc<CallLeg>>,
    pub caller: CallerId,
    pub exten: String,

    pub proceeding: bool,
    pub alerting: bool,
    pub progress: bool,
    pub answered: bool,
    /// Locally assumed DSP features, dropped once the network confirms the phase
    pub dsp_hint: bool,
}

impl ActiveCall {
    pub fn inbound(call: CallRef, channel: ChannelId, caller: CallerId, exten: String) -> Self {
        Self {
            call,
            channel,
            direction: CallDirection::Inbound,
            phase: CallPhase::Setup,
            leg: None,
            caller,
            exten,
            proceeding: false,
            alerting: false,
            progress: false,
            answered: false,
            dsp_hint: false,
        }
    }

    pub fn outbound(call: CallRef, channel: ChannelId, leg: Arc<CallLeg>, number: String) -> Self {
        Self {
            call,
            channel,
            direction: CallDirection::Outbound,
            phase: CallPhase::Setup,
            leg: Some(leg),
            caller: CallerId::default(),
            exten: number,
            proceeding: false,
            alerting: false,
            progress: false,
            answered: false,
            dsp_hint: true,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.phase == CallPhase::HungUp
    }
}

/// Mutable part of a span control block. Always accessed through the span lock.
#[derive(Debug)]
pub struct SpanState {
    pub span: SpanId,
    pub cfg: CfgSpan,
    pub policy: CfgLoopPolicy,

    pub availability: Availability,

    pub resetting: bool,
    /// Channel the reset sweep last visited, -1 before the first one
    pub reset_cursor: i32,
    pub last_reset: Instant,
    pub reset_interval: Option<Duration>,

    pub call: Option<ActiveCall>,
    /// Set when the current (or last) call was released towards the framework.
    /// Only a new call clears it.
    pub already_hungup: bool,

    /// Module answered after power-up
    pub module_alive: bool,
    pub detect: DetectState,
    /// Last signal quality report
    pub rssi: Option<u8>,

    /// Outbound SMS jobs awaiting part results, keyed by correlation id
    pub sms_jobs: HashMap<String, JobProgress>,
}

impl SpanState {
    pub fn new(cfg: CfgSpan, policy: CfgLoopPolicy, now: Instant) -> Self {
        Self {
            span: cfg.span,
            reset_interval: cfg.reset_interval,
            cfg,
            policy,
            availability: Availability::provisioned(),
            resetting: false,
            reset_cursor: -1,
            last_reset: now,
            call: None,
            already_hungup: false,
            module_alive: false,
            detect: DetectState::default(),
            rssi: None,
            sms_jobs: HashMap::new(),
        }
    }

    pub fn num_channels(&self) -> u32 {
        self.cfg.channels
    }

    /// Returns the live call if it carries the given reference
    pub fn call_mut(&mut self, call: CallRef) -> Option<&mut ActiveCall> {
        self.call.as_mut().filter(|c| c.call == call)
    }

    pub fn has_call(&self) -> bool {
        self.call.is_some()
    }

    /// True if `channel` carries no call, live or in teardown
    pub fn channel_idle(&self, channel: ChannelId) -> bool {
        self.call.as_ref().is_none_or(|c| c.channel != channel)
    }

    /// Longest single wait of the worker loop, tighter while a reset sweep runs
    pub fn wait_ceiling(&self) -> Duration {
        if self.resetting {
            self.policy.loop_ceiling.min(self.policy.sweep_ceiling)
        } else {
            self.policy.loop_ceiling
        }
    }

    /// Checks the structural invariants of the control block
    pub fn is_consistent(&self) -> bool {
        if !self.availability.is_consistent() {
            return false;
        }
        if self.resetting && (self.reset_cursor < -1 || self.reset_cursor >= self.num_channels() as i32) {
            return false;
        }
        match &self.call {
            // T309 keeps calls across alarms
            Some(c) => self.availability.is_up() || c.is_torn_down() || self.already_hungup || self.cfg.t309_enabled,
            None => true,
        }
    }
}
