use gsm_core::{CallRef, ChannelId};

use crate::TransactionId;

/// Calling party as presented by the network
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallerId {
    pub number: String,
    pub name: String,
    /// Presentation restricted or number unavailable
    pub anonymous: bool,
}

/// Events decoded by the protocol engine, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GsmEvent {
    /// Signalling link established (modem registered on the network)
    LinkUp,
    /// Signalling link lost
    LinkDown,
    /// Span level alarm raised
    Alarm,
    /// Span level alarm cleared
    NoAlarm,
    /// SIM card not present or not readable
    SimMissing,
    /// SIM PIN rejected or PUK required
    PinError,
    /// Network coverage lost
    NoSignal,
    /// Periodic signal quality report, as reported by AT+CSQ (0..31, 99 = unknown)
    SignalLevel { rssi: u8 },
    /// Module confirmed alive after power-up
    PowerOn,
    /// Module powered down
    PowerOff,
    /// Detection timer fired while the module has not answered yet
    DetectTimeout,

    /// Incoming call
    Ring {
        call: CallRef,
        channel: ChannelId,
        caller: CallerId,
        /// Dialed digits, if the network provided any
        called: Option<String>,
    },
    /// Remote party is being alerted
    Ringing { call: CallRef },
    /// Network accepted the outgoing call setup
    Proceeding { call: CallRef },
    /// In-band progress available
    Progress { call: CallRef, inband: bool },
    /// Call answered by the remote party
    Answer { call: CallRef },
    /// Network cleared the call
    Hangup { call: CallRef, cause: u8 },
    /// Release requested for the call
    HangupReq { call: CallRef, cause: u8 },
    /// Release confirmed; the call reference is free again
    HangupAck { call: CallRef },
    /// Channel restart confirmed
    RestartAck { channel: ChannelId },

    /// Inbound SMS. Either or both of `text` and `pdu` are present
    SmsReceived {
        sender: String,
        date: String,
        pdu: Option<String>,
        text: Option<String>,
    },
    /// One part of an outbound SMS was accepted by the network
    SmsSendOk { id: Option<String>, part: u16 },
    /// One part of an outbound SMS failed
    SmsSendFailed { id: Option<String>, part: u16, reason: String },

    /// USSD answer for transaction `tid`
    UssdResult { tid: TransactionId, ok: bool, text: String },
    /// Operator scan answer for transaction `tid`
    OperatorList { tid: TransactionId, ok: bool, text: String },
    /// Raw command answer for transaction `tid`
    RawResult { tid: TransactionId, ok: bool, text: String },
}

/// Discriminant of GsmEvent, used as key into the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LinkUp,
    LinkDown,
    Alarm,
    NoAlarm,
    SimMissing,
    PinError,
    NoSignal,
    SignalLevel,
    PowerOn,
    PowerOff,
    DetectTimeout,
    Ring,
    Ringing,
    Proceeding,
    Progress,
    Answer,
    Hangup,
    HangupReq,
    HangupAck,
    RestartAck,
    SmsReceived,
    SmsSendOk,
    SmsSendFailed,
    UssdResult,
    OperatorList,
    RawResult,
}

impl GsmEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GsmEvent::LinkUp => EventKind::LinkUp,
            GsmEvent::LinkDown => EventKind::LinkDown,
            GsmEvent::Alarm => EventKind::Alarm,
            GsmEvent::NoAlarm => EventKind::NoAlarm,
            GsmEvent::SimMissing => EventKind::SimMissing,
            GsmEvent::PinError => EventKind::PinError,
            GsmEvent::NoSignal => EventKind::NoSignal,
            GsmEvent::SignalLevel { .. } => EventKind::SignalLevel,
            GsmEvent::PowerOn => EventKind::PowerOn,
            GsmEvent::PowerOff => EventKind::PowerOff,
            GsmEvent::DetectTimeout => EventKind::DetectTimeout,
            GsmEvent::Ring { .. } => EventKind::Ring,
            GsmEvent::Ringing { .. } => EventKind::Ringing,
            GsmEvent::Proceeding { .. } => EventKind::Proceeding,
            GsmEvent::Progress { .. } => EventKind::Progress,
            GsmEvent::Answer { .. } => EventKind::Answer,
            GsmEvent::Hangup { .. } => EventKind::Hangup,
            GsmEvent::HangupReq { .. } => EventKind::HangupReq,
            GsmEvent::HangupAck { .. } => EventKind::HangupAck,
            GsmEvent::RestartAck { .. } => EventKind::RestartAck,
            GsmEvent::SmsReceived { .. } => EventKind::SmsReceived,
            GsmEvent::SmsSendOk { .. } => EventKind::SmsSendOk,
            GsmEvent::SmsSendFailed { .. } => EventKind::SmsSendFailed,
            GsmEvent::UssdResult { .. } => EventKind::UssdResult,
            GsmEvent::OperatorList { .. } => EventKind::OperatorList,
            GsmEvent::RawResult { .. } => EventKind::RawResult,
        }
    }
}
