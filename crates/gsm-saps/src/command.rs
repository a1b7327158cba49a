use gsm_core::CallRef;

/// Commands submitted to the protocol engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GsmCommand {
    /// Originate a call. The engine answers with the call reference as transaction id
    Dial { number: String, hide_caller: bool },
    Answer { call: CallRef },
    /// Release a call (also used to retry a release that was not acknowledged)
    Hangup { call: CallRef, cause: u8 },
    /// Decline an incoming call before it is offered to the framework
    Reject { call: CallRef, cause: u8 },

    /// Submit one text part of an SMS job
    SendSms {
        dest: String,
        text: String,
        id: Option<String>,
        part: u16,
        total: u16,
    },
    /// Submit a pre-encoded PDU
    SendPdu { pdu: String, id: Option<String> },
    /// Delete read messages from the module's own SMS store
    CleanupSmsStore,

    SendUssd { code: String },
    QueryOperators,
    Raw { command: String },

    PowerOn,
    PowerOff,
    PowerReset,
    /// Lightweight "are you there" probe during module detection
    DetectProbe,
}
