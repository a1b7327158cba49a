use gsm_core::cause;

/// Caller-visible outcome of a protocol release cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupOutcome {
    Busy,
    Congestion,
    /// Plain teardown of the leg
    Failure,
}

impl HangupOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            HangupOutcome::Busy => "busy",
            HangupOutcome::Congestion => "congestion",
            HangupOutcome::Failure => "failure",
        }
    }
}

/// Maps a Q.850 release cause to the outcome signalled on the framework leg.
/// Unlisted causes are a generic failure.
pub fn map_cause(cause_value: u8) -> HangupOutcome {
    match cause_value {
        cause::USER_BUSY => HangupOutcome::Busy,
        cause::CALL_REJECTED
        | cause::NETWORK_OUT_OF_ORDER
        | cause::NORMAL_CIRCUIT_CONGESTION
        | cause::SWITCH_CONGESTION
        | cause::DESTINATION_OUT_OF_ORDER
        | cause::NORMAL_TEMPORARY_FAILURE => HangupOutcome::Congestion,
        _ => HangupOutcome::Failure,
    }
}

/// Causes after which the bearer channel must be restarted before reuse
pub fn forces_channel_reset(cause_value: u8) -> bool {
    cause_value == cause::REQUESTED_CHAN_UNAVAIL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_table() {
        assert_eq!(map_cause(cause::USER_BUSY), HangupOutcome::Busy);
        assert_eq!(map_cause(cause::SWITCH_CONGESTION), HangupOutcome::Congestion);
        assert_eq!(map_cause(cause::NETWORK_OUT_OF_ORDER), HangupOutcome::Congestion);
        assert_eq!(map_cause(cause::NORMAL_CLEARING), HangupOutcome::Failure);
        assert_eq!(map_cause(cause::REQUESTED_CHAN_UNAVAIL), HangupOutcome::Failure);
        assert_eq!(map_cause(200), HangupOutcome::Failure);

        assert!(forces_channel_reset(cause::REQUESTED_CHAN_UNAVAIL));
        assert!(!forces_channel_reset(cause::NORMAL_CLEARING));
    }
}
