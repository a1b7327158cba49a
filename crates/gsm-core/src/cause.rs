//! Q.850 release cause values carried by protocol hangup events and commands

pub const UNALLOCATED: u8 = 1;
pub const NORMAL_CLEARING: u8 = 16;
pub const USER_BUSY: u8 = 17;
pub const NO_USER_RESPONSE: u8 = 18;
pub const NO_ANSWER: u8 = 19;
pub const CALL_REJECTED: u8 = 21;
pub const DESTINATION_OUT_OF_ORDER: u8 = 27;
pub const INVALID_NUMBER_FORMAT: u8 = 28;
pub const NORMAL_UNSPECIFIED: u8 = 31;
pub const NORMAL_CIRCUIT_CONGESTION: u8 = 34;
pub const NETWORK_OUT_OF_ORDER: u8 = 38;
pub const NORMAL_TEMPORARY_FAILURE: u8 = 41;
pub const SWITCH_CONGESTION: u8 = 42;
pub const REQUESTED_CHAN_UNAVAIL: u8 = 44;
pub const RESOURCE_UNAVAIL_UNSPECIFIED: u8 = 47;
pub const FACILITY_REJECTED: u8 = 29;
pub const INTERWORKING: u8 = 127;

/// Short mnemonic for log output
pub fn cause_name(cause: u8) -> &'static str {
    match cause {
        UNALLOCATED => "UNALLOCATED",
        NORMAL_CLEARING => "NORMAL_CLEARING",
        USER_BUSY => "USER_BUSY",
        NO_USER_RESPONSE => "NO_USER_RESPONSE",
        NO_ANSWER => "NO_ANSWER",
        CALL_REJECTED => "CALL_REJECTED",
        DESTINATION_OUT_OF_ORDER => "DESTINATION_OUT_OF_ORDER",
        INVALID_NUMBER_FORMAT => "INVALID_NUMBER_FORMAT",
        FACILITY_REJECTED => "FACILITY_REJECTED",
        NORMAL_UNSPECIFIED => "NORMAL_UNSPECIFIED",
        NORMAL_CIRCUIT_CONGESTION => "NORMAL_CIRCUIT_CONGESTION",
        NETWORK_OUT_OF_ORDER => "NETWORK_OUT_OF_ORDER",
        NORMAL_TEMPORARY_FAILURE => "NORMAL_TEMPORARY_FAILURE",
        SWITCH_CONGESTION => "SWITCH_CONGESTION",
        REQUESTED_CHAN_UNAVAIL => "REQUESTED_CHAN_UNAVAIL",
        RESOURCE_UNAVAIL_UNSPECIFIED => "RESOURCE_UNAVAIL_UNSPECIFIED",
        INTERWORKING => "INTERWORKING",
        _ => "UNKNOWN",
    }
}
