use core::fmt;

/// Health bitmask of a span, as reported to the telephony framework.
///
/// Link-up is only meaningful for a provisioned span that is not in alarm;
/// `mark_up()` refuses to set it otherwise and every alarm path clears it.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Availability(u8);

impl Availability {
    pub const PROVISIONED: u8 = 1 << 0;
    pub const NOT_IN_ALARM: u8 = 1 << 1;
    pub const LINK_UP: u8 = 1 << 2;
    pub const NO_SIM: u8 = 1 << 3;
    pub const NO_SIGNAL: u8 = 1 << 4;
    pub const PIN_ERROR: u8 = 1 << 5;
    pub const POWERED: u8 = 1 << 6;

    pub fn provisioned() -> Self {
        Availability(Self::PROVISIONED)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn insert(&mut self, bits: u8) {
        self.0 |= bits;
    }

    pub fn remove(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    pub fn is_up(self) -> bool {
        self.contains(Self::LINK_UP)
    }

    /// Link came up. Clears the alarm condition along with SIM/PIN/signal faults.
    /// Returns false if the span is not provisioned, in which case nothing changes.
    pub fn mark_up(&mut self) -> bool {
        if !self.contains(Self::PROVISIONED) {
            return false;
        }
        self.remove(Self::NO_SIM | Self::NO_SIGNAL | Self::PIN_ERROR);
        self.insert(Self::LINK_UP | Self::NOT_IN_ALARM);
        true
    }

    pub fn mark_down(&mut self) {
        self.remove(Self::LINK_UP);
    }

    /// Raises one of the fault bits (NO_SIM, NO_SIGNAL, PIN_ERROR) and drops the link
    pub fn raise_fault(&mut self, fault: u8) {
        self.insert(fault);
        self.remove(Self::LINK_UP);
    }

    pub fn enter_alarm(&mut self) {
        self.remove(Self::NOT_IN_ALARM | Self::LINK_UP);
    }

    pub fn leave_alarm(&mut self) {
        self.insert(Self::NOT_IN_ALARM);
    }

    /// link-up implies provisioned and not-in-alarm
    pub fn is_consistent(self) -> bool {
        !self.is_up() || self.contains(Self::PROVISIONED | Self::NOT_IN_ALARM)
    }

    /// Human readable state, most severe condition first
    pub fn describe(self) -> String {
        if !self.contains(Self::PROVISIONED) {
            return "Not provisioned".to_string();
        }
        let mut parts: Vec<&str> = vec!["Provisioned"];
        if !self.contains(Self::POWERED) {
            parts.push("Powered off");
        }
        if self.contains(Self::NO_SIM) {
            parts.push("No SIM");
        }
        if self.contains(Self::PIN_ERROR) {
            parts.push("PIN error");
        }
        if self.contains(Self::NO_SIGNAL) {
            parts.push("No signal");
        }
        if !self.contains(Self::NOT_IN_ALARM) {
            parts.push("In Alarm");
        }
        parts.push(if self.is_up() { "Up" } else { "Down" });
        if self.is_up() && self.contains(Self::POWERED) {
            parts.push("Active");
        }
        parts.join(", ")
    }
}

impl fmt::Debug for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Availability({:#09b}: {})", self.0, self.describe())
    }
}
