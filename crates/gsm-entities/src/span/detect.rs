use gsm_config::CfgLoopPolicy;

/// What the worker should do after a wait timed out while the module is not confirmed alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectAction {
    Wait,
    Probe,
    PowerCycle,
    /// Retry budget exhausted, stop escalating
    GiveUp,
}

/// Escalation counter for module detection: soft probe, then power cycle, then give up
#[derive(Debug, Default, Clone)]
pub struct DetectState {
    pub timeouts: u32,
    pub gave_up: bool,
}

impl DetectState {
    pub fn on_timeout(&mut self, policy: &CfgLoopPolicy) -> DetectAction {
        if self.gave_up {
            return DetectAction::Wait;
        }
        self.timeouts += 1;
        let n = self.timeouts;
        if n % policy.give_up_after == 0 {
            self.gave_up = true;
            DetectAction::GiveUp
        } else if n % policy.power_cycle_every == 0 {
            DetectAction::PowerCycle
        } else if n % policy.detect_probe_every == 0 {
            DetectAction::Probe
        } else {
            DetectAction::Wait
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
