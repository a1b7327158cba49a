use std::path::PathBuf;
use std::time::{Duration, Instant};

use gsm_config::{CfgLoopPolicy, CfgSpan, CfgSpool, EngineBackend, GatewayConfig, SharedConfig};
use gsm_core::SpanId;
use gsm_entities::dispatch::{self, Effect, LegAction};
use gsm_entities::SpanState;
use gsm_entities::alarm::reset_mgr;
use gsm_saps::{GsmCommand, GsmEvent, NotificationKind};

/// Span config used by most tests. Can still be modified before use.
pub fn test_span_cfg(span: u32) -> CfgSpan {
    CfgSpan::new(SpanId::new(span).unwrap())
}

/// Fresh spool directory under the system temp dir
pub fn temp_spool_dir() -> PathBuf {
    std::env::temp_dir().join(format!("gsm-test-{}", uuid::Uuid::new_v4()))
}

/// Gateway config with the given spans and a private spool directory
pub fn test_gateway_config(spans: Vec<CfgSpan>, spool_dir: PathBuf) -> SharedConfig {
    let mut cfg = GatewayConfig::new(EngineBackend::Sim);
    cfg.spool = CfgSpool { dir: spool_dir };
    // Short waits keep the tests quick
    cfg.policy.loop_ceiling = Duration::from_millis(100);
    cfg.policy.sweep_ceiling = Duration::from_millis(50);
    cfg.spans = spans;
    SharedConfig::from_config(cfg).unwrap()
}

/// Drives one span state directly through the dispatch table, with a synthetic clock
pub struct SpanTest {
    pub state: SpanState,
    pub now: Instant,
}

impl SpanTest {
    pub fn new(cfg: CfgSpan) -> Self {
        let now = Instant::now();
        Self {
            state: SpanState::new(cfg, CfgLoopPolicy::default(), now),
            now,
        }
    }

    /// Span with the link already up
    pub fn with_link_up(cfg: CfgSpan) -> Self {
        let mut test = Self::new(cfg);
        test.feed(GsmEvent::PowerOn);
        test.feed(GsmEvent::LinkUp);
        assert!(test.state.availability.is_up());
        test
    }

    pub fn feed(&mut self, event: GsmEvent) -> Vec<Effect> {
        let effects = dispatch::dispatch(&mut self.state, &event, self.now);
        assert!(self.state.is_consistent(), "inconsistent after {:?}: {:?}", event, self.state);
        effects
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// One worker loop iteration worth of alarm manager work
    pub fn tick(&mut self) -> Vec<Effect> {
        reset_mgr::poll_sweep(&mut self.state, self.now)
    }
}

pub fn engine_commands(effects: &[Effect]) -> Vec<GsmCommand> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Engine(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

pub fn count_notifications(effects: &[Effect], kind: NotificationKind) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Notify(n) if n.kind == kind))
        .count()
}

pub fn leg_actions(effects: &[Effect]) -> Vec<LegAction> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Leg { action, .. } => Some(action.clone()),
            _ => None,
        })
        .collect()
}

pub fn creates_leg(effects: &[Effect]) -> bool {
    effects.iter().any(|e| matches!(e, Effect::CreateLeg(_)))
}

/// Polls `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
