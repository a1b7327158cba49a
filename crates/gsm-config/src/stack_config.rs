use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gsm_core::SpanId;

/// The protocol engine backend driving the modems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EngineBackend {
    /// No engine, spans are registered but never started. For testing
    None,
    /// Scripted in-process modem simulation
    Sim,
}

/// Spool directory layout for persisted SMS and power state
#[derive(Debug, Clone)]
pub struct CfgSpool {
    pub dir: PathBuf,
}

impl CfgSpool {
    /// Inbound SMS backups, one directory per span
    pub fn sms_backup_dir(&self, span: SpanId) -> PathBuf {
        self.dir.join("sms").join(span.number().to_string())
    }

    /// Append-only log of failed outbound SMS parts for a span
    pub fn failure_log(&self, span: SpanId) -> PathBuf {
        self.dir.join("failed").join(format!("span{}.log", span.number()))
    }

    /// Numeric failure counter for an outbound SMS correlation id
    pub fn retry_counter(&self, id: &str) -> PathBuf {
        self.dir.join("failed").join("retries").join(id)
    }

    /// Present while a span was powered off by the operator
    pub fn power_off_sentinel(&self, span: SpanId) -> PathBuf {
        self.dir.join("power").join(format!("span{}.off", span.number()))
    }
}

impl Default for CfgSpool {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/spool/gsm-gateway"),
        }
    }
}

/// Timing and escalation constants of the span worker loop
#[derive(Debug, Clone)]
pub struct CfgLoopPolicy {
    /// Upper bound on a single wait for transport readiness
    pub loop_ceiling: Duration,
    /// Tighter bound while an idle-channel reset sweep is in progress
    pub sweep_ceiling: Duration,
    /// Every n-th detection timeout sends a light probe
    pub detect_probe_every: u32,
    /// Every n-th detection timeout forces a power cycle
    pub power_cycle_every: u32,
    /// After n detection timeouts, stop retrying
    pub give_up_after: u32,
    /// Delay added to the reset baseline when the link comes up
    pub link_up_grace: Duration,
}

impl Default for CfgLoopPolicy {
    fn default() -> Self {
        Self {
            loop_ceiling: Duration::from_millis(1500),
            sweep_ceiling: Duration::from_millis(1000),
            detect_probe_every: 5,
            power_cycle_every: 15,
            give_up_after: 30,
            link_up_grace: Duration::from_secs(5),
        }
    }
}

/// Most bearer channels a span may declare (a full E1 trunk)
pub const MAX_CHANNELS: u32 = 31;

/// Per-span configuration
#[derive(Debug, Clone)]
pub struct CfgSpan {
    pub span: SpanId,
    /// Number of bearer channels. GSM modules carry one
    pub channels: u32,
    /// Idle channel reset sweep interval. None disables the sweep
    pub reset_interval: Option<Duration>,
    /// Accept calls with restricted caller presentation
    pub allow_anonymous: bool,
    /// Route calls without dialed digits to the "s" extension
    pub immediate: bool,
    pub default_exten: String,
    pub context: String,
    /// Keep calls up across span alarms (T309 running)
    pub t309_enabled: bool,
    /// Forward every protocol event to the framework's event sink
    pub mirror_events: bool,
}

impl CfgSpan {
    pub fn new(span: SpanId) -> Self {
        Self {
            span,
            channels: 1,
            reset_interval: None,
            allow_anonymous: true,
            immediate: false,
            default_exten: default_exten(),
            context: default_context(),
            t309_enabled: false,
            mirror_events: false,
        }
    }
}

#[inline]
pub fn default_exten() -> String {
    "s".to_string()
}

#[inline]
pub fn default_context() -> String {
    "from-gsm".to_string()
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub debug_log: Option<String>,
    pub backend: EngineBackend,
    pub spool: CfgSpool,
    pub policy: CfgLoopPolicy,
    pub spans: Vec<CfgSpan>,
}

impl GatewayConfig {
    pub fn new(backend: EngineBackend) -> Self {
        GatewayConfig {
            debug_log: None,
            backend,
            spool: CfgSpool::default(),
            policy: CfgLoopPolicy::default(),
            spans: vec![],
        }
    }

    pub fn span(&self, span: SpanId) -> Option<&CfgSpan> {
        self.spans.iter().find(|s| s.span == span)
    }

    /// Validate that all required configuration fields are properly set.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for span in &self.spans {
            if !seen.insert(span.span) {
                return Err(format!("span {} configured more than once", span.span));
            }
            if span.channels == 0 || span.channels > MAX_CHANNELS {
                return Err(format!("span {} channels must be within 1..={}", span.span, MAX_CHANNELS));
            }
            if span.reset_interval == Some(Duration::ZERO) {
                return Err(format!("span {} reset_interval must be positive or -1", span.span));
            }
        }

        let p = &self.policy;
        if p.detect_probe_every == 0 || p.power_cycle_every == 0 || p.give_up_after == 0 {
            return Err("policy detection multiples must be non-zero".to_string());
        }
        if p.loop_ceiling.is_zero() || p.sweep_ceiling.is_zero() {
            return Err("policy loop ceilings must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Global shared configuration, immutable after construction.
#[derive(Clone, Debug)]
pub struct SharedConfig {
    cfg: Arc<GatewayConfig>,
}

impl SharedConfig {
    /// Validates and wraps a configuration
    pub fn from_config(cfg: GatewayConfig) -> Result<Self, String> {
        cfg.validate()?;
        Ok(Self { cfg: Arc::new(cfg) })
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<GatewayConfig> {
        Arc::clone(&self.cfg)
    }
}
