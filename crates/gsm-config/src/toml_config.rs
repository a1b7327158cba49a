use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gsm_core::SpanId;
use serde::Deserialize;
use toml::Value;

use super::stack_config::{CfgLoopPolicy, CfgSpan, CfgSpool, EngineBackend, GatewayConfig, SharedConfig, default_context, default_exten};

/// Build `SharedConfig` from a TOML configuration string
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    let expected_config_version = "0.1";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if !root.engine.extra.is_empty() {
        return Err(format!("Unrecognized fields: engine::{:?}", sorted_keys(&root.engine.extra)).into());
    }
    if let Some(ref spool) = root.spool {
        if !spool.extra.is_empty() {
            return Err(format!("Unrecognized fields: spool::{:?}", sorted_keys(&spool.extra)).into());
        }
    }
    if let Some(ref policy) = root.policy {
        if !policy.extra.is_empty() {
            return Err(format!("Unrecognized fields: policy::{:?}", sorted_keys(&policy.extra)).into());
        }
    }
    for span in &root.span {
        if !span.extra.is_empty() {
            return Err(format!("Unrecognized fields in span {}: {:?}", span.span, sorted_keys(&span.extra)).into());
        }
    }

    let mut cfg = GatewayConfig::new(root.engine.backend);
    cfg.debug_log = root.debug_log;

    if let Some(spool) = root.spool {
        cfg.spool = CfgSpool { dir: PathBuf::from(spool.dir) };
    }
    if let Some(policy) = root.policy {
        apply_policy_patch(&mut cfg.policy, policy);
    }
    for span in root.span {
        cfg.spans.push(build_span(span)?);
    }

    Ok(SharedConfig::from_config(cfg)?)
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    let cfg = from_reader(r)?;
    Ok(cfg)
}

fn apply_policy_patch(dst: &mut CfgLoopPolicy, src: PolicyDto) {
    if let Some(v) = src.loop_ceiling_ms {
        dst.loop_ceiling = Duration::from_millis(v);
    }
    if let Some(v) = src.sweep_ceiling_ms {
        dst.sweep_ceiling = Duration::from_millis(v);
    }
    if let Some(v) = src.detect_probe_every {
        dst.detect_probe_every = v;
    }
    if let Some(v) = src.power_cycle_every {
        dst.power_cycle_every = v;
    }
    if let Some(v) = src.give_up_after {
        dst.give_up_after = v;
    }
    if let Some(v) = src.link_up_grace_secs {
        dst.link_up_grace = Duration::from_secs(v);
    }
}

fn build_span(src: SpanDto) -> Result<CfgSpan, Box<dyn std::error::Error>> {
    let span = SpanId::new(src.span)?;
    let mut dst = CfgSpan::new(span);

    if let Some(v) = src.channels {
        dst.channels = v;
    }
    // Negative means never, as does leaving the field out
    dst.reset_interval = match src.reset_interval {
        Some(secs) if secs >= 0 => Some(Duration::from_secs(secs as u64)),
        _ => None,
    };
    if let Some(v) = src.allow_anonymous {
        dst.allow_anonymous = v;
    }
    if let Some(v) = src.immediate {
        dst.immediate = v;
    }
    dst.default_exten = src.default_exten.unwrap_or_else(default_exten);
    dst.context = src.context.unwrap_or_else(default_context);
    if let Some(v) = src.t309_enabled {
        dst.t309_enabled = v;
    }
    if let Some(v) = src.mirror_events {
        dst.mirror_events = v;
    }
    Ok(dst)
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&str> {
    let mut v: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,

    engine: EngineDto,

    #[serde(default)]
    spool: Option<SpoolDto>,

    #[serde(default)]
    policy: Option<PolicyDto>,

    #[serde(default)]
    span: Vec<SpanDto>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct EngineDto {
    backend: EngineBackend,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct SpoolDto {
    dir: String,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct PolicyDto {
    loop_ceiling_ms: Option<u64>,
    sweep_ceiling_ms: Option<u64>,
    detect_probe_every: Option<u32>,
    power_cycle_every: Option<u32>,
    give_up_after: Option<u32>,
    link_up_grace_secs: Option<u64>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct SpanDto {
    span: u32,
    channels: Option<u32>,
    reset_interval: Option<i64>,
    allow_anonymous: Option<bool>,
    immediate: Option<bool>,
    default_exten: Option<String>,
    context: Option<String>,
    t309_enabled: Option<bool>,
    mirror_events: Option<bool>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}
