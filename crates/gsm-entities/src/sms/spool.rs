//! On-disk state: inbound SMS backups, outbound failure records and power-off sentinels

use core::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use gsm_config::CfgSpool;
use gsm_core::SpanId;

use super::delivery::{InboundSms, SmsFailure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpoolErr {
    Io { path: PathBuf, reason: String },
    Encode(String),
}

impl fmt::Display for SpoolErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpoolErr::Io { path, reason } => write!(f, "{}: {}", path.display(), reason),
            SpoolErr::Encode(reason) => write!(f, "encode: {}", reason),
        }
    }
}

impl std::error::Error for SpoolErr {}

fn io_err(path: &Path, e: std::io::Error) -> SpoolErr {
    SpoolErr::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn ensure_parent(path: &Path) -> Result<(), SpoolErr> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir).map_err(|e| io_err(dir, e)),
        None => Ok(()),
    }
}

/// Correlation ids come from the framework; keep them to one harmless path component
fn sanitize_id(id: &str) -> String {
    let s: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if s.is_empty() || s.chars().all(|c| c == '.') { "_".to_string() } else { s }
}

#[derive(Debug, Clone)]
pub struct Spool {
    cfg: CfgSpool,
}

impl Spool {
    pub fn new(cfg: CfgSpool) -> Self {
        Self { cfg }
    }

    /// Writes one JSON file per received message, named by arrival time
    pub fn backup_inbound(&self, sms: &InboundSms) -> Result<PathBuf, SpoolErr> {
        let span = SpanId::new(sms.span).map_err(|e| SpoolErr::Encode(e.to_string()))?;
        let dir = self.cfg.sms_backup_dir(span);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let json = serde_json::to_string_pretty(sms).map_err(|e| SpoolErr::Encode(e.to_string()))?;

        let stamp = Local::now().format("%Y%m%d-%H%M%S%.6f").to_string();
        for n in 0..100 {
            let name = if n == 0 { format!("{}.json", stamp) } else { format!("{}-{}.json", stamp, n) };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    f.write_all(json.as_bytes()).map_err(|e| io_err(&path, e))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        Err(SpoolErr::Io {
            path: dir,
            reason: "no free backup file name".to_string(),
        })
    }

    /// Bumps the failure counter of the job id and appends the record to the span's
    /// failure log. Returns the new counter value.
    pub fn record_failure(&self, failure: &SmsFailure) -> Result<u32, SpoolErr> {
        let span = SpanId::new(failure.span).map_err(|e| SpoolErr::Encode(e.to_string()))?;

        let counter = self.cfg.retry_counter(&sanitize_id(&failure.id));
        ensure_parent(&counter)?;
        let count = self.retry_count(&failure.id) + 1;
        fs::write(&counter, count.to_string()).map_err(|e| io_err(&counter, e))?;

        let log = self.cfg.failure_log(span);
        ensure_parent(&log)?;
        let line = serde_json::to_string(failure).map_err(|e| SpoolErr::Encode(e.to_string()))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(|e| io_err(&log, e))?;
        writeln!(f, "{}", line).map_err(|e| io_err(&log, e))?;
        Ok(count)
    }

    /// Failures recorded so far for a correlation id, 0 if none
    pub fn retry_count(&self, id: &str) -> u32 {
        let path = self.cfg.retry_counter(&sanitize_id(id));
        fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn is_powered_off(&self, span: SpanId) -> bool {
        self.cfg.power_off_sentinel(span).exists()
    }

    pub fn set_powered_off(&self, span: SpanId, off: bool) -> Result<(), SpoolErr> {
        let path = self.cfg.power_off_sentinel(span);
        if off {
            ensure_parent(&path)?;
            fs::write(&path, Local::now().to_rfc3339()).map_err(|e| io_err(&path, e))
        } else {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(io_err(&path, e)),
                _ => Ok(()),
            }
        }
    }
}
