use clap::Parser;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gsm_config::{EngineBackend, SharedConfig, toml_config};
use gsm_core::{STACK_VERSION, debug};
use gsm_entities::Gateway;
use gsm_entities::engines::sim::{SimEngine, default_responder};
use gsm_saps::{CallLeg, InboundCall, Notification, TelephonyFramework};

/// How often the span summary is logged
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

/// Stand-alone framework: accepts every call and writes events to the log
struct LogFramework;

impl TelephonyFramework for LogFramework {
    fn create_leg(&self, call: &InboundCall) -> Option<Arc<CallLeg>> {
        tracing::info!(
            span = call.span.number(),
            "incoming call {} from {:?} to {}@{}",
            call.call,
            call.caller.number,
            call.exten,
            call.context
        );
        Some(CallLeg::new(call.span))
    }

    fn leg_updated(&self, leg: &Arc<CallLeg>) {
        let state = leg.lock();
        tracing::debug!(span = leg.span.number(), "leg {}: {:?}", leg.id, *state);
    }

    fn notify(&self, notification: Notification) {
        tracing::info!(
            span = notification.span.number(),
            "{} {}",
            notification.kind.as_str(),
            notification.payload
        );
    }
}

/// Registers all configured spans and starts a worker for each, according to the backend
fn build_gateway(cfg: &SharedConfig) -> Gateway {
    let mut gateway = match Gateway::new(cfg.clone(), Arc::new(LogFramework)) {
        Ok(g) => g,
        Err(e) => {
            println!("Failed to set up gateway: {}", e);
            std::process::exit(1);
        }
    };

    match cfg.config().backend {
        EngineBackend::None => {
            eprintln!(" -> No engine backend, spans are registered only");
        }
        EngineBackend::Sim => {
            for span_cfg in &cfg.config().spans {
                let (engine, sim, ready) = SimEngine::new();
                sim.set_responder(default_responder());
                if let Err(e) = gateway.start_span(span_cfg.span, Box::new(engine), ready) {
                    println!("Failed to start span {}: {}", span_cfg.span, e);
                    std::process::exit(1);
                }
            }
            eprintln!(" -> Simulated modems on {} span(s)", cfg.config().spans.len());
        }
    }
    gateway
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "GSM span gateway",
    long_about = "Runs the GSM span gateway control plane using the provided TOML configuration file"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with spool, policy and span parameters")]
    config: String,
}

fn main() {
    eprintln!("gsm-gateway {}\n", STACK_VERSION);

    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = debug::setup_logging_default(cfg.config().debug_log.clone());

    let mut gateway = build_gateway(&cfg);

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        println!("Failed to set Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let mut last_status = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            for status in gateway.statuses() {
                tracing::info!(
                    span = status.span.number(),
                    "{}{}{}",
                    status.description,
                    if status.call_active { ", call up" } else { "" },
                    if status.resetting { ", resetting" } else { "" }
                );
            }
        }
    }

    tracing::info!("shutting down");
    gateway.shutdown();
}
