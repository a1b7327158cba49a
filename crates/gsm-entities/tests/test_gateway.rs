mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gsm_config::CfgSpan;
use gsm_core::{SpanId, cause, debug};
use gsm_entities::correlator::SlotKind;
use gsm_entities::engines::sim::{SimEngine, SimHandle, default_responder};
use gsm_entities::{Gateway, GatewayErr};
use gsm_saps::{CallLeg, CallerId, GsmCommand, GsmEvent, LegControl, NotificationKind, TransactionId};

use common::{RecordingFramework, temp_spool_dir, test_gateway_config, test_span_cfg, wait_until};

const WAIT: Duration = Duration::from_secs(3);

struct GatewayTest {
    gateway: Gateway,
    framework: Arc<RecordingFramework>,
    sim: SimHandle,
    dir: PathBuf,
}

impl GatewayTest {
    /// Gateway with span 1 on a simulated module. `prepare` runs before the worker starts.
    fn start_in(dir: PathBuf, prepare: impl FnOnce(&SimHandle)) -> Self {
        Self::start_with(test_span_cfg(1), dir, prepare)
    }

    /// Same, with a custom config for span 1
    fn start_with(span_cfg: CfgSpan, dir: PathBuf, prepare: impl FnOnce(&SimHandle)) -> Self {
        let config = test_gateway_config(vec![span_cfg], dir.clone());
        let framework = RecordingFramework::new();
        let mut gateway = Gateway::new(config, framework.clone()).unwrap();

        let (engine, sim, ready) = SimEngine::new();
        prepare(&sim);
        gateway.start_span(SpanId::new(1).unwrap(), Box::new(engine), ready).unwrap();
        Self {
            gateway,
            framework,
            sim,
            dir,
        }
    }

    fn start() -> Self {
        Self::start_in(temp_spool_dir(), |sim| sim.set_responder(default_responder()))
    }

    fn wait_up(&self) {
        assert!(
            wait_until(WAIT, || self.gateway.status(1).unwrap().availability.is_up()),
            "span never came up: {:?}",
            self.gateway.status(1)
        );
    }

    fn ring(&self, call: u32) {
        self.sim.inject(GsmEvent::Ring {
            call,
            channel: 0,
            caller: CallerId {
                number: "+4930123456".to_string(),
                ..Default::default()
            },
            called: Some("100".to_string()),
        });
        assert!(wait_until(WAIT, || self.framework.legs().len() == 1));
    }

    fn cleanup(mut self) {
        self.gateway.shutdown();
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn sentinel(dir: &Path) -> PathBuf {
    dir.join("power").join("span1.off")
}

#[test]
fn test_span_comes_up_and_answers_queries() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();
    assert_eq!(test.framework.count(NotificationKind::SpanUp), 1);

    let status = test.gateway.status(1).unwrap();
    assert!(status.module_alive);
    assert!(!status.call_active);
    assert!(status.description.contains("Active"));

    let answer = test.gateway.send_ussd(1, "*100#", Duration::from_secs(1)).unwrap();
    assert_eq!(answer, "USSD *100# accepted");
    let operators = test.gateway.query_operators(1, Duration::from_secs(1)).unwrap();
    assert!(operators.contains("SIM-NET"));
    assert_eq!(test.gateway.send_raw_command(1, "AT+CSQ", Duration::from_secs(1)).unwrap(), "OK");
    test.cleanup();
}

#[test]
fn test_unknown_and_unstarted_spans() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    assert_eq!(test.gateway.status(0).unwrap_err(), GatewayErr::InvalidSpan(0));
    assert_eq!(test.gateway.status(40).unwrap_err(), GatewayErr::InvalidSpan(40));
    assert_eq!(
        test.gateway.answer(7).unwrap_err(),
        GatewayErr::SpanNotConfigured(SpanId::new(7).unwrap())
    );
    assert_eq!(test.gateway.statuses().len(), 1);
    test.cleanup();
}

#[test]
fn test_busy_versus_timeout() {
    debug::setup_logging_verbose();
    // No responder: queries are never answered
    let test = GatewayTest::start_in(temp_spool_dir(), |_| {});
    test.wait_up();

    thread::scope(|s| {
        let first = s.spawn(|| test.gateway.send_ussd(1, "*101#", Duration::from_millis(400)));
        let slot_busy = || {
            test.gateway
                .span_control(1)
                .unwrap()
                .correlators
                .slot(SlotKind::Ussd)
                .is_busy()
        };
        assert!(wait_until(WAIT, slot_busy));

        let t0 = Instant::now();
        assert_eq!(test.gateway.send_ussd(1, "*102#", Duration::from_secs(1)), Err(GatewayErr::Busy));
        assert!(t0.elapsed() < Duration::from_millis(100));

        // A different slot is independent
        let t0 = Instant::now();
        assert_eq!(
            test.gateway.query_operators(1, Duration::from_millis(100)),
            Err(GatewayErr::Timeout)
        );
        assert!(t0.elapsed() >= Duration::from_millis(100));

        assert_eq!(first.join().unwrap(), Err(GatewayErr::Timeout));
    });
    test.cleanup();
}

#[test]
fn test_inbound_call_lifecycle() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();

    test.ring(7);
    let offer = &test.framework.offers()[0];
    assert_eq!(offer.exten, "100");
    assert_eq!(offer.caller.number, "+4930123456");
    assert_eq!(test.framework.count(NotificationKind::CallIncoming), 1);
    assert!(test.gateway.status(1).unwrap().call_active);

    test.gateway.answer(1).unwrap();
    assert!(test.sim.commands().contains(&GsmCommand::Answer { call: 7 }));
    assert!(test.gateway.answer(1).is_err());

    // Raw commands must not interfere with the call
    assert_eq!(
        test.gateway.send_raw_command(1, "AT+CFUN=1,1", Duration::from_millis(200)),
        Err(GatewayErr::CallInProgress(SpanId::new(1).unwrap()))
    );

    test.sim.inject(GsmEvent::Hangup {
        call: 7,
        cause: cause::NORMAL_CLEARING,
    });
    assert!(wait_until(WAIT, || !test.gateway.status(1).unwrap().call_active));
    assert_eq!(test.framework.count(NotificationKind::CallHangup), 1);

    let leg = test.framework.legs()[0].clone();
    let state = leg.lock();
    assert_eq!(state.hangup_cause, Some(cause::NORMAL_CLEARING));
    assert!(state.soft_hangup);
    drop(state);
    test.cleanup();
}

#[test]
fn test_declined_call_is_rejected() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();
    test.framework.set_decline(true);

    test.sim.inject(GsmEvent::Ring {
        call: 3,
        channel: 0,
        caller: CallerId::default(),
        called: None,
    });
    let rejected = GsmCommand::Reject {
        call: 3,
        cause: cause::SWITCH_CONGESTION,
    };
    assert!(wait_until(WAIT, || test.sim.commands().contains(&rejected)));
    assert!(wait_until(WAIT, || !test.gateway.status(1).unwrap().call_active));
    test.cleanup();
}

#[test]
fn test_outbound_call() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();

    let leg = CallLeg::new(SpanId::new(1).unwrap());
    let call = test.gateway.dial(1, "+4917000", false, leg.clone()).unwrap();
    assert!(wait_until(WAIT, || leg.lock().controls.contains(&LegControl::Proceeding)));

    let busy_leg = CallLeg::new(SpanId::new(1).unwrap());
    assert_eq!(
        test.gateway.dial(1, "+4917001", false, busy_leg),
        Err(GatewayErr::CallInProgress(SpanId::new(1).unwrap()))
    );

    test.gateway.hangup(1, cause::NORMAL_CLEARING).unwrap();
    assert!(test.sim.commands().contains(&GsmCommand::Hangup {
        call,
        cause: cause::NORMAL_CLEARING
    }));
    assert!(wait_until(WAIT, || !test.gateway.status(1).unwrap().call_active));

    // Leg teardown after the call is gone is accepted without another release
    let releases = test.sim.commands().len();
    assert_eq!(test.gateway.hangup(1, cause::NORMAL_CLEARING), Ok(()));
    assert_eq!(test.sim.commands().len(), releases);
    test.cleanup();
}

#[test]
fn test_hangup_without_call() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();
    assert_eq!(
        test.gateway.hangup(1, cause::NORMAL_CLEARING),
        Err(GatewayErr::NoCall(SpanId::new(1).unwrap()))
    );
    test.cleanup();
}

#[test]
fn test_silent_module_escalates_detection() {
    debug::setup_logging_verbose();
    // Loop ceiling is 100ms: soft check after ~0.5s, power cycle after ~1.5s
    let test = GatewayTest::start_in(temp_spool_dir(), |sim| sim.set_responsive(false));
    assert!(wait_until(Duration::from_secs(5), || test
        .sim
        .commands()
        .contains(&GsmCommand::PowerReset)));

    let commands = test.sim.commands();
    let soft_check = commands.iter().position(|c| *c == GsmCommand::DetectProbe);
    let cycle = commands.iter().position(|c| *c == GsmCommand::PowerReset);
    assert!(soft_check.is_some());
    assert!(soft_check < cycle, "soft check must come before the power cycle: {:?}", commands);
    // Initial start plus the one after the power cycle
    assert!(test.sim.module_starts() >= 2);
    assert!(!test.gateway.status(1).unwrap().module_alive);

    // Module finally answers, escalation stops
    test.sim.set_responsive(true);
    test.gateway.power_reset(1).unwrap();
    test.wait_up();
    assert!(test.gateway.status(1).unwrap().module_alive);
    test.cleanup();
}

#[test]
fn test_mirrored_events_reach_the_framework() {
    debug::setup_logging_verbose();
    let mut cfg = test_span_cfg(1);
    cfg.mirror_events = true;
    let test = GatewayTest::start_with(cfg, temp_spool_dir(), |sim| sim.set_responder(default_responder()));
    test.wait_up();

    // Power-on and link-up from the module start
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::EventTrace) == 2));
    test.sim.inject(GsmEvent::SignalLevel { rssi: 21 });
    test.sim.inject(GsmEvent::NoAlarm);
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::EventTrace) == 4));

    let traced: Vec<String> = test
        .framework
        .notifications()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::EventTrace)
        .map(|n| n.payload["event"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(traced, vec!["PowerOn", "LinkUp", "SignalLevel", "NoAlarm"]);
    test.cleanup();
}

#[test]
fn test_events_are_not_mirrored_by_default() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();
    test.sim.inject(GsmEvent::NoAlarm);
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::SpanNoAlarm) == 1));
    assert_eq!(test.framework.count(NotificationKind::EventTrace), 0);
    test.cleanup();
}

#[test]
fn test_dial_while_down() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start_in(temp_spool_dir(), |sim| sim.set_responsive(false));
    let leg = CallLeg::new(SpanId::new(1).unwrap());
    assert_eq!(
        test.gateway.dial(1, "+4917000", false, leg),
        Err(GatewayErr::SpanDown(SpanId::new(1).unwrap()))
    );
    assert_eq!(
        test.gateway.send_sms(1, "+4917000", "hello", None),
        Err(GatewayErr::SpanDown(SpanId::new(1).unwrap()))
    );
    test.cleanup();
}

#[test]
fn test_sms_job_reports_result() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();

    let parts = test.gateway.send_sms(1, "+4917000", &"z".repeat(300), Some("job-42")).unwrap();
    assert_eq!(parts, 2);
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::SmsJobResult) == 1));

    let result = test
        .framework
        .notifications()
        .into_iter()
        .find(|n| n.kind == NotificationKind::SmsJobResult)
        .unwrap();
    assert_eq!(result.payload["id"], "job-42");
    assert_eq!(result.payload["parts"], 2);
    assert_eq!(result.payload["success"], true);
    test.cleanup();
}

#[test]
fn test_failed_sms_is_persisted() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start_in(temp_spool_dir(), |sim| {
        sim.set_responder(Box::new(|command: &GsmCommand, _tid: TransactionId| match command {
            GsmCommand::SendSms { id, part, .. } => vec![GsmEvent::SmsSendFailed {
                id: id.clone(),
                part: *part,
                reason: "+CMS ERROR: 38".to_string(),
            }],
            _ => Vec::new(),
        }))
    });
    test.wait_up();

    test.gateway.send_sms(1, "+4917000", "short", Some("job/7")).unwrap();
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::SmsJobResult) == 1));

    let log = test.dir.join("failed").join("span1.log");
    assert!(wait_until(WAIT, || log.exists()));
    let line = fs::read_to_string(&log).unwrap();
    assert!(line.contains("+CMS ERROR: 38"));
    test.cleanup();
}

#[test]
fn test_inbound_sms_is_backed_up() {
    debug::setup_logging_verbose();
    let test = GatewayTest::start();
    test.wait_up();

    test.sim.inject(GsmEvent::SmsReceived {
        sender: "+4930999".to_string(),
        date: "26/10/19,12:00:00+08".to_string(),
        pdu: None,
        text: Some("ping".to_string()),
    });
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::SmsReceived) == 1));

    let backups = test.dir.join("sms").join("1");
    assert!(wait_until(WAIT, || fs::read_dir(&backups).map(|d| d.count() == 1).unwrap_or(false)));
    assert!(wait_until(WAIT, || test.sim.commands().contains(&GsmCommand::CleanupSmsStore)));
    test.cleanup();
}

#[test]
fn test_power_off_survives_restart() {
    debug::setup_logging_verbose();
    let dir = temp_spool_dir();
    let test = GatewayTest::start_in(dir.clone(), |sim| sim.set_responder(default_responder()));
    test.wait_up();

    test.gateway.power_off(1).unwrap();
    assert!(sentinel(&dir).exists());
    assert!(wait_until(WAIT, || test.framework.count(NotificationKind::PowerOff) == 1));
    assert!(wait_until(WAIT, || !test.gateway.status(1).unwrap().availability.is_up()));
    let mut gateway = test.gateway;
    gateway.shutdown();

    // Restarted gateway leaves the module off
    let test = GatewayTest::start_in(dir.clone(), |sim| sim.set_responder(default_responder()));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(test.sim.module_starts(), 0);
    assert!(!test.gateway.status(1).unwrap().availability.is_up());

    test.gateway.power_on(1).unwrap();
    assert!(!sentinel(&dir).exists());
    assert_eq!(test.sim.module_starts(), 1);
    test.wait_up();
    test.cleanup();
}
