mod common;

use std::sync::Arc;

use gsm_core::{cause, debug};
use gsm_entities::call::call_fsm;
use gsm_entities::call::cause_map::HangupOutcome;
use gsm_entities::dispatch::{Effect, LegAction};
use gsm_entities::span::span_state::CallPhase;
use gsm_saps::{CallLeg, CallerId, GsmCommand, GsmEvent, LegControl, LegState, NotificationKind};
use proptest::prelude::*;

use common::{SpanTest, count_notifications, creates_leg, engine_commands, leg_actions, test_span_cfg};

fn ring(call: u32, number: &str) -> GsmEvent {
    GsmEvent::Ring {
        call,
        channel: 0,
        caller: CallerId {
            number: number.to_string(),
            name: String::new(),
            anonymous: false,
        },
        called: None,
    }
}

fn anonymous_ring(call: u32) -> GsmEvent {
    GsmEvent::Ring {
        call,
        channel: 0,
        caller: CallerId {
            anonymous: true,
            ..Default::default()
        },
        called: None,
    }
}

/// Rings and attaches a framework leg, as the worker does after create_leg
fn offer_and_attach(test: &mut SpanTest, call: u32) -> Arc<CallLeg> {
    let effects = test.feed(ring(call, "+4915112345"));
    assert!(creates_leg(&effects));
    let leg = CallLeg::new(test.state.span);
    assert!(call_fsm::attach_leg(&mut test.state, call, leg.clone()));
    leg
}

#[test]
fn test_anonymous_call_rejected_without_slot() {
    debug::setup_logging_verbose();
    let mut cfg = test_span_cfg(1);
    cfg.allow_anonymous = false;
    let mut test = SpanTest::with_link_up(cfg);

    let effects = test.feed(anonymous_ring(5));
    assert_eq!(
        engine_commands(&effects),
        vec![GsmCommand::Reject {
            call: 5,
            cause: cause::CALL_REJECTED
        }]
    );
    assert!(!creates_leg(&effects));
    assert!(test.state.call.is_none());

    // Allowed by default
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    let effects = test.feed(anonymous_ring(5));
    assert!(creates_leg(&effects));
    assert!(test.state.call.is_some());
}

#[test]
fn test_extension_resolution() {
    debug::setup_logging_verbose();
    let mut cfg = test_span_cfg(1);
    cfg.default_exten = "100".to_string();
    cfg.context = "gsm-in".to_string();
    let mut test = SpanTest::with_link_up(cfg.clone());

    let effects = test.feed(ring(1, "123"));
    let offer = effects
        .iter()
        .find_map(|e| match e {
            Effect::CreateLeg(offer) => Some(offer.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(offer.exten, "100");
    assert_eq!(offer.context, "gsm-in");
    assert_eq!(offer.caller.number, "123");
    assert_eq!(count_notifications(&effects, NotificationKind::CallIncoming), 1);

    cfg.immediate = true;
    let mut test = SpanTest::with_link_up(cfg.clone());
    test.feed(ring(1, "123"));
    assert_eq!(test.state.call.as_ref().unwrap().exten, "s");

    let mut test = SpanTest::with_link_up(cfg);
    test.feed(GsmEvent::Ring {
        call: 1,
        channel: 0,
        caller: CallerId::default(),
        called: Some("555".to_string()),
    });
    assert_eq!(test.state.call.as_ref().unwrap().exten, "555");
}

#[test]
fn test_second_ring_is_busy_and_duplicate_is_rejected() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 1);

    let effects = test.feed(ring(2, "999"));
    assert_eq!(
        engine_commands(&effects),
        vec![GsmCommand::Reject {
            call: 2,
            cause: cause::USER_BUSY
        }]
    );
    assert!(!creates_leg(&effects));

    let effects = test.feed(ring(1, "+4915112345"));
    assert_eq!(
        engine_commands(&effects),
        vec![GsmCommand::Reject {
            call: 1,
            cause: cause::CALL_REJECTED
        }]
    );
    assert!(!creates_leg(&effects));
    assert_eq!(test.state.call.as_ref().unwrap().call, 1);
}

#[test]
fn test_duplicate_hangup_notifies_once() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 7);

    let hangup = GsmEvent::Hangup {
        call: 7,
        cause: cause::NORMAL_CLEARING,
    };
    let first = test.feed(hangup.clone());
    let second = test.feed(hangup);

    let teardowns = |effects: &[Effect]| {
        leg_actions(effects)
            .iter()
            .filter(|a| matches!(a, LegAction::Hangup { .. } | LegAction::ForceHangup { .. }))
            .count()
            + count_notifications(effects, NotificationKind::CallHangup)
    };
    assert_eq!(teardowns(&first), 2);
    assert_eq!(teardowns(&second), 0);

    // The release is retried, nothing else
    let release = GsmCommand::Hangup {
        call: 7,
        cause: cause::NORMAL_CLEARING,
    };
    assert_eq!(engine_commands(&first), vec![release.clone()]);
    assert_eq!(engine_commands(&second), vec![release]);
    assert!(test.state.call.is_none());
    assert!(test.state.already_hungup);

    // A new call clears the guard
    offer_and_attach(&mut test, 8);
    assert!(!test.state.already_hungup);
}

#[test]
fn test_cause_mapping_on_leg() {
    debug::setup_logging_verbose();
    let cases = [
        (cause::USER_BUSY, HangupOutcome::Busy),
        (cause::SWITCH_CONGESTION, HangupOutcome::Congestion),
        (cause::NORMAL_CLEARING, HangupOutcome::Failure),
        (99, HangupOutcome::Failure),
    ];
    for (cause_value, expected) in cases {
        let mut test = SpanTest::with_link_up(test_span_cfg(1));
        offer_and_attach(&mut test, 3);
        let effects = test.feed(GsmEvent::HangupReq {
            call: 3,
            cause: cause_value,
        });
        assert_eq!(
            leg_actions(&effects),
            vec![LegAction::Hangup {
                cause: cause_value,
                outcome: expected
            }]
        );
    }

    let mut leg = LegState::default();
    call_fsm::apply_leg_action(
        &mut leg,
        &LegAction::Hangup {
            cause: cause::USER_BUSY,
            outcome: HangupOutcome::Busy,
        },
    );
    assert_eq!(leg.controls, vec![LegControl::Busy]);
    assert!(!leg.soft_hangup);

    let mut leg = LegState::default();
    call_fsm::apply_leg_action(
        &mut leg,
        &LegAction::Hangup {
            cause: cause::NORMAL_CLEARING,
            outcome: HangupOutcome::Failure,
        },
    );
    assert!(leg.soft_hangup);
    assert_eq!(leg.hangup_cause, Some(cause::NORMAL_CLEARING));
}

#[test]
fn test_channel_unavailable_forces_reset() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 4);
    test.state.resetting = true;

    let effects = test.feed(GsmEvent::Hangup {
        call: 4,
        cause: cause::REQUESTED_CHAN_UNAVAIL,
    });
    assert!(effects.iter().any(|e| matches!(e, Effect::EngineReset(0))));
    assert!(!test.state.resetting);
    assert_eq!(test.state.reset_cursor, -1);
}

#[test]
fn test_hangup_ack_clears_slot() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 9);
    test.state.resetting = true;

    // Framework hangs up first, the ack completes the teardown
    let cmd = call_fsm::hangup_local(&mut test.state, cause::NORMAL_CLEARING).unwrap();
    assert_eq!(
        cmd,
        Some(GsmCommand::Hangup {
            call: 9,
            cause: cause::NORMAL_CLEARING
        })
    );
    assert_eq!(test.state.call.as_ref().unwrap().phase, CallPhase::HungUp);

    // Repeated local hangup only retries the release
    let cmd = call_fsm::hangup_local(&mut test.state, cause::NORMAL_CLEARING).unwrap();
    assert!(matches!(cmd, Some(GsmCommand::Hangup { call: 9, .. })));
    assert!(test.state.call.is_some());

    test.feed(GsmEvent::HangupAck { call: 9 });
    assert!(test.state.call.is_none());
    assert!(!test.state.resetting);
}

#[test]
fn test_network_hangup_after_local_hangup_frees_slot() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 1);
    call_fsm::hangup_local(&mut test.state, cause::NORMAL_CLEARING).unwrap();
    test.state.resetting = true;

    // Network clears instead of acking: release retried, no second notification
    let effects = test.feed(GsmEvent::Hangup {
        call: 1,
        cause: cause::NORMAL_CLEARING,
    });
    assert_eq!(count_notifications(&effects, NotificationKind::CallHangup), 0);
    assert_eq!(
        engine_commands(&effects),
        vec![GsmCommand::Hangup {
            call: 1,
            cause: cause::NORMAL_CLEARING
        }]
    );
    assert!(test.state.call.is_none());
    assert!(!test.state.resetting);

    // The span takes the next call instead of answering busy
    let effects = test.feed(ring(2, "+4930111"));
    assert!(creates_leg(&effects));
    assert!(engine_commands(&effects).is_empty());
}

#[test]
fn test_stale_ack_keeps_newer_call() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 1);
    test.feed(GsmEvent::Hangup {
        call: 1,
        cause: cause::NORMAL_CLEARING,
    });
    let leg2 = offer_and_attach(&mut test, 2);

    // Ack for the first call arrives after the second one rang
    assert!(test.feed(GsmEvent::HangupAck { call: 1 }).is_empty());
    assert_eq!(test.state.call.as_ref().map(|c| c.call), Some(2));

    let effects = test.feed(GsmEvent::Hangup {
        call: 2,
        cause: cause::USER_BUSY,
    });
    assert_eq!(count_notifications(&effects, NotificationKind::CallHangup), 1);
    assert_eq!(
        leg_actions(&effects),
        vec![LegAction::Hangup {
            cause: cause::USER_BUSY,
            outcome: HangupOutcome::Busy
        }]
    );
    for effect in &effects {
        if let Effect::Leg { leg, action } = effect {
            let mut state = leg.lock();
            call_fsm::apply_leg_action(&mut state, action);
        }
    }
    assert_eq!(leg2.lock().hangup_cause, Some(cause::USER_BUSY));
    assert!(test.state.call.is_none());
}

#[test]
fn test_local_hangup_after_network_release() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));

    // Nothing ever rang on this span
    assert_eq!(
        call_fsm::hangup_local(&mut test.state, cause::NORMAL_CLEARING),
        Err(gsm_entities::GatewayErr::NoCall(test.state.span))
    );

    offer_and_attach(&mut test, 3);
    test.feed(GsmEvent::Hangup {
        call: 3,
        cause: cause::NORMAL_CLEARING,
    });
    // Framework tears its leg down in response; nothing left to release
    assert_eq!(call_fsm::hangup_local(&mut test.state, cause::NORMAL_CLEARING), Ok(None));
}

#[test]
fn test_progress_is_idempotent_and_clears_dsp_hint() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    call_fsm::check_dial(&test.state).unwrap();
    let leg = CallLeg::new(test.state.span);
    call_fsm::start_outbound(&mut test.state, 21, leg, "+3312345".to_string());
    assert!(test.state.call.as_ref().unwrap().dsp_hint);
    assert_eq!(call_fsm::check_dial(&test.state), Err(gsm_entities::GatewayErr::CallInProgress(test.state.span)));

    let effects = test.feed(GsmEvent::Proceeding { call: 21 });
    assert_eq!(leg_actions(&effects), vec![LegAction::Control(LegControl::Proceeding)]);
    assert!(!test.state.call.as_ref().unwrap().dsp_hint);
    assert!(test.feed(GsmEvent::Proceeding { call: 21 }).is_empty());

    test.feed(GsmEvent::Ringing { call: 21 });
    assert_eq!(test.state.call.as_ref().unwrap().phase, CallPhase::Alerting);

    let effects = test.feed(GsmEvent::Answer { call: 21 });
    assert_eq!(count_notifications(&effects, NotificationKind::CallAnswered), 1);
    assert!(test.feed(GsmEvent::Answer { call: 21 }).is_empty());

    // Late progress does not step back from active
    test.feed(GsmEvent::Progress { call: 21, inband: true });
    assert_eq!(test.state.call.as_ref().unwrap().phase, CallPhase::Active);

    // Events for other calls are ignored
    assert!(test.feed(GsmEvent::Answer { call: 99 }).is_empty());
}

#[test]
fn test_link_loss_forces_leg_down() {
    debug::setup_logging_verbose();
    for event in [GsmEvent::LinkDown, GsmEvent::SimMissing, GsmEvent::NoSignal, GsmEvent::PowerOff] {
        let mut test = SpanTest::with_link_up(test_span_cfg(1));
        offer_and_attach(&mut test, 11);

        let effects = test.feed(event.clone());
        assert!(test.state.call.is_none(), "{:?}", event);
        assert!(!test.state.availability.is_up());
        assert_eq!(
            leg_actions(&effects),
            vec![LegAction::ForceHangup {
                cause: cause::NETWORK_OUT_OF_ORDER
            }]
        );
        assert_eq!(count_notifications(&effects, NotificationKind::CallHangup), 1);
    }
}

#[test]
fn test_alarm_respects_t309() {
    debug::setup_logging_verbose();
    let mut test = SpanTest::with_link_up(test_span_cfg(1));
    offer_and_attach(&mut test, 12);
    let effects = test.feed(GsmEvent::Alarm);
    assert!(test.state.call.is_none());
    assert_eq!(count_notifications(&effects, NotificationKind::SpanAlarm), 1);
    assert_eq!(count_notifications(&effects, NotificationKind::CallHangup), 1);

    let mut cfg = test_span_cfg(1);
    cfg.t309_enabled = true;
    let mut test = SpanTest::with_link_up(cfg);
    offer_and_attach(&mut test, 12);
    let effects = test.feed(GsmEvent::Alarm);
    assert!(test.state.call.is_some());
    assert!(!test.state.availability.is_up());
    assert_eq!(count_notifications(&effects, NotificationKind::CallHangup), 0);
}

#[derive(Debug, Clone)]
enum Step {
    Ring(u32),
    Hangup(u32),
    Ack(u32),
    Answer(u32),
    LinkDown,
    LinkUp,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1u32..4).prop_map(Step::Ring),
        (1u32..4).prop_map(Step::Hangup),
        (1u32..4).prop_map(Step::Ack),
        (1u32..4).prop_map(Step::Answer),
        Just(Step::LinkDown),
        Just(Step::LinkUp),
    ]
}

proptest! {
    #[test]
    fn prop_single_call_slot(steps in proptest::collection::vec(step(), 1..40)) {
        let mut test = SpanTest::with_link_up(test_span_cfg(1));
        for s in steps {
            let event = match s {
                Step::Ring(c) => ring(c, "1"),
                Step::Hangup(c) => GsmEvent::Hangup { call: c, cause: cause::NORMAL_CLEARING },
                Step::Ack(c) => GsmEvent::HangupAck { call: c },
                Step::Answer(c) => GsmEvent::Answer { call: c },
                Step::LinkDown => GsmEvent::LinkDown,
                Step::LinkUp => GsmEvent::LinkUp,
            };
            let had_call = test.state.call.is_some();
            let effects = test.feed(event);
            // A leg is only ever requested for an empty slot
            prop_assert!(!(had_call && creates_leg(&effects)));
            prop_assert!(count_notifications(&effects, NotificationKind::CallHangup) <= 1);
        }
    }
}
