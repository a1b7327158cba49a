use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gsm_saps::{CallLeg, InboundCall, Notification, NotificationKind, TelephonyFramework};

/// Telephony framework stand-in. Creates a leg for every offered call unless told to
/// decline, and keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingFramework {
    offers: Mutex<Vec<InboundCall>>,
    legs: Mutex<Vec<Arc<CallLeg>>>,
    notifications: Mutex<Vec<Notification>>,
    decline: AtomicBool,
}

impl RecordingFramework {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }

    pub fn offers(&self) -> Vec<InboundCall> {
        self.offers.lock().unwrap().clone()
    }

    pub fn legs(&self) -> Vec<Arc<CallLeg>> {
        self.legs.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.notifications.lock().unwrap().iter().filter(|n| n.kind == kind).count()
    }
}

impl TelephonyFramework for RecordingFramework {
    fn create_leg(&self, call: &InboundCall) -> Option<Arc<CallLeg>> {
        tracing::debug!("create_leg: {:?}", call);
        self.offers.lock().unwrap().push(call.clone());
        if self.decline.load(Ordering::SeqCst) {
            return None;
        }
        let leg = CallLeg::new(call.span);
        self.legs.lock().unwrap().push(leg.clone());
        Some(leg)
    }

    fn notify(&self, notification: Notification) {
        tracing::debug!("notify: {} {:?}", notification.kind.as_str(), notification.payload);
        self.notifications.lock().unwrap().push(notification);
    }
}
