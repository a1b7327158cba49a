//! Primitives exchanged between the span control plane and its collaborators:
//! - the protocol engine driving one modem (events in, commands out)
//! - the host telephony framework owning call legs and receiving notifications

pub mod command;
pub mod engine;
pub mod event;
pub mod framework;

pub use command::GsmCommand;
pub use engine::{ProtocolEngine, Readiness, TransactionId};
pub use event::{CallerId, EventKind, GsmEvent};
pub use framework::{CallLeg, InboundCall, LegControl, LegState, Notification, NotificationKind, TelephonyFramework};
