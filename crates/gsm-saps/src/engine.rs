use std::time::Duration;

use crossbeam_channel::Receiver;
use gsm_core::ChannelId;

use crate::{GsmCommand, GsmEvent};

/// Identifier returned by the engine for every submitted command.
/// Result events for correlated requests carry it back.
pub type TransactionId = u32;

/// Readiness signal of the command channel. The transport side sends a unit value
/// whenever at least one response is available for `next_event()`.
pub type Readiness = Receiver<()>;

/// Protocol engine owning the command/response session with one modem.
///
/// The engine is driven from exactly one span worker thread. It never blocks:
/// waiting for transport readiness is the worker's business.
pub trait ProtocolEngine: Send {
    /// Pulls at most one decoded event from the transport
    fn next_event(&mut self) -> Option<GsmEvent>;

    /// Time until the next internally scheduled protocol timer, if any
    fn next_timer_deadline(&self) -> Option<Duration>;

    /// Runs due protocol timers. May synthesize an event (module detect retry, timeouts)
    fn run_timers(&mut self) -> Option<GsmEvent>;

    /// Queues a command towards the modem
    fn submit(&mut self, command: GsmCommand) -> TransactionId;

    /// Resets (restarts) one bearer channel
    fn reset(&mut self, channel: ChannelId);

    /// Starts the module power-up and detection sequence
    fn module_start(&mut self);
}
