pub mod control;
pub mod detect;
pub mod registry;
pub mod span_state;
pub mod worker;
