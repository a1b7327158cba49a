pub mod alphabet;
pub mod delivery;
pub mod pdu;
pub mod segment;
pub mod spool;
