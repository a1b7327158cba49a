pub mod call_fsm;
pub mod cause_map;
