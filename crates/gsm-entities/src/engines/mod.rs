pub mod sim;

pub use sim::{SimEngine, SimHandle};
