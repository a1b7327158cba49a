#![allow(dead_code)]

mod recorder;
mod span_test;

pub use recorder::RecordingFramework;
pub use span_test::*;
