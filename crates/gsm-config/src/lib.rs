//! Gateway configuration management
//!
//! This crate provides configuration loading and parsing for the GSM span gateway:
//! - TOML configuration file parsing
//! - Gateway, per-span and loop policy configuration structures

pub mod stack_config;
pub mod toml_config;

pub use stack_config::*;
pub use toml_config::*;
