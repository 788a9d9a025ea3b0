#![doc = "Common types shared across the field control workspace."]

pub mod config;
pub mod error;
pub mod match_phase;
pub mod triggers;

pub use config::*;
pub use error::*;
pub use match_phase::*;
pub use triggers::*;
