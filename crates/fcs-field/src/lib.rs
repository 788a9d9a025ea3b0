#![doc = "Field status engine: compiled packets, aggregation, and session fan-out."]

pub mod engine;

pub use engine::*;
