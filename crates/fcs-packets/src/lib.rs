#![doc = "Hardware topology, field control packet envelopes, and the packet compiler."]

pub mod compiler;
pub mod packet;
pub mod topology;

pub use compiler::*;
pub use packet::*;
pub use topology::*;
