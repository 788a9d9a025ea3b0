#![doc = "PLC supervision: I/O image, Modbus TCP client, and the coil supervisor."]

pub mod image;
pub mod modbus;
pub mod supervisor;

pub use image::*;
pub use modbus::*;
pub use supervisor::*;
