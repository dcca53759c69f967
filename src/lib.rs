//! TU58 DECtape II cartridge emulator, speaking the Radial Serial Protocol
//! (RSP) over a serial line so a vintage PDP-11/VAX host can read and
//! write tape-image files on a modern machine.

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod packet;
pub mod serial;
pub mod supervisor;
pub mod tape;
