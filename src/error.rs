//! Leaf error types for the emulator's sub-systems.
//!
//! Each sub-system gets its own `thiserror` enum (c.f. `TestError` in the
//! teacher's `crates/testing/src/lib.rs`); the supervisor and `main` collapse
//! these into `anyhow::Result` at the orchestration edges.

use thiserror::Error;

/// Errors from the tape-image store (`crate::tape`).
#[derive(Debug, Error)]
pub enum TapeError {
    #[error("unit {0} is not open")]
    BadUnit(u8),

    #[error("unit {0} is write protected")]
    WriteProtected(u8),

    #[error("seek on unit {unit} to offset {offset} is past end of tape ({size})")]
    SeekOutOfRange { unit: u8, offset: u64, size: u64 },

    #[error("unit table is full ({0} units already open)")]
    TableFull(usize),

    #[error("I/O error on unit {unit} ({path}): {source}")]
    Io {
        unit: u8,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the serial line driver (`crate::serial`).
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("cannot open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a serial device (tcgetattr failed)")]
    NotATerminal(String),

    #[error("failed to apply terminal attributes: {0}")]
    Termios(#[from] nix::Error),

    #[error("I/O error on serial line: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced while decoding or dispatching an RSP packet.
///
/// These never cross the wire directly; the engine maps them to the
/// nearest `StatusCode` (spec.md §7) before replying to the host.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("checksum mismatch: expected {expected:04X}, got {actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    // CTRL_LEN (crate::packet) is the only valid length; spelled out
    // literally here since thiserror's format string can't reference it.
    #[error("control packet length {0} is not the expected 10 bytes")]
    BadControlLength(u8),

    #[error("data flag seen out of sequence")]
    DataOutOfSequence,

    #[error(transparent)]
    Tape(#[from] TapeError),

    #[error(transparent)]
    Serial(#[from] SerialError),
}
