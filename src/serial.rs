//! Serial line driver: termios configuration, staged TX/RX, BREAK
//! generation/detection, and out-of-band line-error polling.
//!
//! Ported from `original_source/serial.c::devinit` and the teacher's
//! `crates/testing/src/backends/serial_backend.rs`, with the async I/O
//! swapped for blocking `std::fs::File` since the supervisor here runs on
//! dedicated OS threads (spec.md §9 Design Notes, strategy (b)).

use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::sys::termios::{self, SetArg};

use crate::error::SerialError;

/// Result of a single `rx_get`: either a normal byte, or an out-of-band
/// condition detected via the PARMRK/INPCK escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    Byte(u8),
    Break,
    FramingError,
    NoData,
}

/// Cumulative line-error counters, polled out-of-band so the monitor task
/// never contends with the engine for bytes on the data path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounters {
    pub breaks: u32,
    pub frame_errors: u32,
    pub overruns: u32,
    pub parity_errors: u32,
}

pub struct SerialLine {
    file: std::fs::File,
    /// Bytes already read from the fd but not yet decoded (for the
    /// PARMRK escape-sequence lookahead in `rx_get`).
    pending: std::collections::VecDeque<u8>,
}

/// Default baud rate retained when the requested one isn't recognized
/// (spec.md §4.1: "Unknown baud: log and retain current").
const DEFAULT_BAUD: u32 = 9600;

/// Resolve `baud` to a termios constant. An unrecognized rate is not
/// fatal: it is logged and the default baud is substituted instead, so
/// `open()` never fails just because of a bad `-s/--speed` value.
fn baud_const(baud: u32) -> termios::BaudRate {
    use termios::BaudRate::*;
    match baud {
        50 => B50,
        75 => B75,
        110 => B110,
        134 => B134,
        150 => B150,
        200 => B200,
        300 => B300,
        600 => B600,
        1200 => B1200,
        1800 => B1800,
        2400 => B2400,
        4800 => B4800,
        9600 => B9600,
        19200 => B19200,
        38400 => B38400,
        57600 => B57600,
        115200 => B115200,
        230400 => B230400,
        other => {
            tracing::warn!(baud = other, default = DEFAULT_BAUD, "unsupported baud rate, retaining current");
            B9600
        }
    }
}

impl SerialLine {
    /// Open `path` and configure it for RSP: 8 data bits, `stop_bits`
    /// stop bits, no parity, `baud` bps, non-blocking, `PARMRK|INPCK` on
    /// with `ISTRIP` off so BREAK and framing errors surface as the
    /// `0xFF 0x00 ...` escape instead of being silently stripped.
    pub fn open(path: &str, baud: u32, stop_bits: u8) -> Result<Self, SerialError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)
            .map_err(|e| SerialError::Open {
                path: path.to_string(),
                source: e,
            })?;

        let mut tio = termios::tcgetattr(&file)
            .map_err(|_| SerialError::NotATerminal(path.to_string()))?;

        termios::cfmakeraw(&mut tio);

        // Input: keep PARMRK+INPCK, drop ISTRIP so the 0xFF escape survives;
        // never let the kernel eat XON/XOFF, the protocol handles those in-band.
        tio.input_flags.remove(
            termios::InputFlags::IGNBRK
                | termios::InputFlags::BRKINT
                | termios::InputFlags::ISTRIP
                | termios::InputFlags::INLCR
                | termios::InputFlags::IGNCR
                | termios::InputFlags::ICRNL
                | termios::InputFlags::IXON
                | termios::InputFlags::IXOFF
                | termios::InputFlags::IXANY,
        );
        tio.input_flags
            .insert(termios::InputFlags::PARMRK | termios::InputFlags::INPCK);

        tio.control_flags.remove(termios::ControlFlags::CSIZE);
        tio.control_flags.insert(
            termios::ControlFlags::CS8
                | termios::ControlFlags::CLOCAL
                | termios::ControlFlags::CREAD,
        );
        tio.control_flags.remove(termios::ControlFlags::PARENB);
        if stop_bits >= 2 {
            tio.control_flags.insert(termios::ControlFlags::CSTOPB);
        } else {
            tio.control_flags.remove(termios::ControlFlags::CSTOPB);
        }

        tio.local_flags.remove(
            termios::LocalFlags::ISIG
                | termios::LocalFlags::ICANON
                | termios::LocalFlags::ECHO
                | termios::LocalFlags::IEXTEN,
        );

        tio.control_chars[termios::SpecialCharacterIndices::VMIN as usize] = 1;
        tio.control_chars[termios::SpecialCharacterIndices::VTIME as usize] = 0;

        let rate = baud_const(baud);
        termios::cfsetispeed(&mut tio, rate)?;
        termios::cfsetospeed(&mut tio, rate)?;

        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)?;
        termios::tcflush(&file, termios::FlushArg::TCIOFLUSH)?;

        Ok(SerialLine {
            file,
            pending: std::collections::VecDeque::new(),
        })
    }

    /// Write a single byte, blocking briefly if the output buffer is full.
    pub fn tx_put(&mut self, byte: u8) -> Result<(), SerialError> {
        self.tx_write(&[byte])
    }

    pub fn tx_write(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            match self.file.write(remaining) {
                Ok(0) => {}
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(SerialError::Io(e)),
            }
        }
        Ok(())
    }

    pub fn tx_flush(&mut self) -> Result<(), SerialError> {
        self.file.flush().map_err(SerialError::Io)
    }

    /// Suspend/resume transmission (used by the engine for in-band
    /// XON/XOFF flow control during WRITE).
    pub fn tx_stop(&self) -> Result<(), SerialError> {
        termios::tcflow(&self.file, termios::FlowArg::TCOOFF).map_err(SerialError::from)
    }

    pub fn tx_start(&self) -> Result<(), SerialError> {
        termios::tcflow(&self.file, termios::FlowArg::TCOON).map_err(SerialError::from)
    }

    /// Assert a BREAK condition for 0.25-0.5s (POSIX `tcsendbreak` with
    /// duration 0), satisfying the ">=250ms" BREAK requirement.
    pub fn tx_break(&self) -> Result<(), SerialError> {
        let rc = unsafe { libc::tcsendbreak(self.file.as_raw_fd(), 0) };
        if rc != 0 {
            return Err(SerialError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn rx_init(&self) -> Result<(), SerialError> {
        termios::tcflush(&self.file, termios::FlushArg::TCIFLUSH).map_err(SerialError::from)
    }

    pub fn tx_init(&self) -> Result<(), SerialError> {
        termios::tcflush(&self.file, termios::FlushArg::TCOFLUSH).map_err(SerialError::from)
    }

    /// Read the next byte (or out-of-band event), decoding the
    /// `0xFF 0x00 0x00` (BREAK) / `0xFF 0x00 NN` (framing/parity error) /
    /// `0xFF 0xFF` (literal 0xFF data byte) escape sequence produced by
    /// `PARMRK` when a byte arrives with a framing condition.
    pub fn rx_get(&mut self) -> Result<RxEvent, SerialError> {
        if self.pending.is_empty() {
            let mut buf = [0u8; 256];
            match self.file.read(&mut buf) {
                Ok(0) => return Ok(RxEvent::NoData),
                Ok(n) => self.pending.extend(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok(RxEvent::NoData)
                }
                Err(e) => return Err(SerialError::Io(e)),
            }
        }

        let Some(first) = self.pending.pop_front() else {
            return Ok(RxEvent::NoData);
        };

        if first != 0xFF {
            return Ok(RxEvent::Byte(first));
        }

        // Escape sequence: need at least one more byte to disambiguate.
        if self.pending.is_empty() {
            self.fill_pending_blocking()?;
        }
        let Some(second) = self.pending.pop_front() else {
            return Ok(RxEvent::NoData);
        };
        if second == 0xFF {
            return Ok(RxEvent::Byte(0xFF));
        }

        // second == 0x00: third byte distinguishes BREAK (0x00) from a
        // framing/parity error (nonzero).
        if self.pending.is_empty() {
            self.fill_pending_blocking()?;
        }
        let third = self.pending.pop_front().unwrap_or(0);
        if third == 0x00 {
            Ok(RxEvent::Break)
        } else {
            Ok(RxEvent::FramingError)
        }
    }

    fn fill_pending_blocking(&mut self) -> Result<(), SerialError> {
        let mut buf = [0u8; 256];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.pending.extend(&buf[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(SerialError::Io(e)),
            }
        }
    }

    /// Out-of-band cumulative line-error counters, via `TIOCGICOUNT` on
    /// Linux. Consumes no bytes from the `rx_get` data path, so the line
    /// monitor can poll this freely without racing the engine thread.
    #[cfg(target_os = "linux")]
    pub fn line_counters(&self) -> Result<LineCounters, SerialError> {
        #[repr(C)]
        #[derive(Default)]
        struct SerialIcounter {
            cts: libc::c_int,
            dsr: libc::c_int,
            rng: libc::c_int,
            dcd: libc::c_int,
            rx: libc::c_int,
            tx: libc::c_int,
            frame: libc::c_int,
            overrun: libc::c_int,
            parity: libc::c_int,
            brk: libc::c_int,
            buf_overrun: libc::c_int,
        }

        const TIOCGICOUNT: libc::c_ulong = 0x545D;

        let mut counts = SerialIcounter::default();
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                TIOCGICOUNT,
                &mut counts as *mut SerialIcounter,
            )
        };
        if rc != 0 {
            return Err(SerialError::Io(std::io::Error::last_os_error()));
        }
        Ok(LineCounters {
            breaks: counts.brk as u32,
            frame_errors: counts.frame as u32,
            overruns: counts.overrun as u32,
            parity_errors: counts.parity as u32,
        })
    }

    /// Stub for platforms without `TIOCGICOUNT`: always reports no new
    /// line events. Documented platform gap (spec.md §4.1's "platforms
    /// without this facility" escape clause).
    #[cfg(not(target_os = "linux"))]
    pub fn line_counters(&self) -> Result<LineCounters, SerialError> {
        Ok(LineCounters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_const_falls_back_on_unsupported_rate() {
        assert_eq!(baud_const(1_000_000), termios::BaudRate::B9600);
    }

    #[test]
    fn baud_const_accepts_9600() {
        assert_eq!(baud_const(9600), termios::BaudRate::B9600);
    }

    #[test]
    fn line_counters_default_is_zero() {
        let c = LineCounters::default();
        assert_eq!(c.breaks, 0);
        assert_eq!(c.frame_errors, 0);
    }
}
