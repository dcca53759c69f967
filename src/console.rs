//! Operator console: raw, non-blocking single-key polling for the
//! V(erbose)/D(ebug)/S(ync)/R(estart)/Q(uit) commands.
//!
//! Ported from `original_source/serial.c::{coninit, conrestore, conget}`.

use std::io::Read;
use std::os::unix::io::AsRawFd;

use nix::sys::termios::{self, SetArg};

use crate::error::SerialError;

/// A single operator keystroke, normalized to uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKey {
    Verbose,
    Debug,
    ToggleSendInit,
    Restart,
    Quit,
    Other(char),
}

impl OperatorKey {
    fn from_char(c: char) -> OperatorKey {
        match c.to_ascii_uppercase() {
            'V' => OperatorKey::Verbose,
            'D' => OperatorKey::Debug,
            'S' => OperatorKey::ToggleSendInit,
            'R' => OperatorKey::Restart,
            'Q' => OperatorKey::Quit,
            other => OperatorKey::Other(other),
        }
    }
}

/// Puts stdin into raw, non-blocking, non-echoing mode for the lifetime
/// of this value; restores the prior terminal attributes on drop.
pub struct Console {
    saved: termios::Termios,
}

impl Console {
    pub fn new() -> Result<Self, SerialError> {
        let stdin = std::io::stdin();
        let saved =
            termios::tcgetattr(&stdin).map_err(|_| SerialError::NotATerminal("stdin".into()))?;

        let mut raw = saved.clone();
        raw.local_flags.remove(
            termios::LocalFlags::ISIG
                | termios::LocalFlags::ICANON
                | termios::LocalFlags::ECHO
                | termios::LocalFlags::IEXTEN,
        );
        raw.control_chars[termios::SpecialCharacterIndices::VMIN as usize] = 0;
        raw.control_chars[termios::SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;

        let flags = nix::fcntl::fcntl(stdin.as_raw_fd(), nix::fcntl::FcntlArg::F_GETFL)
            .map_err(SerialError::from)?;
        let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
        flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
        nix::fcntl::fcntl(stdin.as_raw_fd(), nix::fcntl::FcntlArg::F_SETFL(flags))
            .map_err(SerialError::from)?;

        Ok(Console { saved })
    }

    /// Non-blocking single-key poll; `None` if no key is waiting.
    pub fn poll(&self) -> Option<OperatorKey> {
        let mut buf = [0u8; 1];
        match std::io::stdin().read(&mut buf) {
            Ok(1) => Some(OperatorKey::from_char(buf[0] as char)),
            _ => None,
        }
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        let _ = termios::tcsetattr(&stdin, SetArg::TCSANOW, &self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_mapping_is_case_insensitive() {
        assert_eq!(OperatorKey::from_char('v'), OperatorKey::Verbose);
        assert_eq!(OperatorKey::from_char('Q'), OperatorKey::Quit);
        assert_eq!(OperatorKey::from_char('x'), OperatorKey::Other('X'));
    }
}
