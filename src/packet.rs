//! RSP packet framing, checksums, and the control/data packet codec.
//!
//! Ported from `original_source/tu58.h` (wire layout) and
//! `original_source/tu58drive.c::{checksum, putpacket, getpacket}`.

use crate::error::ProtocolError;

/// Size of a control packet body (opcode..block), excluding flag/length/checksum.
pub const CTRL_LEN: u8 = 10;
/// Max size of one data packet's payload.
pub const DATA_LEN: usize = 128;
/// Size of the GETCHAR "not MRSP capable" payload.
pub const CHAR_LEN: usize = 24;
/// Size of a boot block, read/written raw (unpacketized).
pub const BOOT_LEN: usize = 512;

/// Single-byte line frames that carry no length or checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    Null = 0,
    Data = 1,
    Ctrl = 2,
    Init = 4,
    Boot = 8,
    Cont = 16,
    Xon = 17,
    Xoff = 19,
}

impl Flag {
    pub fn from_byte(b: u8) -> Option<Flag> {
        match b {
            0 => Some(Flag::Null),
            1 => Some(Flag::Data),
            2 => Some(Flag::Ctrl),
            4 => Some(Flag::Init),
            8 => Some(Flag::Boot),
            16 => Some(Flag::Cont),
            17 => Some(Flag::Xon),
            19 => Some(Flag::Xoff),
            _ => None,
        }
    }
}

/// RSP command opcodes, carried in a control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Init = 1,
    Read = 2,
    Write = 3,
    Seek = 5,
    Diagnose = 7,
    GetStatus = 8,
    SetStatus = 9,
    GetChar = 10,
    End = 64,
}

impl Opcode {
    pub fn from_byte(b: u8) -> Option<Opcode> {
        match b {
            0 => Some(Opcode::Nop),
            1 => Some(Opcode::Init),
            2 => Some(Opcode::Read),
            3 => Some(Opcode::Write),
            5 => Some(Opcode::Seek),
            7 => Some(Opcode::Diagnose),
            8 => Some(Opcode::GetStatus),
            9 => Some(Opcode::SetStatus),
            10 => Some(Opcode::GetChar),
            64 => Some(Opcode::End),
            _ => None,
        }
    }
}

/// Modifier bit requesting 128-byte ("B128") addressing instead of 512-byte blocks.
pub const MOD_B128: u8 = 128;

/// Switches bit requesting MRSP (per-byte handshake) mode for this command.
pub const SW_MRSP: u8 = 8;

/// End-packet success/failure codes (`tu58.h`'s `TUE_*`), signed 8-bit values
/// carried in the unsigned `modifier` field of an END control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum StatusCode {
    Succ = 0,
    Succr = 1,
    Fail = -1,
    Paro = -2,
    Badu = -8,
    Badf = -9,
    Wpro = -11,
    Derr = -17,
    Skrr = -32,
    Mtrs = -33,
    Bado = -48,
    Badb = -55,
    Comm = -127,
}

impl StatusCode {
    pub fn as_wire_byte(self) -> u8 {
        (self as i8) as u8
    }
}

/// A decoded control packet (opcode..block fields plus flag/length header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPacket {
    pub opcode: u8,
    pub modifier: u8,
    pub unit: u8,
    pub switches: u8,
    pub sequence: u16,
    pub count: u16,
    pub block: u16,
}

impl ControlPacket {
    pub fn new(opcode: u8, unit: u8) -> Self {
        ControlPacket {
            opcode,
            modifier: 0,
            unit,
            switches: 0,
            sequence: 0,
            count: 0,
            block: 0,
        }
    }

    pub fn end(unit: u8, code: StatusCode, count: u16, block: u16) -> Self {
        ControlPacket {
            opcode: Opcode::End as u8,
            modifier: code.as_wire_byte(),
            unit,
            switches: 0,
            sequence: 0,
            count,
            block,
        }
    }

    /// Serialize to `flag, length, opcode..block, cksum_lo, cksum_hi` (14 bytes).
    pub fn to_bytes(&self) -> [u8; 14] {
        let mut buf = [0u8; 14];
        buf[0] = Flag::Ctrl as u8;
        buf[1] = CTRL_LEN;
        buf[2] = self.opcode;
        buf[3] = self.modifier;
        buf[4] = self.unit;
        buf[5] = self.switches;
        buf[6..8].copy_from_slice(&self.sequence.to_le_bytes());
        buf[8..10].copy_from_slice(&self.count.to_le_bytes());
        buf[10..12].copy_from_slice(&self.block.to_le_bytes());
        let cksum = checksum(&buf[0..12]);
        buf[12..14].copy_from_slice(&cksum.to_le_bytes());
        buf
    }

    /// Decode the 10 body bytes following `flag, length`, verifying the
    /// trailing checksum against `flag..block`. `body` must be exactly
    /// `CTRL_LEN as usize + 2` bytes (body + 2 checksum bytes).
    pub fn from_body(body: &[u8]) -> Result<ControlPacket, ProtocolError> {
        debug_assert_eq!(body.len(), CTRL_LEN as usize + 2);

        let mut frame = [0u8; 14];
        frame[0] = Flag::Ctrl as u8;
        frame[1] = CTRL_LEN;
        frame[2..14].copy_from_slice(body);

        verify_checksum(&frame[0..12], &frame[12..14])?;

        Ok(ControlPacket {
            opcode: frame[2],
            modifier: frame[3],
            unit: frame[4],
            switches: frame[5],
            sequence: u16::from_le_bytes([frame[6], frame[7]]),
            count: u16::from_le_bytes([frame[8], frame[9]]),
            block: u16::from_le_bytes([frame[10], frame[11]]),
        })
    }
}

/// A decoded data packet: up to 128 bytes of payload.
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub data: Vec<u8>,
}

impl DataPacket {
    pub fn new(data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= DATA_LEN);
        DataPacket { data }
    }

    /// Serialize to `flag, length, data…, cksum_lo, cksum_hi`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.data.len() + 2);
        buf.push(Flag::Data as u8);
        buf.push(self.data.len() as u8);
        buf.extend_from_slice(&self.data);
        let cksum = checksum(&buf);
        buf.extend_from_slice(&cksum.to_le_bytes());
        buf
    }

    /// Decode `length` data bytes plus a 2-byte checksum, given the
    /// already-consumed `flag` and `length` bytes.
    pub fn from_body(length: u8, body: &[u8]) -> Result<DataPacket, ProtocolError> {
        debug_assert_eq!(body.len(), length as usize + 2);

        let mut frame = Vec::with_capacity(2 + body.len());
        frame.push(Flag::Data as u8);
        frame.push(length);
        frame.extend_from_slice(body);

        let data_end = 2 + length as usize;
        verify_checksum(&frame[0..data_end], &frame[data_end..data_end + 2])?;

        Ok(DataPacket {
            data: frame[2..data_end].to_vec(),
        })
    }
}

fn verify_checksum(payload: &[u8], cksum_bytes: &[u8]) -> Result<(), ProtocolError> {
    let expected = checksum(payload);
    let actual = u16::from_le_bytes([cksum_bytes[0], cksum_bytes[1]]);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// 16-bit end-around-carry checksum over `bytes` (flag through last body byte).
///
/// Ported from `tu58drive.c::checksum`: accumulate little-endian 16-bit
/// words, folding the carry back into the low 16 bits after each add. An
/// odd trailing byte is treated as the low byte of a final word.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut iter = bytes.chunks(2);
    for chunk in &mut iter {
        let word = if chunk.len() == 2 {
            u16::from_le_bytes([chunk[0], chunk[1]]) as u32
        } else {
            chunk[0] as u32
        };
        sum += word;
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn checksum_handles_odd_trailing_byte() {
        // single odd byte is its own low-order word
        assert_eq!(checksum(&[0x01]), 0x0001);
    }

    #[test]
    fn control_packet_round_trips() {
        let pkt = ControlPacket {
            opcode: Opcode::Read as u8,
            modifier: 0,
            unit: 0,
            switches: 0,
            sequence: 0,
            count: 512,
            block: 0,
        };
        let wire = pkt.to_bytes();
        assert_eq!(wire[0], Flag::Ctrl as u8);
        assert_eq!(wire[1], CTRL_LEN);

        let decoded = ControlPacket::from_body(&wire[2..14]).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn control_packet_rejects_bad_checksum() {
        let pkt = ControlPacket::new(Opcode::Nop as u8, 0);
        let mut wire = pkt.to_bytes();
        wire[12] ^= 0xFF; // corrupt checksum
        let err = ControlPacket::from_body(&wire[2..14]).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
    }

    #[test]
    fn data_packet_round_trips_full_length() {
        let data: Vec<u8> = (0..DATA_LEN as u8).collect();
        let pkt = DataPacket::new(data.clone());
        let wire = pkt.to_bytes();
        assert_eq!(wire[0], Flag::Data as u8);
        assert_eq!(wire[1] as usize, DATA_LEN);

        let decoded = DataPacket::from_body(wire[1], &wire[2..]).unwrap();
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn data_packet_rejects_bad_checksum() {
        let pkt = DataPacket::new(vec![1, 2, 3]);
        let mut wire = pkt.to_bytes();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let err = DataPacket::from_body(wire[1], &wire[2..]).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
    }

    #[test]
    fn status_code_encodes_as_signed_byte() {
        assert_eq!(StatusCode::Succ.as_wire_byte(), 0x00);
        assert_eq!(StatusCode::Badb.as_wire_byte(), (-55i8) as u8);
        assert_eq!(StatusCode::Comm.as_wire_byte(), 0x81);
    }

    #[test]
    fn flag_and_opcode_from_byte() {
        assert_eq!(Flag::from_byte(2), Some(Flag::Ctrl));
        assert_eq!(Flag::from_byte(255), None);
        assert_eq!(Opcode::from_byte(64), Some(Opcode::End));
        assert_eq!(Opcode::from_byte(200), None);
    }
}
