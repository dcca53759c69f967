//! Tape-image file store: unit table, block-addressed seek/read/write, and
//! one-shot blank/RT-11/XXDP initialization at open.
//!
//! Ported from `original_source/file.c`. The RT-11 and XXDP word tables are
//! copied byte-for-byte from `rt11_init`/`xxdp_init`; they are part of the
//! wire-bit-exact contract (spec.md §4.2) and must not be "cleaned up".

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::TapeError;

/// Number of logical drive slots (0..N-1).
pub const NUM_UNITS: usize = 8;
/// Blocks per tape, at the normal (512-byte) block size.
pub const TAPE_BLOCKS: u64 = 512;
/// Bytes per normal block.
pub const BLOCK_SIZE: u64 = 512;
/// Total tape image size in bytes.
pub const TAPE_SIZE: u64 = TAPE_BLOCKS * BLOCK_SIZE;

/// How a unit was opened; controls read/write/init behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Create,
    Rt11Init,
    XxdpInit,
}

/// One logical drive slot.
pub struct Unit {
    file: File,
    path: String,
    readable: bool,
    writable: bool,
    was_created: bool,
    was_rt11: bool,
    was_xxdp: bool,
}

impl Unit {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    fn tag(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.readable { 'r' } else { ' ' },
            if self.writable { 'w' } else { ' ' },
            if self.was_created { 'c' } else { ' ' },
            if self.was_rt11 {
                'i'
            } else if self.was_xxdp {
                'x'
            } else {
                ' '
            },
        )
    }
}

/// Table of open units, indexed 0..NUM_UNITS.
#[derive(Default)]
pub struct TapeStore {
    units: Vec<Option<Unit>>,
}

impl TapeStore {
    pub fn new() -> Self {
        let mut units = Vec::with_capacity(NUM_UNITS);
        units.resize_with(NUM_UNITS, || None);
        TapeStore { units }
    }

    /// Open `path` in `mode`, assigning the next free unit slot. Returns the
    /// unit number assigned.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<u8, TapeError> {
        let slot = self
            .units
            .iter()
            .position(|u| u.is_none())
            .ok_or(TapeError::TableFull(NUM_UNITS))?;

        let writable = !matches!(mode, OpenMode::Read);
        let creates = matches!(
            mode,
            OpenMode::Create | OpenMode::Rt11Init | OpenMode::XxdpInit
        );

        let mut opts = OpenOptions::new();
        opts.read(true);
        if writable {
            opts.write(true);
        }
        if creates {
            opts.create(true);
        }

        let mut file = opts.open(path).map_err(|e| TapeError::Io {
            unit: slot as u8,
            path: path.to_string(),
            source: e,
        })?;

        if creates {
            zero_init(&mut file).map_err(|e| TapeError::Io {
                unit: slot as u8,
                path: path.to_string(),
                source: e,
            })?;
            tracing::info!(unit = slot, path, "initialized blank tape image");
        }

        let was_rt11 = matches!(mode, OpenMode::Rt11Init);
        let was_xxdp = matches!(mode, OpenMode::XxdpInit);

        if was_rt11 {
            rt11_init(&mut file).map_err(|e| TapeError::Io {
                unit: slot as u8,
                path: path.to_string(),
                source: e,
            })?;
            tracing::info!(unit = slot, path, "stamped RT-11 directory");
        }
        if was_xxdp {
            xxdp_init(&mut file).map_err(|e| TapeError::Io {
                unit: slot as u8,
                path: path.to_string(),
                source: e,
            })?;
            tracing::info!(unit = slot, path, "stamped XXDP directory");
        }

        let unit = Unit {
            file,
            path: path.to_string(),
            readable: true,
            writable,
            was_created: creates,
            was_rt11,
            was_xxdp,
        };
        tracing::info!(unit = slot, tag = %unit.tag(), path, "unit opened");

        self.units[slot] = Some(unit);
        Ok(slot as u8)
    }

    fn unit_mut(&mut self, unit: u8) -> Result<&mut Unit, TapeError> {
        self.units
            .get_mut(unit as usize)
            .and_then(|o| o.as_mut())
            .ok_or(TapeError::BadUnit(unit))
    }

    pub fn is_present(&self, unit: u8) -> bool {
        self.units
            .get(unit as usize)
            .map(|o| o.is_some())
            .unwrap_or(false)
    }

    pub fn writable(&self, unit: u8) -> bool {
        self.units
            .get(unit as usize)
            .and_then(|o| o.as_ref())
            .map(|u| u.writable)
            .unwrap_or(false)
    }

    /// Seek to `block*block_size + offset`, which must be strictly less than
    /// the tape's size. Returns the error distinguishing out-of-range seeks.
    pub fn seek(
        &mut self,
        unit: u8,
        block_size: u64,
        block: u64,
        offset: u64,
    ) -> Result<(), TapeError> {
        let target = block * block_size + offset;
        let u = self.unit_mut(unit)?;
        let len = u.file.seek(SeekFrom::End(0)).map_err(|e| TapeError::Io {
            unit,
            path: u.path.clone(),
            source: e,
        })?;
        if target >= len {
            return Err(TapeError::SeekOutOfRange {
                unit,
                offset: target,
                size: len,
            });
        }
        u.file
            .seek(SeekFrom::Start(target))
            .map_err(|e| TapeError::Io {
                unit,
                path: u.path.clone(),
                source: e,
            })?;
        Ok(())
    }

    pub fn read(&mut self, unit: u8, buf: &mut [u8]) -> Result<usize, TapeError> {
        let u = self.unit_mut(unit)?;
        if !u.readable {
            return Err(TapeError::BadUnit(unit));
        }
        u.file.read(buf).map_err(|e| TapeError::Io {
            unit,
            path: u.path.clone(),
            source: e,
        })
    }

    pub fn write(&mut self, unit: u8, buf: &[u8]) -> Result<usize, TapeError> {
        let u = self.unit_mut(unit)?;
        if !u.writable {
            return Err(TapeError::WriteProtected(unit));
        }
        u.file.write(buf).map_err(|e| TapeError::Io {
            unit,
            path: u.path.clone(),
            source: e,
        })
    }

    pub fn close_all(&mut self) {
        for slot in self.units.iter_mut() {
            *slot = None;
        }
    }
}

/// Zero-fill an entire tape worth of blocks.
fn zero_init(file: &mut File) -> std::io::Result<()> {
    let zeros = [0u8; BLOCK_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    for _ in 0..TAPE_BLOCKS {
        file.write_all(&zeros)?;
    }
    Ok(())
}

fn write_words(file: &mut File, offset: u64, words: &[u16]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    for w in words {
        file.write_all(&w.to_le_bytes())?;
    }
    Ok(())
}

/// RT-11 v5.4 directory layout, byte-for-byte from `original_source/file.c::rt11_init`.
fn rt11_init(file: &mut File) -> std::io::Result<()> {
    const BOOT: [u16; 35] = [
        0o000240, 0o000005, 0o000404, 0o000000, 0o000000, 0o041420, 0o116020, 0o000400, 0o004067,
        0o000044, 0o000015, 0o000000, 0o005000, 0o041077, 0o047517, 0o026524, 0o026525, 0o067516,
        0o061040, 0o067557, 0o020164, 0o067157, 0o073040, 0o066157, 0o066565, 0o006545, 0o005012,
        0o000200, 0o105737, 0o177564, 0o100375, 0o112037, 0o177566, 0o100372, 0o000777,
    ];
    const BITMAP: [u16; 3] = [0o000000, 0o170000, 0o007777];
    const DIRECT1: [u16; 30] = [
        0o177777, 0o000000, 0o000000, 0o000000, 0o000000, 0o000000, 0o000000, 0o000000, 0o000000,
        0o000001, 0o000006, 0o107123, 0o052122, 0o030461, 0o020101, 0o020040, 0o020040, 0o020040,
        0o020040, 0o020040, 0o020040, 0o020040, 0o020040, 0o020040, 0o042504, 0o051103, 0o030524,
        0o040461, 0o020040, 0o020040,
    ];
    const DIRECT2: [u16; 13] = [
        0o000001, 0o000000, 0o000001, 0o000000, 0o000010, 0o001000, 0o000325, 0o063471, 0o023364,
        0o000770, 0o000000, 0o002264, 0o004000,
    ];

    write_words(file, 0o0000, &BOOT)?;
    write_words(file, 0o1000, &BITMAP)?;
    write_words(file, 0o1700, &DIRECT1)?;
    write_words(file, 0o6000, &DIRECT2)?;
    Ok(())
}

/// XXDPv2.5 MFD/UFD/BITMAP layout, byte-for-byte from `original_source/file.c::xxdp_init`.
fn xxdp_init(file: &mut File) -> std::io::Result<()> {
    const MFD1: [u16; 4] = [0o000002, 0o000001, 0o000007, 0o000007];
    const MFD2: [u16; 4] = [0o000000, 0o000401, 0o000003, 0o000011];
    const UFD1: [u16; 1] = [0o000004];
    const UFD2: [u16; 1] = [0o000005];
    const UFD3: [u16; 1] = [0o000006];
    const UFD4: [u16; 1] = [0o000000];
    const MAP1: [u16; 7] = [
        0o000000, 0o000001, 0o000074, 0o000007, 0o177777, 0o177777, 0o000377,
    ];

    write_words(file, 0o1000, &MFD1)?;
    write_words(file, 0o2000, &MFD2)?;
    write_words(file, 0o3000, &UFD1)?;
    write_words(file, 0o4000, &UFD2)?;
    write_words(file, 0o5000, &UFD3)?;
    write_words(file, 0o6000, &UFD4)?;
    write_words(file, 0o7000, &MAP1)?;
    Ok(())
}

/// Block size in bytes for a given `modifier` byte (B128 toggles 128-byte blocks).
pub fn block_size(modifier: u8) -> u64 {
    if modifier & crate::packet::MOD_B128 != 0 {
        BLOCK_SIZE / 4
    } else {
        BLOCK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn new_blank_tempfile() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[test]
    fn create_zero_fills_whole_tape() {
        let tmp = new_blank_tempfile();
        let path = tmp.path().to_str().unwrap().to_string();
        let mut store = TapeStore::new();
        let unit = store.open(&path, OpenMode::Create).unwrap();
        assert_eq!(unit, 0);

        let mut buf = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, TAPE_SIZE);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn read_only_unit_rejects_writes() {
        let tmp = new_blank_tempfile();
        let path = tmp.path().to_str().unwrap().to_string();
        {
            let mut store = TapeStore::new();
            store.open(&path, OpenMode::Create).unwrap();
        }
        let mut store = TapeStore::new();
        let unit = store.open(&path, OpenMode::Read).unwrap();
        let err = store.write(unit, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TapeError::WriteProtected(_)));
    }

    #[test]
    fn seek_at_or_past_eof_is_rejected() {
        let tmp = new_blank_tempfile();
        let path = tmp.path().to_str().unwrap().to_string();
        let mut store = TapeStore::new();
        let unit = store.open(&path, OpenMode::Create).unwrap();

        // last valid byte is TAPE_SIZE - 1
        assert!(store.seek(unit, 1, TAPE_SIZE - 1, 0).is_ok());
        assert!(matches!(
            store.seek(unit, 1, TAPE_SIZE, 0),
            Err(TapeError::SeekOutOfRange { .. })
        ));
    }

    #[test]
    fn bad_unit_number_is_rejected() {
        let mut store = TapeStore::new();
        assert!(matches!(
            store.seek(3, BLOCK_SIZE, 0, 0),
            Err(TapeError::BadUnit(3))
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = new_blank_tempfile();
        let path = tmp.path().to_str().unwrap().to_string();
        let mut store = TapeStore::new();
        let unit = store.open(&path, OpenMode::Create).unwrap();

        store.seek(unit, BLOCK_SIZE, 1, 0).unwrap();
        let payload: Vec<u8> = (0..=255u8).collect();
        store.write(unit, &payload).unwrap();

        store.seek(unit, BLOCK_SIZE, 1, 0).unwrap();
        let mut out = vec![0u8; payload.len()];
        store.read(unit, &mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn block_size_respects_b128_modifier() {
        assert_eq!(block_size(0), BLOCK_SIZE);
        assert_eq!(block_size(crate::packet::MOD_B128), BLOCK_SIZE / 4);
    }

    #[test]
    fn rt11_init_stamps_boot_block_signature() {
        let tmp = new_blank_tempfile();
        let path = tmp.path().to_str().unwrap().to_string();
        let mut store = TapeStore::new();
        store.open(&path, OpenMode::Rt11Init).unwrap();

        let mut buf = vec![0u8; 4];
        File::open(&path).unwrap().read_exact(&mut buf).unwrap();
        let first_word = u16::from_le_bytes([buf[0], buf[1]]);
        assert_eq!(first_word, 0o000240);
    }

    #[test]
    fn xxdp_init_stamps_mfd1_at_offset() {
        let tmp = new_blank_tempfile();
        let path = tmp.path().to_str().unwrap().to_string();
        let mut store = TapeStore::new();
        store.open(&path, OpenMode::XxdpInit).unwrap();

        let mut f = File::open(&path).unwrap();
        f.seek(SeekFrom::Start(0o1000)).unwrap();
        let mut buf = [0u8; 2];
        f.read_exact(&mut buf).unwrap();
        assert_eq!(u16::from_le_bytes(buf), 0o000002);
    }
}
