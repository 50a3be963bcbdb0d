//! Machine image: memory, registers, stack, instruction pointer, input queue.

use std::fmt;
use std::io::{self, Read, Write};

use crate::operand::REGISTER_COUNT;
use crate::word::{pack, unpack};

/// Magic tag at the start of every snapshot file.
const SNAPSHOT_MAGIC: &[u8; 4] = b"SNCR";

/// Owns the guest's entire addressable state.
///
/// `raw` is kept around unmodified so `reset()` can rebuild `mem` from it.
#[derive(Debug, Clone)]
pub struct Image {
    /// Program memory, one word per cell.
    pub mem: Vec<i16>,
    /// The eight general-purpose registers.
    pub reg: [u16; REGISTER_COUNT],
    /// The guest's own stack (distinct from the debugger's shadow call stack).
    pub stack: Vec<u16>,
    /// Instruction pointer: an index into `mem`.
    pub ip: usize,
    /// Pending input characters, reversed so the next character to deliver
    /// is the last element.
    pub in_queue: Vec<u8>,
    raw: Vec<u8>,
}

impl Image {
    /// Builds a fresh image from a raw program byte image.
    #[must_use]
    pub fn new(raw: Vec<u8>) -> Self {
        let mem = unpack(&raw);
        Self {
            mem,
            reg: [0; REGISTER_COUNT],
            stack: Vec::new(),
            ip: 0,
            in_queue: Vec::new(),
            raw,
        }
    }

    /// Reloads `mem` from `raw` and clears registers, stack, `ip`, and the
    /// input queue.
    pub fn reset(&mut self) {
        self.mem = unpack(&self.raw);
        self.reg = [0; REGISTER_COUNT];
        self.stack.clear();
        self.ip = 0;
        self.in_queue.clear();
    }

    /// Writes `mem` out as raw little-endian words.
    pub fn dump_mem<W: Write>(&self, mut sink: W) -> io::Result<()> {
        sink.write_all(&pack(&self.mem))
    }

    /// Serializes the full machine state to `sink` in the `SNCR` format.
    pub fn write_snapshot<W: Write>(&self, mut sink: W) -> io::Result<()> {
        sink.write_all(SNAPSHOT_MAGIC)?;

        let mut head = Vec::with_capacity(1 + REGISTER_COUNT);
        head.push(self.ip as i16);
        head.extend(self.reg.iter().map(|&r| r as i16));
        write_words(&mut sink, &head)?;

        write_words(&mut sink, &self.mem)?;

        let stack: Vec<i16> = self.stack.iter().map(|&w| w as i16).collect();
        write_words(&mut sink, &stack)
    }

    /// Reads a snapshot previously written by [`Image::write_snapshot`].
    ///
    /// `raw` is reconstructed from the snapshot's `mem` section, so a
    /// subsequent [`Image::reset`] reloads the saved program image rather
    /// than whatever image the debugger originally booted from.
    pub fn read_snapshot<R: Read>(mut source: R) -> Result<Self, SnapshotError> {
        let mut magic = [0_u8; 4];
        source
            .read_exact(&mut magic)
            .map_err(SnapshotError::Io)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic(magic));
        }

        let head = read_words(&mut source)?;
        if head.len() != 1 + REGISTER_COUNT {
            return Err(SnapshotError::Truncated);
        }
        let ip = head[0] as usize;
        let mut reg = [0_u16; REGISTER_COUNT];
        for (slot, &w) in reg.iter_mut().zip(&head[1..]) {
            *slot = w as u16;
        }

        let mem = read_words(&mut source)?;
        let stack: Vec<u16> = read_words(&mut source)?.into_iter().map(|w| w as u16).collect();

        let raw = pack(&mem);
        Ok(Self {
            mem,
            reg,
            stack,
            ip,
            in_queue: Vec::new(),
            raw,
        })
    }
}

fn write_words<W: Write>(sink: &mut W, words: &[i16]) -> io::Result<()> {
    let byte_len = (words.len() * 2) as u32;
    sink.write_all(&byte_len.to_le_bytes())?;
    sink.write_all(&pack(words))
}

fn read_words<R: Read>(source: &mut R) -> Result<Vec<i16>, SnapshotError> {
    let mut len_buf = [0_u8; 4];
    source.read_exact(&mut len_buf).map_err(SnapshotError::Io)?;
    let byte_len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0_u8; byte_len];
    source.read_exact(&mut buf).map_err(SnapshotError::Io)?;
    Ok(unpack(&buf))
}

/// Failure modes for [`Image::read_snapshot`].
#[derive(Debug)]
pub enum SnapshotError {
    /// The file's magic tag wasn't `SNCR`.
    BadMagic([u8; 4]),
    /// A length-prefixed section was shorter than its own header.
    Truncated,
    /// The underlying reader failed.
    Io(io::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic(got) => write!(
                f,
                "bad snapshot magic: expected \"SNCR\", got {:?}",
                String::from_utf8_lossy(got)
            ),
            Self::Truncated => write!(f, "snapshot file ended before its header was complete"),
            Self::Io(err) => write!(f, "snapshot I/O error: {err}"),
        }
    }
}

impl std::error::Error for SnapshotError {}
