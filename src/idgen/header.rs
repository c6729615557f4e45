use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::ops::Range;

use serde::Serialize;

use crate::primitives::io::FileIo;
use crate::types::{PenumbraError, Result};

/// Magic bytes opening every identifier file.
pub const ID_FILE_MAGIC: [u8; 8] = *b"PNBRIDS\0";
/// Current identifier file format version.
pub const ID_FILE_FORMAT_VERSION: u16 = 1;
/// Size of the fixed header preceding the free-id list.
pub const ID_HEADER_LEN: usize = 32;
/// Encoded size of one free-id entry.
pub const FREE_ID_LEN: usize = 8;

const HDR_MAGIC: Range<usize> = 0..8;
const HDR_FORMAT_VERSION: Range<usize> = 8..10;
const HDR_STICKY: usize = 10;
const HDR_RESERVED: usize = 11;
const HDR_CRC32: Range<usize> = 12..16;
const HDR_HIGH_ID: Range<usize> = 16..24;
const HDR_FREE_COUNT: Range<usize> = 24..32;

const MARKER_CLEAN: u8 = 0;
const MARKER_STICKY: u8 = 1;

/// Decoded identifier file header.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct IdFileHeader {
    /// Set while the space is open for mutation; left set by a crash.
    pub sticky: bool,
    /// Exclusive upper bound of ever-allocated ids.
    pub high_id: u64,
    /// Number of free-id entries following the header.
    pub free_count: u64,
}

impl IdFileHeader {
    /// Encodes the header, computing its checksum.
    pub fn encode(&self) -> [u8; ID_HEADER_LEN] {
        let mut buf = [0u8; ID_HEADER_LEN];
        buf[HDR_MAGIC].copy_from_slice(&ID_FILE_MAGIC);
        buf[HDR_FORMAT_VERSION].copy_from_slice(&ID_FILE_FORMAT_VERSION.to_be_bytes());
        buf[HDR_STICKY] = if self.sticky {
            MARKER_STICKY
        } else {
            MARKER_CLEAN
        };
        buf[HDR_RESERVED] = 0;
        buf[HDR_HIGH_ID].copy_from_slice(&self.high_id.to_be_bytes());
        buf[HDR_FREE_COUNT].copy_from_slice(&self.free_count.to_be_bytes());
        let crc = header_crc32(&buf);
        buf[HDR_CRC32].copy_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Decodes and validates a header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ID_HEADER_LEN {
            return Err(PenumbraError::Corruption(
                "identifier file header truncated".into(),
            ));
        }
        if buf[HDR_MAGIC] != ID_FILE_MAGIC {
            return Err(PenumbraError::Corruption(
                "identifier file magic mismatch".into(),
            ));
        }
        let version = u16::from_be_bytes(read_array(&buf[HDR_FORMAT_VERSION]));
        if version != ID_FILE_FORMAT_VERSION {
            return Err(PenumbraError::Corruption(format!(
                "unsupported identifier file version {version}"
            )));
        }
        let stored_crc = u32::from_be_bytes(read_array(&buf[HDR_CRC32]));
        let mut header = [0u8; ID_HEADER_LEN];
        header.copy_from_slice(&buf[..ID_HEADER_LEN]);
        let computed = header_crc32(&header);
        if stored_crc != computed {
            return Err(PenumbraError::Corruption(format!(
                "identifier file header checksum mismatch (stored {stored_crc:#010x}, computed {computed:#010x})"
            )));
        }
        let sticky = match buf[HDR_STICKY] {
            MARKER_CLEAN => false,
            MARKER_STICKY => true,
            other => {
                return Err(PenumbraError::Corruption(format!(
                    "unknown sticky marker 0x{other:02X}"
                )))
            }
        };
        Ok(Self {
            sticky,
            high_id: u64::from_be_bytes(read_array(&buf[HDR_HIGH_ID])),
            free_count: u64::from_be_bytes(read_array(&buf[HDR_FREE_COUNT])),
        })
    }
}

fn header_crc32(buf: &[u8; ID_HEADER_LEN]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..HDR_CRC32.start]);
    hasher.update(&[0u8; 4]);
    hasher.update(&buf[HDR_CRC32.end..]);
    hasher.finalize()
}

fn read_array<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[..N]);
    out
}

/// Reads and validates the header of an identifier file.
pub fn read_header(io: &dyn FileIo) -> Result<IdFileHeader> {
    let mut buf = [0u8; ID_HEADER_LEN];
    match io.read_at(0, &mut buf) {
        Ok(()) => {}
        Err(PenumbraError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
            return Err(PenumbraError::Corruption(
                "identifier file header truncated".into(),
            ));
        }
        Err(err) => return Err(err),
    }
    IdFileHeader::decode(&buf)
}

/// Writes `header` at offset zero and syncs.
pub fn write_header(io: &dyn FileIo, header: &IdFileHeader) -> Result<()> {
    io.write_at(0, &header.encode())?;
    io.sync_all()
}

/// Reads the free-id list declared by a clean header.
///
/// Only call after the sticky marker has been checked.
pub fn read_free_ids(io: &dyn FileIo, header: &IdFileHeader) -> Result<BTreeSet<u64>> {
    let payload_len = header
        .free_count
        .checked_mul(FREE_ID_LEN as u64)
        .ok_or_else(|| PenumbraError::Corruption("free id count overflows file size".into()))?;
    let file_len = io.len()?;
    if file_len < ID_HEADER_LEN as u64 + payload_len {
        return Err(PenumbraError::Corruption(format!(
            "free id list truncated: header declares {} ids, file holds {} bytes",
            header.free_count, file_len
        )));
    }
    let len = usize::try_from(payload_len)
        .map_err(|_| PenumbraError::Corruption("free id list too large".into()))?;
    let mut buf = vec![0u8; len];
    io.read_at(ID_HEADER_LEN as u64, &mut buf)?;
    let mut ids = BTreeSet::new();
    for chunk in buf.chunks_exact(FREE_ID_LEN) {
        let id = u64::from_be_bytes(read_array(chunk));
        if id >= header.high_id {
            return Err(PenumbraError::Corruption(format!(
                "free id {id} at or beyond high id {}",
                header.high_id
            )));
        }
        if !ids.insert(id) {
            return Err(PenumbraError::Corruption(format!(
                "free id {id} listed twice"
            )));
        }
    }
    Ok(ids)
}

/// Replaces the free-id list following the header. The header is not touched.
pub fn write_free_ids(io: &dyn FileIo, ids: &BTreeSet<u64>) -> Result<()> {
    let mut buf = Vec::with_capacity(ids.len() * FREE_ID_LEN);
    for id in ids {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    io.set_len((ID_HEADER_LEN + buf.len()) as u64)?;
    if !buf.is_empty() {
        io.write_at(ID_HEADER_LEN as u64, &buf)?;
    }
    Ok(())
}

/// Forces the sticky marker on, exactly as an unclean shutdown would leave it.
pub fn mark_sticky(io: &dyn FileIo) -> Result<()> {
    let mut header = read_header(io)?;
    header.sticky = true;
    write_header(io, &header)
}
