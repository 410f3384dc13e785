//! The only code that touches the disk: buffered little-endian framing of
//! snapshot object files.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::trace;

use crate::error::SnapshotError;
use crate::snapshot::checksum::get_crc32;
use crate::snapshot::{
    is_file_header, is_file_tail, SnapshotBatchBody, SnapshotVersion, MAGIC_SNAPSHOT_HEAD,
    MAGIC_SNAPSHOT_TAIL,
};

/// On-disk size of `data_length | data_crc`.
pub const SNAPSHOT_BATCH_HEADER_SIZE: usize = 16;

pub struct SnapshotWriter {
    out: BufWriter<File>,
}

impl SnapshotWriter {
    /// Create (truncating) the object file and write magic plus version.
    pub fn open(path: &Path, version: SnapshotVersion) -> Result<Self, SnapshotError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(path)?;
        let mut out = BufWriter::new(file);
        out.write_all(&MAGIC_SNAPSHOT_HEAD)?;
        out.write_u8(version as u8)?;
        Ok(SnapshotWriter { out })
    }

    /// Serialize and write `len | crc | body`, flush, and leave the batch
    /// empty for reuse. Returns the bytes written and the body CRC.
    pub fn write_batch(
        &mut self,
        batch: &mut SnapshotBatchBody,
    ) -> Result<(usize, u32), SnapshotError> {
        let body = batch.serialize();
        let data_crc = get_crc32(&body);

        self.out.write_u64::<LittleEndian>(body.len() as u64)?;
        self.out.write_u64::<LittleEndian>(u64::from(data_crc))?;
        self.out.write_all(&body)?;
        self.out.flush()?;

        batch.clear();
        trace!("batch written, len {}, crc {:#010x}", body.len(), data_crc);
        Ok((SNAPSHOT_BATCH_HEADER_SIZE + body.len(), data_crc))
    }

    /// Write the tail magic and the folded file checksum, then close.
    pub fn finish(mut self, checksum: u32) -> Result<(), SnapshotError> {
        self.out.write_all(&MAGIC_SNAPSHOT_TAIL)?;
        self.out.write_u32::<LittleEndian>(checksum)?;
        self.out.flush()?;
        Ok(())
    }
}

pub struct SnapshotReader {
    input: BufReader<File>,
    version: SnapshotVersion,
    tail_checksum: Option<u32>,
}

impl SnapshotReader {
    /// Open the object file, validating magic and version byte.
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let mut input = BufReader::new(file);

        let magic = read_u64(&mut input)?;
        if !is_file_header(magic) {
            return Err(SnapshotError::BadMagic(magic));
        }
        let raw_version = read_u8(&mut input)?;
        let version = match SnapshotVersion::from_u8(raw_version) {
            Some(SnapshotVersion::None) | Option::None => {
                return Err(SnapshotError::UnsupportedVersion(raw_version))
            }
            Some(v) => v,
        };

        Ok(SnapshotReader {
            input,
            version,
            tail_checksum: None,
        })
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// Next verified batch body, or `None` once the tail has been read.
    /// The per-batch CRC is checked here; parsing is the caller's business
    /// since the codec depends on the version.
    pub fn next_batch(&mut self) -> Result<Option<(Vec<u8>, u32)>, SnapshotError> {
        let first = read_u64(&mut self.input)?;
        if is_file_tail(first) {
            self.tail_checksum = Some(read_u32(&mut self.input)?);
            return Ok(None);
        }

        let data_length = usize::try_from(first)
            .map_err(|_| SnapshotError::Malformed(format!("absurd batch length {}", first)))?;
        let data_crc = read_u64(&mut self.input)? as u32;
        let body = read_strict(&mut self.input, data_length)?;

        let actual = get_crc32(&body);
        if actual != data_crc {
            return Err(SnapshotError::ChecksumMismatch {
                expected: data_crc,
                actual,
            });
        }
        Ok(Some((body, data_crc)))
    }

    /// Checksum recorded in the tail; present only after `next_batch`
    /// returned `None`.
    pub fn tail_checksum(&self) -> Option<u32> {
        self.tail_checksum
    }
}

fn read_u8(input: &mut BufReader<File>) -> Result<u8, SnapshotError> {
    input.read_u8().map_err(map_eof)
}

fn read_u32(input: &mut BufReader<File>) -> Result<u32, SnapshotError> {
    input.read_u32::<LittleEndian>().map_err(map_eof)
}

fn read_u64(input: &mut BufReader<File>) -> Result<u64, SnapshotError> {
    input.read_u64::<LittleEndian>().map_err(map_eof)
}

fn read_strict(input: &mut BufReader<File>, n: usize) -> Result<Vec<u8>, SnapshotError> {
    let mut buf = vec![0u8; n];
    input.read_exact(&mut buf).map_err(map_eof)?;
    Ok(buf)
}

fn map_eof(e: io::Error) -> SnapshotError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SnapshotError::UnexpectedEof
    } else {
        SnapshotError::Io(e)
    }
}
