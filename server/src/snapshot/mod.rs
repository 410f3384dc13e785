//! Snapshot object files: `SnapHead | version | (len|crc|body)* | SnapTail |
//! checksum`. One file holds one logical collection; a full snapshot is a set
//! of such files.

mod batch;
mod checksum;
mod file;
mod serialize;

pub use batch::{BatchType, SnapshotBatchBody};
pub use checksum::{get_crc32, update_checksum};
pub use file::{SnapshotReader, SnapshotWriter, SNAPSHOT_BATCH_HEADER_SIZE};
pub use serialize::{
    load_snapshot_object, serialize_acls, serialize_ephemerals, serialize_int_map,
    serialize_sessions, serialize_string_map,
};

use std::fmt;

pub const MAGIC_SNAPSHOT_HEAD: [u8; 8] = *b"SnapHead";
pub const MAGIC_SNAPSHOT_TAIL: [u8; 8] = *b"SnapTail";

pub fn is_file_header(magic: u64) -> bool {
    magic == u64::from_le_bytes(MAGIC_SNAPSHOT_HEAD)
}

pub fn is_file_tail(magic: u64) -> bool {
    magic == u64::from_le_bytes(MAGIC_SNAPSHOT_TAIL)
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotVersion {
    V0 = 0,
    V1 = 1,
    V2 = 2,
    V3 = 3,
    None = 255,
}

impl SnapshotVersion {
    pub fn from_u8(v: u8) -> Option<SnapshotVersion> {
        match v {
            0 => Some(SnapshotVersion::V0),
            1 => Some(SnapshotVersion::V1),
            2 => Some(SnapshotVersion::V2),
            3 => Some(SnapshotVersion::V3),
            255 => Some(SnapshotVersion::None),
            _ => None,
        }
    }

    /// V2 and later carry the self-describing batch body; V0/V1 carry the
    /// legacy protobuf-framed item batch.
    pub fn uses_batch_body(&self) -> bool {
        matches!(self, SnapshotVersion::V2 | SnapshotVersion::V3)
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotVersion::V0 => "v0",
            SnapshotVersion::V1 => "v1",
            SnapshotVersion::V2 => "v2",
            SnapshotVersion::V3 => "v3",
            SnapshotVersion::None => "none",
        };
        write!(f, "{}", s)
    }
}
