//! Domain serializers and rebuilders. Every collection shares the same
//! emission skeleton: open with header, cut a batch at every
//! `save_batch_size` boundary, fold each batch CRC into the running
//! checksum, flush the final partial batch, write the tail.
//!
//! Records inside a batch element use the ZooKeeper binary convention
//! (big-endian, length-prefixed), matching the client wire protocol.

use std::path::Path;

use bytes::Bytes;
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::snapshot::batch::parse_legacy;
use crate::snapshot::{
    update_checksum, BatchType, SnapshotBatchBody, SnapshotReader, SnapshotVersion, SnapshotWriter,
};
use crate::store::{Acl, AclMapping, AuthId, IntMap, KeeperStore, StringMap};

fn save_batch_and_update_checksum(
    out: &mut SnapshotWriter,
    batch: &mut SnapshotBatchBody,
    checksum: u32,
) -> Result<(usize, u32), SnapshotError> {
    let (save_size, data_crc) = out.write_batch(batch)?;
    Ok((save_size, update_checksum(checksum, data_crc)))
}

/// Shared emission skeleton. An empty collection yields no batches at all:
/// header, version, tail, checksum 0.
fn write_object<T>(
    path: &Path,
    version: SnapshotVersion,
    batch_type: BatchType,
    save_batch_size: u32,
    items: impl IntoIterator<Item = T>,
    encode: impl Fn(&T, &mut jute::Serializer),
) -> Result<(), SnapshotError> {
    if !version.uses_batch_body() {
        return Err(SnapshotError::UnsupportedVersion(version as u8));
    }
    let save_batch_size = save_batch_size.max(1) as u64;

    let mut out = SnapshotWriter::open(path, version)?;
    let mut batch: Option<SnapshotBatchBody> = None;
    let mut checksum = 0u32;
    let mut index = 0u64;

    for item in items {
        // flush and rebuild the batch at every boundary, except the first
        if index % save_batch_size == 0 {
            if let Some(mut full) = batch.take() {
                let (_, new_checksum) = save_batch_and_update_checksum(&mut out, &mut full, checksum)?;
                checksum = new_checksum;
            }
            batch = Some(SnapshotBatchBody::new(batch_type));
        }

        let mut buf = jute::Serializer::new();
        encode(&item, &mut buf);
        if let Some(current) = batch.as_mut() {
            current.add(buf.into_buffer());
        }
        index += 1;
    }

    // flush the last, possibly partial, batch
    if let Some(mut last) = batch.take() {
        let (_, new_checksum) = save_batch_and_update_checksum(&mut out, &mut last, checksum)?;
        checksum = new_checksum;
    }

    out.finish(checksum)
}

pub fn serialize_acls(
    acls: &AclMapping,
    path: &Path,
    save_batch_size: u32,
    version: SnapshotVersion,
) -> Result<(), SnapshotError> {
    info!(
        "Begin create snapshot acl object, acl size {}, path {}",
        acls.len(),
        path.display()
    );
    write_object(
        path,
        version,
        BatchType::AclMap,
        save_batch_size,
        acls.iter(),
        |&(id, acl_list), buf| {
            buf.write_u64(*id);
            buf.write_vec(acl_list);
        },
    )
}

/// Serialize the session table with per-session auth. Returns the next
/// session id sampled at entry so the caller can pair it with the snapshot.
/// The session and auth mutexes are taken (in that order) only long enough
/// to clone a coherent pair; no I/O happens under them.
pub fn serialize_sessions(
    store: &KeeperStore,
    save_batch_size: u32,
    version: SnapshotVersion,
    path: &Path,
) -> Result<i64, SnapshotError> {
    let snapshot = store.sessions_snapshot();
    info!(
        "Begin create snapshot session object, session size {}, path {}",
        snapshot.session_and_timeout.len(),
        path.display()
    );

    let auth = &snapshot.session_and_auth;
    write_object(
        path,
        version,
        BatchType::Session,
        save_batch_size,
        snapshot.session_and_timeout.iter(),
        |&(session_id, timeout_ms), buf| {
            buf.write_i64(*session_id);
            buf.write_i64(*timeout_ms);
            match auth.get(session_id) {
                Some(ids) => buf.write_vec(ids),
                None => buf.write_vec::<AuthId>(&[]),
            }
        },
    )?;

    Ok(snapshot.next_session_id)
}

/// Serialize the ephemeral-node index. The ephemerals mutex is held for the
/// entire emission.
pub fn serialize_ephemerals(
    store: &KeeperStore,
    path: &Path,
    save_batch_size: u32,
    version: SnapshotVersion,
) -> Result<(), SnapshotError> {
    store.with_ephemerals(|ephemerals| {
        info!(
            "Begin create snapshot ephemeral object, node size {}, path {}",
            ephemerals.len(),
            path.display()
        );
        write_object(
            path,
            version,
            BatchType::DataEphemeral,
            save_batch_size,
            ephemerals.iter(),
            |&(session_id, paths), buf| {
                buf.write_i64(*session_id);
                buf.write_u64(paths.len() as u64);
                for node_path in paths.iter() {
                    buf.write_str(node_path);
                }
            },
        )
    })
}

pub fn serialize_string_map(
    snap_map: &StringMap,
    save_batch_size: u32,
    version: SnapshotVersion,
    path: &Path,
) -> Result<(), SnapshotError> {
    info!(
        "Begin create snapshot map object, map size {}, path {}",
        snap_map.len(),
        path.display()
    );
    write_object(
        path,
        version,
        BatchType::StringMap,
        save_batch_size,
        snap_map.iter(),
        |&(key, value), buf| {
            buf.write_str(key);
            buf.write_str(value);
        },
    )
}

pub fn serialize_int_map(
    snap_map: &IntMap,
    save_batch_size: u32,
    version: SnapshotVersion,
    path: &Path,
) -> Result<(), SnapshotError> {
    info!(
        "Begin create snapshot map object, map size {}, path {}",
        snap_map.len(),
        path.display()
    );
    write_object(
        path,
        version,
        BatchType::UintMap,
        save_batch_size,
        snap_map.iter(),
        |&(key, value), buf| {
            buf.write_str(key);
            buf.write_u64(*value);
        },
    )
}

/// Read one object file back, verifying framing and checksums, and install
/// its records into the live store.
pub fn load_snapshot_object(path: &Path, store: &KeeperStore) -> Result<(), SnapshotError> {
    let mut reader = SnapshotReader::open(path)?;
    let version = reader.version();
    let mut checksum = 0u32;
    let mut batches = 0u64;

    while let Some((body, data_crc)) = reader.next_batch()? {
        checksum = update_checksum(checksum, data_crc);
        if body.is_empty() {
            // legal: a flush with no accumulated data
            continue;
        }
        let batch = if version.uses_batch_body() {
            SnapshotBatchBody::parse(Bytes::from(body))?
        } else {
            parse_legacy(Bytes::from(body))?
        };
        install_batch(&batch, store)?;
        batches += 1;
    }

    let declared = reader.tail_checksum().ok_or(SnapshotError::UnexpectedEof)?;
    if declared != checksum {
        warn!(
            "Snapshot object {} tail checksum mismatch, declared {:#010x}, folded {:#010x}",
            path.display(),
            declared,
            checksum
        );
        return Err(SnapshotError::ChecksumMismatch {
            expected: declared,
            actual: checksum,
        });
    }

    info!(
        "Loaded snapshot object {}, version {}, {} batches",
        path.display(),
        version,
        batches
    );
    Ok(())
}

fn install_batch(batch: &SnapshotBatchBody, store: &KeeperStore) -> Result<(), SnapshotError> {
    match batch.batch_type {
        BatchType::AclMap => {
            for element in batch.iter() {
                let mut d = jute::Deserializer::from_buf(element.clone());
                let id = d.read_u64()?;
                let acl_list: Vec<Acl> = d.read_vec()?;
                expect_consumed(&d)?;
                store.set_acl(id, acl_list);
            }
        }

        BatchType::Session => {
            for element in batch.iter() {
                let mut d = jute::Deserializer::from_buf(element.clone());
                let session_id = d.read_i64()?;
                let timeout_ms = d.read_i64()?;
                let auth_ids: Vec<AuthId> = d.read_vec()?;
                expect_consumed(&d)?;
                store.add_session(session_id, timeout_ms);
                if !auth_ids.is_empty() {
                    store.set_session_auth(session_id, auth_ids);
                }
            }
        }

        BatchType::DataEphemeral => {
            for element in batch.iter() {
                let mut d = jute::Deserializer::from_buf(element.clone());
                let session_id = d.read_i64()?;
                let count = d.read_u64()?;
                let mut paths = Vec::with_capacity(count.min(4096) as usize);
                for _ in 0..count {
                    paths.push(d.read_string()?);
                }
                expect_consumed(&d)?;
                store.install_ephemerals(session_id, paths);
            }
        }

        BatchType::StringMap => {
            for element in batch.iter() {
                let mut d = jute::Deserializer::from_buf(element.clone());
                let key = d.read_string()?;
                let value = d.read_string()?;
                expect_consumed(&d)?;
                store.set_string_entry(key, value);
            }
        }

        BatchType::UintMap => {
            for element in batch.iter() {
                let mut d = jute::Deserializer::from_buf(element.clone());
                let key = d.read_string()?;
                let value = d.read_u64()?;
                expect_consumed(&d)?;
                store.set_int_entry(key, value);
            }
        }

        BatchType::Data => {
            return Err(SnapshotError::Malformed(
                "data-tree batches are not handled by this reader".to_string(),
            ));
        }
    }
    Ok(())
}

fn expect_consumed(d: &jute::Deserializer) -> Result<(), SnapshotError> {
    if d.remaining() != 0 {
        return Err(SnapshotError::Malformed(format!(
            "{} trailing bytes after record",
            d.remaining()
        )));
    }
    Ok(())
}
