//! Batch containers. V2+ batches are the self-describing
//! `type | count | (len | bytes)*` body; V0/V1 batches are the legacy
//! protobuf-framed item list, supported read-only.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::SnapshotError;

/// Kind of records carried by a batch. `Data` (tree nodes) is reserved.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    Data = 0,
    DataEphemeral = 1,
    Session = 2,
    StringMap = 3,
    UintMap = 4,
    AclMap = 5,
}

impl BatchType {
    pub fn from_i32(v: i32) -> Option<BatchType> {
        match v {
            0 => Some(BatchType::Data),
            1 => Some(BatchType::DataEphemeral),
            2 => Some(BatchType::Session),
            3 => Some(BatchType::StringMap),
            4 => Some(BatchType::UintMap),
            5 => Some(BatchType::AclMap),
            _ => None,
        }
    }
}

/// Ordered container of opaque elements; order is semantically meaningful
/// and is preserved through serialization.
#[derive(Debug, Clone)]
pub struct SnapshotBatchBody {
    pub batch_type: BatchType,
    elements: Vec<Bytes>,
}

impl SnapshotBatchBody {
    pub fn new(batch_type: BatchType) -> Self {
        SnapshotBatchBody {
            batch_type,
            elements: Vec::new(),
        }
    }

    pub fn add(&mut self, element: Bytes) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.elements.iter()
    }

    /// `type i32 LE | count i32 LE | (len i32 LE | bytes)*count`
    pub fn serialize(&self) -> Bytes {
        let payload: usize = self.elements.iter().map(|e| 4 + e.len()).sum();
        let mut buf = BytesMut::with_capacity(8 + payload);
        buf.put_i32_le(self.batch_type as i32);
        buf.put_i32_le(self.elements.len() as i32);
        for element in &self.elements {
            buf.put_i32_le(element.len() as i32);
            buf.put_slice(element);
        }
        buf.freeze()
    }

    pub fn parse(mut data: Bytes) -> Result<Self, SnapshotError> {
        if data.remaining() < 8 {
            return Err(SnapshotError::Malformed(format!(
                "batch body too short: {} bytes",
                data.remaining()
            )));
        }
        let raw_type = data.get_i32_le();
        let batch_type = BatchType::from_i32(raw_type)
            .ok_or_else(|| SnapshotError::Malformed(format!("unknown batch type {}", raw_type)))?;
        let count = data.get_i32_le();
        if count < 0 {
            return Err(SnapshotError::Malformed(format!(
                "negative element count {}",
                count
            )));
        }

        let mut elements = Vec::with_capacity((count as usize).min(4096));
        for i in 0..count {
            if data.remaining() < 4 {
                return Err(SnapshotError::Malformed(format!(
                    "truncated length prefix for element {}",
                    i
                )));
            }
            let len = data.get_i32_le();
            if len < 0 || len as usize > data.remaining() {
                return Err(SnapshotError::Malformed(format!(
                    "element {} length {} exceeds remaining {} bytes",
                    i,
                    len,
                    data.remaining()
                )));
            }
            elements.push(data.copy_to_bytes(len as usize));
        }
        if data.has_remaining() {
            return Err(SnapshotError::Malformed(format!(
                "{} trailing bytes after last element",
                data.remaining()
            )));
        }

        Ok(SnapshotBatchBody {
            batch_type,
            elements,
        })
    }
}

// Legacy V0/V1 batches: a protobuf message with `batch_type` as field 1
// (varint) and repeated item messages as field 2, each item carrying its
// record bytes as field 1.

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LENGTH_DELIMITED: u64 = 2;
const WIRE_FIXED32: u64 = 5;

fn read_varint(data: &mut Bytes) -> Result<u64, SnapshotError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if !data.has_remaining() {
            return Err(SnapshotError::Malformed(
                "truncated varint in legacy batch".to_string(),
            ));
        }
        let byte = data.get_u8();
        if shift >= 64 {
            return Err(SnapshotError::Malformed(
                "varint overflow in legacy batch".to_string(),
            ));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn read_length_delimited(data: &mut Bytes) -> Result<Bytes, SnapshotError> {
    let len = read_varint(data)? as usize;
    if len > data.remaining() {
        return Err(SnapshotError::Malformed(format!(
            "legacy field length {} exceeds remaining {} bytes",
            len,
            data.remaining()
        )));
    }
    Ok(data.copy_to_bytes(len))
}

fn skip_field(wire_type: u64, data: &mut Bytes) -> Result<(), SnapshotError> {
    match wire_type {
        WIRE_VARINT => {
            read_varint(data)?;
        }
        WIRE_FIXED64 => {
            if data.remaining() < 8 {
                return Err(SnapshotError::Malformed(
                    "truncated fixed64 in legacy batch".to_string(),
                ));
            }
            data.advance(8);
        }
        WIRE_LENGTH_DELIMITED => {
            read_length_delimited(data)?;
        }
        WIRE_FIXED32 => {
            if data.remaining() < 4 {
                return Err(SnapshotError::Malformed(
                    "truncated fixed32 in legacy batch".to_string(),
                ));
            }
            data.advance(4);
        }
        other => {
            return Err(SnapshotError::Malformed(format!(
                "unsupported legacy wire type {}",
                other
            )));
        }
    }
    Ok(())
}

fn parse_legacy_item(mut data: Bytes) -> Result<Bytes, SnapshotError> {
    let mut record = Bytes::new();
    while data.has_remaining() {
        let key = read_varint(&mut data)?;
        let (field, wire_type) = (key >> 3, key & 0x7);
        if field == 1 && wire_type == WIRE_LENGTH_DELIMITED {
            record = read_length_delimited(&mut data)?;
        } else {
            skip_field(wire_type, &mut data)?;
        }
    }
    Ok(record)
}

/// Decode a legacy item batch into the common container.
pub fn parse_legacy(mut data: Bytes) -> Result<SnapshotBatchBody, SnapshotError> {
    let mut raw_type = 0i64;
    let mut elements = Vec::new();
    while data.has_remaining() {
        let key = read_varint(&mut data)?;
        let (field, wire_type) = (key >> 3, key & 0x7);
        match (field, wire_type) {
            (1, WIRE_VARINT) => raw_type = read_varint(&mut data)? as i64,
            (2, WIRE_LENGTH_DELIMITED) => {
                let item = read_length_delimited(&mut data)?;
                elements.push(parse_legacy_item(item)?);
            }
            (_, wire_type) => skip_field(wire_type, &mut data)?,
        }
    }

    let batch_type = BatchType::from_i32(raw_type as i32)
        .ok_or_else(|| SnapshotError::Malformed(format!("unknown batch type {}", raw_type)))?;
    let mut batch = SnapshotBatchBody::new(batch_type);
    for element in elements {
        batch.add(element);
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_form_is_exact() {
        let mut batch = SnapshotBatchBody::new(BatchType::StringMap);
        batch.add(Bytes::from_static(b"ab"));
        batch.add(Bytes::from_static(b"xyz"));

        let expected: &[u8] = &[
            0x03, 0x00, 0x00, 0x00, // type StringMap
            0x02, 0x00, 0x00, 0x00, // count 2
            0x02, 0x00, 0x00, 0x00, b'a', b'b', // element 0
            0x03, 0x00, 0x00, 0x00, b'x', b'y', b'z', // element 1
        ];
        assert_eq!(batch.serialize().as_ref(), expected);
    }

    #[test]
    fn parse_round_trip_preserves_order() {
        let mut batch = SnapshotBatchBody::new(BatchType::Session);
        for i in 0..5u8 {
            batch.add(Bytes::copy_from_slice(&[i, i, i]));
        }
        let parsed = SnapshotBatchBody::parse(batch.serialize()).expect("parse");
        assert_eq!(parsed.batch_type, BatchType::Session);
        let elements: Vec<_> = parsed.iter().cloned().collect();
        for (i, el) in elements.iter().enumerate() {
            assert_eq!(el.as_ref(), &[i as u8, i as u8, i as u8]);
        }
    }

    #[test]
    fn parse_rejects_oversized_element_length() {
        let mut batch = SnapshotBatchBody::new(BatchType::AclMap);
        batch.add(Bytes::from_static(b"payload"));
        let mut raw = batch.serialize().to_vec();
        raw[8] = 0xff; // element length now far beyond the input
        assert!(matches!(
            SnapshotBatchBody::parse(Bytes::from(raw)),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(42);
        buf.put_i32_le(0);
        assert!(matches!(
            SnapshotBatchBody::parse(buf.freeze()),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_trailing_bytes() {
        let batch = SnapshotBatchBody::new(BatchType::UintMap);
        let mut raw = batch.serialize().to_vec();
        raw.push(0xaa);
        assert!(matches!(
            SnapshotBatchBody::parse(Bytes::from(raw)),
            Err(SnapshotError::Malformed(_))
        ));
    }

    fn put_varint(buf: &mut BytesMut, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                buf.put_u8(byte);
                return;
            }
            buf.put_u8(byte | 0x80);
        }
    }

    fn encode_legacy(batch_type: BatchType, items: &[&[u8]]) -> Bytes {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 1 << 3 | WIRE_VARINT); // batch_type
        put_varint(&mut buf, batch_type as u64);
        for item in items {
            let mut inner = BytesMut::new();
            put_varint(&mut inner, 1 << 3 | WIRE_LENGTH_DELIMITED); // data
            put_varint(&mut inner, item.len() as u64);
            inner.put_slice(item);

            put_varint(&mut buf, 2 << 3 | WIRE_LENGTH_DELIMITED); // item
            put_varint(&mut buf, inner.len() as u64);
            buf.put_slice(&inner);
        }
        buf.freeze()
    }

    #[test]
    fn legacy_batch_decodes_items_in_order() {
        let raw = encode_legacy(BatchType::StringMap, &[b"first", b"second"]);
        let batch = parse_legacy(raw).expect("legacy parse");
        assert_eq!(batch.batch_type, BatchType::StringMap);
        let elements: Vec<_> = batch.iter().cloned().collect();
        assert_eq!(elements[0].as_ref(), b"first");
        assert_eq!(elements[1].as_ref(), b"second");
    }

    #[test]
    fn legacy_batch_without_items_is_empty() {
        let raw = encode_legacy(BatchType::Session, &[]);
        let batch = parse_legacy(raw).expect("legacy parse");
        assert_eq!(batch.batch_type, BatchType::Session);
        assert!(batch.is_empty());
    }

    #[test]
    fn legacy_truncated_varint_fails() {
        let raw = Bytes::from_static(&[0x08, 0x80]); // key then unterminated varint
        assert!(matches!(
            parse_legacy(raw),
            Err(SnapshotError::Malformed(_))
        ));
    }
}
