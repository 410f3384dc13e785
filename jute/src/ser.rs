use bytes::{BufMut, Bytes, BytesMut};

use crate::JuteSerialize;

pub struct Serializer {
    buf: BytesMut,
}

impl Serializer {
    pub fn new() -> Serializer {
        Serializer {
            buf: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Serializer {
        Serializer {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn into_buffer(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(if v { 0x1 } else { 0x0 });
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn write_str(&mut self, v: &str) {
        self.buf.put_i32(v.len() as i32);
        self.buf.put_slice(v.as_bytes());
    }

    pub fn write_buffer(&mut self, v: &[u8]) {
        self.buf.put_i32(v.len() as i32);
        self.buf.put_slice(v);
    }

    /// Count prefix for a vector; the caller serializes the elements.
    pub fn write_vec_len(&mut self, len: usize) {
        self.buf.put_i32(len as i32);
    }

    pub fn write_vec<T: JuteSerialize>(&mut self, v: &[T]) {
        self.write_vec_len(v.len());
        for x in v {
            x.serialize(self);
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer::new()
    }
}
