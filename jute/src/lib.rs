//! ZooKeeper binary convention: big-endian integers, strings and buffers
//! length-prefixed by an `i32`, vectors count-prefixed by an `i32`.

mod de;
mod error;
mod ser;

pub use de::Deserializer;
pub use error::JuteError;
pub use ser::Serializer;

pub type Buffer = Vec<u8>;

pub trait JuteSerialize {
    fn serialize(&self, out: &mut Serializer);
}

pub trait JuteDeserialize: Sized {
    fn deserialize(input: &mut Deserializer) -> Result<Self, JuteError>;
}

/// Serialize a single record into a frozen buffer.
pub fn to_buffer<T: JuteSerialize>(value: &T) -> bytes::Bytes {
    let mut s = Serializer::new();
    value.serialize(&mut s);
    s.into_buffer()
}

/// Deserialize a single record, requiring the buffer to be fully consumed.
pub fn from_buffer<T: JuteDeserialize>(buf: bytes::Bytes) -> Result<T, JuteError> {
    let mut d = Deserializer::from_buf(buf);
    let value = T::deserialize(&mut d)?;
    if d.remaining() != 0 {
        return Err(JuteError::TrailingBytes(d.remaining()));
    }
    Ok(value)
}
