use bytes::{Buf, Bytes};

use crate::error::JuteError;
use crate::JuteDeserialize;

pub struct Deserializer {
    buf: Bytes,
}

impl Deserializer {
    pub fn from_buf(buf: Bytes) -> Self {
        Deserializer { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, need: usize) -> Result<(), JuteError> {
        if self.buf.remaining() < need {
            return Err(JuteError::UnexpectedEof {
                need,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, JuteError> {
        self.ensure(1)?;
        match self.buf.get_u8() {
            0x0 => Ok(false),
            0x1 => Ok(true),
            b => Err(JuteError::InvalidBool(b)),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32, JuteError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64, JuteError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_u32(&mut self) -> Result<u32, JuteError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_u64(&mut self) -> Result<u64, JuteError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    fn read_len(&mut self) -> Result<usize, JuteError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(JuteError::InvalidLength(len));
        }
        let len = len as usize;
        self.ensure(len)?;
        Ok(len)
    }

    pub fn read_string(&mut self) -> Result<String, JuteError> {
        let len = self.read_len()?;
        let raw = self.buf.copy_to_bytes(len);
        Ok(String::from_utf8(raw.to_vec())?)
    }

    pub fn read_buffer(&mut self) -> Result<Vec<u8>, JuteError> {
        let len = self.read_len()?;
        Ok(self.buf.copy_to_bytes(len).to_vec())
    }

    /// Count prefix of a vector; the caller deserializes the elements.
    pub fn read_vec_len(&mut self) -> Result<usize, JuteError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(JuteError::InvalidLength(len));
        }
        Ok(len as usize)
    }

    pub fn read_vec<T: JuteDeserialize>(&mut self) -> Result<Vec<T>, JuteError> {
        let len = self.read_vec_len()?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(T::deserialize(self)?);
        }
        Ok(out)
    }
}
