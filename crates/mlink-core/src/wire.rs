//! Типизированное чтение и запись полей пакета
//!
//! Все многобайтовые числа передаются в big-endian. Строки — UTF-8 с
//! VarInt-префиксом длины, UUID — два i64 (старшие, затем младшие биты).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::FramingError;
use crate::varint;

/// Буфер для сборки payload исходящего пакета
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    /// Создать пустой буфер
    pub fn new() -> Self {
        Self::default()
    }

    /// Создать буфер с заранее выделенной ёмкостью
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Записать VarInt
    pub fn put_varint(&mut self, value: i32) -> &mut Self {
        varint::encode(value, &mut self.buf);
        self
    }

    /// Записать строку: VarInt-длина байт UTF-8, затем сами байты
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.put_varint(value.len() as i32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Записать UUID как два i64 big-endian
    pub fn put_uuid(&mut self, uuid: Uuid) -> &mut Self {
        let (hi, lo) = uuid.as_u64_pair();
        self.buf.put_u64(hi);
        self.buf.put_u64(lo);
        self
    }

    /// Записать один байт
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Записать u16 big-endian
    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    /// Записать i32 big-endian
    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    /// Записать i64 big-endian
    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64(value);
        self
    }

    /// Записать байты как есть
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Записать байтовый массив с VarInt-префиксом длины
    pub fn put_prefixed_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_varint(bytes.len() as i32);
        self.buf.put_slice(bytes);
        self
    }

    /// Завершить сборку
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Курсор для разбора payload входящего пакета
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    /// Создать курсор над срезом payload
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Количество непрочитанных байт
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn require(&self, required: usize) -> Result<(), FramingError> {
        if self.buf.len() < required {
            return Err(FramingError::Truncated {
                required,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Прочитать VarInt
    pub fn get_varint(&mut self) -> Result<i32, FramingError> {
        varint::decode(&mut self.buf)
    }

    /// Прочитать строку с VarInt-префиксом длины
    pub fn get_string(&mut self) -> Result<String, FramingError> {
        let len = self.get_varint()?;
        if len < 0 {
            return Err(FramingError::InvalidFrameLength(len));
        }
        let bytes = self.get_bytes(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FramingError::InvalidUtf8)
    }

    /// Прочитать UUID (два i64 big-endian)
    pub fn get_uuid(&mut self) -> Result<Uuid, FramingError> {
        self.require(16)?;
        let hi = self.buf.get_u64();
        let lo = self.buf.get_u64();
        Ok(Uuid::from_u64_pair(hi, lo))
    }

    /// Прочитать один байт
    pub fn get_u8(&mut self) -> Result<u8, FramingError> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    /// Прочитать u16 big-endian
    pub fn get_u16(&mut self) -> Result<u16, FramingError> {
        self.require(2)?;
        Ok(self.buf.get_u16())
    }

    /// Прочитать i32 big-endian
    pub fn get_i32(&mut self) -> Result<i32, FramingError> {
        self.require(4)?;
        Ok(self.buf.get_i32())
    }

    /// Прочитать i64 big-endian
    pub fn get_i64(&mut self) -> Result<i64, FramingError> {
        self.require(8)?;
        Ok(self.buf.get_i64())
    }

    /// Прочитать ровно `len` байт
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], FramingError> {
        self.require(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Прочитать байтовый массив с VarInt-префиксом длины
    pub fn get_prefixed_bytes(&mut self) -> Result<&'a [u8], FramingError> {
        let len = self.get_varint()?;
        if len < 0 {
            return Err(FramingError::InvalidFrameLength(len));
        }
        self.get_bytes(len as usize)
    }
}
