//! Кодирование целых чисел переменной длины (VarInt)
//!
//! Каждый байт несёт 7 младших бит значения, старший бит — признак
//! продолжения. Группы идут от младших бит к старшим. 32-битное значение
//! занимает от 1 до 5 байт; пятый байт с выставленным битом продолжения —
//! ошибка, это ограничивает чтение при злонамеренном вводе.

use bytes::{Buf, BufMut};

use crate::error::FramingError;

/// Максимальная длина закодированного VarInt в байтах
pub const MAX_VARINT_LEN: usize = 5;

/// Маска полезных бит одного байта
const SEGMENT_BITS: u32 = 0x7F;

/// Бит продолжения
const CONTINUE_BIT: u8 = 0x80;

/// Побайтовый накопитель VarInt
///
/// Позволяет декодировать значение из источников, отдающих данные по
/// одному байту (например, из сетевого потока), не дублируя логику
/// ограничения в 32 бита.
#[derive(Debug, Default)]
pub struct VarIntAccumulator {
    value: i32,
    shift: u32,
}

impl VarIntAccumulator {
    /// Создать пустой накопитель
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить очередной байт
    ///
    /// Возвращает `Ok(Some(value))`, когда значение собрано целиком,
    /// `Ok(None)`, если ожидаются ещё байты, и ошибку, если значение
    /// не умещается в 32 бита.
    pub fn push(&mut self, byte: u8) -> Result<Option<i32>, FramingError> {
        self.value |= (((byte as u32) & SEGMENT_BITS) << self.shift) as i32;

        if byte & CONTINUE_BIT == 0 {
            return Ok(Some(self.value));
        }

        self.shift += 7;
        if self.shift >= 32 {
            return Err(FramingError::MalformedVarInt);
        }
        Ok(None)
    }
}

/// Декодировать VarInt из буфера
///
/// Считывает от 1 до 5 байт. Возвращает ошибку, если буфер закончился
/// до завершения значения или значение превышает 32 бита.
pub fn decode(buf: &mut impl Buf) -> Result<i32, FramingError> {
    let mut acc = VarIntAccumulator::new();

    loop {
        if !buf.has_remaining() {
            return Err(FramingError::Truncated {
                required: 1,
                available: 0,
            });
        }

        if let Some(value) = acc.push(buf.get_u8())? {
            return Ok(value);
        }
    }
}

/// Закодировать VarInt в буфер
pub fn encode(mut value: i32, buf: &mut impl BufMut) {
    loop {
        if value as u32 & !SEGMENT_BITS == 0 {
            buf.put_u8(value as u8);
            return;
        }

        buf.put_u8((value as u32 & SEGMENT_BITS) as u8 | CONTINUE_BIT);
        value = ((value as u32) >> 7) as i32;
    }
}

/// Длина закодированного значения без аллокации
///
/// Используется для вычисления границ payload внутри кадра.
pub fn size(value: i32) -> usize {
    for i in 1..MAX_VARINT_LEN {
        if (value as u32) >> (i * 7) == 0 {
            return i;
        }
    }
    MAX_VARINT_LEN
}
