//! Кадрирование потока байт
//!
//! Каждый кадр на проводе: VarInt-длина, затем область `id + payload`.
//! Длина считает только байты этой области, поэтому читатель всегда знает,
//! сколько буферизовать, прежде чем разбирать содержимое, — ошибки
//! кадрирования отделены от ошибок разбора payload.
//!
//! После получения set-compression кадр переходит в двойной формат:
//! VarInt-длина, VarInt-размер распакованных данных (0 — без сжатия),
//! затем либо открытые `id + payload`, либо zlib-поток.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FramingError, MlinkError, ProtocolError, Result};
use crate::varint::{self, VarIntAccumulator};

/// Максимальная длина области `id + payload` входящего кадра.
/// Совпадает с потолком трёхбайтового VarInt.
pub const MAX_FRAME_LENGTH: usize = 2_097_151;

/// Один кадр протокола: числовой id и неразобранный payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Идентификатор пакета (уникален только в паре состояние/направление)
    pub id: i32,
    /// Содержимое пакета после id, без интерпретации
    pub payload: Bytes,
}

/// Прочитать VarInt из асинхронного потока побайтово
async fn read_varint_stream<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32> {
    let mut acc = VarIntAccumulator::new();

    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed.into());
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(value) = acc.push(byte).map_err(MlinkError::Framing)? {
            return Ok(value);
        }
    }
}

/// Прочитать один кадр из потока
///
/// `compression` — порог сжатия, если сервер прислал set-compression.
/// Блокируется до получения полного кадра; обрыв потока до его конца —
/// протокольная ошибка `ConnectionClosed`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    compression: Option<i32>,
) -> Result<Frame> {
    let length = read_varint_stream(reader).await?;

    if length <= 0 {
        return Err(FramingError::InvalidFrameLength(length).into());
    }
    let length = length as usize;
    if length > MAX_FRAME_LENGTH {
        return Err(FramingError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_LENGTH,
        }
        .into());
    }

    let mut body = vec![0u8; length];
    match reader.read_exact(&mut body).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed.into());
        }
        Err(e) => return Err(e.into()),
    }

    let mut cursor = &body[..];

    if compression.is_some() {
        let data_length = varint::decode(&mut cursor).map_err(MlinkError::Framing)?;

        if data_length > 0 {
            let inflated = inflate(cursor, data_length as usize)?;
            return split_frame(&inflated);
        }
        // data_length == 0: область id + payload не сжата
    }

    split_frame(cursor)
}

/// Разобрать область `id + payload`
fn split_frame(body: &[u8]) -> Result<Frame> {
    let mut cursor = body;
    let id = varint::decode(&mut cursor).map_err(MlinkError::Framing)?;

    Ok(Frame {
        id,
        payload: Bytes::copy_from_slice(cursor),
    })
}

/// Собрать кадр в один буфер для единственной записи в поток
///
/// Запись одним буфером гарантирует, что конкурирующие отправители не
/// перемешают части кадров.
pub fn encode_frame(id: i32, payload: &[u8], compression: Option<i32>) -> Result<BytesMut> {
    let mut body = BytesMut::with_capacity(varint::size(id) + payload.len());
    varint::encode(id, &mut body);
    body.extend_from_slice(payload);

    let body = match compression {
        Some(threshold) if (body.len() as i32) >= threshold => {
            let deflated = deflate(&body)?;
            let mut framed =
                BytesMut::with_capacity(varint::size(body.len() as i32) + deflated.len());
            varint::encode(body.len() as i32, &mut framed);
            framed.extend_from_slice(&deflated);
            framed
        }
        Some(_) => {
            // Ниже порога: маркер 0 и открытые данные
            let mut framed = BytesMut::with_capacity(1 + body.len());
            varint::encode(0, &mut framed);
            framed.extend_from_slice(&body);
            framed
        }
        None => body,
    };

    let mut frame = BytesMut::with_capacity(varint::size(body.len() as i32) + body.len());
    varint::encode(body.len() as i32, &mut frame);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Распаковать zlib-поток, сверив размер с заявленным
fn inflate(data: &[u8], declared: usize) -> Result<Vec<u8>> {
    if declared > MAX_FRAME_LENGTH {
        return Err(FramingError::FrameTooLarge {
            size: declared,
            max: MAX_FRAME_LENGTH,
        }
        .into());
    }

    let mut out = Vec::with_capacity(declared);
    let mut decoder = ZlibDecoder::new(data);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FramingError::Decompress(e.to_string()))?;

    if out.len() != declared {
        return Err(FramingError::DecompressedSizeMismatch {
            declared,
            actual: out.len(),
        }
        .into());
    }

    Ok(out)
}

/// Сжать область `id + payload` в zlib-поток
fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| MlinkError::Framing(FramingError::Decompress(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MlinkError;

    async fn roundtrip(id: i32, payload: &[u8], compression: Option<i32>) -> Frame {
        let encoded = encode_frame(id, payload, compression).unwrap();
        let mut cursor = &encoded[..];
        read_frame(&mut cursor, compression).await.unwrap()
    }

    #[tokio::test]
    async fn test_frame_roundtrip_plain() {
        for len in [0usize, 1, 4096] {
            let payload = vec![0x5Au8; len];
            let frame = roundtrip(0x27, &payload, None).await;
            assert_eq!(frame.id, 0x27);
            assert_eq!(frame.payload, payload);
        }
    }

    #[tokio::test]
    async fn test_frame_roundtrip_large_id() {
        // id, занимающий больше одного байта VarInt
        let frame = roundtrip(0x7A, b"transfer", None).await;
        assert_eq!(frame.id, 0x7A);
        assert_eq!(&frame.payload[..], b"transfer");
    }

    #[tokio::test]
    async fn test_rejects_non_positive_length() {
        // Кадр с длиной 0
        let data = [0x00u8];
        let mut cursor = &data[..];
        let err = read_frame(&mut cursor, None).await.unwrap_err();
        assert!(matches!(
            err,
            MlinkError::Framing(FramingError::InvalidFrameLength(0))
        ));
    }

    #[tokio::test]
    async fn test_rejects_oversized_length() {
        // Заявленная длина за пределами трёхбайтового VarInt
        let mut data = BytesMut::new();
        varint::encode(MAX_FRAME_LENGTH as i32 + 1, &mut data);
        let mut cursor = &data[..];
        let err = read_frame(&mut cursor, None).await.unwrap_err();
        assert!(matches!(
            err,
            MlinkError::Framing(FramingError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_connection_closed() {
        // Длина обещает 16 байт, поток обрывается после 3
        let mut data = BytesMut::new();
        varint::encode(16, &mut data);
        data.extend_from_slice(&[1, 2, 3]);
        let mut cursor = &data[..];
        let err = read_frame(&mut cursor, None).await.unwrap_err();
        assert!(matches!(
            err,
            MlinkError::Protocol(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_compressed_below_threshold_uses_zero_marker() {
        let payload = vec![0x11u8; 32];
        let encoded = encode_frame(0x04, &payload, Some(256)).unwrap();

        // После VarInt-длины идёт маркер 0
        let mut cursor = &encoded[..];
        let _outer = varint::decode(&mut cursor).unwrap();
        assert_eq!(varint::decode(&mut cursor).unwrap(), 0);

        let mut cursor = &encoded[..];
        let frame = read_frame(&mut cursor, Some(256)).await.unwrap();
        assert_eq!(frame.id, 0x04);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_compressed_above_threshold_roundtrip() {
        let payload = vec![0x22u8; 8192];
        let frame = roundtrip(0x07, &payload, Some(256)).await;
        assert_eq!(frame.id, 0x07);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_compressed_size_mismatch_rejected() {
        // Кадр заявляет больший распакованный размер, чем есть на деле
        let body = {
            let mut b = BytesMut::new();
            varint::encode(0x07, &mut b);
            b.extend_from_slice(b"data");
            b
        };
        let deflated = deflate(&body).unwrap();

        let mut inner = BytesMut::new();
        varint::encode(body.len() as i32 + 5, &mut inner);
        inner.extend_from_slice(&deflated);

        let mut framed = BytesMut::new();
        varint::encode(inner.len() as i32, &mut framed);
        framed.extend_from_slice(&inner);

        let mut cursor = &framed[..];
        let err = read_frame(&mut cursor, Some(1)).await.unwrap_err();
        assert!(matches!(
            err,
            MlinkError::Framing(FramingError::DecompressedSizeMismatch { .. })
        ));
    }
}
