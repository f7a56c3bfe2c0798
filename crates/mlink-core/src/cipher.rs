//! Потоковое шифрование канала (AES-128-CFB8)
//!
//! После согласования обе стороны шифруют поток AES в режиме CFB с
//! 8-битной обратной связью. Ключ и вектор инициализации — один и тот же
//! общий секрет: это свойство проводного протокола, и оно воспроизводится
//! бит-в-бит ради совместимости. Состояние шифра раздельное на каждое
//! направление и не разделяется между соединениями.
//!
//! До согласования транспорт прозрачен: читатель просто отдаёт байты
//! как есть, а путь записи не трогает буфер.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use aes::cipher::inout::InOutBuf;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tokio::io::{AsyncRead, ReadBuf};

use crate::crypto::SharedSecret;

/// Шифратор исходящего направления
pub type Aes128Cfb8Encryptor = cfb8::Encryptor<aes::Aes128>;

/// Дешифратор входящего направления
pub type Aes128Cfb8Decryptor = cfb8::Decryptor<aes::Aes128>;

/// Создать пару шифров для двух направлений из общего секрета
pub fn cipher_pair(secret: &SharedSecret) -> (Aes128Cfb8Encryptor, Aes128Cfb8Decryptor) {
    let key = secret.as_bytes();
    (
        Aes128Cfb8Encryptor::new(key.into(), key.into()),
        Aes128Cfb8Decryptor::new(key.into(), key.into()),
    )
}

/// Зашифровать буфер на месте, продвинув состояние шифра
pub fn encrypt_in_place(cipher: &mut Aes128Cfb8Encryptor, data: &mut [u8]) {
    let (blocks, _) = InOutBuf::from(data).into_chunks();
    cipher.encrypt_blocks_inout_mut(blocks);
}

/// Расшифровать буфер на месте, продвинув состояние шифра
pub fn decrypt_in_place(cipher: &mut Aes128Cfb8Decryptor, data: &mut [u8]) {
    let (blocks, _) = InOutBuf::from(data).into_chunks();
    cipher.decrypt_blocks_inout_mut(blocks);
}

/// Читатель с прозрачной расшифровкой входящего потока
///
/// До вызова [`CipherReader::enable`] байты проходят без изменений.
/// CFB8 работает побайтово, поэтому расшифровывается ровно то, что
/// было прочитано, без внутренней буферизации.
pub struct CipherReader<R> {
    inner: R,
    cipher: Option<Aes128Cfb8Decryptor>,
}

impl<R> CipherReader<R> {
    /// Обернуть поток; расшифровка пока выключена
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cipher: None,
        }
    }

    /// Включить расшифровку входящих байт
    pub fn enable(&mut self, cipher: Aes128Cfb8Decryptor) {
        self.cipher = Some(cipher);
    }

    /// Включена ли расшифровка
    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CipherReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let pre = buf.filled().len();

        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if let Some(cipher) = &mut me.cipher {
                    let filled = buf.filled_mut();
                    decrypt_in_place(cipher, &mut filled[pre..]);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
