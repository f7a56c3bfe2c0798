//! Криптографические примитивы согласования шифрования
//!
//! Обмен устроен так: сервер присылает RSA-ключ и verify token, клиент
//! генерирует 16-байтовый общий секрет, шифрует секрет и токен RSA
//! (PKCS#1 v1.5) и вычисляет хеш идентификатора сервера для session-сервиса.
//! Хеш — SHA-1 от `server_id ++ shared_secret ++ public_key_der`,
//! интерпретированный как знаковое большое число (two's-complement, ведущий
//! `-` при выставленном старшем бите) и отформатированный в hex. Формат
//! унаследован от legacy-алгоритма и воспроизводится бит-в-бит.
//!
//! Общий секрет зануляется при удалении (Zeroize).

use num_bigint::BigInt;
use rand::{CryptoRng, RngCore};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha1::{Digest, Sha1};
use zeroize::ZeroizeOnDrop;

use crate::error::{CryptoError, FramingError};
use crate::wire::PacketReader;

/// Размер общего секрета (ключ и IV потокового шифра)
pub const SHARED_SECRET_SIZE: usize = 16;

/// Общий секрет соединения (автоматически зануляется)
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; SHARED_SECRET_SIZE],
}

impl SharedSecret {
    /// Сгенерировать новый секрет криптографически стойким ГСЧ
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SHARED_SECRET_SIZE];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Создать из готовых байт (для тестов и проверочных векторов)
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self { bytes }
    }

    /// Получить байты секрета
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Секрет не попадает в логи
        f.write_str("SharedSecret(..)")
    }
}

/// Состояние шифрования после успешного согласования
///
/// Принадлежит единственному соединению, никогда не сохраняется и
/// уничтожается вместе с ним.
#[derive(Debug)]
pub struct CryptoState {
    /// Общий секрет, переданный серверу в RSA-обёртке
    pub shared_secret: SharedSecret,
    /// Хеш идентификатора сервера, предъявленный session-сервису
    pub server_id_hash: String,
}

/// Содержимое запроса шифрования от сервера
#[derive(Debug, Clone)]
pub struct EncryptionRequest {
    /// Идентификатор сервера (в текущем поколении протокола обычно пуст)
    pub server_id: String,
    /// Публичный ключ RSA в DER (X.509 SubjectPublicKeyInfo)
    pub public_key_der: Vec<u8>,
    /// Одноразовый токен для проверки канала
    pub verify_token: Vec<u8>,
}

impl EncryptionRequest {
    /// Разобрать payload пакета encryption-request
    pub fn decode(payload: &[u8]) -> Result<Self, FramingError> {
        let mut reader = PacketReader::new(payload);

        let server_id = reader.get_string()?;
        let public_key_der = reader.get_prefixed_bytes()?.to_vec();
        let verify_token = reader.get_prefixed_bytes()?.to_vec();

        Ok(Self {
            server_id,
            public_key_der,
            verify_token,
        })
    }
}

/// Зашифровать данные публичным ключом сервера (RSA PKCS#1 v1.5)
pub fn rsa_encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    public_key_der: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    key.encrypt(rng, Pkcs1v15Encrypt, data)
        .map_err(|_| CryptoError::RsaEncrypt)
}

/// Вычислить хеш идентификатора сервера
///
/// SHA-1 поверх конкатенации, затем знаковая hex-запись: дайджест
/// трактуется как big-endian число в two's-complement, отрицательные
/// значения получают ведущий `-`, ведущие нули опускаются.
pub fn server_id_hash(server_id: &str, shared_secret: &[u8], public_key_der: &[u8]) -> String {
    let mut digest = Sha1::new();
    digest.update(server_id.as_bytes());
    digest.update(shared_secret);
    digest.update(public_key_der);

    let hash = digest.finalize();
    BigInt::from_signed_bytes_be(&hash).to_str_radix(16)
}
