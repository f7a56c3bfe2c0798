//! Скриптовый фейковый сервер для интеграционных тестов
//!
//! Сервер говорит тем же проводным форматом, что и клиент: кадры с
//! VarInt-префиксом, опциональное сжатие и AES-128-CFB8 после
//! согласования. Каждый сценарий читает и пишет кадры вручную, шаг за
//! шагом.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use chrono::{Duration, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

use mlink_core::cipher::{
    self, Aes128Cfb8Decryptor, Aes128Cfb8Encryptor,
};
use mlink_core::credential::Credential;
use mlink_core::crypto::SharedSecret;
use mlink_core::frame;
use mlink_core::varint::{self, VarIntAccumulator};
use mlink_core::wire::PacketWriter;

/// Учётные данные для тестов
pub fn test_credential() -> Credential {
    Credential::new(
        Uuid::from_u64_pair(0x1234_5678_9ABC_DEF0, 0x0FED_CBA9_8765_4321),
        "TestSteve",
        "test-access-token",
        Utc::now() + Duration::hours(1),
    )
}

/// Серверная сторона соединения в тестах
pub struct ServerLink {
    stream: TcpStream,
    enc: Option<Aes128Cfb8Encryptor>,
    dec: Option<Aes128Cfb8Decryptor>,
    compression: Option<i32>,
}

impl ServerLink {
    /// Обернуть принятое TCP-соединение
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            enc: None,
            dec: None,
            compression: None,
        }
    }

    /// Включить шифрование обоих направлений общим секретом клиента
    pub fn enable_encryption(&mut self, secret: &SharedSecret) {
        let (enc, dec) = cipher::cipher_pair(secret);
        self.enc = Some(enc);
        self.dec = Some(dec);
    }

    /// Включить сжатие для последующих кадров
    pub fn enable_compression(&mut self, threshold: i32) {
        self.compression = Some(threshold);
    }

    async fn read_byte(&mut self) -> u8 {
        let byte = self.stream.read_u8().await.expect("server read byte");
        match &mut self.dec {
            Some(dec) => {
                let mut buf = [byte];
                cipher::decrypt_in_place(dec, &mut buf);
                buf[0]
            }
            None => byte,
        }
    }

    /// Прочитать кадр от клиента
    pub async fn read_frame(&mut self) -> (i32, Vec<u8>) {
        let mut acc = VarIntAccumulator::new();
        let length = loop {
            let byte = self.read_byte().await;
            if let Some(value) = acc.push(byte).expect("frame length varint") {
                break value;
            }
        };

        let mut body = vec![0u8; length as usize];
        self.stream
            .read_exact(&mut body)
            .await
            .expect("server read body");
        if let Some(dec) = &mut self.dec {
            cipher::decrypt_in_place(dec, &mut body);
        }

        // Прогоняем тело через тот же кодек, что и клиент
        let mut framed = BytesMut::new();
        varint::encode(length, &mut framed);
        framed.extend_from_slice(&body);

        let frame = frame::read_frame(&mut &framed[..], self.compression)
            .await
            .expect("server parse frame");
        (frame.id, frame.payload.to_vec())
    }

    /// Отправить кадр клиенту
    pub async fn write_frame(&mut self, id: i32, payload: &[u8]) {
        let mut buf = frame::encode_frame(id, payload, self.compression)
            .expect("server encode frame")
            .to_vec();
        if let Some(enc) = &mut self.enc {
            cipher::encrypt_in_place(enc, &mut buf);
        }
        self.stream.write_all(&buf).await.expect("server write");
    }
}

/// Payload пакета login-success: UUID, имя, пустой список свойств
pub fn login_success_payload() -> Bytes {
    let mut writer = PacketWriter::new();
    writer
        .put_uuid(Uuid::from_u64_pair(1, 2))
        .put_string("TestSteve")
        .put_varint(0);
    writer.freeze()
}

/// Payload пакета disconnect с JSON-компонентом причины
pub fn disconnect_payload(reason_json: &str) -> Bytes {
    let mut writer = PacketWriter::new();
    writer.put_string(reason_json);
    writer.freeze()
}

/// Payload пакета transfer: хост и порт
pub fn transfer_payload(host: &str, port: u16) -> Bytes {
    let mut writer = PacketWriter::new();
    writer.put_string(host).put_i32(port as i32);
    writer.freeze()
}

/// Payload keep-alive
pub fn keep_alive_payload(id: i64) -> Bytes {
    let mut writer = PacketWriter::new();
    writer.put_i64(id);
    writer.freeze()
}

/// Payload set-compression с порогом
pub fn set_compression_payload(threshold: i32) -> Bytes {
    let mut writer = PacketWriter::new();
    writer.put_varint(threshold);
    writer.freeze()
}

/// Payload запроса шифрования
pub fn encryption_request_payload(
    server_id: &str,
    public_key_der: &[u8],
    verify_token: &[u8],
) -> Bytes {
    let mut writer = PacketWriter::new();
    writer
        .put_string(server_id)
        .put_prefixed_bytes(public_key_der)
        .put_prefixed_bytes(verify_token);
    writer.freeze()
}

/// Принять рукопожатие и запрос входа, вернув имя из login-start
pub async fn accept_login(link: &mut ServerLink) -> String {
    let (id, _handshake) = link.read_frame().await;
    assert_eq!(id, 0x00, "ожидалось рукопожатие");

    let (id, payload) = link.read_frame().await;
    assert_eq!(id, 0x00, "ожидался login-start");

    let mut reader = mlink_core::wire::PacketReader::new(&payload);
    reader.get_string().expect("username in login start")
}
