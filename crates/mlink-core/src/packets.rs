//! Идентификаторы пакетов и сборка исходящих пакетов
//!
//! Числовые id малы и переиспользуются между состояниями и направлениями;
//! уникален только тройной ключ (состояние, направление, id). Здесь
//! перечислена используемая часть таблицы протокола 767 и собраны
//! payload всех пакетов, которые клиент отправляет сам.

use bytes::Bytes;
use uuid::Uuid;

use crate::wire::PacketWriter;

/// Версия протокола (Minecraft 1.21)
pub const PROTOCOL_VERSION: i32 = 767;

/// Порт сервера по умолчанию
pub const DEFAULT_PORT: u16 = 25565;

/// Состояние соединения
///
/// Переходы однонаправленные: Handshaking → Login → Configuration → Play.
/// Закрытие соединения — отдельный признак, а не значение этого перечисления.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Начальное рукопожатие
    Handshaking,
    /// Вход и согласование шифрования
    Login,
    /// Серверная конфигурация
    Configuration,
    /// Игровая фаза
    Play,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Handshaking => "HANDSHAKING",
            ConnectionState::Login => "LOGIN",
            ConnectionState::Configuration => "CONFIGURATION",
            ConnectionState::Play => "PLAY",
        };
        f.write_str(name)
    }
}

/// Направление пакета
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Сервер → клиент
    ToClient,
    /// Клиент → сервер
    ToServer,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::ToClient => "TO_CLIENT",
            Direction::ToServer => "TO_SERVER",
        };
        f.write_str(name)
    }
}

/// Состояние, запрашиваемое рукопожатием
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NextState {
    /// Запрос статуса
    Status = 1,
    /// Вход на сервер
    Login = 2,
    /// Подключение после перенаправления
    Transfer = 3,
}

/// Идентификаторы входящих пакетов (сервер → клиент)
pub mod clientbound {
    /// Состояние LOGIN
    pub mod login {
        pub const DISCONNECT: i32 = 0x00;
        pub const ENCRYPTION_REQUEST: i32 = 0x01;
        pub const LOGIN_SUCCESS: i32 = 0x02;
        pub const SET_COMPRESSION: i32 = 0x03;
    }

    /// Состояние CONFIGURATION
    pub mod config {
        pub const CUSTOM_PAYLOAD: i32 = 0x01;
        pub const DISCONNECT: i32 = 0x02;
        pub const FINISH_CONFIGURATION: i32 = 0x03;
        pub const KEEP_ALIVE: i32 = 0x04;
        pub const PING: i32 = 0x05;
        pub const REGISTRY_DATA: i32 = 0x07;
        pub const TRANSFER: i32 = 0x0B;
        pub const FEATURE_FLAGS: i32 = 0x0C;
        pub const TAGS: i32 = 0x0D;
        pub const KNOWN_PACKS: i32 = 0x0E;
    }

    /// Состояние PLAY
    pub mod play {
        pub const DISCONNECT: i32 = 0x1D;
        pub const KEEP_ALIVE: i32 = 0x27;
        pub const TRANSFER: i32 = 0x7A;
    }
}

/// Идентификаторы исходящих пакетов (клиент → сервер)
pub mod serverbound {
    /// Состояние HANDSHAKING
    pub mod handshaking {
        pub const HANDSHAKE: i32 = 0x00;
    }

    /// Состояние LOGIN
    pub mod login {
        pub const LOGIN_START: i32 = 0x00;
        pub const ENCRYPTION_RESPONSE: i32 = 0x01;
        pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;
    }

    /// Состояние CONFIGURATION
    pub mod config {
        pub const FINISH_CONFIGURATION: i32 = 0x03;
        pub const KEEP_ALIVE: i32 = 0x04;
        pub const PONG: i32 = 0x05;
        pub const KNOWN_PACKS: i32 = 0x07;
    }

    /// Состояние PLAY
    pub mod play {
        pub const KEEP_ALIVE: i32 = 0x1A;
    }
}

/// Имя пакета для диагностики
///
/// Покрывает используемую часть таблицы; для остальных id возвращает
/// `None`, и лог показывает только числовой идентификатор.
pub fn packet_name(state: ConnectionState, direction: Direction, id: i32) -> Option<&'static str> {
    use ConnectionState::*;
    use Direction::*;

    let name = match (state, direction, id) {
        (Handshaking, ToServer, 0x00) => "set_protocol",

        (Login, ToClient, 0x00) => "disconnect",
        (Login, ToClient, 0x01) => "encryption_begin",
        (Login, ToClient, 0x02) => "success",
        (Login, ToClient, 0x03) => "compress",
        (Login, ToServer, 0x00) => "login_start",
        (Login, ToServer, 0x01) => "encryption_begin",
        (Login, ToServer, 0x03) => "login_acknowledged",

        (Configuration, ToClient, 0x01) => "custom_payload",
        (Configuration, ToClient, 0x02) => "disconnect",
        (Configuration, ToClient, 0x03) => "finish_configuration",
        (Configuration, ToClient, 0x04) => "keep_alive",
        (Configuration, ToClient, 0x05) => "ping",
        (Configuration, ToClient, 0x07) => "registry_data",
        (Configuration, ToClient, 0x0B) => "transfer",
        (Configuration, ToClient, 0x0C) => "feature_flags",
        (Configuration, ToClient, 0x0D) => "tags",
        (Configuration, ToClient, 0x0E) => "select_known_packs",
        (Configuration, ToServer, 0x03) => "finish_configuration",
        (Configuration, ToServer, 0x04) => "keep_alive",
        (Configuration, ToServer, 0x05) => "pong",
        (Configuration, ToServer, 0x07) => "select_known_packs",

        (Play, ToClient, 0x1D) => "kick_disconnect",
        (Play, ToClient, 0x27) => "keep_alive",
        (Play, ToClient, 0x2C) => "login",
        (Play, ToClient, 0x3B) => "player_chat",
        (Play, ToClient, 0x73) => "system_chat",
        (Play, ToClient, 0x7A) => "transfer",
        (Play, ToServer, 0x1A) => "keep_alive",

        _ => return None,
    };
    Some(name)
}

/// Пакет рукопожатия: версия протокола, адрес, порт, следующее состояние
pub fn handshake(server_address: &str, server_port: u16, next: NextState) -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer
        .put_varint(PROTOCOL_VERSION)
        .put_string(server_address)
        .put_u16(server_port)
        .put_varint(next as i32);
    (serverbound::handshaking::HANDSHAKE, writer.freeze())
}

/// Пакет начала входа: имя и UUID профиля
pub fn login_start(username: &str, profile_id: Uuid) -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer.put_string(username).put_uuid(profile_id);
    (serverbound::login::LOGIN_START, writer.freeze())
}

/// Ответ на запрос шифрования: RSA-обёртки секрета и verify token
pub fn encryption_response(encrypted_secret: &[u8], encrypted_token: &[u8]) -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer
        .put_prefixed_bytes(encrypted_secret)
        .put_prefixed_bytes(encrypted_token);
    (serverbound::login::ENCRYPTION_RESPONSE, writer.freeze())
}

/// Подтверждение входа (пустой payload)
pub fn login_acknowledged() -> (i32, Bytes) {
    (serverbound::login::LOGIN_ACKNOWLEDGED, Bytes::new())
}

/// Эхо keep-alive в состоянии CONFIGURATION
pub fn keep_alive_config(id: i64) -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer.put_i64(id);
    (serverbound::config::KEEP_ALIVE, writer.freeze())
}

/// Эхо keep-alive в состоянии PLAY
pub fn keep_alive_play(id: i64) -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer.put_i64(id);
    (serverbound::play::KEEP_ALIVE, writer.freeze())
}

/// Ответ pong на ping конфигурации
pub fn pong_config(id: i32) -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer.put_i32(id);
    (serverbound::config::PONG, writer.freeze())
}

/// Пустой список известных паков
pub fn known_packs_empty() -> (i32, Bytes) {
    let mut writer = PacketWriter::new();
    writer.put_varint(0);
    (serverbound::config::KNOWN_PACKS, writer.freeze())
}

/// Подтверждение завершения конфигурации (пустой payload)
pub fn finish_configuration_ack() -> (i32, Bytes) {
    (serverbound::config::FINISH_CONFIGURATION, Bytes::new())
}

/// Извлечь простой текст из JSON-компонента чата
///
/// Причины отключения приходят как chat-компоненты. Текст собирается
/// рекурсивно из полей `text`, `extra` и `with`; если вход не является
/// JSON, возвращается как есть.
pub fn chat_component_text(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            let mut out = String::new();
            collect_chat_text(&value, &mut out);
            if out.is_empty() {
                raw.to_string()
            } else {
                out
            }
        }
        Err(_) => raw.to_string(),
    }
}

fn collect_chat_text(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => out.push_str(s),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_chat_text(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(extra) = map.get("extra") {
                collect_chat_text(extra, out);
            }
            if let Some(with) = map.get("with") {
                collect_chat_text(with, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::PacketReader;

    #[test]
    fn test_handshake_layout() {
        let (id, payload) = handshake("mc.example.org", 25565, NextState::Login);
        assert_eq!(id, 0x00);

        let mut reader = PacketReader::new(&payload);
        assert_eq!(reader.get_varint().unwrap(), PROTOCOL_VERSION);
        assert_eq!(reader.get_string().unwrap(), "mc.example.org");
        assert_eq!(reader.get_u16().unwrap(), 25565);
        assert_eq!(reader.get_varint().unwrap(), 2);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_login_start_layout() {
        let uuid = Uuid::from_u64_pair(0xAAAA_BBBB_CCCC_DDDD, 0x1111_2222_3333_4444);
        let (id, payload) = login_start("Steve", uuid);
        assert_eq!(id, 0x00);

        let mut reader = PacketReader::new(&payload);
        assert_eq!(reader.get_string().unwrap(), "Steve");
        assert_eq!(reader.get_uuid().unwrap(), uuid);
    }

    #[test]
    fn test_encryption_response_layout() {
        let (id, payload) = encryption_response(&[1, 2, 3], &[4, 5]);
        assert_eq!(id, 0x01);

        let mut reader = PacketReader::new(&payload);
        assert_eq!(reader.get_prefixed_bytes().unwrap(), &[1, 2, 3]);
        assert_eq!(reader.get_prefixed_bytes().unwrap(), &[4, 5]);
    }

    #[test]
    fn test_keep_alive_echo_ids_differ_by_state() {
        let (config_id, _) = keep_alive_config(9);
        let (play_id, _) = keep_alive_play(9);
        assert_eq!(config_id, 0x04);
        assert_eq!(play_id, 0x1A);
    }

    #[test]
    fn test_empty_payload_packets() {
        assert!(login_acknowledged().1.is_empty());
        assert!(finish_configuration_ack().1.is_empty());

        let (_, packs) = known_packs_empty();
        assert_eq!(&packs[..], &[0x00]);
    }

    #[test]
    fn test_packet_name_scoped_by_state() {
        use ConnectionState::*;
        use Direction::*;

        assert_eq!(packet_name(Configuration, ToClient, 0x04), Some("keep_alive"));
        assert_eq!(packet_name(Play, ToClient, 0x04), None);
        assert_eq!(packet_name(Play, ToClient, 0x27), Some("keep_alive"));
    }

    #[test]
    fn test_chat_component_plain_object() {
        assert_eq!(chat_component_text(r#"{"text":"Kicked"}"#), "Kicked");
    }

    #[test]
    fn test_chat_component_nested_extra() {
        let raw = r#"{"text":"You are ","extra":[{"text":"banned"},{"text":"!"}]}"#;
        assert_eq!(chat_component_text(raw), "You are banned!");
    }

    #[test]
    fn test_chat_component_translate_with() {
        let raw = r#"{"translate":"kick","with":[{"text":"idle"}]}"#;
        assert_eq!(chat_component_text(raw), "idle");
    }

    #[test]
    fn test_chat_component_non_json_passthrough() {
        assert_eq!(chat_component_text("plain reason"), "plain reason");
    }
}
