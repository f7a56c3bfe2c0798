//! Диспетчеризация входящих пакетов
//!
//! Таблица отображает тройку (состояние, направление, id) в обработчик.
//! Промахи уходят в обязательный обработчик по умолчанию: необработанный
//! серверный пакет не должен ни ронять цикл, ни рассинхронизировать
//! соединение — фатальны только ошибки кадрирования. Регистрация
//! статична: таблица собирается до запуска цикла приёма.
//!
//! Обработчики не трогают соединение напрямую: они накапливают действия
//! (ответные пакеты, перенаправление, завершение конфигурации, разрыв)
//! в [`HandlerContext`], а цикл приёма применяет их после возврата.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::Result;
use crate::events::{EventSink, SessionEvent};
use crate::frame::Frame;
use crate::keepalive::KeepAliveMonitor;
use crate::packets::{self, clientbound, ConnectionState, Direction};
use crate::wire::PacketReader;

/// Цель серверного перенаправления
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    /// Хост нового сервера
    pub host: String,
    /// Порт нового сервера
    pub port: u16,
}

impl std::fmt::Display for TransferTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Действия, накопленные обработчиками за один пакет
#[derive(Default)]
pub(crate) struct LoopActions {
    pub(crate) replies: Vec<(i32, Bytes)>,
    pub(crate) transfer: Option<TransferTarget>,
    pub(crate) advance_to_play: bool,
    pub(crate) disconnect: Option<String>,
}

/// Контекст, доступный обработчику пакета
pub struct HandlerContext<'a> {
    /// Текущее состояние соединения
    pub state: ConnectionState,
    /// Монитор keep-alive соединения
    pub keepalive: &'a mut KeepAliveMonitor,
    events: &'a dyn EventSink,
    actions: &'a mut LoopActions,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        state: ConnectionState,
        keepalive: &'a mut KeepAliveMonitor,
        events: &'a dyn EventSink,
        actions: &'a mut LoopActions,
    ) -> Self {
        Self {
            state,
            keepalive,
            events,
            actions,
        }
    }

    /// Поставить ответный пакет в очередь отправки
    pub fn reply(&mut self, id: i32, payload: Bytes) {
        self.actions.replies.push((id, payload));
    }

    /// Запросить перенаправление на другой сервер
    pub fn set_transfer(&mut self, host: String, port: u16) {
        self.actions.transfer = Some(TransferTarget { host, port });
    }

    /// Завершить конфигурацию и перейти в PLAY
    pub fn finish_configuration(&mut self) {
        self.actions.advance_to_play = true;
    }

    /// Зафиксировать разрыв соединения сервером
    pub fn disconnect(&mut self, reason: String) {
        self.actions.disconnect = Some(reason);
    }

    /// Отправить событие в приёмник диагностики
    pub fn emit(&self, event: SessionEvent) {
        self.events.emit(&event);
    }
}

/// Обработчик одного пакета
pub type PacketHandler = Box<dyn Fn(&Frame, &mut HandlerContext<'_>) -> Result<()> + Send + Sync>;

/// Таблица диспетчеризации пакетов
///
/// Тотальная функция: промах возвращает обработчик по умолчанию.
pub struct PacketDispatchTable {
    handlers: HashMap<(ConnectionState, Direction, i32), PacketHandler>,
    default: PacketHandler,
}

impl PacketDispatchTable {
    /// Создать таблицу с заданным обработчиком по умолчанию
    pub fn new(default: PacketHandler) -> Self {
        Self {
            handlers: HashMap::new(),
            default,
        }
    }

    /// Зарегистрировать обработчик для тройки (состояние, направление, id)
    pub fn register(
        &mut self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
        handler: PacketHandler,
    ) {
        self.handlers.insert((state, direction, id), handler);
    }

    /// Найти обработчик; промах отдаёт обработчик по умолчанию
    pub fn handler_for(
        &self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
    ) -> &PacketHandler {
        self.handlers
            .get(&(state, direction, id))
            .unwrap_or(&self.default)
    }

    /// Таблица со встроенными обработчиками клиента
    ///
    /// Покрывает keep-alive, ping, known packs, registry/tags/feature
    /// flags, custom payload, finish-configuration, disconnect и transfer
    /// в обоих состояниях. Всё остальное уходит в обработчик по
    /// умолчанию, который логирует пакет и продолжает цикл.
    pub fn standard() -> Self {
        let mut table = Self::new(Box::new(unhandled));
        table.register_builtin();
        table
    }

    fn register_builtin(&mut self) {
        use ConnectionState::{Configuration, Play};
        use Direction::ToClient;

        self.register(
            Configuration,
            ToClient,
            clientbound::config::KEEP_ALIVE,
            Box::new(keep_alive),
        );
        self.register(Configuration, ToClient, clientbound::config::PING, Box::new(ping));
        self.register(
            Configuration,
            ToClient,
            clientbound::config::KNOWN_PACKS,
            Box::new(known_packs),
        );
        self.register(
            Configuration,
            ToClient,
            clientbound::config::FINISH_CONFIGURATION,
            Box::new(finish_configuration),
        );
        self.register(
            Configuration,
            ToClient,
            clientbound::config::CUSTOM_PAYLOAD,
            Box::new(custom_payload),
        );
        self.register(
            Configuration,
            ToClient,
            clientbound::config::REGISTRY_DATA,
            Box::new(bulk_data),
        );
        self.register(Configuration, ToClient, clientbound::config::TAGS, Box::new(bulk_data));
        self.register(
            Configuration,
            ToClient,
            clientbound::config::FEATURE_FLAGS,
            Box::new(bulk_data),
        );
        self.register(
            Configuration,
            ToClient,
            clientbound::config::DISCONNECT,
            Box::new(disconnect),
        );
        self.register(
            Configuration,
            ToClient,
            clientbound::config::TRANSFER,
            Box::new(transfer),
        );

        self.register(Play, ToClient, clientbound::play::KEEP_ALIVE, Box::new(keep_alive));
        self.register(Play, ToClient, clientbound::play::DISCONNECT, Box::new(disconnect));
        self.register(Play, ToClient, clientbound::play::TRANSFER, Box::new(transfer));
    }
}

/// Keep-alive: зафиксировать id и отправить эхо тем же значением
fn keep_alive(frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    let mut reader = PacketReader::new(&frame.payload);
    let id = reader.get_i64()?;

    ctx.keepalive.record(id);

    let (packet_id, payload) = match ctx.state {
        ConnectionState::Play => packets::keep_alive_play(id),
        _ => packets::keep_alive_config(id),
    };
    ctx.reply(packet_id, payload);
    Ok(())
}

/// Ping конфигурации: ответить pong с тем же идентификатором
fn ping(frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    let mut reader = PacketReader::new(&frame.payload);
    let id = reader.get_i32()?;

    let (packet_id, payload) = packets::pong_config(id);
    ctx.reply(packet_id, payload);
    Ok(())
}

/// Запрос известных паков: у клиента их нет, отвечаем пустым списком
fn known_packs(_frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    let (packet_id, payload) = packets::known_packs_empty();
    ctx.reply(packet_id, payload);
    Ok(())
}

/// Завершение конфигурации: подтвердить и перейти в PLAY
fn finish_configuration(_frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    let (packet_id, payload) = packets::finish_configuration_ack();
    ctx.reply(packet_id, payload);
    ctx.finish_configuration();
    Ok(())
}

/// Custom payload: залогировать канал, содержимое отбросить
fn custom_payload(frame: &Frame, _ctx: &mut HandlerContext<'_>) -> Result<()> {
    let mut reader = PacketReader::new(&frame.payload);
    let channel = reader.get_string()?;

    tracing::debug!(
        "Custom payload «{}» отброшен ({} байт)",
        channel,
        reader.remaining()
    );
    Ok(())
}

/// Объёмные данные (registry, tags, feature flags): только размер в лог
fn bulk_data(frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    tracing::debug!(
        "Данные конфигурации 0x{:02X} приняты без разбора ({} байт) [{}]",
        frame.id,
        frame.payload.len(),
        ctx.state
    );
    Ok(())
}

/// Разрыв соединения сервером: извлечь текст причины
fn disconnect(frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    let mut reader = PacketReader::new(&frame.payload);
    let raw = reader.get_string()?;
    let reason = packets::chat_component_text(&raw);

    ctx.disconnect(reason);
    Ok(())
}

/// Перенаправление: прочитать цель и передать её контроллеру
fn transfer(frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    let mut reader = PacketReader::new(&frame.payload);
    let host = reader.get_string()?;
    let port = reader.get_i32()? as u16;

    ctx.set_transfer(host, port);
    Ok(())
}

/// Обработчик по умолчанию: событие и лог, цикл продолжается
fn unhandled(frame: &Frame, ctx: &mut HandlerContext<'_>) -> Result<()> {
    ctx.emit(SessionEvent::UnhandledPacket {
        state: ctx.state,
        id: frame.id,
        size: frame.payload.len(),
    });

    match packets::packet_name(ctx.state, Direction::ToClient, frame.id) {
        Some(name) => tracing::debug!(
            "Пакет без обработчика: 0x{:02X} ({}) в {}",
            frame.id,
            name,
            ctx.state
        ),
        None => tracing::debug!("Неизвестный пакет 0x{:02X} в {}", frame.id, ctx.state),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use std::time::Duration;

    fn run_handler(
        table: &PacketDispatchTable,
        state: ConnectionState,
        frame: Frame,
        sink: &MemorySink,
    ) -> LoopActions {
        let mut keepalive = KeepAliveMonitor::new(Duration::from_secs(30));
        let mut actions = LoopActions::default();
        let handler = table.handler_for(state, Direction::ToClient, frame.id);
        let mut ctx = HandlerContext::new(state, &mut keepalive, sink, &mut actions);
        handler(&frame, &mut ctx).unwrap();
        actions
    }

    fn frame(id: i32, payload: &[u8]) -> Frame {
        Frame {
            id,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_keep_alive_echoes_same_id_per_state() {
        let table = PacketDispatchTable::standard();
        let sink = MemorySink::new();

        let payload = 0x0102_0304_0506_0708i64.to_be_bytes();

        let actions = run_handler(
            &table,
            ConnectionState::Configuration,
            frame(clientbound::config::KEEP_ALIVE, &payload),
            &sink,
        );
        assert_eq!(actions.replies.len(), 1);
        assert_eq!(actions.replies[0].0, packets::serverbound::config::KEEP_ALIVE);
        assert_eq!(&actions.replies[0].1[..], &payload);

        let actions = run_handler(
            &table,
            ConnectionState::Play,
            frame(clientbound::play::KEEP_ALIVE, &payload),
            &sink,
        );
        assert_eq!(actions.replies[0].0, packets::serverbound::play::KEEP_ALIVE);
        assert_eq!(&actions.replies[0].1[..], &payload);
    }

    #[test]
    fn test_ping_answered_with_matching_pong() {
        let table = PacketDispatchTable::standard();
        let sink = MemorySink::new();

        let actions = run_handler(
            &table,
            ConnectionState::Configuration,
            frame(clientbound::config::PING, &42i32.to_be_bytes()),
            &sink,
        );
        assert_eq!(actions.replies[0].0, packets::serverbound::config::PONG);
        assert_eq!(&actions.replies[0].1[..], &42i32.to_be_bytes());
    }

    #[test]
    fn test_finish_configuration_acks_and_advances() {
        let table = PacketDispatchTable::standard();
        let sink = MemorySink::new();

        let actions = run_handler(
            &table,
            ConnectionState::Configuration,
            frame(clientbound::config::FINISH_CONFIGURATION, &[]),
            &sink,
        );
        assert!(actions.advance_to_play);
        assert_eq!(
            actions.replies[0].0,
            packets::serverbound::config::FINISH_CONFIGURATION
        );
    }

    #[test]
    fn test_disconnect_extracts_chat_text() {
        let table = PacketDispatchTable::standard();
        let sink = MemorySink::new();

        let mut writer = crate::wire::PacketWriter::new();
        writer.put_string(r#"{"text":"Server closed"}"#);

        let actions = run_handler(
            &table,
            ConnectionState::Play,
            frame(clientbound::play::DISCONNECT, &writer.freeze()),
            &sink,
        );
        assert_eq!(actions.disconnect.as_deref(), Some("Server closed"));
    }

    #[test]
    fn test_transfer_sets_target() {
        let table = PacketDispatchTable::standard();
        let sink = MemorySink::new();

        let mut writer = crate::wire::PacketWriter::new();
        writer.put_string("lobby.example.org").put_i32(25570);

        let actions = run_handler(
            &table,
            ConnectionState::Configuration,
            frame(clientbound::config::TRANSFER, &writer.freeze()),
            &sink,
        );
        assert_eq!(
            actions.transfer,
            Some(TransferTarget {
                host: "lobby.example.org".into(),
                port: 25570,
            })
        );
    }

    #[test]
    fn test_unknown_id_goes_to_default() {
        let table = PacketDispatchTable::standard();
        let sink = MemorySink::new();

        let actions = run_handler(
            &table,
            ConnectionState::Play,
            frame(0x55, b"opaque"),
            &sink,
        );
        assert!(actions.replies.is_empty());
        assert!(actions.disconnect.is_none());

        let events = sink.snapshot();
        assert_eq!(
            events[0],
            crate::events::SessionEvent::UnhandledPacket {
                state: ConnectionState::Play,
                id: 0x55,
                size: 6,
            }
        );
    }

    #[test]
    fn test_registration_overrides_builtin() {
        let mut table = PacketDispatchTable::standard();
        table.register(
            ConnectionState::Play,
            Direction::ToClient,
            0x3B,
            Box::new(|frame, ctx| {
                ctx.emit(SessionEvent::UnhandledPacket {
                    state: ctx.state,
                    id: frame.id,
                    size: frame.payload.len(),
                });
                Ok(())
            }),
        );

        let sink = MemorySink::new();
        run_handler(&table, ConnectionState::Play, frame(0x3B, b"chat"), &sink);
        assert_eq!(sink.snapshot().len(), 1);
    }
}
