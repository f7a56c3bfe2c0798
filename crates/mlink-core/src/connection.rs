//! Соединение с игровым сервером
//!
//! Один экземпляр — одна физическая TCP-попытка. Машина состояний идёт
//! строго вперёд: HANDSHAKING → LOGIN → CONFIGURATION → PLAY; закрытие —
//! отдельный признак, а не состояние. Подключение ([`SessionConnection::connect`])
//! выполняется последовательно в вызывающем таске; игровой цикл приёма
//! ([`SessionConnection::run`]) вызывающий код запускает там, где ему
//! удобно, — движок сам ничего не планирует.
//!
//! Отправка пакетов безопасна из любого таска: все записи идут через
//! один сериализующий мьютекс и уходят в сокет единым буфером, поэтому
//! конкурирующие отправители не могут перемешать части кадров.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace, warn};

use crate::auth::SessionAuthenticator;
use crate::cipher::{self, Aes128Cfb8Encryptor, CipherReader};
use crate::credential::Credential;
use crate::crypto::{self, CryptoState, EncryptionRequest, SharedSecret};
use crate::dispatch::{
    HandlerContext, LoopActions, PacketDispatchTable, PacketHandler, TransferTarget,
};
use crate::error::{AuthError, CryptoError, MlinkError, ProtocolError, Result};
use crate::events::{EventSink, SessionEvent};
use crate::frame::{self, Frame};
use crate::keepalive::KeepAliveMonitor;
use crate::packets::{self, clientbound, ConnectionState, Direction, NextState};
use crate::wire::PacketReader;

/// Интервал проверки keep-alive таймаута в игровом цикле
const KEEPALIVE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Параметры подключения
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Таймаут установления TCP-соединения
    pub connect_timeout: Duration,
    /// Таймаут keep-alive (берётся из внешних настроек)
    pub keepalive_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(30),
        }
    }
}

/// Исход фазы подключения
#[derive(Debug)]
pub enum ConnectOutcome {
    /// Конфигурация завершена, соединение в состоянии PLAY
    Play,
    /// Сервер перенаправил клиента до входа в PLAY
    Transfer(TransferTarget),
}

/// Терминальный исход игрового цикла приёма
#[derive(Debug)]
pub enum SessionEnd {
    /// Сервер разорвал соединение
    Disconnected {
        /// Извлечённый текст причины
        reason: String,
    },
    /// Сервер запросил перенаправление
    Transfer(TransferTarget),
    /// Цикл остановлен кооперативно
    Stopped,
}

/// Состояние пути записи; живёт под сериализующим мьютексом
struct FrameWriter {
    half: OwnedWriteHalf,
    cipher: Option<Aes128Cfb8Encryptor>,
    compression: Option<i32>,
}

impl FrameWriter {
    /// Собрать кадр, при необходимости зашифровать, записать одним буфером
    async fn send(&mut self, id: i32, payload: &[u8]) -> Result<()> {
        let mut buf = frame::encode_frame(id, payload, self.compression)?;
        if let Some(cipher) = &mut self.cipher {
            cipher::encrypt_in_place(cipher, &mut buf);
        }
        self.half.write_all(&buf).await?;
        Ok(())
    }
}

/// Отправитель пакетов, пригодный для клонирования в другие таски
#[derive(Clone)]
pub struct PacketSender {
    writer: Arc<Mutex<FrameWriter>>,
}

impl PacketSender {
    /// Отправить пакет; запись сериализуется с остальными отправителями
    pub async fn send(&self, id: i32, payload: &[u8]) -> Result<()> {
        self.writer.lock().await.send(id, payload).await
    }
}

/// Путь чтения: расшифровка, затем кадрирование
struct FrameReader {
    inner: CipherReader<BufReader<OwnedReadHalf>>,
    compression: Option<i32>,
}

impl FrameReader {
    async fn read(&mut self) -> Result<Frame> {
        frame::read_frame(&mut self.inner, self.compression).await
    }
}

struct StopShared {
    notify: Notify,
    stopped: AtomicBool,
}

/// Ручка кооперативной остановки игрового цикла
///
/// Остановка не прерывает обработчик посреди работы: цикл завершится
/// на ближайшей границе пакета.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<StopShared>,
}

impl StopHandle {
    /// Попросить цикл приёма остановиться
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

/// Соединение с игровым сервером
pub struct SessionConnection {
    host: String,
    port: u16,
    options: ConnectOptions,
    authenticator: Arc<dyn SessionAuthenticator>,
    events: Arc<dyn EventSink>,
    dispatch: PacketDispatchTable,
    keepalive: KeepAliveMonitor,
    state: ConnectionState,
    closed: bool,
    reader: Option<FrameReader>,
    writer: Option<Arc<Mutex<FrameWriter>>>,
    crypto: Option<CryptoState>,
    stop: Arc<StopShared>,
}

impl std::fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SessionConnection {
    /// Создать соединение; сокет откроется при вызове `connect`
    pub fn new(
        host: impl Into<String>,
        port: u16,
        options: ConnectOptions,
        authenticator: Arc<dyn SessionAuthenticator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let keepalive = KeepAliveMonitor::new(options.keepalive_timeout);

        Self {
            host: host.into(),
            port,
            options,
            authenticator,
            events,
            dispatch: PacketDispatchTable::standard(),
            keepalive,
            state: ConnectionState::Handshaking,
            closed: false,
            reader: None,
            writer: None,
            crypto: None,
            stop: Arc::new(StopShared {
                notify: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Зарегистрировать пользовательский обработчик пакета
    ///
    /// Вызывается до `connect`: таблица статична на время жизни циклов
    /// приёма. Повторная регистрация той же тройки замещает встроенный
    /// обработчик.
    pub fn register_handler(
        &mut self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
        handler: PacketHandler,
    ) {
        self.dispatch.register(state, direction, id, handler);
    }

    /// Текущее состояние машины соединения
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Закрыто ли соединение
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Хост, к которому выполнялось подключение
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Порт, к которому выполнялось подключение
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Включено ли шифрование канала
    pub fn encryption_enabled(&self) -> bool {
        self.crypto.is_some()
    }

    /// Состояние шифрования, если согласование прошло
    pub fn crypto_state(&self) -> Option<&CryptoState> {
        self.crypto.as_ref()
    }

    /// Монитор keep-alive
    pub fn keepalive(&self) -> &KeepAliveMonitor {
        &self.keepalive
    }

    /// Отправитель пакетов для других тасков
    pub fn sender(&self) -> Option<PacketSender> {
        self.writer.as_ref().map(|writer| PacketSender {
            writer: Arc::clone(writer),
        })
    }

    /// Ручка кооперативной остановки игрового цикла
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.stop),
        }
    }

    /// Отправить пакет серверу
    pub async fn send_packet(&self, id: i32, payload: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_ref()
            .ok_or(MlinkError::Protocol(ProtocolError::ConnectionClosed))?;

        debug!(
            "→ 0x{:02X} {} [{}]",
            id,
            packets::packet_name(self.state, Direction::ToServer, id).unwrap_or("?"),
            self.state
        );
        writer.lock().await.send(id, payload).await
    }

    /// Выполнить подключение: рукопожатие, вход, конфигурация
    ///
    /// Возвращает `Play`, когда соединение готово к игровому циклу,
    /// `Transfer`, если сервер перенаправил клиента раньше. Любая ошибка
    /// фатальна для попытки; соединение при этом закрывается.
    pub async fn connect(&mut self, credential: &Credential) -> Result<ConnectOutcome> {
        let result = self.drive_connect(credential).await;
        if !matches!(result, Ok(ConnectOutcome::Play)) {
            self.close_now().await;
        }
        result
    }

    async fn drive_connect(&mut self, credential: &Credential) -> Result<ConnectOutcome> {
        if credential.is_expired() {
            return Err(MlinkError::Auth(AuthError::Expired));
        }

        self.events.emit(&SessionEvent::Connecting {
            host: self.host.clone(),
            port: self.port,
        });
        debug!("Подключение к {}:{}...", self.host, self.port);

        let stream = tokio::time::timeout(
            self.options.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            MlinkError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "таймаут TCP-подключения",
            ))
        })??;

        debug!("✓ TCP-соединение установлено");

        let (read_half, write_half) = stream.into_split();
        self.reader = Some(FrameReader {
            inner: CipherReader::new(BufReader::new(read_half)),
            compression: None,
        });
        self.writer = Some(Arc::new(Mutex::new(FrameWriter {
            half: write_half,
            cipher: None,
            compression: None,
        })));

        // HANDSHAKING: рукопожатие, сразу за ним запрос входа
        let (id, payload) = packets::handshake(&self.host, self.port, NextState::Login);
        self.send_packet(id, &payload).await?;
        self.set_state(ConnectionState::Login);

        let (id, payload) = packets::login_start(&credential.username, credential.profile_id);
        self.send_packet(id, &payload).await?;
        self.events.emit(&SessionEvent::HandshakeSent);
        debug!("✓ Рукопожатие и запрос входа отправлены");

        // LOGIN: сервер отвечает ровно одной из веток
        loop {
            let frame = self.read_next().await?;

            match frame.id {
                clientbound::login::DISCONNECT => {
                    let reason = decode_disconnect_reason(&frame)?;
                    self.events
                        .emit(&SessionEvent::Disconnected { reason: reason.clone() });
                    return Err(ProtocolError::Disconnected { reason }.into());
                }
                clientbound::login::ENCRYPTION_REQUEST => {
                    self.negotiate_encryption(&frame.payload, credential).await?;
                }
                clientbound::login::SET_COMPRESSION => {
                    let mut reader = PacketReader::new(&frame.payload);
                    let threshold = reader.get_varint().map_err(MlinkError::Framing)?;
                    self.enable_compression(threshold).await;
                }
                clientbound::login::LOGIN_SUCCESS => break,
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        state: self.state,
                        id: other,
                    }
                    .into());
                }
            }
        }

        debug!("✓ Вход выполнен");
        let (id, payload) = packets::login_acknowledged();
        self.send_packet(id, &payload).await?;
        self.set_state(ConnectionState::Configuration);

        // CONFIGURATION: синхронно отвечаем на запросы сервера
        loop {
            let frame = self.read_next().await?;
            let actions = self.dispatch_frame(&frame)?;

            match self.apply_actions(actions).await? {
                Some(LoopOutcome::Play) => {
                    debug!("✓ Конфигурация завершена, соединение в PLAY");
                    return Ok(ConnectOutcome::Play);
                }
                Some(LoopOutcome::Transfer(target)) => {
                    return Ok(ConnectOutcome::Transfer(target));
                }
                Some(LoopOutcome::Disconnected(reason)) => {
                    return Err(ProtocolError::Disconnected { reason }.into());
                }
                None => {}
            }
        }
    }

    /// Игровой цикл приёма: читать, диспетчеризовать, повторять
    ///
    /// Работает до разрыва, перенаправления, остановки или ошибки
    /// ввода-вывода. Ошибки обработчиков незнакомых пакетов не прерывают
    /// цикл — фатальны только ошибки кадрирования и сокета.
    pub async fn run(&mut self) -> Result<SessionEnd> {
        if self.state != ConnectionState::Play || self.closed {
            return Err(ProtocolError::ConnectionClosed.into());
        }

        let mut reader = self
            .reader
            .take()
            .ok_or(MlinkError::Protocol(ProtocolError::ConnectionClosed))?;
        let stop = Arc::clone(&self.stop);
        let mut check = tokio::time::interval(KEEPALIVE_CHECK_INTERVAL);

        debug!("Игровой цикл приёма запущен");

        let end = 'session: loop {
            if stop.stopped.load(Ordering::SeqCst) {
                break Ok(SessionEnd::Stopped);
            }

            // Чтение кадра закреплено: срабатывание таймера не роняет
            // частично прочитанный кадр
            let read = reader.read();
            tokio::pin!(read);

            let frame = loop {
                tokio::select! {
                    _ = stop.notify.notified() => {
                        break 'session Ok(SessionEnd::Stopped);
                    }
                    _ = check.tick() => {
                        // Страховка от notify между регистрациями ожидания
                        if stop.stopped.load(Ordering::SeqCst) {
                            break 'session Ok(SessionEnd::Stopped);
                        }
                        if self.keepalive.is_timed_out() {
                            let seconds = self.keepalive.since_last().as_secs();
                            self.events.emit(&SessionEvent::KeepAliveTimeout { seconds });
                            break 'session Err(MlinkError::Protocol(
                                ProtocolError::KeepAliveTimeout { seconds },
                            ));
                        }
                    }
                    result = &mut read => {
                        match result {
                            Ok(frame) => break frame,
                            Err(e) => break 'session Err(e),
                        }
                    }
                }
            };

            trace_frame(self.state, &frame);

            let actions = match self.dispatch_frame(&frame) {
                Ok(actions) => actions,
                Err(e) => {
                    // Кривой payload известного пакета не валит сессию
                    warn!("Ошибка обработчика пакета 0x{:02X}: {}", frame.id, e);
                    continue;
                }
            };

            match self.apply_actions(actions).await {
                Ok(Some(LoopOutcome::Disconnected(reason))) => {
                    break Ok(SessionEnd::Disconnected { reason });
                }
                Ok(Some(LoopOutcome::Transfer(target))) => {
                    break Ok(SessionEnd::Transfer(target));
                }
                Ok(Some(LoopOutcome::Play)) | Ok(None) => {}
                Err(e) => break Err(e),
            }
        };

        self.close_now().await;
        debug!("Игровой цикл приёма завершён");
        end
    }

    /// Прочитать следующий кадр и залогировать его
    async fn read_next(&mut self) -> Result<Frame> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(MlinkError::Protocol(ProtocolError::ConnectionClosed))?;

        let frame = reader.read().await?;
        trace_frame(self.state, &frame);
        Ok(frame)
    }

    /// Пропустить кадр через таблицу диспетчеризации
    fn dispatch_frame(&mut self, frame: &Frame) -> Result<LoopActions> {
        let mut actions = LoopActions::default();
        let handler = self
            .dispatch
            .handler_for(self.state, Direction::ToClient, frame.id);

        let mut ctx = HandlerContext::new(
            self.state,
            &mut self.keepalive,
            self.events.as_ref(),
            &mut actions,
        );
        handler(frame, &mut ctx)?;
        Ok(actions)
    }

    /// Применить действия, накопленные обработчиком
    async fn apply_actions(&mut self, actions: LoopActions) -> Result<Option<LoopOutcome>> {
        for (id, payload) in &actions.replies {
            self.send_packet(*id, payload).await?;
        }

        if let Some(reason) = actions.disconnect {
            self.events
                .emit(&SessionEvent::Disconnected { reason: reason.clone() });
            debug!("Сервер разорвал соединение: {}", reason);
            return Ok(Some(LoopOutcome::Disconnected(reason)));
        }

        if let Some(target) = actions.transfer {
            self.events.emit(&SessionEvent::Redirect {
                host: target.host.clone(),
                port: target.port,
            });
            debug!("Сервер запросил перенаправление на {}", target);
            return Ok(Some(LoopOutcome::Transfer(target)));
        }

        if actions.advance_to_play {
            self.set_state(ConnectionState::Play);
            return Ok(Some(LoopOutcome::Play));
        }

        Ok(None)
    }

    /// Согласовать шифрование канала
    ///
    /// Ответ с RSA-обёртками уходит в открытом виде; шифр включается
    /// только после его отправки.
    async fn negotiate_encryption(
        &mut self,
        payload: &[u8],
        credential: &Credential,
    ) -> Result<()> {
        let request = EncryptionRequest::decode(payload).map_err(MlinkError::Framing)?;
        debug!("Сервер запросил шифрование, подтверждаем подключение у session-сервиса...");

        let secret = SharedSecret::generate(&mut OsRng);
        let encrypted_secret =
            crypto::rsa_encrypt(&mut OsRng, &request.public_key_der, secret.as_bytes())?;
        let encrypted_token =
            crypto::rsa_encrypt(&mut OsRng, &request.public_key_der, &request.verify_token)?;
        let server_hash =
            crypto::server_id_hash(&request.server_id, secret.as_bytes(), &request.public_key_der);

        let authenticator = Arc::clone(&self.authenticator);
        let cred = credential.clone();
        let hash = server_hash.clone();
        tokio::task::spawn_blocking(move || authenticator.join_server(&cred, &hash))
            .await
            .map_err(|e| CryptoError::SessionAuth(AuthError::Transport(e.to_string())))?
            .map_err(CryptoError::SessionAuth)?;

        self.events.emit(&SessionEvent::SessionAuthenticated);
        debug!("✓ Session-сервис подтвердил подключение");

        let (id, response) = packets::encryption_response(&encrypted_secret, &encrypted_token);
        self.send_packet(id, &response).await?;

        let (enc, dec) = cipher::cipher_pair(&secret);
        if let Some(writer) = &self.writer {
            writer.lock().await.cipher = Some(enc);
        }
        if let Some(reader) = &mut self.reader {
            reader.inner.enable(dec);
        }

        self.crypto = Some(CryptoState {
            shared_secret: secret,
            server_id_hash: server_hash,
        });
        self.events.emit(&SessionEvent::EncryptionEnabled);
        debug!("✓ Шифрование включено");
        Ok(())
    }

    /// Записать порог сжатия в оба направления
    async fn enable_compression(&mut self, threshold: i32) {
        if let Some(reader) = &mut self.reader {
            reader.compression = Some(threshold);
        }
        if let Some(writer) = &self.writer {
            writer.lock().await.compression = Some(threshold);
        }

        self.events
            .emit(&SessionEvent::CompressionEnabled { threshold });
        debug!("✓ Сжатие включено, порог {} байт", threshold);
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        self.state = to;
        self.events.emit(&SessionEvent::StateChanged { from, to });
        debug!("Состояние соединения: {} → {}", from, to);
    }

    /// Закрыть соединение и уничтожить состояние шифра
    async fn close_now(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader = None;

        if let Some(writer) = self.writer.take() {
            let mut guard = writer.lock().await;
            let _ = guard.half.shutdown().await;
        }

        // Общий секрет зануляется при удалении
        self.crypto = None;
        debug!("Соединение с {}:{} закрыто", self.host, self.port);
    }
}

/// Внутренний исход одного шага цикла
enum LoopOutcome {
    Play,
    Transfer(TransferTarget),
    Disconnected(String),
}

/// Разобрать причину из пакета disconnect фазы LOGIN
fn decode_disconnect_reason(frame: &Frame) -> Result<String> {
    let mut reader = PacketReader::new(&frame.payload);
    let raw = reader.get_string().map_err(MlinkError::Framing)?;
    Ok(packets::chat_component_text(&raw))
}

/// Залогировать входящий кадр
fn trace_frame(state: ConnectionState, frame: &Frame) {
    debug!(
        "← 0x{:02X} {} ({} байт) [{}]",
        frame.id,
        packets::packet_name(state, Direction::ToClient, frame.id).unwrap_or("?"),
        frame.payload.len(),
        state
    );

    if tracing::enabled!(tracing::Level::TRACE) {
        trace!("payload: {}", hex_preview(&frame.payload, 256));
    }
}

/// Hex-превью первых `max` байт payload
fn hex_preview(data: &[u8], max: usize) -> String {
    let shown = &data[..data.len().min(max)];
    let mut out = String::with_capacity(shown.len() * 3 + 4);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", byte));
    }
    if data.len() > max {
        out.push_str(" …");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NullAuthenticator;
    use crate::events::NullSink;

    fn connection() -> SessionConnection {
        SessionConnection::new(
            "localhost",
            25565,
            ConnectOptions::default(),
            Arc::new(NullAuthenticator),
            Arc::new(NullSink),
        )
    }

    #[test]
    fn test_initial_state() {
        let conn = connection();
        assert_eq!(conn.state(), ConnectionState::Handshaking);
        assert!(!conn.is_closed());
        assert!(!conn.encryption_enabled());
        assert!(conn.sender().is_none());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let conn = connection();
        let result = conn.send_packet(0x00, &[]).await;
        assert!(matches!(
            result,
            Err(MlinkError::Protocol(ProtocolError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn test_run_requires_play_state() {
        let mut conn = connection();
        let result = conn.run().await;
        assert!(matches!(
            result,
            Err(MlinkError::Protocol(ProtocolError::ConnectionClosed))
        ));
    }

    #[test]
    fn test_hex_preview_truncates() {
        let data = vec![0xABu8; 300];
        let preview = hex_preview(&data, 4);
        assert_eq!(preview, "ab ab ab ab …");
    }
}
