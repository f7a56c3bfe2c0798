//! Приёмник событий сессии поверх tracing
//!
//! Движок отдаёт типизированные события; здесь они превращаются в
//! строки журнала. Терминальный вывод — целиком забота этого слоя.

use tracing::{info, warn};

use mlink_core::events::{EventSink, SessionEvent};

/// Приёмник, транслирующий события сессии в tracing
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connecting { host, port } => {
                info!("Подключение к {}:{}...", host, port);
            }
            SessionEvent::HandshakeSent => {
                info!("Рукопожатие отправлено");
            }
            SessionEvent::EncryptionEnabled => {
                info!("✓ Шифрование канала включено");
            }
            SessionEvent::CompressionEnabled { threshold } => {
                info!("✓ Сжатие включено, порог {} байт", threshold);
            }
            SessionEvent::SessionAuthenticated => {
                info!("✓ Session-сервис подтвердил подключение");
            }
            SessionEvent::StateChanged { from, to } => {
                info!("Состояние: {} → {}", from, to);
            }
            SessionEvent::Disconnected { reason } => {
                warn!("Сервер разорвал соединение: {}", reason);
            }
            SessionEvent::Redirect { host, port } => {
                info!("Перенаправление на {}:{}", host, port);
            }
            SessionEvent::UnhandledPacket { state, id, size } => {
                tracing::debug!(
                    "Пакет без обработчика: 0x{:02X} в {} ({} байт)",
                    id,
                    state,
                    size
                );
            }
            SessionEvent::KeepAliveTimeout { seconds } => {
                warn!("Keep-alive не приходил {} секунд", seconds);
            }
        }
    }
}
