//! Структурированные события сессии
//!
//! Движок не печатает и не форматирует вывод сам: он отдаёт
//! типизированные события в приёмник, который подставляет вызывающий
//! код (терминал, лог, тест).

use crate::packets::ConnectionState;

/// Событие жизненного цикла сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Начато TCP-подключение
    Connecting {
        /// Хост сервера
        host: String,
        /// Порт сервера
        port: u16,
    },
    /// Отправлено рукопожатие и запрос входа
    HandshakeSent,
    /// Шифрование канала включено
    EncryptionEnabled,
    /// Сервер запросил сжатие кадров
    CompressionEnabled {
        /// Порог размера payload
        threshold: i32,
    },
    /// Session-сервис подтвердил подключение
    SessionAuthenticated,
    /// Состояние соединения изменилось
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Сервер разорвал соединение
    Disconnected {
        /// Извлечённый текст причины
        reason: String,
    },
    /// Сервер запросил перенаправление
    Redirect {
        /// Хост нового сервера
        host: String,
        /// Порт нового сервера
        port: u16,
    },
    /// Пакет без зарегистрированного обработчика
    UnhandledPacket {
        state: ConnectionState,
        id: i32,
        size: usize,
    },
    /// Keep-alive перестал приходить
    KeepAliveTimeout {
        /// Секунд с последнего keep-alive
        seconds: u64,
    },
}

/// Приёмник событий сессии
pub trait EventSink: Send + Sync {
    /// Принять событие
    fn emit(&self, event: &SessionEvent);
}

/// Приёмник, отбрасывающий события
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &SessionEvent) {}
}

/// Приёмник, накапливающий события в памяти
///
/// Используется тестами для проверки переходов состояния.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<SessionEvent>>,
}

impl MemorySink {
    /// Создать пустой приёмник
    pub fn new() -> Self {
        Self::default()
    }

    /// Снять копию накопленных событий
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.lock().expect("events mutex").clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SessionEvent) {
        self.events.lock().expect("events mutex").push(event.clone());
    }
}
