//! Типы ошибок протокольного движка MineLink
//!
//! Таксономия повторяет фазы обработки: ошибки кадрирования, ошибки
//! протокольного состояния, криптографические ошибки, ошибки авторизации
//! и ошибки ввода-вывода. Любая из них фатальна для текущей попытки
//! подключения; ретраи — забота вызывающего кода.

use thiserror::Error;

use crate::packets::ConnectionState;

/// Основной тип ошибок MineLink
#[derive(Error, Debug)]
pub enum MlinkError {
    /// Ошибка кадрирования потока байт
    #[error("Ошибка кадрирования: {0}")]
    Framing(#[from] FramingError),

    /// Ошибка протокольного состояния
    #[error("Протокольная ошибка: {0}")]
    Protocol(#[from] ProtocolError),

    /// Ошибка согласования шифрования (RSA/AES или отказ session-сервиса)
    #[error("Согласование шифрования не удалось: {0}")]
    EncryptionNegotiation(#[from] CryptoError),

    /// Ошибка авторизации вне фазы согласования шифрования
    #[error("Ошибка авторизации: {0}")]
    Auth(AuthError),

    /// Превышен лимит серверных перенаправлений
    #[error("Обнаружен цикл перенаправлений: {hops} переходов")]
    RedirectLoop {
        /// Количество выполненных переходов на момент отказа
        hops: u32,
    },

    /// Ошибка ввода-вывода
    #[error("Ошибка I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Ошибки кадрирования: некорректный VarInt, длина кадра, усечённые данные
#[derive(Error, Debug)]
pub enum FramingError {
    /// VarInt не уместился в 5 байт (32 бита)
    #[error("VarInt длиннее 5 байт")]
    MalformedVarInt,

    /// Длина кадра неположительна
    #[error("Некорректная длина кадра: {0}")]
    InvalidFrameLength(i32),

    /// Кадр превышает допустимый размер
    #[error("Кадр превышает допустимый размер: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Недостаточно данных в буфере
    #[error("Недостаточно данных: требуется {required}, доступно {available}")]
    Truncated { required: usize, available: usize },

    /// Строка в пакете не является корректным UTF-8
    #[error("Некорректная строка UTF-8 в пакете")]
    InvalidUtf8,

    /// Размер распакованных данных не совпал с заявленным
    #[error("Размер распакованных данных не совпадает: заявлено {declared}, получено {actual}")]
    DecompressedSizeMismatch { declared: usize, actual: usize },

    /// Ошибка zlib при распаковке кадра
    #[error("Ошибка распаковки zlib: {0}")]
    Decompress(String),
}

/// Ошибки протокольного состояния
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Сервер разорвал соединение, причина — уже извлечённый текст
    #[error("Сервер разорвал соединение: {reason}")]
    Disconnected {
        /// Текст причины, предоставленный сервером
        reason: String,
    },

    /// Пакет с этим id не ожидается в текущем состоянии
    #[error("Неожиданный пакет 0x{id:02X} в состоянии {state}")]
    UnexpectedPacket { state: ConnectionState, id: i32 },

    /// Сервер закрыл поток до завершения кадра
    #[error("Соединение закрыто сервером")]
    ConnectionClosed,

    /// Сервер перестал присылать keep-alive
    #[error("Keep-alive не приходил {seconds} секунд")]
    KeepAliveTimeout { seconds: u64 },
}

/// Криптографические ошибки согласования
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Публичный ключ сервера не разобрался из DER
    #[error("Некорректный публичный ключ сервера: {0}")]
    InvalidPublicKey(String),

    /// Ошибка RSA-шифрования (PKCS#1 v1.5)
    #[error("Ошибка RSA-шифрования")]
    RsaEncrypt,

    /// Session-сервис не подтвердил подключение
    #[error("Отказ session-сервиса: {0}")]
    SessionAuth(#[from] AuthError),
}

/// Ошибки взаимодействия с session-сервисом и учётными данными
#[derive(Error, Debug)]
pub enum AuthError {
    /// Сервис ответил статусом, отличным от 204
    #[error("Session-сервис вернул статус {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Транспортная ошибка при обращении к сервису
    #[error("Ошибка обращения к session-сервису: {0}")]
    Transport(String),

    /// Срок действия учётных данных истёк
    #[error("Срок действия учётных данных истёк")]
    Expired,
}

/// Псевдоним для Result с ошибкой MineLink
pub type Result<T> = std::result::Result<T, MlinkError>;
