//! # MineLink Core (mlink-core)
//!
//! Протокольный движок клиента Minecraft Java Edition (протокол 767):
//! жизненный цикл соединения, машина состояний, кадрирование, согласование
//! шифрования, keep-alive и серверные перенаправления.
//!
//! ## Возможности
//!
//! - **Кадрирование**: VarInt-кодек, кадры с префиксом длины, опциональное
//!   zlib-сжатие по порогу
//! - **Шифрование**: RSA-обёртка общего секрета (PKCS#1 v1.5), AES-128-CFB8
//!   на обоих направлениях, legacy-хеш идентификатора сервера
//! - **Машина состояний**: HANDSHAKING → LOGIN → CONFIGURATION → PLAY,
//!   встроенные обработчики keep-alive, disconnect, transfer и
//!   конфигурационного подпротокола
//! - **Перенаправления**: следование transfer-запросам с жёстким потолком
//!   переходов
//! - **Границы**: учётные данные, session-сервис и приёмник диагностики
//!   подставляются вызывающим кодом
//!
//! ## Структура
//!
//! - [`varint`]: целые переменной длины
//! - [`wire`]: типизированные поля пакетов
//! - [`frame`]: кадрирование и сжатие
//! - [`crypto`]: примитивы согласования шифрования
//! - [`cipher`]: потоковый шифр канала
//! - [`packets`]: идентификаторы и сборка пакетов
//! - [`dispatch`]: таблица обработчиков
//! - [`keepalive`]: монитор живости
//! - [`connection`]: соединение и циклы приёма
//! - [`redirect`]: контроллер перенаправлений
//! - [`credential`], [`auth`], [`events`]: внешние границы
//! - [`error`]: типы ошибок
//!
//! ## Пример использования
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use mlink_core::{
//!     auth::NullAuthenticator,
//!     connection::ConnectOptions,
//!     credential::Credential,
//!     events::NullSink,
//!     redirect::RedirectController,
//! };
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), mlink_core::MlinkError> {
//! let credential = Credential::new(
//!     Uuid::new_v4(),
//!     "Steve",
//!     "access-token",
//!     Utc::now() + Duration::hours(24),
//! );
//!
//! let mut controller = RedirectController::new(
//!     ConnectOptions::default(),
//!     Arc::new(NullAuthenticator),
//!     Arc::new(NullSink),
//! );
//!
//! // Установить сессию и вести игровой цикл до разрыва
//! let end = controller
//!     .run_session("mc.example.org", 25565, &credential, |_conn| {})
//!     .await?;
//! println!("Сессия завершена: {:?}", end);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cipher;
pub mod connection;
pub mod credential;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod frame;
pub mod keepalive;
pub mod packets;
pub mod redirect;
pub mod varint;
pub mod wire;

// Re-экспорт основных типов для удобства
pub use connection::{ConnectOptions, ConnectOutcome, SessionConnection, SessionEnd};
pub use credential::Credential;
pub use dispatch::TransferTarget;
pub use error::{MlinkError, Result};
pub use packets::{ConnectionState, Direction, PROTOCOL_VERSION};
pub use redirect::{RedirectController, MAX_REDIRECT_HOPS};

/// Версия библиотеки
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
