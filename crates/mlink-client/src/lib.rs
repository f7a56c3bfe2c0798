//! # MineLink Client Library
//!
//! Клиентская обвязка протокольного движка MineLink.
//!
//! Предоставляет API для:
//! - Конфигурации и загрузки сохранённого профиля
//! - Подтверждения подключения у session-сервиса Mojang
//! - Трансляции событий сессии в журнал

pub mod config;
pub mod events;
pub mod profile;
pub mod session_auth;

pub use config::ClientConfig;
pub use events::TracingSink;
pub use profile::StoredProfile;
pub use session_auth::MojangSessionService;
