//! Конфигурация клиента MineLink
//!
//! Этот модуль отвечает за загрузку и валидацию конфигурации клиента.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use mlink_core::connection::ConnectOptions;
use mlink_core::packets::DEFAULT_PORT;

/// Конфигурация клиента MineLink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Настройки сервера
    pub server: ServerConfig,

    /// Настройки сессии
    pub session: SessionConfig,

    /// Настройки логирования
    pub logging: LoggingConfig,
}

/// Настройки сервера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP адрес или hostname сервера
    pub host: String,

    /// Порт сервера
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Таймаут подключения (секунды)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Настройки сессии
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Путь к файлу сохранённого профиля
    #[serde(default = "default_profile_path")]
    pub profile_path: String,

    /// Таймаут keep-alive (секунды)
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    /// Подтверждать подключение у session-сервиса
    ///
    /// Выключается только для offline-серверов, не запрашивающих
    /// шифрование.
    #[serde(default = "default_online_mode")]
    pub online_mode: bool,
}

/// Настройки логирования
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Уровень логирования (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Значения по умолчанию
fn default_server_port() -> u16 {
    DEFAULT_PORT
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_profile_path() -> String {
    "profile.toml".to_string()
}

fn default_keepalive_timeout() -> u64 {
    30
}

fn default_online_mode() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_server_port(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile_path: default_profile_path(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            online_mode: default_online_mode(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Загрузить конфигурацию из TOML файла
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Сохранить конфигурацию в TOML файл
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Валидация конфигурации
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.host.is_empty() {
            anyhow::bail!("Адрес сервера не может быть пустым");
        }

        if self.server.port == 0 {
            anyhow::bail!("Порт сервера не может быть 0");
        }

        if self.session.keepalive_timeout_secs == 0 {
            anyhow::bail!("Таймаут keep-alive не может быть 0");
        }

        Ok(())
    }

    /// Разобрать адрес вида `host:port`; порт по умолчанию — 25565
    pub fn parse_address(address: &str) -> Result<(String, u16), anyhow::Error> {
        match address.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Некорректный порт: {}", port))?;
                Ok((host.to_string(), port))
            }
            None => Ok((address.to_string(), DEFAULT_PORT)),
        }
    }

    /// Параметры подключения для движка
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.server.connection_timeout_secs),
            keepalive_timeout: Duration::from_secs(self.session.keepalive_timeout_secs),
        }
    }
}
