//! Загрузка сохранённого профиля
//!
//! Клиент потребляет готовые учётные данные: OAuth-цепочка, которая их
//! выдала, остаётся за пределами этого кода. Профиль хранится в TOML
//! файле; при загрузке проверяется срок действия токена.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mlink_core::credential::Credential;

/// Сохранённый профиль игрока
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    /// UUID профиля
    pub profile_id: Uuid,
    /// Имя игрока
    pub username: String,
    /// Токен доступа
    pub access_token: String,
    /// Момент истечения токена
    pub expires_at: DateTime<Utc>,
}

/// Ошибки загрузки профиля
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Файл не прочитался
    #[error("Не удалось прочитать файл профиля: {0}")]
    Io(#[from] std::io::Error),

    /// Файл не разобрался как TOML
    #[error("Не удалось разобрать файл профиля: {0}")]
    Parse(#[from] toml::de::Error),

    /// Срок действия токена истёк
    #[error("Срок действия токена профиля «{username}» истёк {expires_at}")]
    Expired {
        username: String,
        expires_at: DateTime<Utc>,
    },
}

impl StoredProfile {
    /// Загрузить профиль из TOML файла
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Превратить профиль в учётные данные, проверив срок действия
    pub fn into_credential(self) -> Result<Credential, ProfileError> {
        if Utc::now() >= self.expires_at {
            return Err(ProfileError::Expired {
                username: self.username,
                expires_at: self.expires_at,
            });
        }

        Ok(Credential::new(
            self.profile_id,
            self.username,
            self.access_token,
            self.expires_at,
        ))
    }
}
