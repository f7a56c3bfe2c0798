//! Учётные данные для входа на сервер
//!
//! Движок получает готовые учётные данные извне и только читает их.
//! Откуда они взялись (device-code flow, сохранённый профиль) — забота
//! вызывающего кода. Токен доступа никогда не попадает в логи целиком.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Учётные данные авторизованного профиля
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// UUID профиля
    pub profile_id: Uuid,
    /// Отображаемое имя игрока
    pub username: String,
    /// Непрозрачный токен доступа для session-сервиса
    pub access_token: String,
    /// Момент истечения токена
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Создать учётные данные
    pub fn new(
        profile_id: Uuid,
        username: impl Into<String>,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            profile_id,
            username: username.into(),
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Истёк ли срок действия токена
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// UUID профиля без дефисов — формат, который ожидает session-сервис
    pub fn profile_id_compact(&self) -> String {
        self.profile_id.simple().to_string()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("profile_id", &self.profile_id)
            .field("username", &self.username)
            .field("access_token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
