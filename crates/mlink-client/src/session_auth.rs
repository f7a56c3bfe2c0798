//! HTTPS-реализация границы session-сервиса
//!
//! Перед включением шифрования клиент предъявляет сервису токен доступа,
//! UUID профиля без дефисов и хеш идентификатора сервера. Успех — это
//! ровно HTTP 204; любой другой статус фатален для попытки подключения.

use serde_json::json;
use tracing::debug;

use mlink_core::auth::SessionAuthenticator;
use mlink_core::credential::Credential;
use mlink_core::error::AuthError;

/// Адрес session-сервиса Mojang
const SESSION_SERVER_URL: &str = "https://sessionserver.mojang.com/session/minecraft/join";

/// Session-сервис Mojang
#[derive(Debug)]
pub struct MojangSessionService {
    url: String,
}

impl MojangSessionService {
    /// Сервис по стандартному адресу
    pub fn new() -> Self {
        Self {
            url: SESSION_SERVER_URL.to_string(),
        }
    }

    /// Сервис по собственному адресу (прокси, тестовый стенд)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for MojangSessionService {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAuthenticator for MojangSessionService {
    fn join_server(&self, credential: &Credential, server_id_hash: &str) -> Result<(), AuthError> {
        let payload = json!({
            "accessToken": credential.access_token,
            "selectedProfile": credential.profile_id_compact(),
            "serverId": server_id_hash,
        });

        debug!(
            profile = %credential.profile_id,
            "Подтверждение подключения у session-сервиса"
        );

        let response = ureq::post(&self.url).send_json(payload);

        match response {
            Ok(resp) if resp.status() == 204 => Ok(()),
            Ok(resp) => {
                let status = resp.status();
                let body = resp.into_string().unwrap_or_default();
                Err(AuthError::Rejected { status, body })
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(AuthError::Rejected { status, body })
            }
            Err(e) => Err(AuthError::Transport(e.to_string())),
        }
    }
}
