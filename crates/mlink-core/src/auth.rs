//! Граница session-сервиса
//!
//! Перед отправкой encryption-response клиент обязан предъявить внешнему
//! сервису токен доступа, UUID профиля без дефисов и хеш идентификатора
//! сервера. Конкретная реализация (HTTPS-клиент, заглушка для тестов)
//! подставляется через этот трейт; движок требует только вердикт.

use crate::credential::Credential;
use crate::error::AuthError;

/// Подтверждение подключения у session-сервиса
///
/// Реализация может блокироваться: движок вызывает её через
/// `spawn_blocking`. Любая ошибка фатальна для текущей попытки
/// подключения.
pub trait SessionAuthenticator: Send + Sync {
    /// Предъявить `(accessToken, profileId, serverIdHash)` сервису
    fn join_server(&self, credential: &Credential, server_id_hash: &str) -> Result<(), AuthError>;
}

/// Заглушка для серверов, не запрашивающих шифрование
///
/// Если сервер всё же запросит шифрование, согласование пройдёт без
/// внешнего подтверждения — годится только для доверенных и тестовых
/// серверов.
#[derive(Debug, Default)]
pub struct NullAuthenticator;

impl SessionAuthenticator for NullAuthenticator {
    fn join_server(&self, _credential: &Credential, _server_id_hash: &str) -> Result<(), AuthError> {
        Ok(())
    }
}
