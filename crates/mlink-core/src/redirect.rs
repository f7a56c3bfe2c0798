//! Следование серверным перенаправлениям
//!
//! Сервер может в любой фазе попросить клиента переподключиться к
//! другому адресу. Контроллер закрывает текущее соединение, создаёт
//! новое с теми же учётными данными и прогоняет машину состояний с
//! самого начала — со свежим состоянием шифра. Счётчик переходов общий
//! на всю цепочку; жёсткий потолок ограждает от злонамеренных серверов
//! и не настраивается.

use std::sync::Arc;

use tracing::debug;

use crate::auth::SessionAuthenticator;
use crate::connection::{ConnectOptions, ConnectOutcome, SessionConnection, SessionEnd};
use crate::credential::Credential;
use crate::dispatch::TransferTarget;
use crate::error::{MlinkError, Result};
use crate::events::EventSink;

/// Максимальное число переходов по перенаправлениям
pub const MAX_REDIRECT_HOPS: u32 = 5;

/// Контроллер перенаправлений поверх последовательности подключений
pub struct RedirectController {
    options: ConnectOptions,
    authenticator: Arc<dyn SessionAuthenticator>,
    events: Arc<dyn EventSink>,
    hops: u32,
}

impl RedirectController {
    /// Создать контроллер с нулевым счётчиком переходов
    pub fn new(
        options: ConnectOptions,
        authenticator: Arc<dyn SessionAuthenticator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            options,
            authenticator,
            events,
            hops: 0,
        }
    }

    /// Выполненные переходы
    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// Установить сессию, следуя перенаправлениям фаз входа и конфигурации
    ///
    /// `configure` вызывается для каждой свежей попытки: таблица
    /// обработчиков статична на соединение, и пользовательские
    /// обработчики нужно регистрировать заново.
    pub async fn establish<F>(
        &mut self,
        host: &str,
        port: u16,
        credential: &Credential,
        mut configure: F,
    ) -> Result<SessionConnection>
    where
        F: FnMut(&mut SessionConnection),
    {
        let mut host = host.to_string();
        let mut port = port;

        loop {
            let mut connection = SessionConnection::new(
                host.clone(),
                port,
                self.options.clone(),
                Arc::clone(&self.authenticator),
                Arc::clone(&self.events),
            );
            configure(&mut connection);

            match connection.connect(credential).await? {
                ConnectOutcome::Play => return Ok(connection),
                ConnectOutcome::Transfer(target) => {
                    let next = self.follow(target)?;
                    host = next.host;
                    port = next.port;
                }
            }
        }
    }

    /// Полный прогон: установить сессию и вести игровой цикл,
    /// следуя перенаправлениям и из состояния PLAY
    pub async fn run_session<F>(
        &mut self,
        host: &str,
        port: u16,
        credential: &Credential,
        mut configure: F,
    ) -> Result<SessionEnd>
    where
        F: FnMut(&mut SessionConnection),
    {
        let mut host = host.to_string();
        let mut port = port;

        loop {
            let mut connection = self
                .establish(&host, port, credential, &mut configure)
                .await?;

            match connection.run().await? {
                SessionEnd::Transfer(target) => {
                    let next = self.follow(target)?;
                    host = next.host;
                    port = next.port;
                }
                end => return Ok(end),
            }
        }
    }

    /// Учесть один переход; после потолка — ошибка цикла перенаправлений
    fn follow(&mut self, target: TransferTarget) -> Result<TransferTarget> {
        self.hops += 1;
        if self.hops > MAX_REDIRECT_HOPS {
            return Err(MlinkError::RedirectLoop { hops: self.hops });
        }

        debug!("Переход #{} на {}", self.hops, target);
        Ok(target)
    }
}
