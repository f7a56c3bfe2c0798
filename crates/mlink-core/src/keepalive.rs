//! Отслеживание keep-alive
//!
//! Монитор хранит последний полученный идентификатор и момент его
//! получения. Он только отвечает на вопросы о живости — закрытие
//! соединения по таймауту остаётся за владеющим циклом.

use std::time::{Duration, Instant};

/// Монитор живости соединения
#[derive(Debug)]
pub struct KeepAliveMonitor {
    last_id: i64,
    last_seen: Instant,
    timeout: Duration,
}

impl KeepAliveMonitor {
    /// Создать монитор с заданным таймаутом
    ///
    /// Отсчёт начинается с момента создания: сервер, не приславший ни
    /// одного keep-alive, тоже считается мёртвым по истечении таймаута.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_id: 0,
            last_seen: Instant::now(),
            timeout,
        }
    }

    /// Зафиксировать полученный keep-alive
    pub fn record(&mut self, id: i64) {
        self.last_id = id;
        self.last_seen = Instant::now();
    }

    /// Последний полученный идентификатор
    pub fn last_id(&self) -> i64 {
        self.last_id
    }

    /// Истёк ли таймаут на текущий момент
    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Instant::now())
    }

    /// Истёк ли таймаут на заданный момент времени
    ///
    /// Отдельная точка входа, чтобы тесты могли продвигать время без
    /// сна.
    pub fn is_timed_out_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.timeout
    }

    /// Сколько прошло с последнего keep-alive
    pub fn since_last(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// Настроенный таймаут
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
