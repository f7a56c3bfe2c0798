//! MineLink Client CLI
//!
//! Клиент игрового протокола с поддержкой шифрования и перенаправлений.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use mlink_client::{ClientConfig, MojangSessionService, StoredProfile, TracingSink};
use mlink_core::auth::{NullAuthenticator, SessionAuthenticator};
use mlink_core::connection::SessionEnd;
use mlink_core::redirect::RedirectController;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(name = "mlink-client")]
#[command(about = "MineLink protocol client", long_about = None)]
struct Args {
    /// Путь к конфигурационному файлу
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,

    /// Уровень логирования (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Подкоманды
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Подключиться к серверу
    Connect {
        /// Адрес сервера (host или host:port); иначе берётся из конфигурации
        address: Option<String>,
    },

    /// Генерация примера конфигурации
    GenerateConfig {
        /// Путь для сохранения
        #[arg(short, long, default_value = "client.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let address = match args.command {
        Some(Commands::GenerateConfig { output }) => {
            if let Err(e) = generate_config(&output) {
                eprintln!("Ошибка генерации конфигурации: {}", e);
                std::process::exit(1);
            }
            println!("Конфигурация сохранена в: {}", output.display());
            return;
        }
        Some(Commands::Connect { address }) => address,
        None => None,
    };

    // Загрузка конфигурации
    let config = match ClientConfig::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            if !args.config.exists() {
                println!("⚠ Конфигурационный файл не найден: {}", args.config.display());

                if let Err(gen_err) = generate_config(&args.config) {
                    eprintln!("Ошибка создания конфигурации: {}", gen_err);
                    std::process::exit(1);
                }

                println!("✓ Конфигурация создана: {}", args.config.display());
                println!();
                println!("Отредактируйте файл (адрес сервера, путь к профилю)");
                println!("и запустите клиент снова: mlink-client connect");
                std::process::exit(0);
            } else {
                eprintln!("Ошибка загрузки конфигурации: {}", e);
                eprintln!("Проверьте файл: {}", args.config.display());
                std::process::exit(1);
            }
        }
    };

    // Инициализация логирования
    let log_level = args
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .parse::<Level>()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Не удалось установить global subscriber");

    info!("MineLink Client v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_client(config, address).await {
        error!("Критическая ошибка клиента: {}", e);
        std::process::exit(1);
    }
}

/// Запуск клиента
async fn run_client(
    config: ClientConfig,
    address: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (host, port) = match address {
        Some(address) => ClientConfig::parse_address(&address)?,
        None => (config.server.host.clone(), config.server.port),
    };

    // Загрузка сохранённого профиля
    let credential = StoredProfile::from_file(&config.session.profile_path)?.into_credential()?;
    info!("Профиль: {} ({})", credential.username, credential.profile_id);

    let authenticator: Arc<dyn SessionAuthenticator> = if config.session.online_mode {
        Arc::new(MojangSessionService::new())
    } else {
        info!("⚠ Offline-режим: подключение без подтверждения session-сервиса");
        Arc::new(NullAuthenticator)
    };

    let mut controller = RedirectController::new(
        config.connect_options(),
        authenticator,
        Arc::new(TracingSink),
    );

    info!("Подключение к {}:{}...", host, port);

    // Полный прогон с обработкой Ctrl+C
    tokio::select! {
        result = controller.run_session(&host, port, &credential, |_conn| {}) => {
            match result? {
                SessionEnd::Disconnected { reason } => {
                    info!("Сессия завершена сервером: {}", reason);
                }
                SessionEnd::Stopped => {
                    info!("Сессия остановлена");
                }
                SessionEnd::Transfer(target) => {
                    // run_session следует перенаправлениям сам; сюда
                    // исход не доходит
                    info!("Сессия завершилась перенаправлением на {}", target);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Получен сигнал Ctrl+C, отключение...");
        }
    }

    info!("Клиент остановлен");
    Ok(())
}

/// Генерация примера конфигурации
fn generate_config(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::default();
    config.to_file(path)?;
    Ok(())
}
