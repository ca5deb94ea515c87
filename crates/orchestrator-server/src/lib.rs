//! Ядро оркестратора топологий репликации MySQL.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod services;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use api::AppState;
use config::Config;
use orchestrator_migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use services::topology_probe::TopologyPools;
use tokio::sync::watch;
use tracing::info;

/// Запустить оркестратор.
pub async fn run(config: Config, listen: String, db_url: String) -> anyhow::Result<()> {
    // 1. Подключение к бэкенд-каталогу
    info!("Подключение к каталогу: {db_url}");
    let db: DatabaseConnection = Database::connect(&db_url).await?;

    // 2. Автоматические миграции
    info!("Выполнение миграций...");
    Migrator::up(&db, None).await?;

    // 3. Пулы подключений к топологии и планировщик обнаружения
    let config = Arc::new(config);
    let pools = Arc::new(TopologyPools::new(&config));
    let discovery = services::discovery::start(db.clone(), Arc::clone(&config), Arc::clone(&pools));

    // 4. Маршрутизатор
    let state = AppState {
        db,
        config,
        pools,
        discovery,
    };
    let app = api::build_router(state);

    // 5. Graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Получен сигнал завершения, останавливаю сервер...");
        let _ = shutdown_tx.send(true);
    });

    // 6. Запуск сервера
    let addr: SocketAddr = listen.parse()?;
    info!("Оркестратор запущен на {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("Оркестратор остановлен");
    Ok(())
}
