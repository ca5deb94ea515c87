//! Точка входа оркестратора топологий репликации MySQL.

use clap::Parser;
use orchestrator_server::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "orchestrator-server",
    about = "Оркестратор топологий репликации MySQL"
)]
struct Cli {
    /// Адрес для прослушивания (host:port)
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// URL базы каталога; используется, если в конфигурации не задан
    /// MySQL-бэкенд (MySQLOrchestratorHost)
    #[arg(
        long,
        default_value = "sqlite:./orchestrator.db?mode=rwc",
        env = "DATABASE_URL"
    )]
    db_url: String,

    /// Файлы конфигурации JSON; читаются по порядку, поздние
    /// переопределяют ранние
    #[arg(long = "config")]
    config: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логгера
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_paths = if cli.config.is_empty() {
        vec![
            "/etc/orchestrator.conf.json".to_string(),
            "conf/orchestrator.conf.json".to_string(),
            "orchestrator.conf.json".to_string(),
        ]
    } else {
        cli.config
    };

    let config = Config::read(&config_paths)?;
    config.validate()?;

    // Каталог: MySQL из конфигурации или локальный sqlite из CLI
    let db_url = config.backend_db_url().unwrap_or(cli.db_url);

    orchestrator_server::run(config, cli.listen, db_url).await
}
