use std::sync::Arc;

use gogo_persistence_sqlite::{PlayerDbConfig, players::SqlitePlayerBackend};
use gogo_server_domain::store::PlayerStore;
use log::{error, info};

mod cli;
mod logs;

use cli::{CliError, Command, USAGE};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = logs::init_logger() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = match PlayerDbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let backend = match SqlitePlayerBackend::new(&config) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to open player database: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Using player database {} (max {} connections)",
        config.url, config.max_connections
    );
    let store = PlayerStore::new(Arc::new(Box::new(backend)));

    match run(&store, command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run(store: &PlayerStore, command: Command) -> Result<bool, CliError> {
    let envelope = cli::execute(store, command).await?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(!cli::is_failure(&envelope))
}
