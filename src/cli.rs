use gogo_server_domain::{
    StoreEnvelope, StoreResult,
    player::{Player, get_millis},
    store::PlayerStore,
};
use log::info;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const USAGE: &str = "Usage: gogo-server <command>
  create-db
  add <playername> <email> <password>
  get <id>
  find-email <email>
  find-name <playername>
  list [page-size]
  count
  touch <id>
  set-password <id> <password>
  deactivate <id>
  delete <id>";

const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateDb,
    Add {
        playername: String,
        email: String,
        password: String,
    },
    Get(String),
    FindEmail(String),
    FindName(String),
    List(u32),
    Count,
    Touch(String),
    SetPassword {
        id: String,
        password: String,
    },
    Deactivate(String),
    Delete(String),
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let args: Vec<&str> = args.iter().map(|a| a.as_str()).collect();
        let command = match args.as_slice() {
            ["create-db"] => Command::CreateDb,
            ["add", playername, email, password] => Command::Add {
                playername: playername.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
            ["get", id] => Command::Get(id.to_string()),
            ["find-email", email] => Command::FindEmail(email.to_string()),
            ["find-name", playername] => Command::FindName(playername.to_string()),
            ["list"] => Command::List(DEFAULT_PAGE_SIZE),
            ["list", page_size] => {
                let page_size = page_size
                    .parse::<u32>()
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or_else(|| CliError::Usage(format!("invalid page size: {}", page_size)))?;
                Command::List(page_size)
            }
            ["count"] => Command::Count,
            ["touch", id] => Command::Touch(id.to_string()),
            ["set-password", id, password] => Command::SetPassword {
                id: id.to_string(),
                password: password.to_string(),
            },
            ["deactivate", id] => Command::Deactivate(id.to_string()),
            ["delete", id] => Command::Delete(id.to_string()),
            [] => return Err(CliError::Usage("missing command".to_string())),
            [other, ..] => {
                return Err(CliError::Usage(format!(
                    "unknown command or wrong arguments: {}",
                    other
                )));
            }
        };
        Ok(command)
    }
}

async fn hash_password(password: String) -> Result<String, CliError> {
    let hash =
        tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST)).await??;
    Ok(hash)
}

fn envelope<T: Serialize>(result: StoreResult<T>) -> Result<StoreEnvelope<Value>, CliError> {
    let result = match result {
        Ok(data) => Ok(serde_json::to_value(data)?),
        Err(e) => Err(e),
    };
    Ok(StoreEnvelope::from(result))
}

async fn list_all(store: &PlayerStore, page_size: u32) -> StoreResult<Vec<Player>> {
    let mut pages = store.pages(page_size);
    let mut players = Vec::new();
    while let Some(page) = pages.next_page().await {
        players.extend(page?);
    }
    Ok(players)
}

async fn deactivate(store: &PlayerStore, id: &str) -> StoreResult<Player> {
    let mut player = store.get(id).await?;
    if !player.is_active() {
        return Ok(player);
    }
    player.delete_at = get_millis();
    let update = store.update(player, true).await?;
    Ok(update.new)
}

pub async fn execute(
    store: &PlayerStore,
    command: Command,
) -> Result<StoreEnvelope<Value>, CliError> {
    info!("Running {}", command_name(&command));
    match command {
        Command::CreateDb => envelope(store.create_indexes_if_not_exists().await),
        Command::Add {
            playername,
            email,
            password,
        } => {
            let password = hash_password(password).await?;
            let player = Player::new(&playername, &email, &password);
            envelope(store.save(player).await)
        }
        Command::Get(id) => envelope(store.get(&id).await),
        Command::FindEmail(email) => envelope(store.get_by_email(&email).await),
        Command::FindName(playername) => envelope(store.get_by_username(&playername).await),
        Command::List(page_size) => envelope(list_all(store, page_size).await),
        Command::Count => envelope(store.get_total_players_count().await),
        Command::Touch(id) => envelope(store.update_update_at(&id).await),
        Command::SetPassword { id, password } => {
            let password = hash_password(password).await?;
            envelope(store.update_password(&id, &password).await)
        }
        Command::Deactivate(id) => envelope(deactivate(store, &id).await),
        Command::Delete(id) => envelope(store.permanent_delete(&id).await),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::CreateDb => "create-db",
        Command::Add { .. } => "add",
        Command::Get(_) => "get",
        Command::FindEmail(_) => "find-email",
        Command::FindName(_) => "find-name",
        Command::List(_) => "list",
        Command::Count => "count",
        Command::Touch(_) => "touch",
        Command::SetPassword { .. } => "set-password",
        Command::Deactivate(_) => "deactivate",
        Command::Delete(_) => "delete",
    }
}

pub fn is_failure(envelope: &StoreEnvelope<Value>) -> bool {
    envelope.error.is_some()
}
