use gogo_server_domain::{
    classify::BackendError,
    player::{
        ALLOW_STATS_MAX_LEN, EMAIL_MAX_LEN, ID_LEN, LOCALE_MAX_LEN, PASSWORD_MAX_LEN,
        PLAYERNAME_MAX_LEN, Player,
    },
    store::PlayerBackend,
};
use log::debug;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::{ConfigError, PlayerDbConfig, create_player_db_pool};

pub struct SqlitePlayerBackend {
    pool: Pool<Sqlite>,
}

impl SqlitePlayerBackend {
    pub fn new(config: &PlayerDbConfig) -> Result<Self, ConfigError> {
        let pool = create_player_db_pool(config)?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn player_from_row(row: &SqliteRow) -> sqlx::Result<Player> {
        let allow_stats: String = row.try_get("AllowStats")?;
        Ok(Player {
            id: row.try_get("Id")?,
            playername: row.try_get("Playername")?,
            password: row.try_get("Password")?,
            email: row.try_get("Email")?,
            allow_stats: allow_stats == "1",
            locale: row.try_get("Locale")?,
            create_at: row.try_get("CreateAt")?,
            update_at: row.try_get("UpdateAt")?,
            delete_at: row.try_get("DeleteAt")?,
        })
    }

    fn players_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<Player>, BackendError> {
        rows.iter()
            .map(|row| Self::player_from_row(row).map_err(backend_error))
            .collect()
    }
}

fn allow_stats_to_column(allow_stats: bool) -> &'static str {
    if allow_stats { "1" } else { "0" }
}

fn backend_error(e: sqlx::Error) -> BackendError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return BackendError::UniqueViolation {
                constraint: db_err.constraint().map(|c| c.to_string()),
                message: db_err.message().to_string(),
            };
        }
    }
    BackendError::Other(e.to_string())
}

fn schema_statements() -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS Players (\
             Id VARCHAR({id}) NOT NULL PRIMARY KEY CHECK(length(Id) <= {id}), \
             Playername VARCHAR({name}) NOT NULL CHECK(length(Playername) <= {name}), \
             Password VARCHAR({password}) NOT NULL DEFAULT '' CHECK(length(Password) <= {password}), \
             Email VARCHAR({email}) NOT NULL CHECK(length(Email) <= {email}), \
             AllowStats VARCHAR({stats}) NOT NULL DEFAULT '0' CHECK(length(AllowStats) <= {stats}), \
             Locale VARCHAR({locale}) NOT NULL DEFAULT '' CHECK(length(Locale) <= {locale}), \
             CreateAt BIGINT NOT NULL DEFAULT 0, \
             UpdateAt BIGINT NOT NULL DEFAULT 0, \
             DeleteAt BIGINT NOT NULL DEFAULT 0)",
            id = ID_LEN,
            name = PLAYERNAME_MAX_LEN,
            password = PASSWORD_MAX_LEN,
            email = EMAIL_MAX_LEN,
            stats = ALLOW_STATS_MAX_LEN,
            locale = LOCALE_MAX_LEN,
        ),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_players_email_unique ON Players (Email)".to_string(),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_players_username_unique ON Players (Playername)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_player_email ON Players (Email)".to_string(),
    ]
}

#[async_trait::async_trait]
impl PlayerBackend for SqlitePlayerBackend {
    async fn create_schema(&self) -> Result<(), BackendError> {
        for statement in schema_statements() {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(backend_error)?;
        }
        debug!("Players table and indexes are in place");
        Ok(())
    }

    async fn insert(&self, player: &Player) -> Result<(), BackendError> {
        sqlx::query(
            "INSERT INTO Players (Id, Playername, Password, Email, AllowStats, Locale, CreateAt, UpdateAt, DeleteAt) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&player.id)
        .bind(&player.playername)
        .bind(&player.password)
        .bind(&player.email)
        .bind(allow_stats_to_column(player.allow_stats))
        .bind(&player.locale)
        .bind(player.create_at)
        .bind(player.update_at)
        .bind(player.delete_at)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Player>, BackendError> {
        let row = sqlx::query("SELECT * FROM Players WHERE Id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        row.map(|row| Self::player_from_row(&row).map_err(backend_error))
            .transpose()
    }

    async fn update(&self, player: &Player) -> Result<u64, BackendError> {
        let res = sqlx::query(
            "UPDATE Players SET Playername = ?, Password = ?, Email = ?, AllowStats = ?, Locale = ?, CreateAt = ?, UpdateAt = ?, DeleteAt = ? WHERE Id = ?",
        )
        .bind(&player.playername)
        .bind(&player.password)
        .bind(&player.email)
        .bind(allow_stats_to_column(player.allow_stats))
        .bind(&player.locale)
        .bind(player.create_at)
        .bind(player.update_at)
        .bind(player.delete_at)
        .bind(&player.id)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(res.rows_affected())
    }

    async fn set_update_at(&self, id: &str, update_at: i64) -> Result<u64, BackendError> {
        let res = sqlx::query("UPDATE Players SET UpdateAt = ? WHERE Id = ?")
            .bind(update_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(res.rows_affected())
    }

    async fn set_password(&self, id: &str, password: &str) -> Result<u64, BackendError> {
        let res = sqlx::query("UPDATE Players SET Password = ? WHERE Id = ?")
            .bind(password)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(res.rows_affected())
    }

    async fn select_all(&self) -> Result<Vec<Player>, BackendError> {
        let rows = sqlx::query("SELECT * FROM Players")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;
        Self::players_from_rows(rows)
    }

    async fn select_page(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Player>, BackendError> {
        let query = match after {
            Some(after) => sqlx::query("SELECT * FROM Players WHERE Id > ? ORDER BY Id LIMIT ?")
                .bind(after.to_string())
                .bind(limit as i64),
            None => sqlx::query("SELECT * FROM Players ORDER BY Id LIMIT ?").bind(limit as i64),
        };
        let rows = query.fetch_all(&self.pool).await.map_err(backend_error)?;
        Self::players_from_rows(rows)
    }

    async fn select_by_email(&self, email: &str) -> Result<Option<Player>, BackendError> {
        let row = sqlx::query("SELECT * FROM Players WHERE Email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        row.map(|row| Self::player_from_row(&row).map_err(backend_error))
            .transpose()
    }

    async fn select_by_username(&self, username: &str) -> Result<Option<Player>, BackendError> {
        let row = sqlx::query("SELECT * FROM Players WHERE Playername = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;
        row.map(|row| Self::player_from_row(&row).map_err(backend_error))
            .transpose()
    }

    async fn count(&self) -> Result<i64, BackendError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(Id) FROM Players")
            .fetch_one(&self.pool)
            .await
            .map_err(backend_error)
    }

    async fn delete(&self, id: &str) -> Result<u64, BackendError> {
        let res = sqlx::query("DELETE FROM Players WHERE Id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(res.rows_affected())
    }
}
