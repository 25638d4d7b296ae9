use rand::Rng;
use serde::Serialize;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

pub type PlayerId = String;

pub const ID_LEN: usize = 24;
pub const PLAYERNAME_MAX_LEN: usize = 64;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const EMAIL_MAX_LEN: usize = 128;
pub const ALLOW_STATS_MAX_LEN: usize = 1;
pub const LOCALE_MAX_LEN: usize = 5;

pub const DEFAULT_LOCALE: &str = "en-US";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[validate(length(min = 1, max = 24))]
    pub id: PlayerId,
    #[validate(length(min = 1, max = 64))]
    pub playername: String,
    #[serde(skip_serializing)]
    #[validate(length(max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 128), email)]
    pub email: String,
    pub allow_stats: bool,
    #[validate(length(max = 5))]
    pub locale: String,
    #[validate(range(min = 1))]
    pub create_at: i64,
    #[validate(range(min = 1))]
    pub update_at: i64,
    /// Soft-delete marker, zero while the account is active.
    pub delete_at: i64,
}

impl Player {
    pub fn new(playername: &str, email: &str, password: &str) -> Self {
        Self {
            playername: playername.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            allow_stats: true,
            ..Default::default()
        }
    }

    /// Fills in the fields a fresh record gets before its first insert.
    pub fn pre_save(&mut self) {
        if self.id.is_empty() {
            self.id = new_id();
        }
        if self.create_at == 0 {
            self.create_at = get_millis();
        }
        self.update_at = self.create_at;
        self.normalize();
        if self.locale.is_empty() {
            self.locale = DEFAULT_LOCALE.to_string();
        }
    }

    pub fn pre_update(&mut self) {
        self.update_at = get_millis();
        self.normalize();
    }

    fn normalize(&mut self) {
        self.playername = self.playername.trim().to_lowercase();
        self.email = self.email.trim().to_lowercase();
    }

    /// Every failing field at once. The offending values are dropped from
    /// the errors so they never reach messages or logs.
    pub fn is_valid(&self) -> Result<(), ValidationErrors> {
        self.validate().map_err(|mut errors| {
            for kind in errors.errors_mut().values_mut() {
                if let ValidationErrorsKind::Field(field_errors) = kind {
                    for error in field_errors.iter_mut() {
                        error.params.remove("value");
                    }
                }
            }
            errors
        })
    }

    pub fn is_active(&self) -> bool {
        self.delete_at == 0
    }
}

pub fn new_id() -> PlayerId {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

pub fn get_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
