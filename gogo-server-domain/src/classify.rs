use thiserror::Error;

use crate::StoreError;

/// Failure reported by a backing store adapter.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("unique constraint violated: {message}")]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn message(&self) -> &str {
        match self {
            BackendError::UniqueViolation { message, .. } => message,
            BackendError::Other(message) => message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Email,
    Playername,
}

impl Constraint {
    pub fn signatures(&self) -> &'static [&'static str] {
        match self {
            Constraint::Email => &["Email", "players_email_key", "idx_players_email_unique"],
            Constraint::Playername => &[
                "Playername",
                "players_username_key",
                "idx_players_username_unique",
            ],
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.signatures().iter().any(|sig| text.contains(sig))
    }
}

pub fn is_unique_constraint_error(message: &str, signatures: &[&str]) -> bool {
    let lower = message.to_lowercase();
    let unique = lower.contains("unique constraint") || lower.contains("duplicate entry");
    unique && signatures.iter().any(|sig| message.contains(sig))
}

fn violated_constraint(err: &BackendError) -> Option<Constraint> {
    let constraints = [Constraint::Email, Constraint::Playername];
    if let BackendError::UniqueViolation {
        constraint: Some(name),
        ..
    } = err
    {
        if let Some(found) = constraints.iter().find(|c| c.matches(name)) {
            return Some(*found);
        }
    }
    let message = err.message();
    constraints
        .into_iter()
        .find(|c| is_unique_constraint_error(message, c.signatures()))
}

/// Maps a failed insert or update to the error kind a caller can act on.
pub fn classify_write_error(
    operation: &'static str,
    player_id: &str,
    err: BackendError,
) -> StoreError {
    match violated_constraint(&err) {
        Some(Constraint::Email) => StoreError::EmailExists {
            player_id: player_id.to_string(),
        },
        Some(Constraint::Playername) => StoreError::UsernameExists {
            player_id: player_id.to_string(),
        },
        None => persistence_error(operation, format!("player_id={}", player_id), err),
    }
}

pub fn persistence_error(
    operation: &'static str,
    correlation: impl Into<String>,
    err: BackendError,
) -> StoreError {
    StoreError::Persistence {
        operation,
        correlation: correlation.into(),
        detail: err.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_constraint_wins() {
        let err = BackendError::UniqueViolation {
            constraint: Some("idx_players_username_unique".to_string()),
            message: "whatever the driver said".to_string(),
        };
        assert!(matches!(
            classify_write_error("op", "id1", err),
            StoreError::UsernameExists { .. }
        ));
    }

    #[test]
    fn test_sqlite_text_fallback() {
        let err = BackendError::UniqueViolation {
            constraint: None,
            message: "UNIQUE constraint failed: Players.Email".to_string(),
        };
        assert!(matches!(
            classify_write_error("op", "id1", err),
            StoreError::EmailExists { .. }
        ));
    }

    #[test]
    fn test_mysql_text_fallback() {
        let err = BackendError::Other(
            "Duplicate entry 'ann' for key 'idx_players_username_unique'".to_string(),
        );
        assert!(matches!(
            classify_write_error("op", "id1", err),
            StoreError::UsernameExists { .. }
        ));
    }

    #[test]
    fn test_other_errors_are_opaque() {
        let err = BackendError::Other("database is locked".to_string());
        match classify_write_error("PlayerStore::save", "id1", err) {
            StoreError::Persistence {
                operation,
                correlation,
                detail,
            } => {
                assert_eq!(operation, "PlayerStore::save");
                assert_eq!(correlation, "player_id=id1");
                assert_eq!(detail, "database is locked");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_email_column_mention_without_unique_is_not_conflict() {
        let err = BackendError::Other("no such column: Email".to_string());
        assert!(matches!(
            classify_write_error("op", "id1", err),
            StoreError::Persistence { .. }
        ));
    }
}
