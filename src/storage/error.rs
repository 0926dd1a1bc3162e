use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

use crate::context::Interrupted;
use crate::domain::AccountId;

/// Which integrity rule the database refused to break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
            ConstraintKind::Other => "constraint",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{kind} violation in {operation}: {message}")]
    Constraint {
        kind: ConstraintKind,
        operation: &'static str,
        message: String,
    },

    #[error("cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("database busy in {operation}: {message}")]
    Busy {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("storage error in {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{original} (rollback also failed: {rollback})")]
    Rollback {
        #[source]
        original: Box<StoreError>,
        rollback: Box<StoreError>,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }

    /// Classify a sqlx error raised while running `operation`.
    pub fn from_sqlx(operation: &'static str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let message = db_err.message().to_string();

            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
            let primary_code = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            if matches!(primary_code, Some(5) | Some(6)) {
                return StoreError::Busy { operation, message };
            }

            let kind = match db_err.kind() {
                ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                _ => None,
            };
            if let Some(kind) = kind {
                return StoreError::Constraint {
                    kind,
                    operation,
                    message,
                };
            }
        }

        StoreError::Storage {
            operation,
            source: err,
        }
    }

    /// Combine a failure with the outcome of the rollback it triggered.
    /// A failed rollback never hides the original error, and vice versa.
    pub fn with_rollback(self, rollback: Result<(), StoreError>) -> Self {
        match rollback {
            Ok(()) => self,
            Err(rollback) => StoreError::Rollback {
                original: Box::new(self),
                rollback: Box::new(rollback),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Constraint {
                kind: ConstraintKind::ForeignKey,
                ..
            }
        )
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Busy { .. } => true,
            StoreError::Storage { source, .. } => {
                matches!(source, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            StoreError::Rollback { original, .. } => original.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_successful_rollback_keeps_original() {
        let err = StoreError::not_found("account", 42).with_rollback(Ok(()));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "account 42 not found");
    }

    #[test]
    fn test_failed_rollback_reports_both() {
        let rollback = StoreError::Storage {
            operation: "rollback",
            source: sqlx::Error::PoolClosed,
        };
        let err = StoreError::not_found("account", 42).with_rollback(Err(rollback));

        let message = err.to_string();
        assert!(message.contains("account 42 not found"), "{message}");
        assert!(message.contains("rollback"), "{message}");

        match &err {
            StoreError::Rollback { original, rollback } => {
                assert!(original.is_not_found());
                assert!(matches!(**rollback, StoreError::Storage { .. }));
            }
            other => panic!("expected composite error, got {other:?}"),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_interruption_is_classified() {
        let err: StoreError = Interrupted::Cancelled.into();
        assert!(matches!(err, StoreError::Interrupted(Interrupted::Cancelled)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let busy = StoreError::Busy {
            operation: "update_account",
            message: "database is locked".into(),
        };
        assert!(busy.is_transient());
        assert!(
            StoreError::from_sqlx("acquire", sqlx::Error::PoolTimedOut).is_transient()
        );
        assert!(!StoreError::not_found("entry", 1).is_transient());
    }
}
