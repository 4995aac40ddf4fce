//! Small helpers for auth input validation and storage errors.

use regex::Regex;
use std::sync::LazyLock;

/// Compiled on first use.
static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Name of the violated unique constraint, if `err` is a unique violation.
pub(super) fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err)
            if db_err.code().is_some_and(|code| code.as_ref() == "23505") =>
        {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(
            normalize_email(" Teacher@School.TEST "),
            "teacher@school.test"
        );
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@school.test"));
        assert!(valid_email("first.last@school.co"));
    }

    #[test]
    fn valid_email_rejects_malformed() {
        assert!(!valid_email("school.test"));
        assert!(!valid_email("a @school.test"));
        assert!(!valid_email("a@school"));
    }

    #[test]
    fn email_pattern_compiles() {
        assert!(EMAIL_PATTERN.is_some());
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert_eq!(unique_violation_constraint(&sqlx::Error::RowNotFound), None);
    }
}
