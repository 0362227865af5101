//! The `utils` module holds the pieces shared across `popcast`: the crate
//! error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{PopcastError, Result};

#[cfg(test)]
mod tests {
    use super::error::PopcastError;
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
    }

    #[test]
    fn error_messages_name_the_bad_value() {
        assert_eq!(
            PopcastError::InvalidCapacity(0).to_string(),
            "mailbox capacity must be at least 1, got 0"
        );
        assert!(
            PopcastError::InvalidAdmission("burst must be at least 1".into())
                .to_string()
                .contains("burst")
        );
    }
}
