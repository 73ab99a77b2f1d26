//! Environment configuration helpers

use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Variable is set but cannot be parsed
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    /// The env file could not be read
    #[error("failed to load env file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Load variables from a `.env` file.
///
/// With `None` the usual `.env` lookup is used and a missing file is not an
/// error. An explicit path must exist.
pub fn load_env_file(path: Option<&Path>) -> Result<(), EnvError> {
    match path {
        Some(path) => dotenvy::from_path(path).map_err(|e| EnvError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

/// Read a variable, treating empty or whitespace-only values as unset
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable
pub fn env_parse<T>(name: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|value| {
            value.parse::<T>().map_err(|e| EnvError::Invalid {
                name: name.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Read a boolean flag (`1`, `true`, `yes`, `on` are true)
pub fn env_flag(name: &str) -> bool {
    env_var(name).is_some_and(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable name; the process environment is shared.

    #[test]
    fn test_env_var_empty_is_unset() {
        unsafe { std::env::set_var("CHAT_UTILS_TEST_EMPTY", "   ") };
        assert_eq!(env_var("CHAT_UTILS_TEST_EMPTY"), None);
    }

    #[test]
    fn test_env_parse_number() {
        unsafe { std::env::set_var("CHAT_UTILS_TEST_NUM", "15") };
        assert_eq!(env_parse::<u64>("CHAT_UTILS_TEST_NUM"), Ok(Some(15)));
        assert_eq!(env_parse::<u64>("CHAT_UTILS_TEST_MISSING"), Ok(None));
    }

    #[test]
    fn test_env_parse_invalid() {
        unsafe { std::env::set_var("CHAT_UTILS_TEST_BAD", "fifteen") };
        let err = env_parse::<u64>("CHAT_UTILS_TEST_BAD").unwrap_err();
        assert!(err.to_string().contains("CHAT_UTILS_TEST_BAD"));
    }

    #[test]
    fn test_env_flag() {
        unsafe { std::env::set_var("CHAT_UTILS_TEST_FLAG", "Yes") };
        assert!(env_flag("CHAT_UTILS_TEST_FLAG"));
        assert!(!env_flag("CHAT_UTILS_TEST_FLAG_MISSING"));
    }

    #[test]
    fn test_missing_explicit_env_file() {
        let result = load_env_file(Some(Path::new("/nonexistent/stock-chat.env")));
        assert!(matches!(result, Err(EnvError::File { .. })));
    }
}
